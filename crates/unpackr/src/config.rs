use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use unpackr_archive::ExtractOptions;

use crate::error::Result;

const GIB: u64 = 1024 * 1024 * 1024;

/// Runtime settings: defaults, then an optional TOML file, then `UNPACKR_*` variables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-owner extraction directories live under here.
    pub download_dir: PathBuf,
    pub free_limit: u64,
    pub premium_limit: u64,
    pub primary_upload_ceiling: u64,
    pub elevated_upload_ceiling: u64,
    pub progress_interval_ms: u64,
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub archiver: String,
    pub connect_timeout_secs: u64,
    /// Delete the received archive once extraction is over.
    pub remove_source: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("/tmp/unpackr"),
            free_limit: 2 * GIB,
            premium_limit: 4 * GIB,
            primary_upload_ceiling: 2 * GIB,
            elevated_upload_ceiling: 4 * GIB,
            progress_interval_ms: 2_000,
            session_ttl_secs: 6 * 60 * 60,
            sweep_interval_secs: 10 * 60,
            archiver: unpackr_archive::DEFAULT_ARCHIVER.to_string(),
            connect_timeout_secs: 30,
            remove_source: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub const ENV_PREFIX: &'static str = "UNPACKR_";

    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(Self::ENV_PREFIX))
    }

    pub fn load(file: Option<&Path>) -> Result<Self> {
        Ok(Self::figment(file).extract()?)
    }

    /// Largest input an owner may submit.
    pub fn size_ceiling(&self, premium: bool) -> u64 {
        if premium { self.premium_limit } else { self.free_limit }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(100))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions::default().archiver(&self.archiver)
    }
}
