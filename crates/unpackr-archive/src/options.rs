use std::ffi::OsString;

/// Name of the general-purpose archiver looked up on `PATH` by default.
pub const DEFAULT_ARCHIVER: &str = "7z";

#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// General-purpose archiver used for rar/7z/bare streams and unknown inputs.
    pub archiver: OsString,
    /// Inspect magic bytes before handing an unrecognized name to the archiver.
    pub sniff_unknown: bool,
    /// Refuse archives whose members expand beyond this many bytes.
    pub max_unpacked_bytes: Option<u64>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            archiver: OsString::from(DEFAULT_ARCHIVER),
            sniff_unknown: true,
            max_unpacked_bytes: None,
        }
    }
}

impl ExtractOptions {
    pub fn archiver(mut self, program: impl Into<OsString>) -> Self {
        self.archiver = program.into();
        self
    }

    pub fn sniff_unknown(mut self, enabled: bool) -> Self {
        self.sniff_unknown = enabled;
        self
    }

    pub fn max_unpacked_bytes(mut self, limit: u64) -> Self {
        self.max_unpacked_bytes = Some(limit);
        self
    }
}
