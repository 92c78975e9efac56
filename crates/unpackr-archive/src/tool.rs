//! The general-purpose external archiver (`7z` and compatible binaries).

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{Error, Result};

/// 7-Zip reports non-fatal warnings with exit code 1.
const EXIT_WARNING: i32 = 1;

#[derive(Clone, Debug)]
pub struct Archiver {
    program: PathBuf,
}

impl Archiver {
    /// Look `program` up on `PATH` (or take it as-is when it is a path).
    pub fn locate(program: &OsStr) -> Option<Self> {
        match which::which(program) {
            Ok(program) => Some(Self { program }),
            Err(e) => {
                tracing::debug!(program = ?program, error = %e, "archiver not found");
                None
            }
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Run `x` into `destination`. Arguments are passed directly, never through a shell.
    pub fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let mut out_flag = OsString::from("-o");
        out_flag.push(destination);

        let output = Command::new(&self.program)
            .arg("x")
            .arg("-y")
            .arg("-bd")
            .arg(out_flag)
            .arg("--")
            .arg(archive)
            .output()?;

        match output.status.code() {
            Some(0) => Ok(()),
            Some(EXIT_WARNING) => {
                tracing::warn!(
                    archive = %archive.display(),
                    diagnostics = %diagnostics(&output),
                    "archiver finished with warnings"
                );
                Ok(())
            }
            _ => Err(Error::ToolFailed {
                tool: self.name(),
                status: output.status.to_string(),
                stderr: diagnostics(&output),
            }),
        }
    }

    /// Total unpacked size and file count from the technical listing (`l -slt`).
    pub fn list_sizes(&self, archive: &Path) -> Option<(u64, usize)> {
        let output = Command::new(&self.program)
            .arg("l")
            .arg("-slt")
            .arg("--")
            .arg(archive)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_listing(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Prefer stderr; 7-Zip prints most errors to stdout, so fall back to its tail.
fn diagnostics(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(5)..].join("\n")
}

/// Sum `Size = N` over the non-folder records that follow the `----------` separator.
fn parse_listing(listing: &str) -> Option<(u64, usize)> {
    let (_, records) = listing.split_once("\n----------")?;

    let mut total = 0u64;
    let mut files = 0usize;
    for record in records.split("\n\n") {
        let mut size = None;
        let mut folder = false;
        for line in record.lines() {
            if let Some(value) = line.strip_prefix("Size = ") {
                size = value.trim().parse::<u64>().ok();
            } else if let Some(value) = line.strip_prefix("Folder = ") {
                folder = value.trim() == "+";
            }
        }
        if let (Some(size), false) = (size, folder) {
            total = total.saturating_add(size);
            files += 1;
        }
    }
    (files > 0).then_some((total, files))
}
