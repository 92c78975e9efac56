use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchPhase {
    Connecting,
    Downloading,
    Completed,
}

/// Snapshot handed to progress callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub phase: FetchPhase,

    /// Bytes written to the partial file so far.
    pub bytes_downloaded: u64,

    /// Total expected bytes, when the server sent a Content-Length.
    pub total_bytes: Option<u64>,
}

impl Progress {
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) | None => None,
            Some(total) => Some(self.bytes_downloaded as f64 / total as f64 * 100.0),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Per-download knobs, built up fluently.
#[derive(Clone, Default)]
pub struct FetchOptions {
    pub on_progress: Option<ProgressCallback>,
    /// Abort once more than this many bytes have arrived.
    pub max_bytes: Option<u64>,
}

impl FetchOptions {
    pub fn on_progress(mut self, callback: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn max_bytes(mut self, limit: u64) -> Self {
        self.max_bytes = Some(limit);
        self
    }

    pub(crate) fn report(&self, progress: Progress) {
        if let Some(callback) = &self.on_progress {
            callback(&progress);
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("on_progress", &self.on_progress.is_some())
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_needs_a_total() {
        let mut progress = Progress {
            phase: FetchPhase::Downloading,
            bytes_downloaded: 50,
            total_bytes: None,
        };
        assert_eq!(progress.percentage(), None);

        progress.total_bytes = Some(200);
        assert_eq!(progress.percentage(), Some(25.0));

        progress.total_bytes = Some(0);
        assert_eq!(progress.percentage(), None);
    }

    #[test]
    fn options_builder() {
        let options = FetchOptions::default().max_bytes(10).on_progress(|_| {});
        assert_eq!(options.max_bytes, Some(10));
        assert!(options.on_progress.is_some());
        assert!(format!("{options:?}").contains("on_progress: true"));
    }
}
