//! Terminal rendering of status text.

use indicatif::{ProgressBar, ProgressStyle};
use unpackr::{StatusSink, TransportError};

const TEMPLATE: &str = "{spinner:.cyan} {wide_msg}";
const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

/// A spinner line that shows the latest status text.
pub struct TerminalStatus {
    pb: ProgressBar,
}

impl TerminalStatus {
    pub fn new(initial: &str) -> Self {
        let style = ProgressStyle::with_template(TEMPLATE)
            .map(|style| style.tick_chars(TICK))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let pb = ProgressBar::new_spinner().with_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb.set_message(initial.to_string());
        Self { pb }
    }

    #[cfg(test)]
    fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }

    pub fn finish(&self) {
        self.pb.finish();
    }
}

/// The chat layout spans several lines; a terminal line gets them joined.
fn one_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "┖")
        .collect::<Vec<_>>()
        .join("  ")
}

impl StatusSink for TerminalStatus {
    async fn update(&self, text: &str) -> Result<(), TransportError> {
        self.pb.set_message(one_line(text));
        Ok(())
    }
}
