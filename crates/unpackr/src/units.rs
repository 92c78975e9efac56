//! Human-readable sizes, durations and the block progress bar.

use std::time::Duration;

const SIZE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

pub const BAR_CELLS: usize = 12;
const FILLED: char = '■';
const EMPTY: char = '□';

/// `1536` -> `"1.50 KB"`. Binary multiples, two decimals, `"0 B"` for zero.
pub fn readable_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", SIZE_UNITS[unit])
}

/// `3723s` -> `"1h 2m 3s"`. Seconds are always shown when nothing larger is.
pub fn readable_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let (hours, rest) = (rest / 3_600, rest % 3_600);
    let (minutes, seconds) = (rest / 60, rest % 60);

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

/// Filled cells proportional to `current / total`; all empty when the total is unknown.
pub fn progress_bar(current: u64, total: u64, cells: usize) -> String {
    let filled = if total == 0 {
        0
    } else {
        let ratio = (current as f64 / total as f64).min(1.0);
        (cells as f64 * ratio) as usize
    };
    let mut bar = String::with_capacity(cells * FILLED.len_utf8());
    bar.extend(std::iter::repeat_n(FILLED, filled));
    bar.extend(std::iter::repeat_n(EMPTY, cells - filled));
    bar
}

/// A single filled cell sweeping across the bar, one step per tick.
pub fn sweep_bar(tick: u64, cells: usize) -> String {
    if cells == 0 {
        return String::new();
    }
    let lit = (tick % cells as u64) as usize;
    (0..cells).map(|i| if i == lit { FILLED } else { EMPTY }).collect()
}
