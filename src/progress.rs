//! Progress reporting.
//!
//! Interactive runs get an indicatif bar over the input rows. With
//! `--log-only` the bar is hidden and progress goes through `log` at a fixed
//! row interval, which keeps output readable under `tail -f`.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Rows between progress lines in log-only mode.
pub const LOG_INTERVAL: u64 = 500;

/// Switches bars off in favour of periodic log lines.
pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

/// Whether log-only mode is on.
pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// "12.3s" under a minute, "4.5m" above.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Bar over `len` rows. `len` of 0 means the total is unknown and a
/// spinner-style bar is drawn instead.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = if len == 0 {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::new(len)
    };
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let template = if len == 0 {
            "{msg} {spinner} [{elapsed_precise}] {pos} rows ({per_sec})"
        } else {
            "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})"
        };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("=> "));
        }
        if len == 0 {
            pb.enable_steady_tick(Duration::from_millis(100));
        }
    }
    pb.set_message(msg.to_string());
    pb
}

/// Logs a progress line every `interval` rows and at the last row. No-op
/// unless log-only mode is on.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if !is_log_only() || interval == 0 {
        return;
    }
    if current % interval == 0 || current == total {
        if total > 0 {
            let pct = 100.0 * current as f64 / total as f64;
            info!("[{}] {}/{} ({:.1}%)", phase, current, total, pct);
        } else {
            info!("[{}] {} rows", phase, current);
        }
    }
}
