pub mod completions;
pub mod cut;
pub mod doctor;
pub mod man_pages;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INVALID_INPUT: u8 = 2;
pub const EXIT_MANIFEST_ERROR: u8 = 3;
pub const EXIT_EXTRACTION_ERROR: u8 = 4;

/// Map an error message to the process exit code.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("invalid slice name:")
        || msg.starts_with("invalid release:")
        || msg.starts_with("invalid architecture:")
    {
        EXIT_INVALID_INPUT
    } else if msg.starts_with("manifest error:")
        || msg.starts_with("slice definition file not found")
    {
        EXIT_MANIFEST_ERROR
    } else if msg.starts_with("extraction failed") {
        EXIT_EXTRACTION_ERROR
    } else {
        EXIT_FAILURE
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}
