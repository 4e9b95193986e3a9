//! Shared setup for the live-site tests.
//!
//! Everything that touches ask.u.ae is `#[ignore]`d. Run with:
//! `cargo test -- --ignored`

#![allow(dead_code)]

use std::path::Path;
use uask_qa::Settings;

/// Check if Chrome is available
pub fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

/// Environment settings, headless, with reports under `reports_dir`.
pub fn settings(reports_dir: &Path) -> Settings {
    let mut settings = Settings::load().expect("invalid environment settings");
    settings.headless = true;
    settings.max_retries = 1;
    settings.reports_dir = reports_dir.to_path_buf();
    settings
}
