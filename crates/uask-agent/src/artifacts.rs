//! Screenshot files.

use crate::driver::PageDriver;
use crate::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

/// `name_YYYYmmdd_HHMMSS.png`, with path-hostile characters replaced.
pub fn timestamped_name(name: &str) -> String {
    format!(
        "{}_{}.png",
        file_stem(name),
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Keep ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "screenshot".into()
    } else {
        stem
    }
}

/// Capture the page into `dir` under a timestamped name.
pub async fn save_screenshot<D: PageDriver + ?Sized>(
    driver: &D,
    dir: &Path,
    name: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(timestamped_name(name));
    let png = driver.screenshot().await?;
    std::fs::write(&path, png)?;
    info!("screenshot: {}", path.display());
    Ok(path)
}
