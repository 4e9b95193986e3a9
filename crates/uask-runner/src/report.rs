//! Run results, failure screenshots with metadata sidecars, and the
//! summary file.

use crate::Result;
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uask_agent::artifacts::file_stem;
use uask_agent::PageDriver;

/// Outcome of one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub success: bool,
    pub error: Option<String>,
    pub steps_executed: usize,
    pub duration_ms: u64,
    /// Attempts made beyond the first.
    pub retries: u32,
    pub screenshot: Option<PathBuf>,
}

/// Outcome of a whole suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteResult {
    pub suite: String,
    pub results: Vec<CaseResult>,
}

impl SuiteResult {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            results: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    /// Write `{execution_time, suite, passed, failed, results}` as pretty JSON.
    pub fn write_summary(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct Summary<'a> {
            execution_time: String,
            suite: &'a str,
            passed: usize,
            failed: usize,
            results: &'a [CaseResult],
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let summary = Summary {
            execution_time: Local::now().to_rfc3339(),
            suite: &self.suite,
            passed: self.passed(),
            failed: self.failed(),
            results: &self.results,
        };
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        info!("summary saved: {}", path.display());
        Ok(())
    }
}

/// JSON written next to a failure screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenshotMetadata {
    pub test_name: String,
    pub timestamp: String,
    pub screenshot: String,
    pub error: Option<String>,
    pub phase: String,
    pub url: Option<String>,
    pub attempt: u32,
}

/// `<case>_failed_YYYYmmdd_HHMMSS.png`
pub fn failure_screenshot_name(case_name: &str) -> String {
    format!(
        "{}_failed_{}.png",
        file_stem(case_name),
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// The sidecar path for a screenshot: same stem, `.json`.
pub fn sidecar_path(screenshot: &Path) -> PathBuf {
    screenshot.with_extension("json")
}

/// Capture the page after a failed case and describe it in a sidecar.
pub async fn save_failure_screenshot<D: PageDriver + ?Sized>(
    driver: &D,
    dir: &Path,
    case_name: &str,
    error: Option<&str>,
    attempt: u32,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(failure_screenshot_name(case_name));
    let png = driver.screenshot().await?;
    std::fs::write(&path, png)?;
    info!("failure screenshot: {}", path.display());

    let metadata = ScreenshotMetadata {
        test_name: case_name.to_string(),
        timestamp: Local::now().to_rfc3339(),
        screenshot: path.display().to_string(),
        error: error.map(str::to_string),
        phase: "call".into(),
        url: driver.url().await.ok(),
        attempt,
    };
    write_metadata(&path, &metadata);
    Ok(path)
}

/// Sidecar failures are logged, not raised: the screenshot already exists.
fn write_metadata(screenshot: &Path, metadata: &ScreenshotMetadata) {
    let path = sidecar_path(screenshot);
    let result = serde_json::to_string_pretty(metadata)
        .map_err(std::io::Error::other)
        .and_then(|json| std::fs::write(&path, json));
    match result {
        Ok(()) => info!("screenshot metadata: {}", path.display()),
        Err(e) => warn!("failed to save screenshot metadata {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uask_agent::testing::FakePage;

    fn case(name: &str, success: bool) -> CaseResult {
        CaseResult {
            name: name.into(),
            success,
            error: (!success).then(|| "assertion failed: page is not ready".to_string()),
            steps_executed: 2,
            duration_ms: 1500,
            retries: 0,
            screenshot: None,
        }
    }

    #[test]
    fn failure_name_is_path_safe() {
        let name = failure_screenshot_name("xss / script tag");
        assert!(name.starts_with("xss___script_tag_failed_"), "{}", name);
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn sidecar_sits_next_to_png() {
        assert_eq!(
            sidecar_path(Path::new("reports/screenshots/a_failed_1.png")),
            PathBuf::from("reports/screenshots/a_failed_1.json")
        );
    }

    #[test]
    fn counts_and_success() {
        let mut suite = SuiteResult::new("UI");
        suite.results.push(case("loads", true));
        suite.results.push(case("sends", false));
        assert_eq!(suite.passed(), 1);
        assert_eq!(suite.failed(), 1);
        assert!(!suite.success());
        assert!(SuiteResult::new("empty").success());
    }

    #[test]
    fn summary_file_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("summary.json");
        let mut suite = SuiteResult::new("UI");
        suite.results.push(case("loads", true));
        suite.write_summary(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["suite"], "UI");
        assert_eq!(json["passed"], 1);
        assert_eq!(json["results"][0]["name"], "loads");
        assert_eq!(json["results"][0]["steps_executed"], 2);
        assert!(json["execution_time"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn failure_screenshot_writes_png_and_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let page = FakePage::new();
        let path = save_failure_screenshot(
            &page,
            tmp.path(),
            "widget loads",
            Some("input not found"),
            2,
        )
        .await
        .unwrap();

        assert!(path.exists());
        assert_eq!(page.screenshots(), 1);
        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sidecar_path(&path)).unwrap()).unwrap();
        assert_eq!(meta["test_name"], "widget loads");
        assert_eq!(meta["error"], "input not found");
        assert_eq!(meta["phase"], "call");
        assert_eq!(meta["attempt"], 2);
        assert_eq!(meta["url"], "https://ask.u.ae/en/");
        assert!(chrono::DateTime::parse_from_rfc3339(meta["timestamp"].as_str().unwrap()).is_ok());
    }
}
