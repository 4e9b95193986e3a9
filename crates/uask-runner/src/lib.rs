//! # uask-runner
//!
//! YAML-declared QA suites for the U-Ask chatbot. A suite names a target,
//! a browser profile and a list of cases; each case is a sequence of steps
//! (setup, send, checks on the captured reply) executed in a fresh tab.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use uask_runner::{Runner, Settings, Suite};
//!
//! # #[tokio::main]
//! # async fn main() -> uask_runner::Result<()> {
//! let settings = Settings::load()?;
//! let suite = Suite::load_with_params("configs/ui_behavior.yaml", &settings.params())?;
//! let runner = Runner::launch(&suite, &settings).await?;
//! let result = runner.run(&suite).await?;
//! println!("{}/{} cases passed", result.passed(), result.results.len());
//! runner.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
pub mod logging;
pub mod operator;
pub mod report;
mod runner;
pub mod test_data;

pub use config::{
    BrowserSection, Case, Check, DataRef, ElementRole, Engine, Language, OnFailure, ParamDef,
    Params, RetryConfig, SendStep, Settings, Step, Suite, TargetUrl, TextDirection, Viewport,
};
pub use report::{CaseResult, ScreenshotMetadata, SuiteResult};
pub use runner::{CaseContext, Exchange, Runner};
pub use test_data::{EdgeCase, Query, SecurityCase, TestData};

/// Result type for uask-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from loading configuration or running a suite.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("{0}")]
    Agent(#[from] uask_agent::Error),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),
}
