//! # uask-agent
//!
//! Interaction layer for driving a chatbot widget through a stealth browser.
//! Finds the chat input and send control across shifting DOM layouts, clears
//! disclaimer and CAPTCHA overlays, detects CAPTCHA challenges (and waits
//! for a human to solve them), and runs the full type → send → observe cycle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use uask_agent::{ChatHelpers, EokaDriver, LaunchProfile};
//!
//! # #[tokio::main]
//! # async fn main() -> uask_agent::Result<()> {
//! let browser = LaunchProfile::default().launch().await?;
//! let page = browser.new_page("about:blank").await?;
//! let driver = EokaDriver::new(page);
//!
//! let helpers = ChatHelpers::default();
//! let setup = helpers.setup_page_reliably(&driver, "https://ask.u.ae/en/").await?;
//! if setup.page_ready() {
//!     let outcome = helpers
//!         .send_message_complete(&driver, "How do I renew my Emirates ID?", true)
//!         .await?;
//!     println!("sent: {}", outcome.success());
//! }
//! browser.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod chat_page;
pub mod driver;
pub mod helpers;
pub mod probe;
pub mod selectors;
pub mod session;
pub mod stealth;
pub mod wait;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use chat_page::{AccessibilityReport, ChatPage, MessageCount};
pub use driver::{EokaDriver, PageDriver};
pub use helpers::{
    CaptchaCheck, ChatElements, ChatHelpers, Dismissal, Located, SendFailure, SendOutcome,
    SetupOutcome,
};
pub use probe::{Probe, ProbeState};
pub use selectors::{CaptchaPattern, PageLocators, SelectorSet, Timings};
pub use session::{SessionCookie, SessionSnapshot};
pub use stealth::LaunchProfile;

// Re-export eoka types that callers need
pub use eoka::{Browser, Page, StealthConfig};

/// Result type for uask-agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from driving the page.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
