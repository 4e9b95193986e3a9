//! # uask-qa
//!
//! QA automation for the U-Ask government chatbot (ask.u.ae). The work is
//! split across three crates, re-exported here:
//!
//! - [`validators`]: pure checks on captured replies (keywords,
//!   hallucination cues, formatting, XSS and prompt-injection signals,
//!   similarity)
//! - [`agent`]: the chat-page interaction layer (element discovery,
//!   overlay dismissal, CAPTCHA detection, the send cycle)
//! - [`runner`]: YAML suites, environment settings, test data, reports and
//!   the `uask-runner` CLI
//!
//! Suites live in `configs/`, the query fixture in `data/test-data.json`.

pub use uask_agent as agent;
pub use uask_runner as runner;
pub use uask_validators as validators;

pub use uask_agent::{ChatHelpers, ChatPage, EokaDriver, LaunchProfile, PageDriver};
pub use uask_runner::{Runner, Settings, Suite, SuiteResult, TestData};
