//! Candidate lists and timings. Everything here can be overridden from a
//! suite file; unset fields keep the defaults below.

use crate::probe::{probes, Probe};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A CAPTCHA signature and the label reported when it matches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CaptchaPattern {
    pub probe: Probe,
    pub label: String,
}

impl CaptchaPattern {
    pub fn new(probe: &str, label: &str) -> Self {
        Self {
            probe: Probe::parse(probe),
            label: label.into(),
        }
    }
}

/// Ordered fallback lists for every element the helpers look for.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    pub input: Vec<Probe>,
    pub send: Vec<Probe>,
    pub widget: Vec<Probe>,
    pub disclaimer: Vec<Probe>,
    pub disclaimer_backdrop: Probe,
    pub modals: Vec<Probe>,
    pub modal_close: Vec<Probe>,
    pub modal_backdrop: Probe,
    pub captcha: Vec<CaptchaPattern>,
    /// Body text shown while the chat backend is still connecting.
    pub loading_texts: Vec<String>,
    pub page: PageLocators,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            input: probes([
                "[contenteditable='true'][placeholder*='ask' i]",
                "[contenteditable='true'][placeholder*='question' i]",
                "[contenteditable='true']:not([aria-hidden='true'])",
                "textarea[placeholder*='ask' i]",
                "textarea[placeholder*='question' i]",
                "input[placeholder*='ask' i]",
                ".chat-input textarea",
                ".chat-input input",
                ".message-input",
                "#chat-input",
                ".input-message",
            ]),
            send: probes([
                "button[aria-label*='send' i]",
                "button[title*='send' i]",
                "button:has-text('Send')",
                ".send-button",
                ".chat-send",
                "button svg[class*='send']",
                "button:has(svg)",
                ".btn-send",
                "[data-testid*='send']",
                "button[type='submit']",
            ]),
            widget: probes([
                "#chat-widget",
                ".chat-widget",
                "#chat-container",
                ".chat-container",
                "iframe[title*='chat']",
                "[data-testid*='chat']",
                ".chat-wrapper",
                ".chatbot",
            ]),
            disclaimer: probes([
                ".overlay-disclaimer button",
                ".disclaimer button",
                ".overlay button",
                "[data-dismiss='modal']",
                ".modal button",
                ".close-btn",
                "button:has-text('Close')",
                "button:has-text('Accept')",
                "button:has-text('Continue')",
                ".btn-close",
                "[aria-label*='close' i]",
                ".disclaimer-close",
                ".popup-close",
            ]),
            disclaimer_backdrop: Probe::css(".overlay, .modal-backdrop"),
            modals: probes([
                "#modalRecaptcha",
                ".modal.show",
                ".swal2-container",
                ".modal-backdrop",
                "[role='dialog'][aria-modal='true']",
                ".captcha-modal",
                ".recaptcha-modal",
            ]),
            modal_close: probes([
                "#modalRecaptcha button",
                "#modalRecaptcha .btn-close",
                "#modalRecaptcha [aria-label*='close' i]",
                ".swal2-close",
                ".swal2-cancel",
                ".modal .close",
                ".modal .btn-close",
                ".modal button[data-dismiss='modal']",
                ".modal button:has-text('Close')",
                ".modal button:has-text('Cancel')",
                ".modal button:has-text('OK')",
            ]),
            modal_backdrop: Probe::css(".modal-backdrop, .swal2-backdrop"),
            captcha: vec![
                CaptchaPattern::new("iframe[src*='recaptcha']", "Active reCAPTCHA"),
                CaptchaPattern::new(".g-recaptcha", "Visible Google reCAPTCHA"),
                CaptchaPattern::new("#modalRecaptcha", "CAPTCHA Modal"),
            ],
            loading_texts: [
                "Connecting to Services...",
                "Loading...",
                "Please wait...",
                "Initializing...",
                "Connecting to services...",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            page: PageLocators::default(),
        }
    }
}

/// Selector unions used by the page object.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PageLocators {
    pub chat_widget: Probe,
    pub input: Probe,
    pub send: Probe,
    pub message_container: Probe,
    pub user_messages: Probe,
    pub ai_responses: Probe,
    pub loading: Probe,
    pub error: Probe,
    pub iframe: Probe,
    pub document: Probe,
}

impl Default for PageLocators {
    fn default() -> Self {
        Self {
            chat_widget: Probe::css("#chat-widget, iframe[title*='chat'], #chat-container"),
            input: Probe::css(
                "textarea[placeholder*='Ask'], input[type='text'], textarea, input[placeholder]",
            ),
            send: Probe::css(
                "button[type='submit'], button[aria-label*='Send'], button[aria-label*='send' i]",
            ),
            message_container: Probe::css(
                ".message-container, .chat-messages, .messages, [role='log']",
            ),
            user_messages: Probe::css(
                ".user-message, .message.user, .user, [data-message-type='user']",
            ),
            ai_responses: Probe::css(
                ".ai-message, .bot-message, .message.bot, .assistant, .bot, [data-message-type='assistant']",
            ),
            loading: Probe::css(".loading, .typing-indicator, .spinner, [role='progressbar']"),
            error: Probe::css(".error-message, .alert-error, .error, [role='alert']"),
            iframe: Probe::css("iframe"),
            document: Probe::css("html"),
        }
    }
}

/// Delays and timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// How long discovery waits for a chat element to become visible.
    pub probe_timeout_ms: u64,
    pub dismiss_probe_timeout_ms: u64,
    pub dismiss_attempts: u32,
    pub dismiss_settle_ms: u64,
    pub navigation_timeout_ms: u64,
    pub network_idle_ms: u64,
    pub post_navigation_settle_ms: u64,
    pub services_max_wait_ms: u64,
    pub services_poll_ms: u64,
    pub focus_settle_ms: u64,
    pub clear_settle_ms: u64,
    pub type_settle_ms: u64,
    pub click_settle_ms: u64,
    pub post_send_settle_ms: u64,
    pub captcha_wait_ms: u64,
    pub captcha_poll_ms: u64,
    /// How long to watch the page for a reply after sending.
    pub response_change_ms: u64,
    pub response_timeout_ms: u64,
    pub action_timeout_ms: u64,
    pub stable_poll_ms: u64,
    /// Pause after a reply shows up, before reading it.
    pub render_settle_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 3_000,
            dismiss_probe_timeout_ms: 2_000,
            dismiss_attempts: 3,
            dismiss_settle_ms: 2_000,
            navigation_timeout_ms: 60_000,
            network_idle_ms: 500,
            post_navigation_settle_ms: 3_000,
            services_max_wait_ms: 30_000,
            services_poll_ms: 1_000,
            focus_settle_ms: 500,
            clear_settle_ms: 300,
            type_settle_ms: 1_000,
            click_settle_ms: 1_000,
            post_send_settle_ms: 2_000,
            captcha_wait_ms: 30_000,
            captcha_poll_ms: 5_000,
            response_change_ms: 5_000,
            response_timeout_ms: 30_000,
            action_timeout_ms: 30_000,
            stable_poll_ms: 500,
            render_settle_ms: 1_000,
        }
    }
}

impl Timings {
    /// Every delay scaled to zero except the timeouts, for fast fakes.
    pub fn instant() -> Self {
        Self {
            dismiss_settle_ms: 0,
            post_navigation_settle_ms: 0,
            focus_settle_ms: 0,
            clear_settle_ms: 0,
            type_settle_ms: 0,
            click_settle_ms: 0,
            post_send_settle_ms: 0,
            render_settle_ms: 0,
            ..Self::default()
        }
    }

    pub(crate) fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_candidate_order() {
        let s = SelectorSet::default();
        assert_eq!(s.input.len(), 11);
        assert_eq!(s.send.len(), 10);
        assert_eq!(s.widget.len(), 8);
        assert_eq!(s.disclaimer.len(), 13);
        assert_eq!(s.modals[0], Probe::css("#modalRecaptcha"));
        assert_eq!(s.send[2], Probe::text("button", "Send"));
        assert_eq!(s.captcha[2].label, "CAPTCHA Modal");
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let s: SelectorSet =
            serde_json::from_str(r##"{"input": ["#my-input", "text:Ask"]}"##).unwrap();
        assert_eq!(s.input, vec![Probe::css("#my-input"), Probe::parse("text:Ask")]);
        assert_eq!(s.send.len(), 10);
    }

    #[test]
    fn captcha_pattern_override() {
        let s: SelectorSet = serde_json::from_str(
            r#"{"captcha": [{"probe": ".h-captcha", "label": "hCaptcha"}]}"#,
        )
        .unwrap();
        assert_eq!(s.captcha, vec![CaptchaPattern::new(".h-captcha", "hCaptcha")]);
    }

    #[test]
    fn timings_partial_override() {
        let t: Timings = serde_json::from_str(r#"{"captcha_wait_ms": 1000}"#).unwrap();
        assert_eq!(t.captcha_wait_ms, 1000);
        assert_eq!(t.captcha_poll_ms, 5000);
    }
}
