//! Page object over the chat UI: fixed locator unions and primitive actions.
//!
//! Unlike [`ChatHelpers`](crate::ChatHelpers), nothing here retries through
//! candidate lists. Failures surface as errors so a test can assert on them.

use crate::artifacts;
use crate::driver::PageDriver;
use crate::helpers::ChatHelpers;
use crate::probe::Probe;
use crate::selectors::{PageLocators, Timings};
use crate::wait;
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of [`ChatPage::check_accessibility`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccessibilityReport {
    /// Input carries an `aria-label` or a placeholder.
    pub has_labels: bool,
    /// Message container declares a `role`.
    pub has_aria_attributes: bool,
    /// Send control is not removed from the tab order.
    pub keyboard_navigable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageCount {
    pub user: usize,
    pub ai: usize,
}

/// How long the loading indicator gets to show up after a send.
const LOADING_APPEAR: Duration = Duration::from_secs(5);
/// Identical non-empty reads in a row before a reply counts as stable.
const STABLE_READS: u32 = 3;

pub struct ChatPage<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    locators: PageLocators,
    timings: Timings,
}

impl<'a, D: PageDriver + ?Sized> ChatPage<'a, D> {
    pub fn new(driver: &'a D) -> Self {
        Self::with_locators(driver, PageLocators::default(), Timings::default())
    }

    pub fn with_locators(driver: &'a D, locators: PageLocators, timings: Timings) -> Self {
        Self {
            driver,
            locators,
            timings,
        }
    }

    pub fn driver(&self) -> &'a D {
        self.driver
    }

    pub fn locators(&self) -> &PageLocators {
        &self.locators
    }

    fn action_timeout(&self) -> Duration {
        Timings::ms(self.timings.action_timeout_ms)
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        info!("navigating to {}", url);
        self.driver.goto(url).await?;
        self.driver
            .wait_for_network_idle(self.timings.network_idle_ms, self.timings.action_timeout_ms)
            .await
    }

    /// Wait for the widget container. A page whose widget lives in an
    /// iframe counts as loaded once the iframe exists.
    pub async fn wait_for_chat_widget(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or_else(|| self.action_timeout());
        info!("waiting for chat widget");
        if wait::visible(self.driver, &self.locators.chat_widget, timeout).await? {
            return Ok(());
        }
        if self.driver.probe(&self.locators.iframe).await?.present() {
            info!("chat widget found in iframe");
            return Ok(());
        }
        Err(Error::Timeout(format!(
            "chat widget not visible after {}ms",
            timeout.as_millis()
        )))
    }

    pub async fn send_message(&self, message: &str, wait_for_response: bool) -> Result<()> {
        info!("sending message: {}", message.chars().take(50).collect::<String>());
        let input = &self.locators.input;
        if !wait::visible(self.driver, input, self.action_timeout()).await? {
            return Err(Error::ElementNotFound(input.to_string()));
        }
        self.driver.fill(input, "").await?;
        self.driver.fill(input, message).await?;
        ChatHelpers::settle(self.timings.focus_settle_ms).await;
        self.driver.click(&self.locators.send).await?;

        if wait_for_response {
            self.wait_for_response(None).await?;
        }
        Ok(())
    }

    /// Loading indicator up then down (best effort), then at least one
    /// AI response visible.
    pub async fn wait_for_response(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or_else(|| Timings::ms(self.timings.response_timeout_ms));
        info!("waiting for AI response");

        let loading = &self.locators.loading;
        match wait::visible(self.driver, loading, LOADING_APPEAR).await {
            Ok(true) => {
                if !wait::hidden(self.driver, loading, timeout).await.unwrap_or(false) {
                    debug!("loading indicator still visible");
                }
            }
            Ok(false) => debug!("no loading indicator, fast reply"),
            Err(e) => debug!("loading indicator check failed: {}", e),
        }

        if !wait::visible(self.driver, &self.locators.ai_responses, timeout).await? {
            return Err(Error::Timeout(format!(
                "no AI response within {}ms",
                timeout.as_millis()
            )));
        }
        ChatHelpers::settle(self.timings.render_settle_ms).await;
        Ok(())
    }

    /// Empty when nothing has been answered yet.
    pub async fn last_ai_response(&self) -> Result<String> {
        let text = self
            .all_ai_responses()
            .await?
            .pop()
            .unwrap_or_default();
        if text.is_empty() {
            warn!("no AI responses found");
        } else {
            debug!("last response: {}", text.chars().take(100).collect::<String>());
        }
        Ok(text)
    }

    pub async fn all_ai_responses(&self) -> Result<Vec<String>> {
        self.driver.texts(&self.locators.ai_responses).await
    }

    pub async fn last_user_message(&self) -> Result<String> {
        let mut all = self.driver.texts(&self.locators.user_messages).await?;
        Ok(all.pop().unwrap_or_default())
    }

    pub async fn is_input_cleared(&self) -> Result<bool> {
        let value = self.driver.read_input(&self.locators.input).await?;
        Ok(value.trim().is_empty())
    }

    /// `"ltr"` unless the document says otherwise.
    pub async fn text_direction(&self) -> Result<String> {
        let dir = self
            .driver
            .evaluate_json("document.dir || document.documentElement.dir || ''")
            .await?;
        Ok(match dir.as_str() {
            Some(d) if !d.is_empty() => d.to_lowercase(),
            _ => "ltr".into(),
        })
    }

    pub async fn is_rtl_layout(&self) -> Result<bool> {
        Ok(self.text_direction().await? == "rtl")
    }

    /// `<html lang>`, empty if unset.
    pub async fn page_language(&self) -> Result<String> {
        let lang = self
            .driver
            .evaluate_json("document.documentElement.lang || ''")
            .await?;
        Ok(lang.as_str().unwrap_or_default().to_string())
    }

    pub async fn scroll_to_bottom(&self) -> Result<()> {
        info!("scrolling to bottom");
        let js = match &self.locators.message_container {
            Probe::Css(sel) => format!(
                "(() => {{ const el = document.querySelector({}); if (el) el.scrollTop = el.scrollHeight; }})()",
                serde_json::to_string(sel)?
            ),
            Probe::Text { .. } => {
                "window.scrollTo(0, document.body.scrollHeight)".to_string()
            }
        };
        self.driver.execute(&js).await
    }

    pub async fn message_count(&self) -> Result<MessageCount> {
        Ok(MessageCount {
            user: self.driver.probe(&self.locators.user_messages).await?.count,
            ai: self.driver.probe(&self.locators.ai_responses).await?.count,
        })
    }

    pub async fn is_error_displayed(&self) -> bool {
        self.driver
            .probe(&self.locators.error)
            .await
            .map(|s| s.visible)
            .unwrap_or(false)
    }

    /// Empty unless an error is showing.
    pub async fn error_message(&self) -> Result<String> {
        if !self.is_error_displayed().await {
            return Ok(String::new());
        }
        let mut texts = self.driver.texts(&self.locators.error).await?;
        Ok(if texts.is_empty() {
            String::new()
        } else {
            texts.swap_remove(0)
        })
    }

    pub async fn is_loading(&self) -> bool {
        self.driver
            .probe(&self.locators.loading)
            .await
            .map(|s| s.visible)
            .unwrap_or(false)
    }

    pub async fn take_screenshot(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        artifacts::save_screenshot(self.driver, dir, name).await
    }

    pub async fn check_accessibility(&self) -> AccessibilityReport {
        info!("running accessibility checks");
        let mut report = AccessibilityReport::default();
        let d = self.driver;

        let aria = d.attribute(&self.locators.input, "aria-label").await;
        let placeholder = d.attribute(&self.locators.input, "placeholder").await;
        report.has_labels = matches!(aria, Ok(Some(ref v)) if !v.is_empty())
            || matches!(placeholder, Ok(Some(ref v)) if !v.is_empty());

        if let Ok(Some(role)) = d.attribute(&self.locators.message_container, "role").await {
            report.has_aria_attributes = !role.is_empty();
        }

        // A missing send control can't be judged; absent tabindex is focusable.
        if d.probe(&self.locators.send).await.map(|s| s.present()).unwrap_or(false) {
            report.keyboard_navigable = match d.attribute(&self.locators.send, "tabindex").await {
                Ok(None) => true,
                Ok(Some(v)) => v.trim().parse::<i32>().map(|n| n >= 0).unwrap_or(false),
                Err(_) => false,
            };
        }
        report
    }

    /// Poll the last reply until it reads the same, non-empty, three times
    /// in a row. Returns false if it never settles.
    pub async fn wait_for_stable_response(&self, timeout: Duration) -> Result<bool> {
        info!("waiting for response to stabilize");
        let poll = Timings::ms(self.timings.stable_poll_ms.max(1));
        let max_checks = (timeout.as_millis() / poll.as_millis()).max(1);
        let mut previous = String::new();
        let mut stable = 0;

        for _ in 0..max_checks {
            let current = self.all_ai_responses().await?.pop().unwrap_or_default();
            if !current.is_empty() && current == previous {
                stable += 1;
                if stable >= STABLE_READS {
                    info!("response stabilized");
                    return Ok(true);
                }
            } else {
                stable = 0;
            }
            previous = current;
            tokio::time::sleep(poll).await;
        }
        warn!("response did not stabilize within {}ms", timeout.as_millis());
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeElement, FakePage, FakeState};
    use serde_json::json;

    fn keys() -> PageLocators {
        PageLocators::default()
    }

    fn page_object(page: &FakePage) -> ChatPage<'_, FakePage> {
        ChatPage::with_locators(page, keys(), Timings::instant())
    }

    #[tokio::test(start_paused = true)]
    async fn widget_visible() {
        let page = FakePage::new();
        page.add(&keys().chat_widget.to_string(), FakeElement::visible());
        page_object(&page)
            .wait_for_chat_widget(Some(Duration::from_secs(1)))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn widget_in_iframe_counts() {
        let page = FakePage::new();
        page.add("iframe", FakeElement::hidden());
        page_object(&page)
            .wait_for_chat_widget(Some(Duration::from_secs(1)))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn widget_missing_times_out() {
        let page = FakePage::new();
        let err = page_object(&page)
            .wait_for_chat_widget(Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn send_and_read_reply() {
        let page = FakePage::new();
        let l = keys();
        let (input, send, ai, user, loading) = (
            l.input.to_string(),
            l.send.to_string(),
            l.ai_responses.to_string(),
            l.user_messages.to_string(),
            l.loading.to_string(),
        );
        page.add(&input, FakeElement::visible());
        page.add(&send, FakeElement::visible());
        {
            let (input, user, loading) = (input.clone(), user.clone(), loading.clone());
            page.on_click(&send, move |s: &mut FakeState| {
                let text = s.value(&input);
                s.push_text(&user, &text);
                s.elements.get_mut(&input).unwrap().value.clear();
                s.show(&loading);
            });
        }
        {
            let (ai, loading) = (ai.clone(), loading.clone());
            page.schedule(Duration::from_secs(2), move |s| {
                s.hide(&loading);
                s.push_text(&ai, "You can renew your Emirates ID online.");
            });
        }

        let chat = page_object(&page);
        chat.send_message("How do I renew my Emirates ID?", true)
            .await
            .unwrap();
        assert_eq!(
            chat.last_ai_response().await.unwrap(),
            "You can renew your Emirates ID online."
        );
        assert_eq!(
            chat.last_user_message().await.unwrap(),
            "How do I renew my Emirates ID?"
        );
        assert!(chat.is_input_cleared().await.unwrap());
        assert_eq!(chat.message_count().await.unwrap(), MessageCount { user: 1, ai: 1 });
        assert!(!chat.is_loading().await);
    }

    #[tokio::test(start_paused = true)]
    async fn send_without_input_fails() {
        let page = FakePage::new();
        let mut chat = page_object(&page);
        chat.timings.action_timeout_ms = 500;
        let err = chat.send_message("hi", false).await.unwrap_err();
        assert!(matches!(err, Error::ElementNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn no_reply_is_a_timeout() {
        let page = FakePage::new();
        let err = page_object(&page)
            .wait_for_response(Some(Duration::from_secs(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn empty_conversation() {
        let page = FakePage::new();
        let chat = page_object(&page);
        assert_eq!(chat.last_ai_response().await.unwrap(), "");
        assert!(chat.all_ai_responses().await.unwrap().is_empty());
        assert_eq!(chat.message_count().await.unwrap(), MessageCount::default());
    }

    #[tokio::test]
    async fn direction_defaults_to_ltr() {
        let page = FakePage::new();
        let chat = page_object(&page);
        assert_eq!(chat.text_direction().await.unwrap(), "ltr");
        assert!(!chat.is_rtl_layout().await.unwrap());
        assert_eq!(chat.page_language().await.unwrap(), "");
    }

    #[tokio::test]
    async fn arabic_page_is_rtl() {
        let page = FakePage::new();
        page.on_eval("document.dir", json!("RTL"));
        page.on_eval("documentElement.lang", json!("ar"));
        let chat = page_object(&page);
        assert!(chat.is_rtl_layout().await.unwrap());
        assert_eq!(chat.page_language().await.unwrap(), "ar");
    }

    #[tokio::test]
    async fn error_banner() {
        let page = FakePage::new();
        let chat = page_object(&page);
        assert!(!chat.is_error_displayed().await);
        assert_eq!(chat.error_message().await.unwrap(), "");

        page.add(
            &keys().error.to_string(),
            FakeElement::visible().texts(&["Service unavailable"]),
        );
        assert!(chat.is_error_displayed().await);
        assert_eq!(chat.error_message().await.unwrap(), "Service unavailable");
    }

    #[tokio::test]
    async fn scroll_targets_container() {
        let page = FakePage::new();
        page_object(&page).scroll_to_bottom().await.unwrap();
        let scripts = page.scripts();
        assert!(scripts[0].contains("scrollTop = el.scrollHeight"));
        assert!(scripts[0].contains(".chat-messages"));
    }

    #[tokio::test]
    async fn accessibility_report() {
        let page = FakePage::new();
        let l = keys();
        page.add(
            &l.input.to_string(),
            FakeElement::visible().attr("placeholder", "Ask U-Ask"),
        );
        page.add(&l.message_container.to_string(), FakeElement::visible().attr("role", "log"));
        page.add(&l.send.to_string(), FakeElement::visible());
        let report = page_object(&page).check_accessibility().await;
        assert_eq!(
            report,
            AccessibilityReport {
                has_labels: true,
                has_aria_attributes: true,
                keyboard_navigable: true,
            }
        );

        page.add(&l.send.to_string(), FakeElement::visible().attr("tabindex", "-1"));
        assert!(!page_object(&page).check_accessibility().await.keyboard_navigable);
    }

    #[tokio::test]
    async fn accessibility_on_bare_page() {
        let page = FakePage::new();
        assert_eq!(
            page_object(&page).check_accessibility().await,
            AccessibilityReport::default()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stable_response() {
        let page = FakePage::new();
        let ai = keys().ai_responses.to_string();
        page.add(&ai, FakeElement::visible().texts(&["Partial"]));
        page.schedule(Duration::from_millis(700), {
            let ai = ai.clone();
            move |s| {
                s.elements.get_mut(&ai).unwrap().texts = vec!["Partial answer, complete.".into()];
            }
        });
        assert!(page_object(&page)
            .wait_for_stable_response(Duration::from_secs(5))
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_response_never_stabilizes() {
        let page = FakePage::new();
        assert!(!page_object(&page)
            .wait_for_stable_response(Duration::from_secs(2))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn screenshot_into_dir() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new();
        let path = page_object(&page)
            .take_screenshot(dir.path(), "chat widget")
            .await
            .unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("chat_widget_"));
    }
}
