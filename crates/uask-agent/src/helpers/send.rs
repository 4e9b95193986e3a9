use super::{CaptchaCheck, ChatElements, ChatHelpers, Dismissal, Located};
use crate::driver::PageDriver;
use crate::selectors::Timings;
use crate::wait::Poll;
use crate::Result;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Why a send cycle stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SendFailure {
    #[error("input field not found")]
    InputNotFound,
    #[error("send button not found")]
    SendNotFound,
    #[error("failed to enter message: {0}")]
    TypingFailed(String),
    #[error("message not entered correctly: expected {expected:?}, got {actual:?}")]
    TextMismatch { expected: String, actual: String },
    #[error("failed to click send button: {0}")]
    ClickFailed(String),
}

/// Everything observed during [`ChatHelpers::send_message_complete`].
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub message: String,
    pub elements: ChatElements,
    pub failure: Option<SendFailure>,
    pub captcha_before: Option<CaptchaCheck>,
    pub modals_after: Option<Dismissal>,
    pub captcha_after: Option<CaptchaCheck>,
    pub captcha_manually_solved: bool,
    /// The literal message shows up in the page text after sending.
    pub message_appears: bool,
    /// Page text length changed while waiting for a reply.
    pub content_changed: bool,
    pub body_text_length: usize,
    /// Text that appeared while waiting for a reply.
    pub new_content: String,
    pub elapsed_ms: u64,
}

impl SendOutcome {
    fn new(message: &str, elements: ChatElements) -> Self {
        Self {
            message: message.into(),
            elements,
            failure: None,
            captcha_before: None,
            modals_after: None,
            captcha_after: None,
            captcha_manually_solved: false,
            message_appears: false,
            content_changed: false,
            body_text_length: 0,
            new_content: String::new(),
            elapsed_ms: 0,
        }
    }

    fn fail(mut self, failure: SendFailure, start: Instant) -> Self {
        error!("{}", failure);
        self.failure = Some(failure);
        self.elapsed_ms = start.elapsed().as_millis() as u64;
        self
    }

    /// Typed and clicked. Says nothing about a reply.
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn captcha_triggered(&self) -> bool {
        self.captcha_after.as_ref().is_some_and(|c| c.detected)
    }
}

/// Part of `after` not present in `before`.
fn added_text(before: &str, after: &str) -> String {
    match after.strip_prefix(before) {
        Some(tail) => tail.trim().to_string(),
        None => after.trim().to_string(),
    }
}

fn preview(message: &str) -> String {
    let mut p: String = message.chars().take(50).collect();
    if message.chars().count() > 50 {
        p.push_str("...");
    }
    p
}

impl ChatHelpers {
    /// Focus, clear, fill and read back the input.
    ///
    /// A read-back error counts as typed since the value can't be verified.
    pub async fn type_message_reliably<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        message: &str,
        input: Option<&Located>,
    ) -> std::result::Result<(), SendFailure> {
        let found;
        let input = match input {
            Some(l) => l,
            None => {
                found = self
                    .find_input(driver)
                    .await
                    .ok_or(SendFailure::InputNotFound)?;
                &found
            }
        };
        let t = &self.timings;
        info!("typing message: {}", preview(message));

        let typing = |e: crate::Error| SendFailure::TypingFailed(e.to_string());
        driver.click(&input.probe).await.map_err(typing)?;
        Self::settle(t.focus_settle_ms).await;
        driver.fill(&input.probe, "").await.map_err(typing)?;
        Self::settle(t.clear_settle_ms).await;
        driver.fill(&input.probe, message).await.map_err(typing)?;
        Self::settle(t.type_settle_ms).await;

        match driver.read_input(&input.probe).await {
            Ok(actual) if actual.contains(message) => {
                info!("message typed: {}", preview(&actual));
                Ok(())
            }
            Ok(actual) => Err(SendFailure::TextMismatch {
                expected: message.into(),
                actual,
            }),
            Err(e) => {
                warn!("could not verify typed text: {}", e);
                Ok(())
            }
        }
    }

    pub async fn click_send_reliably<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        send: Option<&Located>,
    ) -> std::result::Result<(), SendFailure> {
        let found;
        let send = match send {
            Some(l) => l,
            None => {
                found = self
                    .find_send(driver)
                    .await
                    .ok_or(SendFailure::SendNotFound)?;
                &found
            }
        };
        info!("clicking send button");
        driver
            .click(&send.probe)
            .await
            .map_err(|e| SendFailure::ClickFailed(e.to_string()))?;
        Self::settle(self.timings.click_settle_ms).await;
        info!("send button clicked");
        Ok(())
    }

    /// Find, type, send, deal with CAPTCHA and watch for a reply.
    ///
    /// Action failures come back in [`SendOutcome::failure`]; `Err` is
    /// reserved for the page itself becoming unreadable.
    pub async fn send_message_complete<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        message: &str,
        wait_for_response: bool,
    ) -> Result<SendOutcome> {
        let start = Instant::now();
        let t = &self.timings;
        info!("=== sending message: {} ===", preview(message));

        let elements = self.find_chat_elements(driver).await;
        let outcome = SendOutcome::new(message, elements.clone());
        let Some(input) = elements.input.as_ref() else {
            return Ok(outcome.fail(SendFailure::InputNotFound, start));
        };
        let Some(send) = elements.send.as_ref() else {
            return Ok(outcome.fail(SendFailure::SendNotFound, start));
        };

        let mut outcome = outcome;
        outcome.captcha_before = Some(self.check_for_captcha(driver).await);

        if let Err(f) = self.type_message_reliably(driver, message, Some(input)).await {
            return Ok(outcome.fail(f, start));
        }
        self.snapshot(driver, "message_typed").await;

        if let Err(f) = self.click_send_reliably(driver, Some(send)).await {
            return Ok(outcome.fail(f, start));
        }
        Self::settle(t.post_send_settle_ms).await;

        outcome.modals_after = Some(self.close_captcha_modals(driver).await);
        let after = self.check_for_captcha(driver).await;
        if after.detected {
            warn!("captcha appeared after sending: {:?}", after.kinds);
            outcome.captcha_manually_solved = self
                .wait_for_manual_captcha_solution(driver, Timings::ms(t.captcha_wait_ms))
                .await;
        }
        outcome.captcha_after = Some(after);

        let body = driver.body_text().await?;
        outcome.message_appears = body.contains(message);
        outcome.body_text_length = body.chars().count();
        self.snapshot(driver, "after_send").await;

        if wait_for_response && outcome.message_appears {
            info!("waiting for a reply");
            let initial = body.len();
            let changed = Poll::every(
                Timings::ms(t.stable_poll_ms),
                Timings::ms(t.response_change_ms),
            )
            .until(|| async move {
                let now = driver.body_text().await?;
                Ok((now.len() != initial).then_some(now))
            })
            .await?;
            if let Some(now) = changed {
                outcome.content_changed = true;
                outcome.new_content = added_text(&body, &now);
                debug!("page text grew by {} bytes", now.len() as i64 - initial as i64);
            }
        }

        outcome.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            "send result: success={}, message_appears={}, captcha_triggered={}",
            outcome.success(),
            outcome.message_appears,
            outcome.captcha_triggered()
        );
        Ok(outcome)
    }
}
