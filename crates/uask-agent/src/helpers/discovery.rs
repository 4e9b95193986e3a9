use super::ChatHelpers;
use crate::driver::PageDriver;
use crate::probe::Probe;
use crate::selectors::Timings;
use crate::wait;
use serde::Serialize;
use tracing::{debug, info};

/// The candidate that matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Located {
    pub probe: Probe,
    /// Element is `contenteditable` rather than a form control.
    pub editable: bool,
}

/// What [`ChatHelpers::find_chat_elements`] found. Built fresh per call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatElements {
    pub input: Option<Located>,
    pub send: Option<Located>,
    pub widget: Option<Located>,
}

impl ChatElements {
    pub fn input_found(&self) -> bool {
        self.input.is_some()
    }

    pub fn send_found(&self) -> bool {
        self.send.is_some()
    }

    pub fn widget_found(&self) -> bool {
        self.widget.is_some()
    }
}

impl ChatHelpers {
    /// Locate the input, send control and widget container.
    ///
    /// Nothing found is "UI not ready", not an error.
    pub async fn find_chat_elements<D: PageDriver + ?Sized>(&self, driver: &D) -> ChatElements {
        let elements = ChatElements {
            input: self.find_input(driver).await,
            send: self.find_send(driver).await,
            widget: self.find_widget(driver).await,
        };
        info!(
            "found elements: input={}, send={}, widget={}",
            elements.input_found(),
            elements.send_found(),
            elements.widget_found()
        );
        elements
    }

    pub async fn find_input<D: PageDriver + ?Sized>(&self, driver: &D) -> Option<Located> {
        let found = self.first_visible(driver, &self.selectors.input).await;
        if let Some(ref l) = found {
            info!("input field: {} (editable={})", l.probe, l.editable);
        }
        found
    }

    pub async fn find_send<D: PageDriver + ?Sized>(&self, driver: &D) -> Option<Located> {
        let found = self.first_visible(driver, &self.selectors.send).await;
        if let Some(ref l) = found {
            info!("send button: {}", l.probe);
        }
        found
    }

    /// The widget may be collapsed, so presence is enough.
    pub async fn find_widget<D: PageDriver + ?Sized>(&self, driver: &D) -> Option<Located> {
        for probe in &self.selectors.widget {
            match driver.probe(probe).await {
                Ok(state) if state.present() => {
                    info!("chat widget: {}", probe);
                    return Some(Located {
                        probe: probe.clone(),
                        editable: state.editable,
                    });
                }
                Ok(_) => {}
                Err(e) => debug!("widget probe {} failed: {}", probe, e),
            }
        }
        None
    }

    async fn first_visible<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        candidates: &[Probe],
    ) -> Option<Located> {
        let timeout = Timings::ms(self.timings.probe_timeout_ms);
        match wait::first_visible(driver, candidates, timeout).await {
            Ok(hit) => hit.map(|(probe, editable)| Located {
                probe: probe.clone(),
                editable,
            }),
            Err(e) => {
                debug!("discovery failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectors::SelectorSet;
    use crate::testing::{FakeElement, FakePage};
    use std::time::Duration;
    use tokio::time::Instant;

    fn helpers() -> ChatHelpers {
        ChatHelpers::new(SelectorSet::default(), Timings::instant())
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_finds_nothing() {
        let page = FakePage::new();
        let start = Instant::now();
        let found = helpers().find_chat_elements(&page).await;
        assert_eq!(found, ChatElements::default());
        assert!(!found.input_found());
        // input and send each wait out one probe timeout
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert!(start.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn finds_each_role() {
        let page = FakePage::new();
        page.add(
            "[contenteditable='true']:not([aria-hidden='true'])",
            FakeElement::visible().editable(),
        );
        page.add("button[type='submit']", FakeElement::visible());
        page.add(".chatbot", FakeElement::hidden());

        let found = helpers().find_chat_elements(&page).await;
        let input = found.input.unwrap();
        assert_eq!(
            input.probe,
            Probe::css("[contenteditable='true']:not([aria-hidden='true'])")
        );
        assert!(input.editable);
        assert_eq!(found.send.unwrap().probe, Probe::css("button[type='submit']"));
        // hidden but present is enough for the widget
        assert_eq!(found.widget.unwrap().probe, Probe::css(".chatbot"));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_candidate_wins() {
        let page = FakePage::new();
        page.add("#chat-input", FakeElement::visible());
        page.add("textarea[placeholder*='ask' i]", FakeElement::visible());
        let input = helpers().find_input(&page).await.unwrap();
        assert_eq!(input.probe, Probe::css("textarea[placeholder*='ask' i]"));
        assert!(!input.editable);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_input_is_not_found() {
        let page = FakePage::new();
        page.add(".message-input", FakeElement::hidden());
        assert!(helpers().find_input(&page).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn late_input_is_found_within_timeout() {
        let page = FakePage::new();
        page.add(".chat-input textarea", FakeElement::hidden());
        page.schedule(Duration::from_millis(1500), |s| s.show(".chat-input textarea"));
        let input = helpers().find_input(&page).await.unwrap();
        assert_eq!(input.probe, Probe::css(".chat-input textarea"));
    }

    #[tokio::test(start_paused = true)]
    async fn broken_candidate_is_skipped() {
        let page = FakePage::new();
        page.fail_probe("button:has(svg)");
        page.add(".btn-send", FakeElement::visible());
        let send = helpers().find_send(&page).await.unwrap();
        assert_eq!(send.probe, Probe::css(".btn-send"));
    }

    #[tokio::test(start_paused = true)]
    async fn send_by_text() {
        let page = FakePage::new();
        page.add("button:has-text('Send')", FakeElement::visible());
        let send = helpers().find_send(&page).await.unwrap();
        assert_eq!(send.probe, Probe::text("button", "Send"));
    }
}
