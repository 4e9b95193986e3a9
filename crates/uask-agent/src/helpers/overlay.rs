use super::ChatHelpers;
use crate::driver::PageDriver;
use crate::probe::Probe;
use crate::selectors::Timings;
use crate::wait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How an overlay dismissal went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Dismissal {
    /// Nothing to dismiss.
    NotPresent,
    /// The overlay went away. `via` is the control that closed it, or
    /// `None` when Escape / the backdrop did.
    Closed { via: Option<Probe> },
    /// Controls kept reappearing; Escape and backdrop clicks were applied
    /// but the result could not be verified.
    Fallback,
    /// The overlay is still open.
    StillOpen,
}

impl Dismissal {
    pub fn believed_closed(&self) -> bool {
        !matches!(self, Dismissal::StillOpen)
    }
}

impl ChatHelpers {
    /// Dismiss the site disclaimer / welcome overlay.
    pub async fn close_disclaimer<D: PageDriver + ?Sized>(&self, driver: &D) -> Dismissal {
        let t = &self.timings;
        let controls = &self.selectors.disclaimer;
        let attempts = t.dismiss_attempts.max(1);
        let mut seen = false;

        for attempt in 1..=attempts {
            debug!("disclaimer attempt {}/{}", attempt, attempts);
            let hit = wait::first_visible(driver, controls, Timings::ms(t.dismiss_probe_timeout_ms))
                .await
                .ok()
                .flatten();

            let Some((probe, _)) = hit else {
                if seen {
                    info!("disclaimer gone after fallback");
                    return Dismissal::Closed { via: None };
                }
                info!("no disclaimer found");
                return Dismissal::NotPresent;
            };

            seen = true;
            info!("disclaimer control visible: {}", probe);
            if self.click_and_verify(driver, probe, probe).await {
                info!("disclaimer closed via {}", probe);
                return Dismissal::Closed {
                    via: Some(probe.clone()),
                };
            }

            self.overlay_fallback(driver, &self.selectors.disclaimer_backdrop)
                .await;
        }

        match wait::first_visible(driver, controls, Duration::ZERO).await {
            Ok(None) => Dismissal::Closed { via: None },
            _ => {
                warn!("disclaimer controls still visible after {} attempts", attempts);
                Dismissal::Fallback
            }
        }
    }

    /// Close CAPTCHA / alert modals sitting over the chat.
    pub async fn close_captcha_modals<D: PageDriver + ?Sized>(&self, driver: &D) -> Dismissal {
        let attempts = self.timings.dismiss_attempts.max(1);
        let mut acted = false;

        for attempt in 1..=attempts {
            let Some(modal) = self.open_modal(driver).await else {
                return if acted {
                    Dismissal::Closed { via: None }
                } else {
                    Dismissal::NotPresent
                };
            };
            acted = true;
            info!("modal open ({}), attempt {}/{}", modal, attempt, attempts);

            for control in &self.selectors.modal_close {
                match driver.probe(control).await {
                    Ok(state) if state.visible => {}
                    _ => continue,
                }
                if self.click_and_verify(driver, control, &modal).await {
                    info!("modal closed via {}", control);
                    return Dismissal::Closed {
                        via: Some(control.clone()),
                    };
                }
                if self.open_modal(driver).await.is_none() {
                    return Dismissal::Closed {
                        via: Some(control.clone()),
                    };
                }
            }

            self.overlay_fallback(driver, &self.selectors.modal_backdrop)
                .await;
        }

        match self.open_modal(driver).await {
            None => Dismissal::Closed { via: None },
            Some(modal) => {
                warn!("modal {} still open after {} attempts", modal, attempts);
                Dismissal::StillOpen
            }
        }
    }

    async fn open_modal<D: PageDriver + ?Sized>(&self, driver: &D) -> Option<Probe> {
        wait::first_visible(driver, &self.selectors.modals, Duration::ZERO)
            .await
            .ok()
            .flatten()
            .map(|(p, _)| p.clone())
    }

    /// Click `control`, settle, and report whether `target` is now hidden.
    async fn click_and_verify<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        control: &Probe,
        target: &Probe,
    ) -> bool {
        if let Err(e) = driver.click(control).await {
            debug!("click on {} failed: {}", control, e);
            return false;
        }
        Self::settle(self.timings.dismiss_settle_ms).await;
        match driver.probe(target).await {
            Ok(state) => !state.visible,
            Err(e) => {
                debug!("re-check of {} failed: {}", target, e);
                false
            }
        }
    }

    /// Escape, then a click on the backdrop if one is showing.
    async fn overlay_fallback<D: PageDriver + ?Sized>(&self, driver: &D, backdrop: &Probe) {
        debug!("trying Escape / backdrop fallback");
        if let Err(e) = driver.press_key("Escape").await {
            debug!("Escape failed: {}", e);
        }
        Self::settle(self.timings.dismiss_settle_ms / 2).await;

        if let Ok(state) = driver.probe(backdrop).await {
            if state.visible {
                if let Err(e) = driver.click(backdrop).await {
                    debug!("backdrop click failed: {}", e);
                }
                Self::settle(self.timings.dismiss_settle_ms / 2).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectors::SelectorSet;
    use crate::testing::{FakeElement, FakePage};

    fn helpers() -> ChatHelpers {
        ChatHelpers::new(SelectorSet::default(), Timings::instant())
    }

    #[tokio::test(start_paused = true)]
    async fn clean_page_has_nothing_to_dismiss() {
        let page = FakePage::new();
        let h = helpers();
        assert_eq!(h.close_disclaimer(&page).await, Dismissal::NotPresent);
        assert_eq!(h.close_captcha_modals(&page).await, Dismissal::NotPresent);
        assert!(page.clicks().is_empty());
        // idempotent
        assert!(h.close_disclaimer(&page).await.believed_closed());
        assert!(h.close_captcha_modals(&page).await.believed_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn disclaimer_closed_by_first_visible_control() {
        let page = FakePage::new();
        page.add(".disclaimer button", FakeElement::visible());
        page.add("button:has-text('Accept')", FakeElement::visible());
        page.on_click(".disclaimer button", |s| {
            s.hide(".disclaimer button");
            s.hide("button:has-text('Accept')");
        });

        let out = helpers().close_disclaimer(&page).await;
        assert_eq!(
            out,
            Dismissal::Closed {
                via: Some(Probe::css(".disclaimer button"))
            }
        );
        assert_eq!(page.clicks(), vec![".disclaimer button".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn disclaimer_escape_fallback() {
        let page = FakePage::new();
        page.add(".overlay button", FakeElement::visible());
        page.on_key("Escape", |s| s.hide(".overlay button"));

        let out = helpers().close_disclaimer(&page).await;
        assert_eq!(out, Dismissal::Closed { via: None });
        assert_eq!(page.keys(), vec!["Escape".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_disclaimer_reports_fallback() {
        let page = FakePage::new();
        page.add(".close-btn", FakeElement::visible());
        page.add(".overlay, .modal-backdrop", FakeElement::visible());

        let out = helpers().close_disclaimer(&page).await;
        assert_eq!(out, Dismissal::Fallback);
        assert!(out.believed_closed());
        assert_eq!(page.keys().len(), 3);
        let clicks = page.clicks();
        assert_eq!(clicks.iter().filter(|c| *c == ".close-btn").count(), 3);
        assert_eq!(
            clicks.iter().filter(|c| *c == ".overlay, .modal-backdrop").count(),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn captcha_modal_closed_by_button() {
        let page = FakePage::new();
        page.add("#modalRecaptcha", FakeElement::visible());
        page.add("#modalRecaptcha button", FakeElement::visible());
        page.on_click("#modalRecaptcha button", |s| {
            s.remove("#modalRecaptcha");
            s.remove("#modalRecaptcha button");
        });

        let out = helpers().close_captcha_modals(&page).await;
        assert_eq!(
            out,
            Dismissal::Closed {
                via: Some(Probe::css("#modalRecaptcha button"))
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn captcha_modal_closed_by_text_button() {
        let page = FakePage::new();
        page.add(".modal.show", FakeElement::visible());
        page.add(".modal button:has-text('OK')", FakeElement::visible());
        page.on_click(".modal button:has-text('OK')", |s| s.hide(".modal.show"));

        let out = helpers().close_captcha_modals(&page).await;
        assert_eq!(
            out,
            Dismissal::Closed {
                via: Some(Probe::text(".modal button", "OK"))
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_captcha_modal_is_still_open() {
        let page = FakePage::new();
        page.add("#modalRecaptcha", FakeElement::visible());

        let out = helpers().close_captcha_modals(&page).await;
        assert_eq!(out, Dismissal::StillOpen);
        assert!(!out.believed_closed());
        assert_eq!(page.keys().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backdrop_click_closes_modal() {
        let page = FakePage::new();
        page.add(".swal2-container", FakeElement::visible());
        page.add(".modal-backdrop, .swal2-backdrop", FakeElement::visible());
        page.on_click(".modal-backdrop, .swal2-backdrop", |s| {
            s.hide(".swal2-container");
            s.hide(".modal-backdrop, .swal2-backdrop");
        });

        let out = helpers().close_captcha_modals(&page).await;
        assert_eq!(out, Dismissal::Closed { via: None });
    }
}
