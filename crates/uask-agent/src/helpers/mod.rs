//! High-level chat helpers: page preparation, element discovery, overlay
//! dismissal, CAPTCHA handling and the full send cycle.

mod captcha;
mod discovery;
mod overlay;
mod send;

pub use captcha::CaptchaCheck;
pub use discovery::{ChatElements, Located};
pub use overlay::Dismissal;
pub use send::{SendFailure, SendOutcome};

use crate::artifacts;
use crate::driver::PageDriver;
use crate::selectors::{SelectorSet, Timings};
use crate::wait::Poll;
use crate::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Selector lists, timings and an optional screenshot directory, passed to
/// every helper. Holds no page state; one instance serves many pages.
#[derive(Debug, Clone, Default)]
pub struct ChatHelpers {
    pub selectors: SelectorSet,
    pub timings: Timings,
    screenshots: Option<PathBuf>,
}

/// Result of [`ChatHelpers::setup_page_reliably`].
#[derive(Debug, Clone, Serialize)]
pub struct SetupOutcome {
    pub disclaimer: Dismissal,
    pub captcha_modals: Dismissal,
    pub services_loaded: bool,
    pub final_modals: Dismissal,
    pub url: String,
    pub title: String,
}

impl SetupOutcome {
    /// Disclaimer out of the way and the chat backend connected.
    pub fn page_ready(&self) -> bool {
        self.disclaimer.believed_closed() && self.services_loaded
    }
}

impl ChatHelpers {
    pub fn new(selectors: SelectorSet, timings: Timings) -> Self {
        Self {
            selectors,
            timings,
            screenshots: None,
        }
    }

    /// Save progress screenshots ("initial_load", "after_send", ...) here.
    pub fn with_screenshots(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshots = Some(dir.into());
        self
    }

    pub(crate) async fn snapshot<D: PageDriver + ?Sized>(&self, driver: &D, label: &str) {
        let Some(ref dir) = self.screenshots else {
            return;
        };
        if let Err(e) = artifacts::save_screenshot(driver, dir, label).await {
            debug!("screenshot '{}' skipped: {}", label, e);
        }
    }

    pub(crate) async fn settle(ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Timings::ms(ms)).await;
        }
    }

    /// Navigate and bring the page to a state where chatting can start.
    pub async fn setup_page_reliably<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        url: &str,
    ) -> Result<SetupOutcome> {
        let t = &self.timings;
        info!("preparing page: {}", url);

        tokio::time::timeout(Timings::ms(t.navigation_timeout_ms), driver.goto(url))
            .await
            .map_err(|_| Error::Timeout(format!("navigation to {}", url)))??;
        if let Err(e) = driver
            .wait_for_network_idle(t.network_idle_ms, t.navigation_timeout_ms)
            .await
        {
            debug!("network never went idle: {}", e);
        }
        Self::settle(t.post_navigation_settle_ms).await;
        self.snapshot(driver, "initial_load").await;

        let disclaimer = self.close_disclaimer(driver).await;
        let captcha_modals = self.close_captcha_modals(driver).await;
        let services_loaded = self.wait_for_services_to_load(driver).await;
        let final_modals = self.close_captcha_modals(driver).await;

        self.snapshot(driver, "page_ready").await;

        let outcome = SetupOutcome {
            disclaimer,
            captcha_modals,
            services_loaded,
            final_modals,
            url: driver.url().await?,
            title: driver.title().await?,
        };
        info!(
            "page ready: {} (disclaimer {:?}, services loaded {})",
            outcome.page_ready(),
            outcome.disclaimer,
            outcome.services_loaded
        );
        Ok(outcome)
    }

    /// Poll the page text until no loading phrase remains.
    pub async fn wait_for_services_to_load<D: PageDriver + ?Sized>(&self, driver: &D) -> bool {
        let t = &self.timings;
        let start = Instant::now();
        let loading = &self.selectors.loading_texts;
        info!("waiting for services to load");

        let loaded = Poll::every(
            Timings::ms(t.services_poll_ms),
            Timings::ms(t.services_max_wait_ms),
        )
        .until(|| async move {
            match driver.body_text().await {
                Ok(body) => {
                    let still = loading.iter().find(|l| body.contains(l.as_str()));
                    if let Some(phrase) = still {
                        debug!("still loading ({:?}), {}s elapsed", phrase, start.elapsed().as_secs());
                    }
                    Ok(still.is_none().then_some(()))
                }
                Err(e) => {
                    debug!("error reading page text: {}", e);
                    Ok(None)
                }
            }
        })
        .await;

        match loaded {
            Ok(Some(())) => {
                info!("services loaded in {:.1}s", start.elapsed().as_secs_f64());
                true
            }
            _ => {
                warn!(
                    "services did not finish loading within {}s",
                    t.services_max_wait_ms / 1000
                );
                false
            }
        }
    }
}
