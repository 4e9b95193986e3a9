use super::ChatHelpers;
use crate::driver::PageDriver;
use crate::selectors::Timings;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of a quick CAPTCHA scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptchaCheck {
    pub detected: bool,
    /// Label of the pattern that matched.
    pub kinds: Vec<String>,
}

impl ChatHelpers {
    /// Scan for a visible CAPTCHA. Stops at the first matching pattern.
    pub async fn check_for_captcha<D: PageDriver + ?Sized>(&self, driver: &D) -> CaptchaCheck {
        let mut check = CaptchaCheck::default();
        for pattern in &self.selectors.captcha {
            match driver.probe(&pattern.probe).await {
                Ok(state) if state.present() && state.visible => {
                    debug!("active captcha: {}", pattern.label);
                    check.detected = true;
                    check.kinds.push(pattern.label.clone());
                    break;
                }
                Ok(_) => {}
                Err(e) => debug!("captcha probe {} failed: {}", pattern.probe, e),
            }
        }
        check
    }

    /// Wait for a human to solve the CAPTCHA in the visible browser.
    ///
    /// Returns true once the challenge is gone. Nothing is clicked.
    pub async fn wait_for_manual_captcha_solution<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        timeout: Duration,
    ) -> bool {
        warn!("==================================================");
        warn!("CAPTCHA detected: manual solution required");
        warn!("solve it in the browser window; the run continues");
        warn!("automatically once it disappears (timeout {}s)", timeout.as_secs());
        warn!("==================================================");

        let poll = Timings::ms(self.timings.captcha_poll_ms).max(Duration::from_millis(1));
        let start = Instant::now();
        let mut checks = 0u32;

        while start.elapsed() < timeout {
            if !self.check_for_captcha(driver).await.detected {
                info!("captcha solved after {}s", start.elapsed().as_secs());
                return true;
            }
            checks += 1;
            let remaining = timeout.saturating_sub(start.elapsed());
            if checks % 2 == 0 {
                info!("waiting for captcha solution ({}s remaining)", remaining.as_secs());
            }
            tokio::time::sleep(poll.min(remaining)).await;
        }

        if !self.check_for_captcha(driver).await.detected {
            info!("captcha solved at the last moment");
            return true;
        }
        warn!("captcha not solved within {}s", timeout.as_secs());
        false
    }
}
