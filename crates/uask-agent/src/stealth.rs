//! Browser launch profile.
//!
//! "Stealth" here means a patched Chrome binary and an ordinary desktop
//! user agent. No fingerprint scripts are injected.

use crate::driver::EokaDriver;
use crate::Result;
use eoka::{Browser, Page, StealthConfig};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// User agent presented when stealth is on and none is configured.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LaunchProfile {
    pub headless: bool,
    pub stealth: bool,
    pub user_agent: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub proxy: Option<String>,
    /// Pause before every page action, in milliseconds.
    pub slow_mo_ms: u64,
}

impl Default for LaunchProfile {
    fn default() -> Self {
        Self {
            headless: false,
            stealth: false,
            user_agent: None,
            viewport_width: 1920,
            viewport_height: 1080,
            proxy: None,
            slow_mo_ms: 0,
        }
    }
}

impl LaunchProfile {
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn stealth(mut self, stealth: bool) -> Self {
        self.stealth = stealth;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    pub fn slow_mo(mut self, ms: u64) -> Self {
        self.slow_mo_ms = ms;
        self
    }

    /// Effective user agent: the configured one, the desktop default when
    /// stealth is on, otherwise whatever Chrome reports.
    pub fn effective_user_agent(&self) -> Option<String> {
        match (&self.user_agent, self.stealth) {
            (Some(ua), _) => Some(ua.clone()),
            (None, true) => Some(DESKTOP_USER_AGENT.to_string()),
            (None, false) => None,
        }
    }

    pub fn to_stealth_config(&self) -> StealthConfig {
        StealthConfig {
            headless: self.headless,
            proxy: self.proxy.clone(),
            user_agent: self.effective_user_agent(),
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            patch_binary: self.stealth,
            ..Default::default()
        }
    }

    pub async fn launch(&self) -> Result<Browser> {
        debug!(
            "launching browser (headless: {}, stealth: {}, viewport: {}x{})",
            self.headless, self.stealth, self.viewport_width, self.viewport_height
        );
        Ok(Browser::launch_with_config(self.to_stealth_config()).await?)
    }

    /// Wrap a page with this profile's pacing.
    pub fn driver(&self, page: Page) -> EokaDriver {
        EokaDriver::new(page).with_slow_mo(Duration::from_millis(self.slow_mo_ms))
    }
}
