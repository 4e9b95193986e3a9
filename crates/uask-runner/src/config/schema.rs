use super::params::{self, ParamDef, Params};
use super::settings::Settings;
use super::steps::{Check, SendStep, Step};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use uask_agent::{LaunchProfile, SelectorSet, Timings};

/// A QA suite: where to point the browser and which cases to run.
#[derive(Debug, Clone, Deserialize)]
pub struct Suite {
    pub name: String,

    #[serde(default)]
    pub params: HashMap<String, ParamDef>,

    #[serde(default)]
    pub browser: BrowserSection,

    pub target: TargetUrl,

    /// Replaces the built-in candidate lists; unset lists keep defaults.
    pub selectors: Option<SelectorSet>,

    /// Fields layered over the run's timings; unset fields keep theirs.
    pub timings: Option<serde_yaml::Mapping>,

    #[serde(default)]
    pub cases: Vec<Case>,

    pub on_failure: Option<OnFailure>,
}

impl Suite {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_params(path, &Params::new())
    }

    pub fn load_with_params<P: AsRef<Path>>(path: P, params: &Params) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse_with_params(&content, params)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        Self::parse_with_params(yaml, &Params::new())
    }

    /// Parse with `${name}` substitution across the whole document.
    pub fn parse_with_params(yaml: &str, params: &Params) -> Result<Self> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(yaml)?;

        let defs: HashMap<String, ParamDef> = match value.get("params") {
            Some(v) => serde_yaml::from_value(v.clone())?,
            None => HashMap::new(),
        };

        params::substitute_value(&mut value, params, &defs)?;

        let suite: Suite = serde_yaml::from_value(value)?;
        suite.validate()?;
        Ok(suite)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("name is required".into()));
        }
        if self.target.url.trim().is_empty() {
            return Err(Error::Config("target.url is required".into()));
        }

        let mut seen = HashSet::new();
        for case in &self.cases {
            if case.name.trim().is_empty() {
                return Err(Error::Config("every case needs a name".into()));
            }
            if !seen.insert(case.name.as_str()) {
                return Err(Error::Config(format!("duplicate case name '{}'", case.name)));
            }
            for (i, step) in case.steps.iter().enumerate() {
                validate_step(step).map_err(|msg| {
                    Error::Config(format!(
                        "case '{}', step {} ({}): {}",
                        case.name,
                        i + 1,
                        step.name(),
                        msg
                    ))
                })?;
            }
        }

        self.timings_or(Timings::default())
            .map_err(|e| Error::Config(format!("timings: {}", e)))?;

        if let Some(retry) = self.on_failure.as_ref().and_then(|f| f.retry.as_ref()) {
            if retry.attempts == 0 {
                return Err(Error::Config(
                    "on_failure.retry.attempts must be at least 1".into(),
                ));
            }
        }
        Ok(())
    }

    /// Some `send` step draws its messages from the test-data fixture.
    pub fn uses_test_data(&self) -> bool {
        self.cases
            .iter()
            .flat_map(|c| &c.steps)
            .any(|s| matches!(s, Step::Send(send) if send.data.is_some()))
    }

    /// Retry policy and failure-screenshot switch, falling back to `settings`.
    pub fn failure_policy(&self, settings: &Settings) -> (RetryConfig, bool) {
        let on_failure = self.on_failure.as_ref();
        let retry = on_failure
            .and_then(|f| f.retry.clone())
            .unwrap_or_else(|| settings.default_retry());
        let screenshot = on_failure
            .and_then(|f| f.screenshot)
            .unwrap_or(settings.screenshot_on_failure);
        (retry, screenshot)
    }

    /// Selector lists for this suite.
    pub fn selector_set(&self) -> SelectorSet {
        self.selectors.clone().unwrap_or_default()
    }

    /// `base` with this suite's `timings` fields written over it.
    pub fn timings_or(&self, base: Timings) -> Result<Timings> {
        let Some(ref overrides) = self.timings else {
            return Ok(base);
        };
        let mut merged = match serde_yaml::to_value(&base)? {
            serde_yaml::Value::Mapping(m) => m,
            _ => return Ok(base),
        };
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
        Ok(serde_yaml::from_value(serde_yaml::Value::Mapping(merged))?)
    }
}

fn validate_step(step: &Step) -> std::result::Result<(), String> {
    match step {
        Step::Send(send) => validate_send(send),
        Step::CompareResponses(c) => {
            if c.messages.len() < 2 {
                return Err("needs at least two messages".into());
            }
            check_ratio("min_similarity", c.min_similarity)
        }
        Step::Navigate(n) if n.url.trim().is_empty() => Err("url is required".into()),
        Step::Screenshot(s) if s.name.trim().is_empty() => Err("name is required".into()),
        _ => Ok(()),
    }
}

fn validate_send(send: &SendStep) -> std::result::Result<(), String> {
    let sources = [send.text.is_some(), send.repeat.is_some(), send.data.is_some()]
        .iter()
        .filter(|s| **s)
        .count();
    if sources != 1 {
        return Err("exactly one of text, repeat or data is required".into());
    }
    if send.repeat.is_some() && send.times.unwrap_or(0) == 0 {
        return Err("repeat needs times of at least 1".into());
    }
    if let Some(ref data) = send.data {
        let kinds = [&data.query, &data.security, &data.edge_case]
            .iter()
            .filter(|k| k.is_some())
            .count();
        if kinds != 1 {
            return Err("data needs exactly one of query, security or edge_case".into());
        }
    }
    check_ratio("pass_rate", send.pass_rate)?;
    for check in &send.expect {
        if let Check::Matches { pattern } = check {
            regex::Regex::new(pattern).map_err(|e| format!("invalid pattern: {}", e))?;
        }
    }
    Ok(())
}

fn check_ratio(field: &str, value: Option<f64>) -> std::result::Result<(), String> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(format!("{} must be within 0..=1", field)),
        _ => Ok(()),
    }
}

/// Browser launch section of a suite.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BrowserSection {
    #[serde(default)]
    pub headless: bool,

    /// Patched Chrome binary and a desktop user agent.
    #[serde(default)]
    pub stealth: bool,

    pub proxy: Option<String>,

    pub user_agent: Option<String>,

    pub viewport: Option<Viewport>,
}

impl BrowserSection {
    /// Launch profile: the run's `base` profile with this section on top.
    pub fn profile(&self, base: LaunchProfile) -> LaunchProfile {
        let mut profile = base;
        profile.headless |= self.headless;
        profile.stealth |= self.stealth;
        if self.proxy.is_some() {
            profile.proxy = self.proxy.clone();
        }
        if self.user_agent.is_some() {
            profile.user_agent = self.user_agent.clone();
        }
        if let Some(ref v) = self.viewport {
            profile = profile.viewport(v.width, v.height);
        }
        profile
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetUrl {
    pub url: String,
}

/// A named sequence of steps run in its own tab.
#[derive(Debug, Clone, Deserialize)]
pub struct Case {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnFailure {
    /// Capture a screenshot and metadata sidecar. Defaults to the run setting.
    pub screenshot: Option<bool>,

    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub attempts: u32,

    #[serde(default)]
    pub delay_ms: u64,
}
