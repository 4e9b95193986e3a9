//! Environment-driven run settings.
//!
//! Every knob has a default; a variable that is set but malformed is a
//! configuration error naming the variable. A `.env` file supplies values
//! the process environment leaves unset.

use super::params::Params;
use super::schema::RetryConfig;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uask_agent::{LaunchProfile, Timings};

pub const DEFAULT_BASE_URL: &str = "https://ask.u.ae";

/// Read by [`Settings::load`] from the working directory.
pub const DOTENV_FILE: &str = ".env";

/// Browser engine. The CDP driver only speaks Chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    Chromium,
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Self::Chromium),
            "firefox" | "webkit" => Err(Error::Config(format!(
                "browser '{}' is not supported: only chromium can be driven",
                s.trim()
            ))),
            other => Err(Error::Config(format!("unknown browser '{}'", other))),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("chromium")
    }
}

/// Site language, which is also the URL path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ar => "ar",
        }
    }

    pub fn is_rtl(&self) -> bool {
        matches!(self, Self::Ar)
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "ar" => Ok(Self::Ar),
            other => Err(Error::Config(format!(
                "unknown language '{}', expected en or ar",
                other
            ))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved run settings. Built once by the binary and passed down.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_url: String,
    pub engine: Engine,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub slow_mo_ms: u64,
    /// Default timeout for page actions.
    pub timeout_ms: u64,
    pub language: Language,
    /// How long the page object waits for a reply.
    pub max_response_time_ms: u64,
    pub screenshot_on_failure: bool,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub similarity_threshold: f64,
    pub log_level: String,
    pub reports_dir: PathBuf,
    pub test_data_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            engine: Engine::Chromium,
            headless: false,
            viewport_width: 1920,
            viewport_height: 1080,
            slow_mo_ms: 0,
            timeout_ms: 30_000,
            language: Language::En,
            max_response_time_ms: 10_000,
            screenshot_on_failure: true,
            max_retries: 3,
            retry_delay_secs: 2,
            similarity_threshold: uask_validators::DEFAULT_SIMILARITY_THRESHOLD,
            log_level: "INFO".into(),
            reports_dir: PathBuf::from("reports"),
            test_data_file: PathBuf::from("data/test-data.json"),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings from the process environment, then `.env`.
    pub fn load() -> Result<Self> {
        Self::from_env_file(DOTENV_FILE)
    }

    /// Read settings from the process environment, falling back to the
    /// dotenv file at `path`. A missing file is not an error.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_lookup_and_file(|key| std::env::var(key).ok(), path.as_ref())
    }

    /// `lookup` wins over the file.
    pub fn from_lookup_and_file<F>(lookup: F, path: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = read_dotenv(path)?;
        Self::from_lookup(|key| lookup(key).or_else(|| file.get(key).cloned()))
    }

    /// Read settings through `lookup`; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            base_url: get("BASE_URL").unwrap_or(d.base_url),
            engine: parse_or(&get, "BROWSER", d.engine)?,
            headless: bool_or(&get, "HEADLESS", d.headless)?,
            viewport_width: parse_or(&get, "VIEWPORT_WIDTH", d.viewport_width)?,
            viewport_height: parse_or(&get, "VIEWPORT_HEIGHT", d.viewport_height)?,
            slow_mo_ms: parse_or(&get, "SLOW_MO", d.slow_mo_ms)?,
            timeout_ms: parse_or(&get, "TIMEOUT", d.timeout_ms)?,
            language: parse_or(&get, "TEST_LANGUAGE", d.language)?,
            max_response_time_ms: parse_or(&get, "MAX_RESPONSE_TIME", d.max_response_time_ms)?,
            screenshot_on_failure: bool_or(&get, "SCREENSHOT_ON_FAILURE", d.screenshot_on_failure)?,
            max_retries: parse_or(&get, "MAX_RETRIES", d.max_retries)?,
            retry_delay_secs: parse_or(&get, "RETRY_DELAY", d.retry_delay_secs)?,
            similarity_threshold: parse_or(&get, "SIMILARITY_THRESHOLD", d.similarity_threshold)?,
            log_level: get("LOG_LEVEL").unwrap_or(d.log_level),
            reports_dir: get("REPORTS_DIR").map(PathBuf::from).unwrap_or(d.reports_dir),
            test_data_file: get("TEST_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(d.test_data_file),
        })
    }

    /// Parameters every suite can reference: `base_url` and `lang`.
    pub fn params(&self) -> Params {
        Params::new()
            .set("base_url", self.base_url.trim_end_matches('/'))
            .set("lang", self.language.as_str())
    }

    /// Chat URL for a language: `<base>/<lang>/`.
    pub fn url_for(&self, language: Language) -> String {
        format!("{}/{}/", self.base_url.trim_end_matches('/'), language)
    }

    /// Chat URL for the configured language.
    pub fn chat_url(&self) -> String {
        self.url_for(self.language)
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.reports_dir.join("screenshots")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.reports_dir.join("logs")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.reports_dir.join("summary.json")
    }

    pub fn launch_profile(&self) -> LaunchProfile {
        LaunchProfile::default()
            .headless(self.headless)
            .viewport(self.viewport_width, self.viewport_height)
            .slow_mo(self.slow_mo_ms)
    }

    /// Default timings with this run's action and response timeouts.
    pub fn timings(&self) -> Timings {
        Timings {
            action_timeout_ms: self.timeout_ms,
            response_timeout_ms: self.max_response_time_ms,
            ..Timings::default()
        }
    }

    /// Retry policy for suites that don't declare their own.
    pub fn default_retry(&self) -> RetryConfig {
        RetryConfig {
            attempts: self.max_retries.max(1),
            delay_ms: self.retry_delay_secs * 1_000,
        }
    }
}

fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let bad = |e: dotenvy::Error| Error::Config(format!("{}: {}", path.display(), e));
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path).map_err(bad)? {
        let (key, value) = item.map_err(bad)?;
        vars.insert(key, value);
    }
    Ok(vars)
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{}: invalid value '{}': {}", key, raw, e))),
    }
}

fn bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!(
                "{}: invalid value '{}', expected true or false",
                key, raw
            ))),
        },
    }
}
