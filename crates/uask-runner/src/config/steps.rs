//! Case steps and the checks applied to a captured reply.
//!
//! Both accept either a bare name (`setup`, `xss_sanitized`) or a map with
//! a single key carrying the payload.

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use uask_validators::DEFAULT_MIN_LENGTH;

/// One step of a case.
#[derive(Debug, Clone)]
pub enum Step {
    /// Navigate to the target and clear overlays; fails unless the page is ready.
    Setup,
    Navigate(NavigateStep),
    FindElements(FindElementsStep),
    Type(TypeStep),
    ClickSend,
    Send(SendStep),
    CheckCaptcha(CheckCaptchaStep),
    CloseOverlays,
    Wait(WaitStep),
    Screenshot(ScreenshotStep),
    AssertDirection(AssertDirectionStep),
    AssertStable(AssertStableStep),
    CompareResponses(CompareResponsesStep),
    Log(LogStep),
}

impl Step {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Navigate(_) => "navigate",
            Self::FindElements(_) => "find_elements",
            Self::Type(_) => "type",
            Self::ClickSend => "click_send",
            Self::Send(_) => "send",
            Self::CheckCaptcha(_) => "check_captcha",
            Self::CloseOverlays => "close_overlays",
            Self::Wait(_) => "wait",
            Self::Screenshot(_) => "screenshot",
            Self::AssertDirection(_) => "assert_direction",
            Self::AssertStable(_) => "assert_stable",
            Self::CompareResponses(_) => "compare_responses",
            Self::Log(_) => "log",
        }
    }
}

const STEP_NAMES: &[&str] = &[
    "setup",
    "navigate",
    "find_elements",
    "type",
    "click_send",
    "send",
    "check_captcha",
    "close_overlays",
    "wait",
    "screenshot",
    "assert_direction",
    "assert_stable",
    "compare_responses",
    "log",
];

const BARE_STEPS: &[&str] = &[
    "setup",
    "click_send",
    "check_captcha",
    "close_overlays",
    "assert_stable",
];

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(StepVisitor)
    }
}

struct StepVisitor;

impl<'de> Visitor<'de> for StepVisitor {
    type Value = Step;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a step (name, or map with a single step key)")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match value {
            "setup" => Ok(Step::Setup),
            "click_send" => Ok(Step::ClickSend),
            "check_captcha" => Ok(Step::CheckCaptcha(CheckCaptchaStep::default())),
            "close_overlays" => Ok(Step::CloseOverlays),
            "assert_stable" => Ok(Step::AssertStable(AssertStableStep::default())),
            other => Err(de::Error::unknown_variant(other, BARE_STEPS)),
        }
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected step key"))?;

        let step = match key.as_str() {
            "setup" => {
                let _: serde_yaml::Value = map.next_value()?;
                Step::Setup
            }
            "click_send" => {
                let _: serde_yaml::Value = map.next_value()?;
                Step::ClickSend
            }
            "close_overlays" => {
                let _: serde_yaml::Value = map.next_value()?;
                Step::CloseOverlays
            }
            "check_captcha" => Step::CheckCaptcha(next_or_default(&mut map)?),
            "assert_stable" => Step::AssertStable(next_or_default(&mut map)?),
            "navigate" => Step::Navigate(map.next_value()?),
            "find_elements" => Step::FindElements(next_or_default(&mut map)?),
            "type" => Step::Type(map.next_value()?),
            "send" => Step::Send(map.next_value()?),
            "wait" => Step::Wait(map.next_value()?),
            "screenshot" => Step::Screenshot(map.next_value()?),
            "assert_direction" => Step::AssertDirection(map.next_value()?),
            "compare_responses" => Step::CompareResponses(map.next_value()?),
            "log" => Step::Log(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, STEP_NAMES)),
        };

        Ok(step)
    }
}

/// Payload that may be omitted (`key:` or `key: {}`).
fn next_or_default<'de, M, T>(map: &mut M) -> Result<T, M::Error>
where
    M: MapAccess<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value: serde_yaml::Value = map.next_value()?;
    if value.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(value).map_err(de::Error::custom)
}

// --- Step payloads ---

#[derive(Debug, Clone, Deserialize)]
pub struct NavigateStep {
    pub url: String,
}

/// Chat element roles discovery can look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementRole {
    Input,
    Send,
    Widget,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindElementsStep {
    /// Roles that must be found; the rest are only reported.
    #[serde(default)]
    pub require: Vec<ElementRole>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeStep {
    pub text: String,
}

fn default_true() -> bool {
    true
}

/// Send a message through the full cycle and check the reply.
///
/// Exactly one source: `text`, `repeat` × `times`, or a `data` reference.
#[derive(Debug, Clone, Deserialize)]
pub struct SendStep {
    pub text: Option<String>,
    pub repeat: Option<String>,
    pub times: Option<usize>,
    pub data: Option<DataRef>,
    #[serde(default = "default_true")]
    pub wait_for_response: bool,
    #[serde(default)]
    pub expect: Vec<Check>,
    /// Share of data entries that must pass when `data` expands to many.
    pub pass_rate: Option<f64>,
}

impl SendStep {
    /// Literal message for `text` / `repeat` sources.
    pub fn literal(&self) -> Option<String> {
        match (&self.text, &self.repeat, self.times) {
            (Some(text), _, _) => Some(text.clone()),
            (None, Some(unit), Some(times)) => Some(unit.repeat(times)),
            _ => None,
        }
    }
}

/// Reference into the test-data fixture. One of `query` (language),
/// `security` (category) or `edge_case` (language). Without `index`
/// every entry is sent in turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataRef {
    pub query: Option<String>,
    pub security: Option<String>,
    pub edge_case: Option<String>,
    pub index: Option<usize>,
}

impl fmt::Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.query, &self.security, &self.edge_case) {
            (Some(lang), _, _) => write!(f, "valid_queries.{}", lang)?,
            (_, Some(cat), _) => write!(f, "security_tests.{}", cat)?,
            (_, _, Some(lang)) => write!(f, "edge_cases.{}", lang)?,
            _ => write!(f, "<empty>")?,
        }
        if let Some(i) = self.index {
            write!(f, "[{}]", i)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckCaptchaStep {
    /// Block for a human to solve a detected challenge.
    #[serde(default)]
    pub wait_for_solution: bool,
    /// Fail the case when a challenge is showing.
    #[serde(default)]
    pub fail_if_present: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitStep {
    pub ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenshotStep {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    Ltr,
    Rtl,
}

impl TextDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ltr => "ltr",
            Self::Rtl => "rtl",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertDirectionStep {
    pub dir: TextDirection,
}

fn default_stable_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertStableStep {
    #[serde(default = "default_stable_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AssertStableStep {
    fn default() -> Self {
        Self {
            timeout_ms: default_stable_timeout_ms(),
        }
    }
}

/// Send each message and require consecutive replies to be similar.
#[derive(Debug, Clone, Deserialize)]
pub struct CompareResponsesStep {
    pub messages: Vec<String>,
    /// Defaults to the run's similarity threshold.
    pub min_similarity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogStep {
    pub message: String,
}

// --- Checks ---

fn default_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

fn default_min_matches() -> usize {
    1
}

/// An assertion on the reply captured by a `send`.
#[derive(Debug, Clone)]
pub enum Check {
    Meaningful { min_length: usize },
    Keywords { words: Vec<String>, min_matches: usize },
    Forbidden { terms: Vec<String> },
    HallucinationFree,
    WellFormatted,
    /// Every combined response validation at once.
    Valid { min_length: usize },
    XssSanitized,
    InjectionResistant,
    InputDiscoverable,
    PageNotContains { text: String },
    Matches { pattern: String },
}

impl Check {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Meaningful { .. } => "meaningful",
            Self::Keywords { .. } => "keywords",
            Self::Forbidden { .. } => "forbidden",
            Self::HallucinationFree => "hallucination_free",
            Self::WellFormatted => "well_formatted",
            Self::Valid { .. } => "valid",
            Self::XssSanitized => "xss_sanitized",
            Self::InjectionResistant => "injection_resistant",
            Self::InputDiscoverable => "input_discoverable",
            Self::PageNotContains { .. } => "page_not_contains",
            Self::Matches { .. } => "matches",
        }
    }

    /// Still meaningful when the send was stopped by a CAPTCHA.
    pub fn applies_without_reply(&self) -> bool {
        matches!(self, Self::InputDiscoverable)
    }
}

const CHECK_NAMES: &[&str] = &[
    "meaningful",
    "keywords",
    "forbidden",
    "hallucination_free",
    "well_formatted",
    "valid",
    "xss_sanitized",
    "injection_resistant",
    "input_discoverable",
    "page_not_contains",
    "matches",
];

#[derive(Deserialize)]
struct MinLength {
    #[serde(default = "default_min_length")]
    min_length: usize,
}

impl Default for MinLength {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
        }
    }
}

#[derive(Deserialize)]
struct KeywordsArgs {
    words: Vec<String>,
    #[serde(default = "default_min_matches")]
    min_matches: usize,
}

#[derive(Deserialize)]
struct ForbiddenArgs {
    terms: Vec<String>,
}

#[derive(Deserialize)]
struct TextArgs {
    text: String,
}

#[derive(Deserialize)]
struct PatternArgs {
    pattern: String,
}

impl<'de> Deserialize<'de> for Check {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(CheckVisitor)
    }
}

struct CheckVisitor;

impl<'de> Visitor<'de> for CheckVisitor {
    type Value = Check;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a check (name, or map with a single check key)")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match value {
            "meaningful" => Ok(Check::Meaningful {
                min_length: default_min_length(),
            }),
            "hallucination_free" => Ok(Check::HallucinationFree),
            "well_formatted" => Ok(Check::WellFormatted),
            "valid" => Ok(Check::Valid {
                min_length: default_min_length(),
            }),
            "xss_sanitized" => Ok(Check::XssSanitized),
            "injection_resistant" => Ok(Check::InjectionResistant),
            "input_discoverable" => Ok(Check::InputDiscoverable),
            other => Err(de::Error::unknown_variant(other, CHECK_NAMES)),
        }
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected check key"))?;

        let check = match key.as_str() {
            "meaningful" => {
                let a: MinLength = next_or_default(&mut map)?;
                Check::Meaningful {
                    min_length: a.min_length,
                }
            }
            "valid" => {
                let a: MinLength = next_or_default(&mut map)?;
                Check::Valid {
                    min_length: a.min_length,
                }
            }
            "keywords" => {
                let a: KeywordsArgs = map.next_value()?;
                Check::Keywords {
                    words: a.words,
                    min_matches: a.min_matches,
                }
            }
            "forbidden" => {
                let a: ForbiddenArgs = map.next_value()?;
                Check::Forbidden { terms: a.terms }
            }
            "page_not_contains" => {
                let a: TextArgs = map.next_value()?;
                Check::PageNotContains { text: a.text }
            }
            "matches" => {
                let a: PatternArgs = map.next_value()?;
                Check::Matches { pattern: a.pattern }
            }
            unit @ ("hallucination_free" | "well_formatted" | "xss_sanitized"
            | "injection_resistant" | "input_discoverable") => {
                let _: serde_yaml::Value = map.next_value()?;
                return self.visit_str(unit);
            }
            other => return Err(de::Error::unknown_variant(other, CHECK_NAMES)),
        };

        Ok(check)
    }
}
