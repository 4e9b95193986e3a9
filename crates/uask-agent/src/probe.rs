//! Selector strategies resolved live in the page.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Elements considered when a text probe has no explicit scope.
pub const DEFAULT_TEXT_SCOPE: &str = "a,button,input,[role=\"button\"],[onclick]";

/// One candidate in an ordered fallback list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Probe {
    /// `css:.chat-input textarea` or a bare selector
    Css(String),
    /// `button:has-text('Close')` or `text:Close`: elements matching
    /// `scope` whose visible text contains `text` (case-insensitive)
    Text { scope: String, text: String },
}

impl Probe {
    pub fn css(selector: impl Into<String>) -> Self {
        Probe::Css(selector.into())
    }

    pub fn text(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Probe::Text {
            scope: scope.into(),
            text: text.into(),
        }
    }

    /// Parse a probe string. Anything without a recognised prefix or
    /// `:has-text(...)` suffix is a CSS selector.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some(v) = s.strip_prefix("css:") {
            return Probe::Css(v.trim().into());
        }
        if let Some(v) = s.strip_prefix("text:") {
            return Probe::text(DEFAULT_TEXT_SCOPE, v.trim());
        }
        if let Some((scope, text)) = split_has_text(s) {
            return Probe::text(scope, text);
        }
        Probe::Css(s.into())
    }

    /// `(kind, value, scope)` arguments for the in-page resolver.
    pub(crate) fn as_js_args(&self) -> (&'static str, &str, &str) {
        match self {
            Probe::Css(sel) => ("css", sel, ""),
            Probe::Text { scope, text } => ("text", text, scope),
        }
    }
}

/// `button:has-text('Close')` -> `("button", "Close")`
fn split_has_text(s: &str) -> Option<(&str, &str)> {
    let idx = s.find(":has-text(")?;
    let scope = s[..idx].trim();
    let rest = s[idx + ":has-text(".len()..].strip_suffix(')')?;
    let text = rest
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .or_else(|| rest.strip_prefix('"').and_then(|r| r.strip_suffix('"')))
        .unwrap_or(rest);
    let scope = if scope.is_empty() { "*" } else { scope };
    Some((scope, text))
}

impl From<String> for Probe {
    fn from(s: String) -> Self {
        Probe::parse(&s)
    }
}

impl From<&str> for Probe {
    fn from(s: &str) -> Self {
        Probe::parse(s)
    }
}

impl From<Probe> for String {
    fn from(p: Probe) -> Self {
        p.to_string()
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Css(sel) => f.write_str(sel),
            Probe::Text { scope, text } if scope == DEFAULT_TEXT_SCOPE => {
                write!(f, "text:{}", text)
            }
            Probe::Text { scope, text } => write!(f, "{}:has-text('{}')", scope, text),
        }
    }
}

/// What the resolver saw for a probe at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ProbeState {
    /// Number of matching elements.
    #[serde(default)]
    pub count: usize,
    /// First match is rendered with a non-zero box.
    #[serde(default)]
    pub visible: bool,
    /// First match is `contenteditable`.
    #[serde(default)]
    pub editable: bool,
}

impl ProbeState {
    pub fn present(&self) -> bool {
        self.count > 0
    }
}

/// Parse a list of probe strings.
pub fn probes<I, S>(items: I) -> Vec<Probe>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|s| Probe::parse(s.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_css() {
        assert_eq!(
            Probe::parse("textarea[placeholder*='ask' i]"),
            Probe::Css("textarea[placeholder*='ask' i]".into())
        );
    }

    #[test]
    fn parse_prefixed() {
        assert_eq!(Probe::parse("css:#chat-input"), Probe::Css("#chat-input".into()));
        assert_eq!(
            Probe::parse("text:Accept"),
            Probe::text(DEFAULT_TEXT_SCOPE, "Accept")
        );
    }

    #[test]
    fn parse_has_text() {
        assert_eq!(
            Probe::parse("button:has-text('Close')"),
            Probe::text("button", "Close")
        );
        assert_eq!(
            Probe::parse(".modal button:has-text(\"OK\")"),
            Probe::text(".modal button", "OK")
        );
        assert_eq!(Probe::parse(":has-text('Send')"), Probe::text("*", "Send"));
    }

    #[test]
    fn display_round_trips_has_text() {
        let p = Probe::parse("button:has-text('Continue')");
        assert_eq!(p.to_string(), "button:has-text('Continue')");
        assert_eq!(Probe::parse(&p.to_string()), p);
    }

    #[test]
    fn deserialize_from_string() {
        let list: Vec<Probe> =
            serde_json::from_str(r##"["#modalRecaptcha", "button:has-text('OK')"]"##).unwrap();
        assert_eq!(list[0], Probe::css("#modalRecaptcha"));
        assert_eq!(list[1], Probe::text("button", "OK"));
    }

    #[test]
    fn js_args() {
        assert_eq!(Probe::css(".x").as_js_args(), ("css", ".x", ""));
        assert_eq!(
            Probe::text("button", "Send").as_js_args(),
            ("text", "Send", "button")
        );
    }
}
