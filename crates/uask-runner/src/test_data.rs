//! Test-data fixture: sample queries, attack payloads and edge cases.
//!
//! ```json
//! {
//!   "valid_queries": { "en": [{ "query": "...", "expected_keywords": ["visa"] }] },
//!   "security_tests": { "xss_attempts": ["<script>...", { "query": "...", "description": "..." }] },
//!   "edge_cases": { "en": [{ "input": "", "description": "empty message" }] }
//! }
//! ```

use crate::config::DataRef;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestData {
    #[serde(default)]
    pub valid_queries: BTreeMap<String, Vec<Query>>,
    #[serde(default)]
    pub security_tests: BTreeMap<String, Vec<SecurityCase>>,
    #[serde(default)]
    pub edge_cases: BTreeMap<String, Vec<EdgeCase>>,
}

/// A question the bot should answer well.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Query {
    pub query: String,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
    #[serde(default)]
    pub should_not_contain: Vec<String>,
    pub category: Option<String>,
}

/// An attack payload, bare or with a description.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SecurityCase {
    Plain(String),
    Described {
        #[serde(alias = "payload")]
        query: String,
        description: Option<String>,
    },
}

impl SecurityCase {
    pub fn payload(&self) -> &str {
        match self {
            Self::Plain(p) => p,
            Self::Described { query, .. } => query,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Plain(_) => None,
            Self::Described { description, .. } => description.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EdgeCase {
    #[serde(alias = "query")]
    pub input: String,
    pub description: Option<String>,
    pub expected_behavior: Option<String>,
}

/// One message expanded from a [`DataRef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub label: String,
    pub message: String,
    pub expected_keywords: Vec<String>,
    pub forbidden_terms: Vec<String>,
}

impl TestData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("test data {}: {}", path.display(), e)))?;
        let data = Self::parse(&content)?;
        info!(
            "loaded test data from {} ({} query sets, {} security categories, {} edge-case sets)",
            path.display(),
            data.valid_queries.len(),
            data.security_tests.len(),
            data.edge_cases.len()
        );
        Ok(data)
    }

    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn queries(&self, language: &str) -> &[Query] {
        self.valid_queries
            .get(language)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn security(&self, category: &str) -> &[SecurityCase] {
        self.security_tests
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn edge_cases(&self, language: &str) -> &[EdgeCase] {
        self.edge_cases
            .get(language)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Messages a reference points at. An unknown set, an empty set or an
    /// out-of-range index is an error.
    pub fn entries(&self, data: &DataRef) -> Result<Vec<DataEntry>> {
        let all: Vec<DataEntry> = if let Some(ref lang) = data.query {
            self.queries(lang)
                .iter()
                .enumerate()
                .map(|(i, q)| DataEntry {
                    label: q.category.clone().unwrap_or_else(|| format!("query {}", i)),
                    message: q.query.clone(),
                    expected_keywords: q.expected_keywords.clone(),
                    forbidden_terms: q.should_not_contain.clone(),
                })
                .collect()
        } else if let Some(ref category) = data.security {
            self.security(category)
                .iter()
                .enumerate()
                .map(|(i, c)| DataEntry {
                    label: c
                        .description()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("{} {}", category, i)),
                    message: c.payload().to_string(),
                    expected_keywords: Vec::new(),
                    forbidden_terms: Vec::new(),
                })
                .collect()
        } else if let Some(ref lang) = data.edge_case {
            self.edge_cases(lang)
                .iter()
                .enumerate()
                .map(|(i, e)| DataEntry {
                    label: e
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("edge case {}", i)),
                    message: e.input.clone(),
                    expected_keywords: Vec::new(),
                    forbidden_terms: Vec::new(),
                })
                .collect()
        } else {
            Vec::new()
        };

        if all.is_empty() {
            return Err(Error::Config(format!("test data {} is empty", data)));
        }
        match data.index {
            None => Ok(all),
            Some(i) => all
                .get(i)
                .cloned()
                .map(|e| vec![e])
                .ok_or_else(|| {
                    Error::Config(format!(
                        "test data {}: index out of range ({} entries)",
                        data,
                        all.len()
                    ))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "valid_queries": {
            "en": [
                {"query": "How do I renew my Emirates ID?", "expected_keywords": ["emirates id", "renew"], "should_not_contain": ["error"], "category": "identity"},
                {"query": "What is a golden visa?"}
            ]
        },
        "security_tests": {
            "xss_attempts": [
                "<script>alert('XSS')</script>",
                {"query": "<img src=x onerror=alert(1)>", "description": "img onerror"},
                {"payload": "<svg onload=alert(1)>"}
            ]
        },
        "edge_cases": {
            "en": [{"input": "", "description": "empty message"}]
        }
    }"#;

    fn data() -> TestData {
        TestData::parse(FIXTURE).unwrap()
    }

    #[test]
    fn test_parse_fixture_shapes() {
        let d = data();
        assert_eq!(d.queries("en").len(), 2);
        assert_eq!(d.queries("en")[1].expected_keywords.len(), 0);
        assert!(d.queries("ar").is_empty());

        let xss = d.security("xss_attempts");
        assert_eq!(xss.len(), 3);
        assert_eq!(xss[0].payload(), "<script>alert('XSS')</script>");
        assert_eq!(xss[0].description(), None);
        assert_eq!(xss[1].description(), Some("img onerror"));
        assert_eq!(xss[2].payload(), "<svg onload=alert(1)>");

        assert_eq!(d.edge_cases("en")[0].input, "");
    }

    #[test]
    fn test_missing_sections_are_empty() {
        let d = TestData::parse("{}").unwrap();
        assert!(d.security("prompt_injection").is_empty());
    }

    #[test]
    fn test_entries_carry_query_expectations() {
        let r = DataRef {
            query: Some("en".into()),
            index: Some(0),
            ..Default::default()
        };
        let entries = data().entries(&r).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "identity");
        assert_eq!(entries[0].expected_keywords, vec!["emirates id", "renew"]);
        assert_eq!(entries[0].forbidden_terms, vec!["error"]);
    }

    #[test]
    fn test_entries_expand_whole_category() {
        let r = DataRef {
            security: Some("xss_attempts".into()),
            ..Default::default()
        };
        let entries = data().entries(&r).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].label, "xss_attempts 0");
        assert_eq!(entries[1].label, "img onerror");
    }

    #[test]
    fn test_entries_errors() {
        let empty = DataRef {
            security: Some("nope".into()),
            ..Default::default()
        };
        assert!(data().entries(&empty).is_err());

        let out_of_range = DataRef {
            edge_case: Some("en".into()),
            index: Some(5),
            ..Default::default()
        };
        let err = data().entries(&out_of_range).unwrap_err().to_string();
        assert!(err.contains("out of range"), "{}", err);
    }

    #[test]
    fn test_load_bundled_fixture() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data/test-data.json");
        let d = TestData::load(path).unwrap();
        assert!(!d.queries("en").is_empty());
        assert!(!d.queries("ar").is_empty());
        assert!(!d.security("xss_attempts").is_empty());
        assert!(!d.security("prompt_injection").is_empty());
    }
}
