//! Session snapshots: cookies and localStorage captured from a manually
//! verified browsing session, replayed into fresh pages.

use crate::driver::PageDriver;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// A cookie as stored in the snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            http_only: false,
            secure: false,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// Cookies, localStorage entries and the URL they were captured on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub cookies: Vec<SessionCookie>,
    #[serde(rename = "localStorage")]
    pub local_storage: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// On-disk shape. Storage may sit at the top level as `localStorage`
/// (list of pairs or an object) or nested as `storage.local_storage`.
#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    cookies: Vec<SessionCookie>,
    #[serde(default, rename = "localStorage", deserialize_with = "storage_entries")]
    local_storage: Option<Vec<(String, String)>>,
    #[serde(default)]
    storage: Option<RawStorage>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawStorage {
    #[serde(default, deserialize_with = "storage_entries")]
    local_storage: Option<Vec<(String, String)>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StorageShape {
    Pairs(Vec<(String, String)>),
    Map(serde_json::Map<String, serde_json::Value>),
}

fn storage_entries<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<(String, String)>>, D::Error>
where
    D: Deserializer<'de>,
{
    let shape: Option<StorageShape> = Option::deserialize(deserializer)?;
    Ok(shape.map(|s| match s {
        StorageShape::Pairs(pairs) => pairs,
        StorageShape::Map(map) => map
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect(),
    }))
}

impl SessionSnapshot {
    /// Parse a snapshot from JSON text.
    pub fn parse(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(Error::Session("snapshot must be a JSON object".into()));
        }
        let raw: RawSnapshot = serde_json::from_value(value)?;
        let local_storage = raw
            .local_storage
            .or_else(|| raw.storage.and_then(|s| s.local_storage))
            .unwrap_or_default();
        Ok(Self {
            cookies: raw.cookies,
            local_storage,
            url: raw.url,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Session(format!("cannot read {}: {}", path.display(), e))
        })?;
        let snapshot = Self::parse(&content)?;
        info!(
            "loaded session from {} ({} cookies, {} storage entries)",
            path.display(),
            snapshot.cookies.len(),
            snapshot.local_storage.len()
        );
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("session saved to {}", path.display());
        Ok(())
    }

    /// Capture the current page's cookies, localStorage and URL.
    pub async fn capture(driver: &(impl PageDriver + ?Sized)) -> Result<Self> {
        Ok(Self {
            cookies: driver.cookies().await?,
            local_storage: driver.local_storage().await?,
            url: Some(driver.url().await?),
        })
    }

    /// Replay the snapshot into `driver`'s page.
    ///
    /// Cookies go in first; localStorage is origin-bound so the page must
    /// already be on the target origin for those entries to land. Reloads
    /// when anything was written so the site sees the restored state.
    pub async fn restore(&self, driver: &(impl PageDriver + ?Sized)) -> Result<()> {
        for cookie in &self.cookies {
            debug!("restoring cookie {}", cookie.name);
            driver.set_cookie(cookie).await?;
        }
        driver.set_local_storage(&self.local_storage).await?;
        if !self.is_empty() {
            driver.reload().await?;
        }
        info!(
            "restored session ({} cookies, {} storage entries)",
            self.cookies.len(),
            self.local_storage.len()
        );
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.local_storage.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;

    #[test]
    fn parse_top_level_local_storage_pairs() {
        let snap = SessionSnapshot::parse(
            r#"{
                "cookies": [{"name": "sid", "value": "abc", "domain": ".u.ae", "httpOnly": true}],
                "localStorage": [["lang", "en"], ["seen_disclaimer", "1"]],
                "url": "https://ask.u.ae/en/"
            }"#,
        )
        .unwrap();
        assert_eq!(snap.cookies.len(), 1);
        assert!(snap.cookies[0].http_only);
        assert_eq!(snap.cookies[0].domain.as_deref(), Some(".u.ae"));
        assert_eq!(snap.local_storage[1], ("seen_disclaimer".into(), "1".into()));
        assert_eq!(snap.url.as_deref(), Some("https://ask.u.ae/en/"));
    }

    #[test]
    fn parse_nested_storage_object() {
        let snap = SessionSnapshot::parse(
            r#"{"cookies": [], "storage": {"local_storage": {"lang": "ar", "count": 3}}}"#,
        )
        .unwrap();
        assert!(snap.local_storage.contains(&("lang".into(), "ar".into())));
        assert!(snap.local_storage.contains(&("count".into(), "3".into())));
    }

    #[test]
    fn parse_defaults_missing_fields() {
        let snap = SessionSnapshot::parse("{}").unwrap();
        assert!(snap.is_empty());
        assert!(snap.url.is_none());
    }

    #[test]
    fn parse_rejects_non_object() {
        assert!(matches!(
            SessionSnapshot::parse("[1, 2]"),
            Err(Error::Session(_))
        ));
        assert!(SessionSnapshot::parse("not json").is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let snap = SessionSnapshot {
            cookies: vec![SessionCookie::new("sid", "abc").domain(".u.ae")],
            local_storage: vec![("lang".into(), "en".into())],
            url: Some("https://ask.u.ae/en/".into()),
        };
        snap.save(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"localStorage\""));

        let loaded = SessionSnapshot::load(&path).unwrap();
        assert_eq!(loaded, snap);
    }

    #[test]
    fn load_missing_file_is_session_error() {
        let err = SessionSnapshot::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }

    #[tokio::test]
    async fn capture_and_restore_through_driver() {
        let source = FakePage::new();
        source.set_cookies(vec![SessionCookie::new("sid", "abc")]);
        source.set_storage(vec![("lang".into(), "en".into())]);
        let snap = SessionSnapshot::capture(&source).await.unwrap();
        assert_eq!(snap.cookies.len(), 1);
        assert_eq!(snap.url.as_deref(), Some("https://ask.u.ae/en/"));

        let target = FakePage::new();
        snap.restore(&target).await.unwrap();
        assert_eq!(target.cookie_names(), vec!["sid".to_string()]);
        assert_eq!(target.storage(), vec![("lang".to_string(), "en".to_string())]);
        assert_eq!(target.reloads(), 1);
    }

    #[tokio::test]
    async fn restore_empty_snapshot_skips_reload() {
        let target = FakePage::new();
        SessionSnapshot::default().restore(&target).await.unwrap();
        assert_eq!(target.reloads(), 0);
    }
}
