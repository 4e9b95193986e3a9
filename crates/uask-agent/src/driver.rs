//! The page seam every helper talks through.

use crate::probe::{Probe, ProbeState};
use crate::session::SessionCookie;
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::Page;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Browser operations the chat helpers need.
///
/// Element operations take a [`Probe`] and act on its first match.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn wait_for_network_idle(&self, idle_ms: u64, timeout_ms: u64) -> Result<()>;
    async fn reload(&self) -> Result<()>;

    /// Count, visibility and editability of a probe's matches.
    async fn probe(&self, probe: &Probe) -> Result<ProbeState>;
    async fn click(&self, probe: &Probe) -> Result<()>;
    /// Replace the element's content. Works on inputs, textareas and
    /// contenteditable hosts.
    async fn fill(&self, probe: &Probe, value: &str) -> Result<()>;
    /// `innerText` for contenteditable hosts, `value` otherwise.
    async fn read_input(&self, probe: &Probe) -> Result<String>;
    /// `innerText` of every match, in document order.
    async fn texts(&self, probe: &Probe) -> Result<Vec<String>>;
    async fn attribute(&self, probe: &Probe, name: &str) -> Result<Option<String>>;

    /// Visible text of the whole page.
    async fn body_text(&self) -> Result<String>;
    async fn press_key(&self, key: &str) -> Result<()>;
    async fn url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;
    /// PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    async fn execute(&self, js: &str) -> Result<()>;
    async fn evaluate_json(&self, js: &str) -> Result<Value>;

    async fn cookies(&self) -> Result<Vec<SessionCookie>>;
    async fn set_cookie(&self, cookie: &SessionCookie) -> Result<()>;
    async fn delete_cookie(&self, name: &str, domain: Option<&str>) -> Result<()>;
    async fn local_storage(&self) -> Result<Vec<(String, String)>>;
    async fn set_local_storage(&self, entries: &[(String, String)]) -> Result<()>;
    /// Drop cookies, localStorage and sessionStorage for the current origin.
    async fn clear_storage(&self) -> Result<()>;
}

/// Element lookup shared by every probe script. Text probes keep only the
/// innermost matches so `*:has-text('Send')` lands on the button, not `<body>`.
const FIND_JS: &str = r#"
const __visible = el => {
    const r = el.getBoundingClientRect();
    const s = getComputedStyle(el);
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none' && s.opacity !== '0';
};
const __find = (kind, value, scope) => {
    if (kind === 'css') return [...document.querySelectorAll(value)];
    const needle = (value || '').toLowerCase();
    const hits = [...document.querySelectorAll(scope || '*')]
        .filter(el => (el.innerText || el.value || el.getAttribute('aria-label') || '').toLowerCase().includes(needle));
    return hits.filter(el => !hits.some(o => o !== el && el.contains(o)));
};
const __selector = el => {
    if (el.id) return '#' + CSS.escape(el.id);
    const path = [];
    let n = el;
    while (n && n.nodeType === 1) {
        let s = n.tagName.toLowerCase();
        if (n.id) { path.unshift('#' + CSS.escape(n.id)); break; }
        const p = n.parentElement;
        if (p) {
            const sibs = [...p.children].filter(c => c.tagName === n.tagName);
            if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(n) + 1) + ')';
        }
        path.unshift(s);
        n = p;
    }
    return path.join(' > ');
};
"#;

const STATE_OP: &str = "els => ({ count: els.length, visible: els.length > 0 && __visible(els[0]), editable: els.length > 0 && !!els[0].isContentEditable })";
const SELECTOR_OP: &str = "els => els.length ? __selector(els[0]) : null";
const READ_OP: &str = "els => { const el = els[0]; if (!el) return null; return el.isContentEditable ? el.innerText : (el.value ?? ''); }";
const TEXTS_OP: &str = "els => els.map(el => el.innerText || el.textContent || '')";

/// Fill a contenteditable host so frameworks listening for `input` notice.
const FILL_EDITABLE_OP: &str = r#"els => {
    const el = els[0];
    if (!el) return false;
    el.focus();
    document.execCommand('selectAll', false);
    if (__value === '') document.execCommand('delete', false);
    else document.execCommand('insertText', false, __value);
    if (el.innerText.trim() !== __value.trim()) {
        el.innerText = __value;
        el.dispatchEvent(new InputEvent('input', { bubbles: true }));
    }
    return true;
}"#;

const CLEAR_STORAGE_JS: &str =
    "(() => { try { localStorage.clear(); sessionStorage.clear(); } catch (e) {} })()";

/// [`PageDriver`] over an eoka stealth page.
pub struct EokaDriver {
    page: Page,
    slow_mo: Duration,
}

impl EokaDriver {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            slow_mo: Duration::ZERO,
        }
    }

    /// Pause this long before every input action.
    pub fn with_slow_mo(mut self, slow_mo: Duration) -> Self {
        self.slow_mo = slow_mo;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn into_page(self) -> Page {
        self.page
    }

    async fn pace(&self) {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }
    }

    /// Run `op` (a JS function of the match list) against a probe.
    async fn run<T: DeserializeOwned>(&self, probe: &Probe, op: &str, prelude: &str) -> Result<T> {
        let (kind, value, scope) = probe.as_js_args();
        let js = format!(
            "(() => {{\n{FIND_JS}\n{prelude}\ntry {{ const __els = __find({}, {}, {}); return {{ ok: ({op})(__els) }}; }} catch (e) {{ return {{ error: String(e) }}; }}\n}})()",
            serde_json::to_string(kind)?,
            serde_json::to_string(value)?,
            serde_json::to_string(scope)?,
        );
        let out: Value = self.page.evaluate(&js).await?;
        if let Some(err) = out.get("error").and_then(Value::as_str) {
            return Err(Error::Script(format!("{}: {}", probe, err)));
        }
        Ok(serde_json::from_value(
            out.get("ok").cloned().unwrap_or(Value::Null),
        )?)
    }

    async fn selector_for(&self, probe: &Probe) -> Result<String> {
        if let Probe::Css(sel) = probe {
            return Ok(sel.clone());
        }
        let sel: Option<String> = self.run(probe, SELECTOR_OP, "").await?;
        sel.ok_or_else(|| Error::ElementNotFound(probe.to_string()))
    }
}

#[async_trait]
impl PageDriver for EokaDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!("goto: {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    async fn wait_for_network_idle(&self, idle_ms: u64, timeout_ms: u64) -> Result<()> {
        self.page.wait_for_network_idle(idle_ms, timeout_ms).await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.page.reload().await?;
        Ok(())
    }

    async fn probe(&self, probe: &Probe) -> Result<ProbeState> {
        self.run(probe, STATE_OP, "").await
    }

    async fn click(&self, probe: &Probe) -> Result<()> {
        self.pace().await;
        let selector = self.selector_for(probe).await?;
        debug!("click: {}", probe);
        self.page.click(&selector).await?;
        Ok(())
    }

    async fn fill(&self, probe: &Probe, value: &str) -> Result<()> {
        self.pace().await;
        let state = self.probe(probe).await?;
        if !state.present() {
            return Err(Error::ElementNotFound(probe.to_string()));
        }
        debug!("fill: {} ({} chars)", probe, value.chars().count());
        if state.editable {
            let prelude = format!("const __value = {};", serde_json::to_string(value)?);
            let filled: bool = self.run(probe, FILL_EDITABLE_OP, &prelude).await?;
            if !filled {
                return Err(Error::ElementNotFound(probe.to_string()));
            }
            return Ok(());
        }
        let selector = self.selector_for(probe).await?;
        self.page.fill(&selector, value).await?;
        Ok(())
    }

    async fn read_input(&self, probe: &Probe) -> Result<String> {
        let value: Option<String> = self.run(probe, READ_OP, "").await?;
        value.ok_or_else(|| Error::ElementNotFound(probe.to_string()))
    }

    async fn texts(&self, probe: &Probe) -> Result<Vec<String>> {
        self.run(probe, TEXTS_OP, "").await
    }

    async fn attribute(&self, probe: &Probe, name: &str) -> Result<Option<String>> {
        let op = format!(
            "els => els.length ? els[0].getAttribute({}) : null",
            serde_json::to_string(name)?
        );
        self.run(probe, &op, "").await
    }

    async fn body_text(&self) -> Result<String> {
        Ok(self.page.text().await?)
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.pace().await;
        self.page.human().press_key(key).await?;
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?)
    }

    async fn title(&self) -> Result<String> {
        Ok(self.page.title().await?)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }

    async fn execute(&self, js: &str) -> Result<()> {
        self.page.execute(js).await?;
        Ok(())
    }

    async fn evaluate_json(&self, js: &str) -> Result<Value> {
        Ok(self.page.evaluate(js).await?)
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>> {
        let raw = self.page.cookies().await?;
        let value = serde_json::to_value(&raw)?;
        Ok(serde_json::from_value(value)?)
    }

    async fn set_cookie(&self, cookie: &SessionCookie) -> Result<()> {
        self.page
            .set_cookie(
                &cookie.name,
                &cookie.value,
                cookie.domain.as_deref(),
                cookie.path.as_deref(),
            )
            .await?;
        Ok(())
    }

    async fn delete_cookie(&self, name: &str, domain: Option<&str>) -> Result<()> {
        self.page.delete_cookie(name, domain).await?;
        Ok(())
    }

    async fn local_storage(&self) -> Result<Vec<(String, String)>> {
        let entries: Option<Vec<(String, String)>> = self
            .page
            .evaluate("(() => { try { return Object.entries(localStorage); } catch (e) { return null; } })()")
            .await?;
        Ok(entries.unwrap_or_default())
    }

    async fn set_local_storage(&self, entries: &[(String, String)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let js = format!(
            "(() => {{ const e = {}; for (const [k, v] of e) localStorage.setItem(k, v); }})()",
            serde_json::to_string(entries)?
        );
        self.page.execute(&js).await?;
        Ok(())
    }

    async fn clear_storage(&self) -> Result<()> {
        for cookie in self.cookies().await? {
            self.page
                .delete_cookie(&cookie.name, cookie.domain.as_deref())
                .await?;
        }
        self.page.execute(CLEAR_STORAGE_JS).await?;
        Ok(())
    }
}
