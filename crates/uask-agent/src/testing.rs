//! In-memory page for unit tests. Elements are keyed by the probe's display
//! string; clicks, key presses and timers mutate the model through effects.

use crate::driver::PageDriver;
use crate::probe::{Probe, ProbeState};
use crate::session::SessionCookie;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

type Effect = Box<dyn FnMut(&mut FakeState) + Send>;
type Timer = Box<dyn FnOnce(&mut FakeState) + Send>;

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub count: usize,
    pub visible: bool,
    pub editable: bool,
    pub value: String,
    pub texts: Vec<String>,
    pub attrs: HashMap<String, String>,
    /// `fill` silently leaves the value untouched.
    pub drops_input: bool,
}

impl FakeElement {
    pub fn visible() -> Self {
        Self {
            count: 1,
            visible: true,
            ..Default::default()
        }
    }

    pub fn hidden() -> Self {
        Self {
            count: 1,
            visible: false,
            ..Default::default()
        }
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn texts(mut self, texts: &[&str]) -> Self {
        self.count = texts.len();
        self.texts = texts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn drops_input(mut self) -> Self {
        self.drops_input = true;
        self
    }
}

#[derive(Default)]
pub struct FakeState {
    pub elements: HashMap<String, FakeElement>,
    pub body: String,
    pub url: String,
    pub title: String,
    pub cookies: Vec<SessionCookie>,
    pub storage: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub keys: Vec<String>,
    pub scripts: Vec<String>,
    pub screenshots: usize,
    pub reloads: usize,
    pub gotos: Vec<String>,
}

impl FakeState {
    pub fn show(&mut self, key: &str) {
        let el = self.elements.entry(key.into()).or_default();
        el.count = el.count.max(1);
        el.visible = true;
    }

    pub fn hide(&mut self, key: &str) {
        if let Some(el) = self.elements.get_mut(key) {
            el.visible = false;
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.elements.remove(key);
    }

    pub fn append_body(&mut self, text: &str) {
        if !self.body.is_empty() {
            self.body.push('\n');
        }
        self.body.push_str(text);
    }

    pub fn set_body(&mut self, text: &str) {
        self.body = text.into();
    }

    pub fn value(&self, key: &str) -> String {
        self.elements
            .get(key)
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }

    pub fn push_text(&mut self, key: &str, text: &str) {
        let el = self.elements.entry(key.into()).or_default();
        el.texts.push(text.into());
        el.count = el.texts.len();
        el.visible = true;
    }
}

pub struct FakePage {
    state: Mutex<FakeState>,
    on_click: Mutex<HashMap<String, Effect>>,
    on_key: Mutex<HashMap<String, Effect>>,
    timers: Mutex<Vec<(Instant, Timer)>>,
    probe_errors: Mutex<HashSet<String>>,
    click_errors: Mutex<HashSet<String>>,
    eval_results: Mutex<Vec<(String, Value)>>,
}

impl FakePage {
    pub fn new() -> Self {
        let state = FakeState {
            url: "https://ask.u.ae/en/".into(),
            title: "U-Ask".into(),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            on_click: Mutex::new(HashMap::new()),
            on_key: Mutex::new(HashMap::new()),
            timers: Mutex::new(Vec::new()),
            probe_errors: Mutex::new(HashSet::new()),
            click_errors: Mutex::new(HashSet::new()),
            eval_results: Mutex::new(Vec::new()),
        }
    }

    /// Run `f` against the model after applying any due timers.
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let now = Instant::now();
        let due: Vec<Timer> = {
            let mut timers = self.timers.lock().unwrap();
            let mut due = Vec::new();
            let mut i = 0;
            while i < timers.len() {
                if timers[i].0 <= now {
                    due.push(timers.remove(i).1);
                } else {
                    i += 1;
                }
            }
            due
        };
        let mut state = self.state.lock().unwrap();
        for timer in due {
            timer(&mut state);
        }
        f(&mut state)
    }

    pub fn add(&self, key: &str, el: FakeElement) {
        self.with(|s| {
            s.elements.insert(key.into(), el);
        });
    }

    pub fn set_body(&self, text: &str) {
        self.with(|s| s.set_body(text));
    }

    pub fn on_click(&self, key: &str, effect: impl FnMut(&mut FakeState) + Send + 'static) {
        self.on_click
            .lock()
            .unwrap()
            .insert(key.into(), Box::new(effect));
    }

    pub fn on_key(&self, key: &str, effect: impl FnMut(&mut FakeState) + Send + 'static) {
        self.on_key
            .lock()
            .unwrap()
            .insert(key.into(), Box::new(effect));
    }

    pub fn schedule(&self, after: Duration, effect: impl FnOnce(&mut FakeState) + Send + 'static) {
        self.timers
            .lock()
            .unwrap()
            .push((Instant::now() + after, Box::new(effect)));
    }

    pub fn fail_probe(&self, key: &str) {
        self.probe_errors.lock().unwrap().insert(key.into());
    }

    pub fn fail_click(&self, key: &str) {
        self.click_errors.lock().unwrap().insert(key.into());
    }

    /// Scripts containing `needle` evaluate to `value`.
    pub fn on_eval(&self, needle: &str, value: Value) {
        self.eval_results
            .lock()
            .unwrap()
            .push((needle.into(), value));
    }

    pub fn scripts(&self) -> Vec<String> {
        self.with(|s| s.scripts.clone())
    }

    pub fn set_cookies(&self, cookies: Vec<SessionCookie>) {
        self.with(|s| s.cookies = cookies);
    }

    pub fn set_storage(&self, entries: Vec<(String, String)>) {
        self.with(|s| s.storage = entries);
    }

    pub fn cookie_names(&self) -> Vec<String> {
        self.with(|s| s.cookies.iter().map(|c| c.name.clone()).collect())
    }

    pub fn storage(&self) -> Vec<(String, String)> {
        self.with(|s| s.storage.clone())
    }

    pub fn reloads(&self) -> usize {
        self.with(|s| s.reloads)
    }

    pub fn clicks(&self) -> Vec<String> {
        self.with(|s| s.clicks.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.with(|s| s.keys.clone())
    }

    pub fn screenshots(&self) -> usize {
        self.with(|s| s.screenshots)
    }

    pub fn value(&self, key: &str) -> String {
        self.with(|s| s.value(key))
    }

    pub fn is_visible(&self, key: &str) -> bool {
        self.with(|s| s.elements.get(key).map(|e| e.visible).unwrap_or(false))
    }

    fn element(&self, probe: &Probe) -> Option<FakeElement> {
        let key = probe.to_string();
        self.with(|s| s.elements.get(&key).cloned())
    }

    fn run_effect(&self, table: &Mutex<HashMap<String, Effect>>, key: &str) {
        let mut table = table.lock().unwrap();
        if let Some(effect) = table.get_mut(key) {
            self.with(|s| effect(s));
        }
    }
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.with(|s| {
            s.gotos.push(url.into());
            s.url = url.into();
        });
        Ok(())
    }

    async fn wait_for_network_idle(&self, _idle_ms: u64, _timeout_ms: u64) -> Result<()> {
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.with(|s| s.reloads += 1);
        Ok(())
    }

    async fn probe(&self, probe: &Probe) -> Result<ProbeState> {
        let key = probe.to_string();
        if self.probe_errors.lock().unwrap().contains(&key) {
            return Err(Error::Script(format!("{}: invalid selector", key)));
        }
        Ok(self
            .element(probe)
            .map(|e| ProbeState {
                count: e.count,
                visible: e.visible && e.count > 0,
                editable: e.editable,
            })
            .unwrap_or_default())
    }

    async fn click(&self, probe: &Probe) -> Result<()> {
        let key = probe.to_string();
        if self.click_errors.lock().unwrap().contains(&key) {
            return Err(Error::Script(format!("{}: element is not clickable", key)));
        }
        if self.element(probe).map(|e| e.count == 0).unwrap_or(true) {
            return Err(Error::ElementNotFound(key));
        }
        self.with(|s| s.clicks.push(key.clone()));
        self.run_effect(&self.on_click, &key);
        Ok(())
    }

    async fn fill(&self, probe: &Probe, value: &str) -> Result<()> {
        let key = probe.to_string();
        self.with(|s| match s.elements.get_mut(&key) {
            Some(el) if el.count > 0 => {
                if !el.drops_input {
                    el.value = value.into();
                }
                Ok(())
            }
            _ => Err(Error::ElementNotFound(key.clone())),
        })
    }

    async fn read_input(&self, probe: &Probe) -> Result<String> {
        self.element(probe)
            .map(|e| e.value)
            .ok_or_else(|| Error::ElementNotFound(probe.to_string()))
    }

    async fn texts(&self, probe: &Probe) -> Result<Vec<String>> {
        Ok(self.element(probe).map(|e| e.texts).unwrap_or_default())
    }

    async fn attribute(&self, probe: &Probe, name: &str) -> Result<Option<String>> {
        Ok(self.element(probe).and_then(|e| e.attrs.get(name).cloned()))
    }

    async fn body_text(&self) -> Result<String> {
        Ok(self.with(|s| s.body.clone()))
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.with(|s| s.keys.push(key.into()));
        self.run_effect(&self.on_key, key);
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.with(|s| s.url.clone()))
    }

    async fn title(&self) -> Result<String> {
        Ok(self.with(|s| s.title.clone()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.with(|s| s.screenshots += 1);
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn execute(&self, js: &str) -> Result<()> {
        self.with(|s| s.scripts.push(js.into()));
        Ok(())
    }

    async fn evaluate_json(&self, js: &str) -> Result<Value> {
        self.with(|s| s.scripts.push(js.into()));
        let results = self.eval_results.lock().unwrap();
        Ok(results
            .iter()
            .find(|(needle, _)| js.contains(needle.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null))
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>> {
        Ok(self.with(|s| s.cookies.clone()))
    }

    async fn set_cookie(&self, cookie: &SessionCookie) -> Result<()> {
        self.with(|s| {
            s.cookies.retain(|c| c.name != cookie.name);
            s.cookies.push(cookie.clone());
        });
        Ok(())
    }

    async fn delete_cookie(&self, name: &str, _domain: Option<&str>) -> Result<()> {
        self.with(|s| s.cookies.retain(|c| c.name != name));
        Ok(())
    }

    async fn local_storage(&self) -> Result<Vec<(String, String)>> {
        Ok(self.with(|s| s.storage.clone()))
    }

    async fn set_local_storage(&self, entries: &[(String, String)]) -> Result<()> {
        self.with(|s| s.storage.extend(entries.iter().cloned()));
        Ok(())
    }

    async fn clear_storage(&self) -> Result<()> {
        self.with(|s| {
            s.cookies.clear();
            s.storage.clear();
        });
        Ok(())
    }
}
