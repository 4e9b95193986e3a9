mod executor;

pub use executor::{CaseContext, Exchange};

use crate::config::{Case, Settings, Suite};
use crate::report::{self, CaseResult, SuiteResult};
use crate::test_data::TestData;
use crate::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uask_agent::{Browser, ChatHelpers, LaunchProfile, Page, PageDriver, SessionSnapshot};

/// Runs suites against one browser, each case in a fresh tab.
pub struct Runner {
    browser: Browser,
    /// Kept open so closing a case's tab never closes the last window.
    _home: Page,
    profile: LaunchProfile,
    helpers: ChatHelpers,
    settings: Settings,
    data: Option<TestData>,
    session: Option<SessionSnapshot>,
}

/// What one attempt at a case produced.
struct Attempt {
    steps_executed: usize,
    error: Option<String>,
    screenshot: Option<PathBuf>,
}

impl Runner {
    /// Launch the browser for `suite`. Loads the test-data fixture when a
    /// step refers to it.
    pub async fn launch(suite: &Suite, settings: &Settings) -> Result<Self> {
        let data = if suite.uses_test_data() {
            Some(TestData::load(&settings.test_data_file)?)
        } else {
            None
        };

        let profile = suite.browser.profile(settings.launch_profile());
        let browser = profile.launch().await?;
        let home = browser.new_page("about:blank").await?;
        let helpers = ChatHelpers::new(suite.selector_set(), suite.timings_or(settings.timings())?);

        Ok(Self {
            browser,
            _home: home,
            profile,
            helpers,
            settings: settings.clone(),
            data,
            session: None,
        })
    }

    /// Replay `session` into every case's tab before its first step.
    pub fn with_session(mut self, session: SessionSnapshot) -> Self {
        self.session = Some(session);
        self
    }

    /// Load a session file saved by `uask-capture-session`.
    pub fn with_session_file(self, path: impl AsRef<Path>) -> Result<Self> {
        Ok(self.with_session(SessionSnapshot::load(path)?))
    }

    pub fn helpers(&self) -> &ChatHelpers {
        &self.helpers
    }

    /// Run every case and write the summary file.
    pub async fn run(&self, suite: &Suite) -> Result<SuiteResult> {
        info!("running suite '{}' ({} cases)", suite.name, suite.cases.len());
        let mut result = SuiteResult::new(&suite.name);

        for case in &suite.cases {
            let case_result = self.run_case(suite, case).await;
            match case_result.error {
                None => info!("PASS {} ({}ms)", case_result.name, case_result.duration_ms),
                Some(ref e) => warn!("FAIL {}: {}", case_result.name, e),
            }
            result.results.push(case_result);
        }

        info!(
            "suite '{}': {}/{} cases passed",
            suite.name,
            result.passed(),
            result.results.len()
        );
        result.write_summary(&self.settings.summary_path())?;
        Ok(result)
    }

    async fn run_case(&self, suite: &Suite, case: &Case) -> CaseResult {
        let start = Instant::now();
        let (retry, screenshot) = suite.failure_policy(&self.settings);

        let mut last = Attempt {
            steps_executed: 0,
            error: None,
            screenshot: None,
        };
        let mut retries = 0;

        for attempt in 1..=retry.attempts {
            if attempt > 1 {
                retries += 1;
                info!("retry attempt {}/{} for '{}'", attempt, retry.attempts, case.name);
                if retry.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(retry.delay_ms)).await;
                }
            }

            let capture = screenshot && attempt == retry.attempts;
            last = self.run_once(suite, case, attempt, capture).await;
            match last.error {
                None => break,
                Some(ref e) => warn!("'{}' attempt {} failed: {}", case.name, attempt, e),
            }
        }

        CaseResult {
            name: case.name.clone(),
            success: last.error.is_none(),
            error: last.error,
            steps_executed: last.steps_executed,
            duration_ms: start.elapsed().as_millis() as u64,
            retries,
            screenshot: last.screenshot,
        }
    }

    async fn run_once(&self, suite: &Suite, case: &Case, attempt: u32, capture: bool) -> Attempt {
        let page = match self.browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                return Attempt {
                    steps_executed: 0,
                    error: Some(crate::Error::from(e).to_string()),
                    screenshot: None,
                }
            }
        };
        let tab_id = page.target_id().to_string();
        let driver = self.profile.driver(page);

        let prepared = match self.session {
            Some(ref session) => restore_session(&driver, session, &suite.target.url).await,
            None => Ok(()),
        };
        let (steps_executed, error) = match prepared {
            Ok(()) => {
                let mut ctx = CaseContext::new(&driver, &self.helpers, &suite.target.url)
                    .with_screenshots(self.settings.screenshots_dir())
                    .with_similarity_threshold(self.settings.similarity_threshold);
                if let Some(ref data) = self.data {
                    ctx = ctx.with_test_data(data);
                }
                execute_case(&mut ctx, case).await
            }
            Err(e) => (0, Some(e.to_string())),
        };

        let mut screenshot = None;
        if capture && error.is_some() {
            match report::save_failure_screenshot(
                &driver,
                &self.settings.screenshots_dir(),
                &case.name,
                error.as_deref(),
                attempt,
            )
            .await
            {
                Ok(path) => screenshot = Some(path),
                Err(e) => warn!("failed to save failure screenshot: {}", e),
            }
        }

        if let Err(e) = driver.clear_storage().await {
            debug!("could not clear storage: {}", e);
        }
        if let Err(e) = self.browser.close_tab(&tab_id).await {
            debug!("could not close tab {}: {}", tab_id, e);
        }

        Attempt {
            steps_executed,
            error,
            screenshot,
        }
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

/// Land on the target origin, then replay cookies and localStorage.
async fn restore_session<D: PageDriver + ?Sized>(
    driver: &D,
    session: &SessionSnapshot,
    url: &str,
) -> Result<()> {
    driver.goto(url).await?;
    session.restore(driver).await?;
    Ok(())
}

/// Execute `case` step by step, stopping at the first failure. Returns the
/// number of steps that completed and the failure, if any.
async fn execute_case<D: PageDriver + ?Sized>(
    ctx: &mut CaseContext<'_, D>,
    case: &Case,
) -> (usize, Option<String>) {
    for (i, step) in case.steps.iter().enumerate() {
        debug!("'{}' step {}: {}", case.name, i + 1, step.name());
        if let Err(e) = ctx.execute(step).await {
            return (i, Some(e.to_string()));
        }
    }
    (case.steps.len(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uask_agent::testing::{FakeElement, FakePage};
    use uask_agent::{SelectorSet, SessionCookie, Timings};

    const URL: &str = "https://ask.u.ae/en/";

    fn case(yaml_steps: &str) -> Case {
        let suite = Suite::parse(&format!(
            "name: t\ntarget: {{url: '{}'}}\ncases:\n  - name: c\n    steps:\n{}",
            URL, yaml_steps
        ))
        .unwrap();
        suite.cases.into_iter().next().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn execute_case_counts_completed_steps() {
        let page = FakePage::new();
        let helpers = ChatHelpers::new(SelectorSet::default(), Timings::instant());
        let mut ctx = CaseContext::new(&page, &helpers, URL);

        let c = case("      - log: {message: start}\n      - wait: {ms: 10}\n      - find_elements: {require: [input]}\n      - log: {message: never}");
        let (done, error) = execute_case(&mut ctx, &c).await;
        assert_eq!(done, 2);
        assert_eq!(error.as_deref(), Some("assertion failed: chat input not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_case_all_steps() {
        let page = FakePage::new();
        page.add("textarea[placeholder*='ask' i]", FakeElement::visible());
        let helpers = ChatHelpers::new(SelectorSet::default(), Timings::instant());
        let mut ctx = CaseContext::new(&page, &helpers, URL);

        let c = case("      - setup\n      - find_elements: {require: [input]}");
        assert_eq!(execute_case(&mut ctx, &c).await, (2, None));
    }

    #[tokio::test]
    async fn session_restore_visits_target_first() {
        let page = FakePage::new();
        let session = SessionSnapshot {
            cookies: vec![SessionCookie::new("sid", "abc").domain(".u.ae")],
            local_storage: vec![("seen_disclaimer".into(), "1".into())],
            url: Some(URL.into()),
        };
        restore_session(&page, &session, URL).await.unwrap();
        assert_eq!(page.with(|s| s.gotos.clone()), vec![URL.to_string()]);
        assert_eq!(page.cookie_names(), vec!["sid".to_string()]);
        assert_eq!(page.reloads(), 1);
    }
}
