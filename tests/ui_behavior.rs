//! UI behavior against the live chat page.
//!
//! These tests require Chrome and network access to ask.u.ae.
//! Run with: cargo test --test ui_behavior -- --ignored

mod common;

use common::{chrome_available, settings};
use uask_qa::{ChatHelpers, ChatPage, Runner, Suite};

#[test]
fn test_suites_validate() {
    let settings = uask_qa::Settings::default();
    for file in ["ui_behavior", "mobile", "security", "responses"] {
        let path = format!("configs/{}.yaml", file);
        let suite = Suite::load_with_params(&path, &settings.params())
            .unwrap_or_else(|e| panic!("{}: {}", path, e));
        assert!(!suite.cases.is_empty(), "{} has no cases", path);
        assert!(suite.target.url.starts_with("https://ask.u.ae/en"));
    }
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_chat_widget_loads() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let profile = settings.launch_profile();
    let browser = profile.launch().await.expect("Failed to launch browser");
    let page = browser
        .new_page("about:blank")
        .await
        .expect("Failed to create page");
    let driver = profile.driver(page);

    let helpers = ChatHelpers::new(Default::default(), settings.timings());
    let setup = helpers
        .setup_page_reliably(&driver, &settings.chat_url())
        .await
        .expect("Failed to set up page");
    assert!(setup.url.contains("ask.u.ae"));

    let elements = helpers.find_chat_elements(&driver).await;
    if setup.page_ready() {
        assert!(elements.input_found(), "chat input not found");
    }

    let chat = ChatPage::new(&driver);
    let direction = chat.text_direction().await.expect("Failed to read direction");
    let expected = if settings.language.is_rtl() { "rtl" } else { "ltr" };
    assert_eq!(direction, expected);

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_ui_behavior_suite() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let suite = Suite::load_with_params("configs/ui_behavior.yaml", &settings.params())
        .expect("Failed to load suite");

    let runner = Runner::launch(&suite, &settings)
        .await
        .expect("Failed to launch runner");
    let result = runner.run(&suite).await.expect("Suite run failed");
    runner.close().await.expect("Failed to close browser");

    assert_eq!(result.results.len(), suite.cases.len());
    assert!(settings.summary_path().exists());
    for case in result.results.iter().filter(|c| !c.success) {
        eprintln!("{}: {:?}", case.name, case.error);
    }
}
