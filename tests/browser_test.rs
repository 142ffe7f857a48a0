use bookmarks_verify::browser::ChromiumLauncher;
use bookmarks_verify::condition::Condition;
use bookmarks_verify::config::HarnessConfig;
use bookmarks_verify::driver::BrowserLauncher;
use bookmarks_verify::locator::Locator;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_launcher_builds_browser_config() {
    // Chromium is not launched here; CI images rarely ship it. Pointing at an
    // explicit executable skips auto-detection so the builder can be checked.
    let mut config = HarnessConfig::default();
    config.headless = false;
    config.chrome_executable = Some(PathBuf::from("/usr/bin/chromium"));

    let launcher = ChromiumLauncher::new(&config);
    assert!(!launcher.is_headless());

    let browser_config = launcher.browser_config();
    assert!(
        browser_config.is_ok(),
        "Browser config should build successfully"
    );
}

#[test]
fn test_headless_is_the_default() {
    let launcher = ChromiumLauncher::new(&HarnessConfig::default());
    assert!(launcher.is_headless());
}

const FIXTURE_PAGE: &str = "data:text/html,\
<h1>All Bookmarks</h1>\
<button>Add bookmark</button>\
<div role=\"dialog\"><label for=\"t\">Title</label><input id=\"t\" value=\"Mocked Title\">\
<textarea id=\"description\">Mocked Description</textarea></div>\
<textarea id=\"description-outside\"></textarea>";

#[tokio::test]
#[ignore = "needs a local Chromium"]
async fn test_locators_resolve_in_a_real_page() {
    let launcher = ChromiumLauncher::new(&HarnessConfig::default());
    let page = launcher.open_page().await.unwrap();
    page.goto(FIXTURE_PAGE, Duration::from_secs(10)).await.unwrap();

    let button = page
        .element_state(&Locator::role("button", "add bookmark"))
        .await
        .unwrap();
    assert_eq!(button.count, 1);
    assert!(button.visible);

    let title = page.element_state(&Locator::label("Title")).await.unwrap();
    assert_eq!(title.value.as_deref(), Some("Mocked Title"));

    let scoped = page
        .element_state(&Locator::css("textarea").within(Locator::any_role("dialog")))
        .await
        .unwrap();
    assert_eq!(scoped.count, 1);
    assert!(scoped.tag.unwrap().eq_ignore_ascii_case("textarea"));

    let missing = page
        .element_state(&Locator::role("button", "Save bookmark"))
        .await
        .unwrap();
    assert_eq!(missing.count, 0);
    let hidden = Condition::hidden(Locator::role("button", "Save bookmark"));
    assert!(hidden.evaluate(&missing).unwrap().satisfied);

    page.close().await.unwrap();
}
