mod common;

use bookmarks_verify::bookmarks;
use bookmarks_verify::condition::Condition;
use bookmarks_verify::diagnostics::MemorySink;
use bookmarks_verify::error::FailureKind;
use bookmarks_verify::locator::Locator;
use bookmarks_verify::runner::{RunState, ScenarioRunner};
use bookmarks_verify::scenario::Scenario;
use bookmarks_verify::step::Step;
use common::{quick_config, FakeLauncher, Hang};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn never_visible() -> Step {
    Step::assert_visible(Locator::css("#does-not-exist")).labeled("wait for missing element")
}

#[tokio::test]
async fn test_first_failure_stops_the_scenario() {
    let launcher = FakeLauncher::new();
    let sink = Arc::new(MemorySink::new());
    let runner = ScenarioRunner::new(launcher.clone(), quick_config(), sink.clone());

    let scenario = Scenario::new("fail fast")
        .mocks(bookmarks::list_mocks())
        .step(never_visible().within(Duration::from_millis(200)))
        .step(Step::click(Locator::role("button", "Add bookmark")).labeled("open dialog"));

    let report = runner.run(&scenario).await;

    assert_eq!(report.state, RunState::Failed);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.step_index, Some(0));
    assert_eq!(failure.cause, FailureKind::TimedOut);
    assert!(failure.message.contains("wait for missing element"));
    assert_eq!(report.steps_completed, 0);
    assert_eq!(launcher.closes(), 1);
    assert_eq!(sink.failures().len(), 1);

    let app = launcher.app(0);
    let app = app.lock();
    assert!(!app.dialog_open);
    assert!(app.actions.iter().all(|a| !a.starts_with("click")));
}

#[tokio::test]
async fn test_navigation_failure_runs_no_steps() {
    let launcher = FakeLauncher::new();
    let sink = Arc::new(MemorySink::new());
    let runner = ScenarioRunner::new(launcher.clone(), quick_config(), sink.clone());

    let scenario = Scenario::new("unreachable")
        .target("http://unreachable.test/")
        .step(Step::click(Locator::role("button", "Add bookmark")));

    let report = runner.run(&scenario).await;

    assert_eq!(report.state, RunState::Failed);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.cause, FailureKind::NavigationFailure);
    assert_eq!(failure.step_index, None);
    assert!(failure.step_label.is_none());
    assert_eq!(report.steps_completed, 0);
    assert_eq!(launcher.closes(), 1);
    assert!(launcher.app(0).lock().actions.is_empty());
    assert_eq!(sink.failures()[0].cause, FailureKind::NavigationFailure);
}

#[tokio::test]
async fn test_cancellation_interrupts_wait_and_tears_down() {
    let launcher = FakeLauncher::new();
    let sink = Arc::new(MemorySink::new());
    let runner = ScenarioRunner::new(launcher.clone(), quick_config(), sink.clone());

    let scenario = Scenario::new("cancelled")
        .mocks(bookmarks::list_mocks())
        .step(never_visible().within(Duration::from_secs(60)));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = runner.run_with_cancel(&scenario, cancel).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failure.as_ref().unwrap().cause, FailureKind::Cancelled);
    assert!(report.diagnostics_captured);
    assert_eq!(launcher.closes(), 1);
}

#[tokio::test]
async fn test_scenario_time_limit_cancels_run() {
    let launcher = FakeLauncher::new();
    let sink = Arc::new(MemorySink::new());
    let mut config = quick_config();
    config.scenario_timeout_ms = Some(150);
    let runner = ScenarioRunner::new(launcher.clone(), config, sink);

    let scenario = Scenario::new("too slow")
        .mocks(bookmarks::list_mocks())
        .step(never_visible().within(Duration::from_secs(60)));

    let report = runner.run(&scenario).await;

    assert_eq!(report.failure.unwrap().cause, FailureKind::Cancelled);
    assert_eq!(launcher.closes(), 1);
}

#[tokio::test]
async fn test_hung_click_fails_the_step_without_a_scenario_limit() {
    let launcher = FakeLauncher::hanging(Hang::Click);
    let sink = Arc::new(MemorySink::new());
    let mut config = quick_config();
    config.scenario_timeout_ms = None;
    let runner = ScenarioRunner::new(launcher.clone(), config, sink.clone());

    let scenario = Scenario::new("wedged click")
        .mocks(bookmarks::list_mocks())
        .step(
            Step::click(Locator::role("button", "Add bookmark"))
                .labeled("open dialog")
                .within(Duration::from_millis(200)),
        );

    let started = Instant::now();
    let report = runner.run(&scenario).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.state, RunState::Failed);
    let failure = report.failure.unwrap();
    assert_eq!(failure.step_index, Some(0));
    assert_eq!(failure.step_label.as_deref(), Some("open dialog"));
    assert_eq!(failure.cause, FailureKind::TimedOut);
    assert!(failure.message.contains("clicking"), "{}", failure.message);
    assert_eq!(launcher.closes(), 1);
    assert_eq!(sink.failures().len(), 1);
}

#[tokio::test]
async fn test_time_limit_during_fixture_setup_still_closes_the_page() {
    let launcher = FakeLauncher::hanging(Hang::InitScript);
    let sink = Arc::new(MemorySink::new());
    let mut config = quick_config();
    config.scenario_timeout_ms = Some(100);
    let runner = ScenarioRunner::new(launcher.clone(), config, sink.clone());

    let started = Instant::now();
    let report = runner.run(&bookmarks::empty_state()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.transitions, vec![RunState::Idle, RunState::Failed]);
    assert_eq!(report.failure.unwrap().cause, FailureKind::Cancelled);
    assert_eq!(launcher.opened(), 1);
    assert_eq!(launcher.closes(), 1);
}

#[tokio::test]
async fn test_launch_failure_goes_straight_to_failed() {
    let launcher = FakeLauncher::refusing();
    let sink = Arc::new(MemorySink::new());
    let runner = ScenarioRunner::new(launcher.clone(), quick_config(), sink.clone());

    let report = runner.run(&bookmarks::empty_state()).await;

    assert_eq!(report.transitions, vec![RunState::Idle, RunState::Failed]);
    assert_eq!(report.failure.unwrap().cause, FailureKind::Driver);
    assert_eq!(launcher.closes(), 0);
    assert!(sink.failures()[0].screenshot.is_none());
}

#[tokio::test]
async fn test_run_all_keeps_sessions_apart() {
    let launcher = FakeLauncher::new();
    let sink = Arc::new(MemorySink::new());
    let mut config = quick_config();
    config.parallelism = 2;
    let runner = ScenarioRunner::new(launcher.clone(), config, sink.clone());

    let scenarios = vec![
        bookmarks::add_bookmark_with_autofill(),
        bookmarks::add_bookmark_without_metadata_mock(),
        bookmarks::empty_state(),
    ];
    let reports = runner.run_all(&scenarios, &CancellationToken::new()).await;

    let names: Vec<_> = reports.iter().map(|r| r.scenario.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "add bookmark with autofill",
            "add bookmark without metadata mock",
            "empty state"
        ]
    );
    assert!(reports[0].passed());
    assert_eq!(reports[1].state, RunState::Failed);
    assert!(reports[1].passed(), "strict scenario should fail where expected");
    assert!(reports[2].passed());
    assert_eq!(launcher.opened(), 3);
    assert_eq!(launcher.closes(), 3);
    assert_eq!(sink.failures().len(), 1);
}

#[tokio::test]
async fn test_scenario_file_runs_end_to_end() {
    let scenario = Scenario::from_toml_str(
        r#"
name = "from toml"
policy = "strict"

[[mocks]]
url = { contains = "/api/v1/" }
method = "GET"
response = { body = { json = [] } }

[[steps]]
label = "open dialog"
action = "click"
target = { by = "role", role = "button", name = "Add bookmark" }

[[steps.then]]
until = "visible"
target = { by = "role", role = "dialog" }

[[steps]]
label = "type a url"
action = "fill"
target = { by = "label", text = "URL" }
value = "https://example.com"

[[steps]]
label = "close with escape"
action = "press"
key = "Escape"
"#,
    )
    .unwrap();

    let launcher = FakeLauncher::new();
    let runner = ScenarioRunner::new(launcher.clone(), quick_config(), Arc::new(MemorySink::new()));
    let report = runner.run(&scenario).await;

    assert!(report.passed(), "{:?}", report.failure);
    assert_eq!(report.steps_completed, 3);
    let app = launcher.app(0);
    assert_eq!(app.lock().url, "https://example.com");
    assert!(!app.lock().dialog_open);
}

#[tokio::test]
async fn test_wait_for_step_reports_condition() {
    let launcher = FakeLauncher::new();
    let sink = Arc::new(MemorySink::new());
    let runner = ScenarioRunner::new(launcher, quick_config(), sink);

    let scenario = Scenario::new("heading text")
        .mocks(bookmarks::list_mocks())
        .step(
            Step::wait_for(Condition::text_contains(
                Locator::role("heading", "All Bookmarks"),
                "Favourites",
            ))
            .within(Duration::from_millis(100)),
        );

    let report = runner.run(&scenario).await;
    let failure = report.failure.unwrap();
    assert_eq!(failure.cause, FailureKind::TimedOut);
    assert!(failure.message.contains("Favourites"));
    assert!(failure.message.contains("All Bookmarks"));
}
