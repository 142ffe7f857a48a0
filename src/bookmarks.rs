//! Built-in scenarios for the bookmarks manager UI.

use serde_json::json;
use std::time::Duration;

use crate::condition::Condition;
use crate::error::FailureKind;
use crate::locator::Locator;
use crate::mock::{HttpMethod, MockRule, UrlPattern};
use crate::scenario::Scenario;
use crate::step::Step;

pub const EXAMPLE_URL: &str = "https://example.com";
pub const MOCKED_TITLE: &str = "Mocked Title";
pub const MOCKED_DESCRIPTION: &str = "Mocked Description";
pub const MOCKED_IMAGE: &str = "https://x/y.png";

const SLOW_UI: Duration = Duration::from_secs(10);

/// List endpoints the app calls on load, all answered with `[]`.
pub fn list_mocks() -> Vec<MockRule> {
    ["/api/v1/bookmarks", "/api/v1/tags", "/api/v1/collections"]
        .into_iter()
        .map(|path| MockRule::get(path, json!([])))
        .collect()
}

pub fn page_info_mock() -> MockRule {
    MockRule::get(
        "/api/v1/page-info",
        json!({
            "title": MOCKED_TITLE,
            "description": MOCKED_DESCRIPTION,
            "image": MOCKED_IMAGE,
        }),
    )
}

pub fn create_bookmark_mock() -> MockRule {
    MockRule::post("/api/v1/bookmarks", json!({ "id": 1 }))
}

/// Metadata lookup, bookmark creation and the list endpoints.
pub fn api_mocks() -> Vec<MockRule> {
    let mut rules = vec![page_info_mock(), create_bookmark_mock()];
    rules.extend(list_mocks());
    rules
}

pub fn add_dialog() -> Locator {
    Locator::role("dialog", "Add a new bookmark")
}

fn add_button() -> Locator {
    Locator::role("button", "Add bookmark")
}

fn url_field() -> Locator {
    Locator::css("#url").within(add_dialog())
}

fn title_field() -> Locator {
    Locator::css("#title").within(add_dialog())
}

fn description_field() -> Locator {
    Locator::css("#description").within(add_dialog())
}

fn tags_input() -> Locator {
    Locator::placeholder("Select tags...").within(add_dialog())
}

fn page_info_seen() -> Condition {
    Condition::request_seen(UrlPattern::contains("/api/v1/page-info"), HttpMethod::Get)
}

/// Open the dialog, enter a URL and blur so the app asks for metadata.
fn open_and_enter_url() -> Vec<Step> {
    vec![
        Step::navigate("./")
            .labeled("navigate to app root")
            .then(Condition::visible(add_button())),
        Step::click(add_button())
            .labeled("open Add Bookmark dialog")
            .then(Condition::visible(add_dialog())),
        Step::fill(url_field(), EXAMPLE_URL).labeled("fill URL field"),
        Step::blur(url_field())
            .labeled(BLUR_STEP)
            .then(page_info_seen()),
    ]
}

/// Title autofill plus the preview image rendered from the metadata.
fn autofill_checks() -> Vec<Step> {
    vec![
        Step::assert_value(title_field(), MOCKED_TITLE)
            .labeled("wait for title autofill")
            .within(SLOW_UI),
        Step::assert_visible(Locator::alt_text("Preview").within(add_dialog()))
            .labeled("preview image shown"),
    ]
}

fn save_and_close() -> Vec<Step> {
    vec![
        Step::click(Locator::role("button", "Save bookmark").within(add_dialog()))
            .labeled("click Save bookmark")
            .then(Condition::request_seen(
                UrlPattern::contains("/api/v1/bookmarks"),
                HttpMethod::Post,
            )),
        Step::assert_hidden(add_dialog())
            .labeled("wait for dialog to close")
            .within(SLOW_UI),
    ]
}

/// Metadata autofill then save, all against mocks.
pub fn add_bookmark_with_autofill() -> Scenario {
    let mut steps = open_and_enter_url();
    steps.extend(autofill_checks());
    steps.extend(save_and_close());

    Scenario::new("add bookmark with autofill")
        .mocks(api_mocks())
        .steps(steps)
}

pub const BLUR_STEP: &str = "blur to trigger fetch";

/// Same flow with the metadata mock left out under the strict policy. The
/// run passes only if it fails at the blur step with a mock mismatch.
pub fn add_bookmark_without_metadata_mock() -> Scenario {
    let mut steps = open_and_enter_url();
    steps.extend(autofill_checks());
    steps.extend(save_and_close());

    Scenario::new("add bookmark without metadata mock")
        .mocks([create_bookmark_mock()])
        .mocks(list_mocks())
        .strict()
        .expect_failure(BLUR_STEP, FailureKind::MockMismatch)
        .steps(steps)
}

/// Create a tag from the combobox inside the dialog, then save.
pub fn create_tag_in_dialog() -> Scenario {
    let tag = "new tag with spaces";
    let create_option = Locator::text(format!("Create \"{}\"", tag)).within(add_dialog());
    let badge = Locator::exact_text(tag).within(add_dialog());

    let mut steps = open_and_enter_url();
    steps.extend([
        Step::wait_for(Condition::tag_is(description_field(), "textarea"))
            .labeled("description is a textarea"),
        Step::wait_for(Condition::hidden(
            Locator::placeholder("Fetching title...").within(add_dialog()),
        ))
        .labeled("wait for metadata fetch to finish")
        .within(SLOW_UI),
        Step::wait_for(Condition::value_not_empty(title_field()))
            .labeled("title is pre-filled")
            .within(SLOW_UI),
        Step::wait_for(Condition::value_not_empty(description_field()))
            .labeled("description is pre-filled")
            .within(SLOW_UI),
        Step::fill(tags_input(), tag).labeled("type new tag"),
        Step::click(create_option).labeled("choose create option"),
        Step::assert_visible(badge.clone()).labeled("tag badge shown"),
        Step::wait_for(Condition::has_class(badge, "bg-primary")).labeled("tag badge styled"),
        Step::screenshot("tag-created"),
    ]);
    steps.extend(save_and_close());

    Scenario::new("create tag in dialog")
        .mocks(api_mocks())
        .steps(steps)
}

/// With no bookmarks the welcome view is shown.
pub fn empty_state() -> Scenario {
    Scenario::new("empty state")
        .mocks(list_mocks())
        .steps([
            Step::assert_visible(Locator::text("Welcome to your Bookmark Manager"))
                .labeled("welcome message shown")
                .within(SLOW_UI),
            Step::assert_visible(add_button()).labeled("add button in header"),
            Step::screenshot("empty-state"),
        ])
}

/// Pressing Escape dismisses the dialog without saving.
pub fn dialog_dismiss() -> Scenario {
    Scenario::new("dialog dismiss")
        .mocks(list_mocks())
        .strict()
        .steps([
            Step::click(add_button())
                .labeled("open Add Bookmark dialog")
                .then(Condition::visible(add_dialog())),
            Step::press_key("Escape").labeled("press Escape"),
            Step::assert_hidden(add_dialog()).labeled("dialog closed"),
        ])
}

/// The app shell renders its main heading; the console is kept either way.
pub fn app_loads() -> Scenario {
    Scenario::new("app loads")
        .mocks(list_mocks())
        .keep_console()
        .steps([
            Step::wait_for(Condition::text_equals(Locator::css("h1"), "All Bookmarks"))
                .labeled("main heading rendered")
                .within(SLOW_UI),
            Step::assert_visible(Locator::css("main")).labeled("main content shown"),
            Step::screenshot("app-loaded"),
        ])
}

/// Sidebar sections, the inline collection form, and tag badges that can be
/// removed again.
pub fn sidebar_collections() -> Scenario {
    let collections = Locator::role("heading", "Collections");
    let new_collection = Locator::placeholder("New collection name");
    let first = "Awesome Tag 1";
    let second = "Cool Tag 2";
    let badge = |tag: &str| Locator::exact_text(tag).within(add_dialog());

    Scenario::new("sidebar collections")
        .mocks(list_mocks())
        .strict()
        .steps([
            Step::assert_visible(collections.clone())
                .labeled("collections heading shown")
                .within(SLOW_UI),
            Step::assert_visible(Locator::role("heading", "Tags")).labeled("tags heading shown"),
            Step::hover(collections)
                .labeled("hover collections heading")
                .then(Condition::visible(Locator::title("Create a collection"))),
            Step::click(Locator::title("Create a collection"))
                .labeled("open collection form")
                .then(Condition::visible(new_collection.clone())),
            Step::fill(new_collection.clone(), "My New Collection").labeled("name the collection"),
            Step::press_key("Escape").labeled("dismiss collection form"),
            Step::assert_hidden(new_collection).labeled("collection form closed"),
            Step::click(add_button())
                .labeled("open Add Bookmark dialog")
                .then(Condition::visible(add_dialog())),
            Step::fill(tags_input(), first).labeled("type first tag"),
            Step::press(tags_input(), "Enter")
                .labeled("create first tag")
                .then(Condition::visible(badge(first))),
            Step::fill(tags_input(), second).labeled("type second tag"),
            Step::press(tags_input(), "Enter")
                .labeled("create second tag")
                .then(Condition::visible(badge(second))),
            Step::click(Locator::role("button", format!("Remove {}", first)).within(add_dialog()))
                .labeled("remove first tag")
                .then(Condition::hidden(badge(first))),
            Step::assert_visible(badge(second)).labeled("second tag kept"),
            Step::screenshot("sidebar-and-tags"),
        ])
}

pub fn builtin_names() -> &'static [&'static str] {
    &[
        "app-loads",
        "add-bookmark",
        "add-bookmark-strict",
        "create-tag",
        "empty-state",
        "dialog-dismiss",
        "sidebar-collections",
    ]
}

pub fn builtin(name: &str) -> Option<Scenario> {
    match name {
        "app-loads" => Some(app_loads()),
        "sidebar-collections" => Some(sidebar_collections()),
        "add-bookmark" => Some(add_bookmark_with_autofill()),
        "add-bookmark-strict" => Some(add_bookmark_without_metadata_mock()),
        "create-tag" => Some(create_tag_in_dialog()),
        "empty-state" => Some(empty_state()),
        "dialog-dismiss" => Some(dialog_dismiss()),
        _ => None,
    }
}
