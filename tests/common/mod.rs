//! In-memory stand-in for the bookmarks manager UI.
//!
//! Every API call the real app would make goes through the installed
//! interceptor, so mocks, strict mode and the request log behave as they do
//! against Chromium.

#![allow(dead_code)]

use async_trait::async_trait;
use bookmarks_verify::driver::{BrowserLauncher, ConsoleEntry, ElementState, PageDriver};
use bookmarks_verify::locator::{By, Locator};
use bookmarks_verify::mock::{Decision, Interceptor, RequestDescriptor};
use bookmarks_verify::HarnessError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];

#[derive(Debug, Default)]
pub struct AppState {
    pub origin: String,
    pub loaded: bool,
    pub has_token: bool,
    pub dialog_open: bool,
    pub url: String,
    pub title: String,
    pub description: String,
    pub image: String,
    pub tag_input: String,
    pub collections_hovered: bool,
    pub collection_form_open: bool,
    pub collection_name: String,
    pub tags: Vec<String>,
    pub saved: usize,
    pub actions: Vec<String>,
    pub console: Vec<ConsoleEntry>,
    pub interceptor: Option<Arc<Interceptor>>,
}

impl AppState {
    fn api(&mut self, method: &str, path: &str) -> Option<serde_json::Value> {
        let url = format!("{}/apps/bookmarksmanager/api/v1/{}", self.origin, path);
        let request = RequestDescriptor::new(method, url.clone());
        let decision = match &self.interceptor {
            Some(interceptor) => interceptor.resolve(&request),
            None => Decision::PassThrough,
        };
        match decision {
            Decision::Fulfill { response, .. } if response.status < 400 => {
                serde_json::from_slice(&response.body_bytes()).ok()
            }
            Decision::Fulfill { response, .. } => {
                self.log_error(format!("{} {} returned {}", method, url, response.status));
                None
            }
            // Nothing is listening behind the fake.
            Decision::PassThrough => {
                self.log_error(format!("{} {} net::ERR_CONNECTION_REFUSED", method, url));
                None
            }
            Decision::Reject => {
                self.log_error(format!("{} {} net::ERR_BLOCKED_BY_CLIENT", method, url));
                None
            }
        }
    }

    fn log_error(&mut self, text: String) {
        self.console.push(ConsoleEntry::new("error", text));
    }

    fn load(&mut self) {
        self.loaded = true;
        self.dialog_open = false;
        for path in ["bookmarks", "tags", "collections"] {
            if self.api("GET", path).is_none() {
                self.console
                    .push(ConsoleEntry::new("error", format!("Failed to load {}", path)));
            }
        }
    }

    fn fetch_page_info(&mut self) {
        let path = format!("page-info?url={}", self.url);
        match self.api("GET", &path) {
            Some(info) => {
                self.title = info["title"].as_str().unwrap_or_default().to_string();
                self.description = info["description"].as_str().unwrap_or_default().to_string();
                self.image = info["image"].as_str().unwrap_or_default().to_string();
            }
            None => self
                .console
                .push(ConsoleEntry::new("error", "Failed to fetch page info")),
        }
    }

    fn save(&mut self) {
        if !self.has_token {
            self.console
                .push(ConsoleEntry::new("error", "CSRF check failed: missing requesttoken"));
            return;
        }
        match self.api("POST", "bookmarks") {
            Some(body) if body.get("id").is_some() => {
                self.saved += 1;
                self.dialog_open = false;
                self.url.clear();
                self.title.clear();
                self.description.clear();
                self.image.clear();
                self.tags.clear();
            }
            _ => self
                .console
                .push(ConsoleEntry::new("error", "Could not save bookmark")),
        }
    }

    fn pending_tag(&self) -> Option<String> {
        let tag = self.tag_input.trim();
        (!tag.is_empty() && !self.tags.iter().any(|t| t == tag)).then(|| tag.to_string())
    }

    fn remove_button_for(&self, name: &str) -> Option<&String> {
        self.tags
            .iter()
            .find(|t| name.eq_ignore_ascii_case(&format!("Remove {}", t)))
    }

    fn element(&self, locator: &Locator) -> ElementState {
        if let Some(parent) = &locator.within {
            let scope = self.element(parent);
            if scope.count == 0 || !scope.visible {
                return ElementState::missing();
            }
        }
        if !self.loaded {
            return ElementState::missing();
        }

        let shown = |visible: bool, tag: &str, text: &str, value: Option<&str>| ElementState {
            count: 1,
            visible,
            enabled: true,
            tag: Some(tag.to_string()),
            text: Some(text.to_string()),
            value: value.map(str::to_string),
            classes: Vec::new(),
        };
        let eq = |a: &str, b: &str| a.eq_ignore_ascii_case(b);
        let has = |hay: &str, needle: &str| hay.to_lowercase().contains(&needle.to_lowercase());

        match &locator.by {
            By::Role { role, name } if role == "button" => match name.as_deref() {
                Some(n) if has("Add bookmark", n) => shown(true, "button", "Add bookmark", None),
                Some(n) if has("Save bookmark", n) && self.dialog_open => {
                    shown(true, "button", "Save bookmark", None)
                }
                Some(n) if self.dialog_open && self.remove_button_for(n).is_some() => {
                    shown(true, "button", "", None)
                }
                _ => ElementState::missing(),
            },
            By::Role { role, name } if role == "dialog" => {
                let named = name.as_deref().map_or(true, |n| has("Add a new bookmark", n));
                if self.dialog_open && named {
                    shown(true, "div", "Add a new bookmark", None)
                } else {
                    ElementState::missing()
                }
            }
            By::Role { role, name } if role == "heading" => match name.as_deref() {
                Some(n) if has("All Bookmarks", n) => shown(true, "h1", "All Bookmarks", None),
                Some(n) if eq("Collections", n) => shown(true, "h3", "Collections", None),
                Some(n) if eq("Tags", n) => shown(true, "h3", "Tags", None),
                _ => ElementState::missing(),
            },
            By::Css { selector } if selector == "h1" => shown(true, "h1", "All Bookmarks", None),
            By::Css { selector } if selector == "main" => shown(true, "main", "", None),
            By::Css { selector } if self.dialog_open => match selector.as_str() {
                "#url" => shown(true, "input", "", Some(&self.url)),
                "#title" => shown(true, "input", "", Some(&self.title)),
                "#description" => shown(true, "textarea", "", Some(&self.description)),
                _ => ElementState::missing(),
            },
            By::Label { text } if self.dialog_open => {
                if eq(text, "URL") {
                    shown(true, "input", "", Some(&self.url))
                } else if eq(text, "Title") {
                    shown(true, "input", "", Some(&self.title))
                } else {
                    ElementState::missing()
                }
            }
            By::Placeholder { text } if self.dialog_open && has("Select tags...", text) => {
                shown(true, "input", "", Some(&self.tag_input))
            }
            By::Placeholder { text }
                if self.collection_form_open && has("New collection name", text) =>
            {
                shown(true, "input", "", Some(&self.collection_name))
            }
            By::AltText { text }
                if self.dialog_open && !self.image.is_empty() && eq("Preview", text) =>
            {
                shown(true, "img", "", None)
            }
            By::Title { text } if self.collections_hovered && eq("Create a collection", text) => {
                shown(true, "button", "", None)
            }
            By::Text { text, exact } => {
                if has("Welcome to your Bookmark Manager", text) && !self.dialog_open {
                    return shown(true, "h2", "Welcome to your Bookmark Manager", None);
                }
                if !self.dialog_open {
                    return ElementState::missing();
                }
                if let Some(pending) = self.pending_tag() {
                    let option = format!("Create \"{}\"", pending);
                    if (*exact && option == *text) || (!*exact && has(&option, text)) {
                        return shown(true, "div", &option, None);
                    }
                }
                match self.tags.iter().find(|t| if *exact { t == &text } else { has(t, text) }) {
                    Some(tag) => ElementState {
                        classes: vec!["badge".to_string(), "bg-primary".to_string()],
                        ..shown(true, "span", tag, None)
                    },
                    None => ElementState::missing(),
                }
            }
            _ => ElementState::missing(),
        }
    }
}

/// Driver calls that never return, standing in for a wedged renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hang {
    InitScript,
    Click,
}

pub struct FakePage {
    app: Arc<Mutex<AppState>>,
    closes: Arc<AtomicUsize>,
    hang: Option<Hang>,
}

impl FakePage {
    async fn maybe_hang(&self, at: Hang) {
        if self.hang == Some(at) {
            std::future::pending::<()>().await;
        }
    }

    fn require(&self, locator: &Locator) -> Result<(), HarnessError> {
        let state = self.app.lock().element(locator);
        if state.count == 0 || !state.visible {
            return Err(HarnessError::Driver(format!("No element for {}", locator)));
        }
        Ok(())
    }

    fn record(&self, action: String) {
        self.app.lock().actions.push(action);
    }
}

fn is_field(locator: &Locator, selector: &str, label: &str) -> bool {
    match &locator.by {
        By::Css { selector: s } => s == selector,
        By::Label { text } => text.eq_ignore_ascii_case(label),
        _ => false,
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn add_init_script(&self, source: &str) -> Result<(), HarnessError> {
        self.maybe_hang(Hang::InitScript).await;
        if source.contains("requesttoken") {
            self.app.lock().has_token = true;
        }
        Ok(())
    }

    async fn intercept(&self, interceptor: Arc<Interceptor>) -> Result<(), HarnessError> {
        self.app.lock().interceptor = Some(interceptor);
        Ok(())
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), HarnessError> {
        let parsed = url::Url::parse(url).map_err(|e| HarnessError::Driver(e.to_string()))?;
        if parsed.host_str() == Some("unreachable.test") {
            return Err(HarnessError::Driver("net::ERR_NAME_NOT_RESOLVED".to_string()));
        }
        self.record(format!("goto {}", url));
        let mut app = self.app.lock();
        app.origin = parsed.origin().ascii_serialization();
        app.load();
        Ok(())
    }

    async fn element_state(&self, locator: &Locator) -> Result<ElementState, HarnessError> {
        Ok(self.app.lock().element(locator))
    }

    async fn click(&self, locator: &Locator) -> Result<(), HarnessError> {
        self.maybe_hang(Hang::Click).await;
        self.require(locator)?;
        self.record(format!("click {}", locator));
        let mut app = self.app.lock();
        match &locator.by {
            By::Role { name: Some(name), .. } if name.eq_ignore_ascii_case("Add bookmark") => {
                app.dialog_open = true;
            }
            By::Role { name: Some(name), .. } if name.eq_ignore_ascii_case("Save bookmark") => {
                app.save();
            }
            By::Role { name: Some(name), .. } => {
                if let Some(tag) = app.remove_button_for(name).cloned() {
                    app.tags.retain(|t| *t != tag);
                }
            }
            By::Title { text } if text.eq_ignore_ascii_case("Create a collection") => {
                app.collection_form_open = true;
            }
            By::Text { .. } => {
                if let Some(tag) = app.pending_tag() {
                    app.tags.push(tag);
                    app.tag_input.clear();
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), HarnessError> {
        self.require(locator)?;
        self.record(format!("fill {}", locator));
        let mut app = self.app.lock();
        if is_field(locator, "#url", "URL") {
            app.url = value.to_string();
        } else if is_field(locator, "#title", "Title") {
            app.title = value.to_string();
        } else if let By::Placeholder { text } = &locator.by {
            if text.eq_ignore_ascii_case("New collection name") {
                app.collection_name = value.to_string();
            } else {
                app.tag_input = value.to_string();
            }
        }
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), HarnessError> {
        self.require(locator)?;
        let mut app = self.app.lock();
        if is_field(locator, "#url", "URL") {
            app.url.push_str(text);
        }
        Ok(())
    }

    async fn press(&self, locator: Option<&Locator>, key: &str) -> Result<(), HarnessError> {
        self.record(format!("press {}", key));
        let mut app = self.app.lock();
        match key {
            "Escape" => {
                app.dialog_open = false;
                app.collection_form_open = false;
            }
            "Enter" if locator.map_or(false, |l| matches!(l.by, By::Placeholder { .. })) => {
                if let Some(tag) = app.pending_tag() {
                    app.tags.push(tag);
                    app.tag_input.clear();
                }
            }
            "Tab" if locator.map_or(false, |l| is_field(l, "#url", "URL")) => {
                app.fetch_page_info()
            }
            _ => {}
        }
        Ok(())
    }

    async fn blur(&self, locator: &Locator) -> Result<(), HarnessError> {
        self.require(locator)?;
        self.record(format!("blur {}", locator));
        if is_field(locator, "#url", "URL") {
            self.app.lock().fetch_page_info();
        }
        Ok(())
    }

    async fn hover(&self, locator: &Locator) -> Result<(), HarnessError> {
        self.require(locator)?;
        self.record(format!("hover {}", locator));
        if let By::Role { name: Some(name), .. } = &locator.by {
            if name.eq_ignore_ascii_case("Collections") {
                self.app.lock().collections_hovered = true;
            }
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, HarnessError> {
        Ok(PNG_MAGIC.to_vec())
    }

    async fn console_log(&self) -> Vec<ConsoleEntry> {
        self.app.lock().console.clone()
    }

    async fn close(&self) -> Result<(), HarnessError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one fresh fake app per session and counts opens and closes.
#[derive(Default)]
pub struct FakeLauncher {
    pub opened: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub apps: Mutex<Vec<Arc<Mutex<AppState>>>>,
    pub refuse: bool,
    pub hang: Option<Hang>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            refuse: true,
            ..Self::default()
        })
    }

    pub fn hanging(at: Hang) -> Arc<Self> {
        Arc::new(Self {
            hang: Some(at),
            ..Self::default()
        })
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn app(&self, idx: usize) -> Arc<Mutex<AppState>> {
        self.apps.lock()[idx].clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>, HarnessError> {
        if self.refuse {
            return Err(HarnessError::Driver("Failed to launch chromium".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let app = Arc::new(Mutex::new(AppState::default()));
        self.apps.lock().push(app.clone());
        Ok(Box::new(FakePage {
            app,
            closes: self.closes.clone(),
            hang: self.hang,
        }))
    }
}

/// Fast timeouts so failing scenarios finish quickly.
pub fn quick_config() -> bookmarks_verify::config::HarnessConfig {
    let mut config = bookmarks_verify::config::HarnessConfig::default();
    config.base_url = "http://localhost:5173/index.php/apps/bookmarksmanager/".to_string();
    config.step_timeout_ms = 500;
    config.poll_interval_ms = 20;
    config.diagnostics_timeout_ms = 500;
    config
}
