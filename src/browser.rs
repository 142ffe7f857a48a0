//! Chromium-backed [`PageDriver`] over CDP.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
    FulfillRequestParams, HeaderEntry, RequestId, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::layout::Point;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;

use crate::config::HarnessConfig;
use crate::driver::{BrowserLauncher, ConsoleEntry, ElementState, PageDriver};
use crate::error::HarnessError;
use crate::locator::Locator;
use crate::mock::{Decision, Interceptor, MockResponse, RequestDescriptor};

const PROBE_JS: &str = include_str!("browser/probe.js");

/// Launches one Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    executable: Option<PathBuf>,
    window: (u32, u32),
}

impl ChromiumLauncher {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            headless: config.headless,
            executable: config.chrome_executable.clone(),
            window: (config.window_width, config.window_height),
        }
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    pub fn browser_config(&self) -> Result<BrowserConfig, HarnessError> {
        let mut builder = BrowserConfig::builder().window_size(self.window.0, self.window.1);
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| HarnessError::Driver(format!("Failed to build browser config: {}", e)))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>, HarnessError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarnessError::Driver(format!("Failed to launch chromium: {}", e)))?;

        // The CDP connection stalls unless the handler is polled.
        let handler_task = task::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(HarnessError::Driver(format!(
                    "Failed to create initial page: {}",
                    e
                )));
            }
        };

        let driver = ChromiumPage {
            browser: tokio::sync::Mutex::new(Some(browser)),
            page,
            tasks: Mutex::new(vec![handler_task]),
            console: Arc::new(Mutex::new(Vec::new())),
        };
        if let Err(e) = driver.capture_console().await {
            let _ = driver.close().await;
            return Err(e);
        }
        Ok(Box::new(driver))
    }
}

pub struct ChromiumPage {
    browser: tokio::sync::Mutex<Option<Browser>>,
    page: Page,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    console: Arc<Mutex<Vec<ConsoleEntry>>>,
}

#[derive(Debug, Deserialize)]
struct Center {
    x: f64,
    y: f64,
}

impl ChromiumPage {
    async fn capture_console(&self) -> Result<(), HarnessError> {
        let mut calls = self.page.event_listener::<EventConsoleApiCalled>().await?;
        let mut exceptions = self.page.event_listener::<EventExceptionThrown>().await?;

        let sink = self.console.clone();
        let console_task = task::spawn(async move {
            while let Some(event) = calls.next().await {
                let level = format!("{:?}", event.r#type).to_lowercase();
                let text = event
                    .args
                    .iter()
                    .map(render_remote_object)
                    .collect::<Vec<_>>()
                    .join(" ");
                sink.lock().push(ConsoleEntry::new(level, text));
            }
        });

        let sink = self.console.clone();
        let exception_task = task::spawn(async move {
            while let Some(event) = exceptions.next().await {
                let details = &event.exception_details;
                let text = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                sink.lock().push(ConsoleEntry::new("exception", text));
            }
        });

        self.tasks.lock().extend([console_task, exception_task]);
        Ok(())
    }

    async fn probe<T: DeserializeOwned>(
        &self,
        locator: &Locator,
        op: &str,
        arg: Option<&str>,
    ) -> Result<T, HarnessError> {
        let script = format!(
            "({})({}, {}, {})",
            PROBE_JS,
            locator.to_json(),
            serde_json::to_string(op)?,
            serde_json::to_string(&arg)?
        );
        let raw: String = self
            .page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|e| HarnessError::Driver(format!("Probe returned an unexpected value: {}", e)))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn center_of(&self, locator: &Locator) -> Result<Point, HarnessError> {
        let center: Option<Center> = self.probe(locator, "point", None).await?;
        center
            .map(|c| Point { x: c.x, y: c.y })
            .ok_or_else(|| HarnessError::Driver(format!("No element for {}", locator)))
    }

    async fn expect_applied(
        &self,
        locator: &Locator,
        op: &str,
        arg: Option<&str>,
    ) -> Result<(), HarnessError> {
        if self.probe::<bool>(locator, op, arg).await? {
            Ok(())
        } else {
            Err(HarnessError::Driver(format!("No element for {} ({})", locator, op)))
        }
    }

    async fn dispatch_key(&self, key: &str) -> Result<(), HarnessError> {
        let def = key_definition(key)?;
        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(def.key.clone())
            .code(def.code.clone())
            .windows_virtual_key_code(def.key_code)
            .native_virtual_key_code(def.key_code);
        if let Some(text) = &def.text {
            down = down.text(text.clone());
        }
        let down = down.build().map_err(HarnessError::Driver)?;
        self.page.execute(down).await?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(def.key)
            .code(def.code)
            .windows_virtual_key_code(def.key_code)
            .native_virtual_key_code(def.key_code)
            .build()
            .map_err(HarnessError::Driver)?;
        self.page.execute(up).await?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn add_init_script(&self, source: &str) -> Result<(), HarnessError> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await?;
        Ok(())
    }

    async fn intercept(&self, interceptor: Arc<Interceptor>) -> Result<(), HarnessError> {
        let mut paused = self.page.event_listener::<EventRequestPaused>().await?;
        let page = self.page.clone();
        let rules = interceptor.clone();
        let fetch_task = task::spawn(async move {
            while let Some(event) = paused.next().await {
                let request = RequestDescriptor::new(
                    event.request.method.clone(),
                    event.request.url.clone(),
                );
                let id = event.request_id.clone();
                let handled = match rules.resolve(&request) {
                    Decision::Fulfill { response, .. } => fulfill(&page, id, &response).await,
                    Decision::PassThrough => page
                        .execute(ContinueRequestParams::new(id))
                        .await
                        .map(|_| ())
                        .map_err(HarnessError::from),
                    Decision::Reject => page
                        .execute(FailRequestParams::new(id, ErrorReason::BlockedByClient))
                        .await
                        .map(|_| ())
                        .map_err(HarnessError::from),
                };
                if let Err(e) = handled {
                    tracing::warn!("Could not answer {} {}: {}", request.method, request.url, e);
                }
            }
        });
        self.tasks.lock().push(fetch_task);

        let url_pattern = interceptor
            .scope()
            .map(|prefix| format!("*{}*", prefix))
            .unwrap_or_else(|| "*".to_string());
        let enable = EnableParams::builder()
            .pattern(
                RequestPattern::builder()
                    .url_pattern(url_pattern)
                    .request_stage(RequestStage::Request)
                    .build(),
            )
            .build();
        self.page.execute(enable).await?;
        Ok(())
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), HarnessError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HarnessError::NavigationFailure {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(HarnessError::NavigationFailure {
                url: url.to_string(),
                reason: format!("page did not load within {}ms", timeout.as_millis()),
            }),
        }
    }

    async fn element_state(&self, locator: &Locator) -> Result<ElementState, HarnessError> {
        self.probe(locator, "state", None).await
    }

    async fn click(&self, locator: &Locator) -> Result<(), HarnessError> {
        let point = self.center_of(locator).await?;
        self.page.click(point).await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), HarnessError> {
        self.expect_applied(locator, "fill", Some(value)).await
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), HarnessError> {
        self.expect_applied(locator, "focus", None).await?;
        self.page.execute(InsertTextParams::new(text)).await?;
        Ok(())
    }

    async fn press(&self, locator: Option<&Locator>, key: &str) -> Result<(), HarnessError> {
        if let Some(locator) = locator {
            self.expect_applied(locator, "focus", None).await?;
        }
        self.dispatch_key(key).await
    }

    async fn blur(&self, locator: &Locator) -> Result<(), HarnessError> {
        self.expect_applied(locator, "blur", None).await
    }

    async fn hover(&self, locator: &Locator) -> Result<(), HarnessError> {
        let point = self.center_of(locator).await?;
        self.page.move_mouse(point).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, HarnessError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn console_log(&self) -> Vec<ConsoleEntry> {
        self.console.lock().clone()
    }

    async fn close(&self) -> Result<(), HarnessError> {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();

        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("Page close failed: {}", e);
        }
        let result = match self.browser.lock().await.take() {
            Some(mut browser) => {
                let closed = browser.close().await.map(|_| ());
                if let Err(e) = browser.wait().await {
                    tracing::debug!("Waiting for chromium to exit failed: {}", e);
                }
                closed.map_err(HarnessError::from)
            }
            None => Ok(()),
        };

        for handle in tasks {
            handle.abort();
        }
        result
    }
}

async fn fulfill(page: &Page, id: RequestId, response: &MockResponse) -> Result<(), HarnessError> {
    let headers: Vec<HeaderEntry> = response
        .effective_headers()
        .into_iter()
        .map(|(name, value)| HeaderEntry::new(name, value))
        .collect();
    let params = FulfillRequestParams::builder()
        .request_id(id)
        .response_code(i64::from(response.status))
        .response_headers(headers)
        .body(BASE64.encode(response.body_bytes()))
        .build()
        .map_err(HarnessError::Driver)?;
    page.execute(params).await?;
    Ok(())
}

fn render_remote_object(arg: &RemoteObject) -> String {
    match &arg.value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => arg.description.clone().unwrap_or_default(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyDefinition {
    key: String,
    code: String,
    key_code: i64,
    text: Option<String>,
}

fn key_definition(key: &str) -> Result<KeyDefinition, HarnessError> {
    let named = |key: &str, code: &str, key_code: i64, text: Option<&str>| KeyDefinition {
        key: key.to_string(),
        code: code.to_string(),
        key_code,
        text: text.map(str::to_string),
    };
    let def = match key {
        "Enter" => named("Enter", "Enter", 13, Some("\r")),
        "Tab" => named("Tab", "Tab", 9, None),
        "Escape" => named("Escape", "Escape", 27, None),
        "Backspace" => named("Backspace", "Backspace", 8, None),
        "Delete" => named("Delete", "Delete", 46, None),
        "ArrowUp" => named("ArrowUp", "ArrowUp", 38, None),
        "ArrowDown" => named("ArrowDown", "ArrowDown", 40, None),
        "ArrowLeft" => named("ArrowLeft", "ArrowLeft", 37, None),
        "ArrowRight" => named("ArrowRight", "ArrowRight", 39, None),
        "Space" | " " => named(" ", "Space", 32, Some(" ")),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => {
                    let upper = c.to_ascii_uppercase();
                    let code = if c.is_ascii_digit() {
                        format!("Digit{}", c)
                    } else {
                        format!("Key{}", upper)
                    };
                    KeyDefinition {
                        key: c.to_string(),
                        code,
                        key_code: upper as i64,
                        text: Some(c.to_string()),
                    }
                }
                _ => {
                    return Err(HarnessError::Driver(format!("Unsupported key '{}'", other)));
                }
            }
        }
    };
    Ok(def)
}
