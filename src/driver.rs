//! Seams between the harness and a concrete browser.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::HarnessError;
use crate::locator::Locator;
use crate::mock::Interceptor;

/// Observable state of the first element a locator resolves to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementState {
    pub count: usize,
    pub visible: bool,
    pub enabled: bool,
    pub tag: Option<String>,
    pub text: Option<String>,
    pub value: Option<String>,
    pub classes: Vec<String>,
}

impl ElementState {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> String {
        if self.count == 0 {
            return "no matching element".to_string();
        }
        let mut parts = vec![
            format!("{} match(es)", self.count),
            if self.visible { "visible" } else { "hidden" }.to_string(),
        ];
        if !self.enabled {
            parts.push("disabled".to_string());
        }
        if let Some(tag) = &self.tag {
            parts.push(format!("<{}>", tag));
        }
        if let Some(value) = &self.value {
            parts.push(format!("value={:?}", value));
        }
        if let Some(text) = &self.text {
            parts.push(format!("text={:?}", crate::utils::truncate_observed(text)));
        }
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConsoleEntry {
    pub fn new(level: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            text: text.into(),
            at: Utc::now(),
        }
    }
}

impl std::fmt::Display for ConsoleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {}", self.at.to_rfc3339(), self.level, self.text)
    }
}

/// One page inside an isolated browser context.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Register a script that runs before any page script on every new document.
    async fn add_init_script(&self, source: &str) -> Result<(), HarnessError>;
    async fn intercept(&self, interceptor: Arc<Interceptor>) -> Result<(), HarnessError>;
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), HarnessError>;
    async fn element_state(&self, locator: &Locator) -> Result<ElementState, HarnessError>;
    async fn click(&self, locator: &Locator) -> Result<(), HarnessError>;
    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), HarnessError>;
    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), HarnessError>;
    /// Press a key, focusing `locator` first when one is given.
    async fn press(&self, locator: Option<&Locator>, key: &str) -> Result<(), HarnessError>;
    async fn blur(&self, locator: &Locator) -> Result<(), HarnessError>;
    async fn hover(&self, locator: &Locator) -> Result<(), HarnessError>;
    async fn screenshot(&self) -> Result<Vec<u8>, HarnessError>;
    async fn console_log(&self) -> Vec<ConsoleEntry>;
    async fn close(&self) -> Result<(), HarnessError>;
}

/// Opens fresh, isolated pages.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>, HarnessError>;
}
