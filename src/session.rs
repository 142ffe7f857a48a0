use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::driver::{BrowserLauncher, PageDriver};
use crate::error::HarnessError;
use crate::mock::Interceptor;
use crate::wait::guarded;

/// Per-session state applied before the application loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fixture {
    /// `<meta name="requesttoken">`, read by the app for CSRF-protected calls.
    RequestToken { token: String },
    LocalStorage { key: String, value: String },
    Script { source: String },
}

impl Fixture {
    pub fn request_token(token: impl Into<String>) -> Self {
        Fixture::RequestToken {
            token: token.into(),
        }
    }

    pub fn init_script(&self) -> String {
        match self {
            Fixture::RequestToken { token } => format!(
                r#"(() => {{
  const token = {token};
  const inject = () => {{
    if (document.querySelector('meta[name="requesttoken"]')) return;
    const meta = document.createElement('meta');
    meta.name = 'requesttoken';
    meta.content = token;
    (document.head || document.documentElement).appendChild(meta);
  }};
  if (document.documentElement) inject();
  else document.addEventListener('readystatechange', inject, {{ once: true }});
  document.addEventListener('DOMContentLoaded', () => {{
    inject();
    if (document.head) document.head.dataset.requesttoken = token;
  }}, {{ once: true }});
}})();"#,
                token = js_string(token)
            ),
            Fixture::LocalStorage { key, value } => format!(
                "(() => {{ try {{ window.localStorage.setItem({}, {}); }} catch (_) {{}} }})();",
                js_string(key),
                js_string(value)
            ),
            Fixture::Script { source } => source.clone(),
        }
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// One page owned exclusively by one scenario run.
pub struct Session {
    id: Uuid,
    page: Box<dyn PageDriver>,
    interceptor: OnceLock<Arc<Interceptor>>,
    navigated: AtomicBool,
    closed: AtomicBool,
}

impl Session {
    pub fn new(page: Box<dyn PageDriver>) -> Self {
        Self {
            id: Uuid::new_v4(),
            page,
            interceptor: OnceLock::new(),
            navigated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    pub fn interceptor(&self) -> Option<&Arc<Interceptor>> {
        self.interceptor.get()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) async fn attach_interceptor(
        &self,
        interceptor: Arc<Interceptor>,
    ) -> Result<(), HarnessError> {
        if self.is_closed() {
            return Err(HarnessError::Config(format!("session {} is closed", self.id)));
        }
        if self.navigated.load(Ordering::SeqCst) {
            return Err(HarnessError::Config(
                "mock rules must be installed before the first navigation".to_string(),
            ));
        }
        self.interceptor
            .set(interceptor.clone())
            .map_err(|_| HarnessError::Config("session already has mock rules installed".to_string()))?;
        self.page.intercept(interceptor).await
    }

    /// Surface the first strict-mode mismatch recorded on this session.
    pub fn mock_fault(&self) -> Result<(), HarnessError> {
        match self.interceptor().and_then(|i| i.first_mismatch()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), HarnessError> {
        if self.is_closed() {
            return Err(HarnessError::Config(format!("session {} is closed", self.id)));
        }
        self.navigated.store(true, Ordering::SeqCst);
        tracing::info!("Session {} navigating to {}", self.id, url);
        match self.page.goto(url, timeout).await {
            Ok(()) => Ok(()),
            Err(e @ HarnessError::NavigationFailure { .. }) => Err(e),
            Err(e @ HarnessError::Cancelled(_)) => Err(e),
            Err(e) => Err(HarnessError::NavigationFailure {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Close page and browser. Calling this again is a no-op.
    pub async fn destroy(&self) -> Result<(), HarnessError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("Tearing down session {}", self.id);
        self.page.close().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::warn!("Session {} dropped without destroy()", self.id);
        }
    }
}

pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { launcher }
    }

    /// Open a fresh page and apply `fixtures` before anything navigates.
    ///
    /// Once a page exists it is closed on every error path, including
    /// cancellation while fixtures are being applied.
    pub async fn create(
        &self,
        fixtures: &[Fixture],
        cancel: &CancellationToken,
    ) -> Result<Session, HarnessError> {
        let page = self.launcher.open_page().await?;
        let session = Session::new(page);
        if let Err(e) = self.prepare(&session, fixtures, cancel).await {
            if let Err(close) = session.destroy().await {
                tracing::warn!("Session {} teardown after failed setup: {}", session.id(), close);
            }
            return Err(e);
        }
        tracing::debug!(
            "Created session {} with {} fixture(s)",
            session.id(),
            fixtures.len()
        );
        Ok(session)
    }

    async fn prepare(
        &self,
        session: &Session,
        fixtures: &[Fixture],
        cancel: &CancellationToken,
    ) -> Result<(), HarnessError> {
        if cancel.is_cancelled() {
            return Err(HarnessError::Cancelled("creating a session".to_string()));
        }
        for fixture in fixtures {
            guarded(
                "applying fixtures",
                cancel,
                session.page().add_init_script(&fixture.init_script()),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn destroy(&self, session: &Session) -> Result<(), HarnessError> {
        session.destroy().await
    }
}
