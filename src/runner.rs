//! Scenario execution: `Idle -> Running -> {Completed, Failed}`.

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::driver::BrowserLauncher;
use crate::error::{FailureKind, HarnessError};
use crate::scenario::{ExpectedFailure, Scenario};
use crate::session::{Fixture, Session, SessionManager};
use crate::step::StepContext;
use crate::wait::bounded;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunState {
    /// `Idle -> Failed` covers a session that could not be created at all.
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Running)
                | (RunState::Idle, RunState::Failed)
                | (RunState::Running, RunState::Completed)
                | (RunState::Running, RunState::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

#[derive(Debug)]
struct RunTracker {
    state: RunState,
    history: Vec<RunState>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    fn advance(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            tracing::error!("Illegal run transition {:?} -> {:?}", self.state, next);
            return;
        }
        self.state = next;
        self.history.push(next);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub step_index: Option<usize>,
    pub step_label: Option<String>,
    pub cause: FailureKind,
    pub message: String,
}

impl FailureReport {
    pub fn is_expected(&self, expected: &ExpectedFailure) -> bool {
        self.cause == expected.cause && self.step_label.as_deref() == Some(expected.step.as_str())
    }
}

/// Machine-readable outcome of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub state: RunState,
    pub transitions: Vec<RunState>,
    pub steps_total: usize,
    pub steps_completed: usize,
    pub failure: Option<FailureReport>,
    pub diagnostics_captured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_failure: Option<ExpectedFailure>,
    pub elapsed_ms: u64,
}

impl ScenarioReport {
    /// Completed, or failed exactly where and how a negative scenario expects.
    pub fn passed(&self) -> bool {
        match (&self.expected_failure, &self.failure) {
            (None, None) => self.state == RunState::Completed,
            (Some(expected), Some(failure)) => failure.is_expected(expected),
            _ => false,
        }
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), HarnessError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn write_to_writer<W: Write>(&self, writer: &mut W) -> Result<(), HarnessError> {
        let payload = serde_json::to_string_pretty(self)?;
        writer.write_all(payload.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

type StepError = (Option<usize>, HarnessError);

pub struct ScenarioRunner {
    sessions: SessionManager,
    config: HarnessConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl ScenarioRunner {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        config: HarnessConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            sessions: SessionManager::new(launcher),
            config,
            sink,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        self.run_with_cancel(scenario, CancellationToken::new()).await
    }

    /// Run several scenarios, each on its own session, at most
    /// `parallelism` at a time. Reports come back in input order.
    pub async fn run_all(
        &self,
        scenarios: &[Scenario],
        cancel: &CancellationToken,
    ) -> Vec<ScenarioReport> {
        let limit = self.config.parallelism.max(1);
        futures::stream::iter(
            scenarios
                .iter()
                .map(|scenario| self.run_with_cancel(scenario, cancel.clone())),
        )
        .buffered(limit)
        .collect()
        .await
    }

    /// Run one scenario. Cancelling `cancel` (or hitting the configured
    /// scenario timeout) interrupts the current step; diagnostics are still
    /// captured and the session is always torn down.
    pub async fn run_with_cancel(
        &self,
        scenario: &Scenario,
        cancel: CancellationToken,
    ) -> ScenarioReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut tracker = RunTracker::new();
        let token = cancel.child_token();

        let timer = self.config.scenario_timeout().map(|limit| {
            let token = token.clone();
            let name = scenario.name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::warn!("[{}] scenario time limit of {:?} reached", name, limit);
                token.cancel();
            })
        });

        tracing::info!(
            "[{}] starting run {} ({} steps)",
            scenario.name,
            run_id,
            scenario.steps.len()
        );

        let fixtures = self.fixtures_for(scenario);
        let created = self.sessions.create(&fixtures, &token).await;

        let mut steps_completed = 0;
        let (failure, diagnostics_captured) = match created {
            Err(e) => {
                tracker.advance(RunState::Failed);
                tracing::error!("[{}] could not create a session: {}", scenario.name, e);
                let diagnostic = self.diagnostic(scenario, run_id, None, &e);
                let captured = self.persist(&diagnostic);
                (Some(failure_report(scenario, None, &e)), captured)
            }
            Ok(session) => {
                tracker.advance(RunState::Running);
                let outcome = self
                    .drive(scenario, &session, &token, &mut steps_completed)
                    .await;

                let result = match outcome {
                    Ok(()) => {
                        tracker.advance(RunState::Completed);
                        if self.config.final_screenshot {
                            self.final_screenshot(scenario, &session).await;
                        }
                        if scenario.capture_console {
                            self.keep_console(scenario, &session).await;
                        }
                        (None, false)
                    }
                    Err((step_index, e)) => {
                        tracker.advance(RunState::Failed);
                        tracing::error!("[{}] {}", scenario.name, e);
                        let diagnostic = self.capture(scenario, run_id, &session, step_index, &e).await;
                        let captured = self.persist(&diagnostic);
                        (Some(failure_report(scenario, step_index, &e)), captured)
                    }
                };

                if let Err(e) = session.destroy().await {
                    tracing::warn!("[{}] teardown failed: {}", scenario.name, e);
                }
                result
            }
        };

        if let Some(timer) = timer {
            timer.abort();
        }

        let report = ScenarioReport {
            run_id,
            scenario: scenario.name.clone(),
            state: tracker.state,
            transitions: tracker.history,
            steps_total: scenario.steps.len(),
            steps_completed,
            failure,
            diagnostics_captured,
            expected_failure: scenario.expect_failure.clone(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        match &report.failure {
            Some(f) if report.passed() => tracing::info!(
                "[{}] failed as expected at step {} ({:?})",
                report.scenario,
                f.step_label.as_deref().unwrap_or("<setup>"),
                f.cause
            ),
            None if report.expected_failure.is_some() => tracing::error!(
                "[{}] completed but was expected to fail",
                report.scenario
            ),
            None => tracing::info!(
                "[{}] completed {} steps in {}ms",
                report.scenario,
                report.steps_completed,
                report.elapsed_ms
            ),
            Some(f) => tracing::error!(
                "[{}] FAILED at step {} ({:?}): {}",
                report.scenario,
                f.step_label.as_deref().unwrap_or("<setup>"),
                f.cause,
                f.message
            ),
        }
        report
    }

    async fn drive(
        &self,
        scenario: &Scenario,
        session: &Session,
        token: &CancellationToken,
        steps_completed: &mut usize,
    ) -> Result<(), StepError> {
        let target = self.target_url(scenario).map_err(|e| (None, e))?;
        let policy = scenario.policy.unwrap_or(self.config.mock_policy);

        bounded(
            "installing mock rules",
            self.config.wait_options().timeout,
            token,
            scenario.mock_engine().install(session, policy),
        )
        .await
        .map_err(|e| (None, e))?;

        bounded(
            "loading the target page",
            self.config.navigation_timeout(),
            token,
            session.navigate(target.as_str(), self.config.navigation_timeout()),
        )
        .await
        .map_err(|e| match e {
            HarnessError::TimedOut { .. } => (
                None,
                HarnessError::NavigationFailure {
                    url: target.to_string(),
                    reason: e.to_string(),
                },
            ),
            other => (None, other),
        })?;

        let ctx = StepContext {
            scenario: &scenario.name,
            session,
            base_url: &target,
            wait: self.config.wait_options(),
            navigation_timeout: self.config.navigation_timeout(),
            cancel: token,
            sink: self.sink.as_ref(),
        };

        for (idx, step) in scenario.steps.iter().enumerate() {
            step.execute(&ctx).await.map_err(|e| (Some(idx), e))?;
            *steps_completed += 1;
        }
        Ok(())
    }

    fn target_url(&self, scenario: &Scenario) -> Result<Url, HarnessError> {
        let raw = scenario
            .target_url
            .as_deref()
            .unwrap_or(self.config.base_url.as_str());
        Url::parse(raw).map_err(|e| HarnessError::Config(format!("target url '{}': {}", raw, e)))
    }

    fn fixtures_for(&self, scenario: &Scenario) -> Vec<Fixture> {
        let mut fixtures = scenario.fixtures.clone();
        let has_token = fixtures
            .iter()
            .any(|f| matches!(f, Fixture::RequestToken { .. }));
        if !has_token {
            if let Some(token) = &self.config.request_token {
                fixtures.insert(0, Fixture::request_token(token.clone()));
            }
        }
        fixtures
    }

    fn diagnostic(
        &self,
        scenario: &Scenario,
        run_id: Uuid,
        step_index: Option<usize>,
        error: &HarnessError,
    ) -> Diagnostic {
        Diagnostic {
            run_id,
            scenario: scenario.name.clone(),
            step_index,
            step_label: step_index
                .and_then(|i| scenario.steps.get(i))
                .map(|s| s.label.clone()),
            cause: error.kind(),
            message: error.to_string(),
            screenshot: None,
            console: Vec::new(),
            requests: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    /// Best-effort capture from a possibly wedged page, bounded in time.
    async fn capture(
        &self,
        scenario: &Scenario,
        run_id: Uuid,
        session: &Session,
        step_index: Option<usize>,
        error: &HarnessError,
    ) -> Diagnostic {
        let limit = self.config.diagnostics_timeout();
        let mut diagnostic = self.diagnostic(scenario, run_id, step_index, error);

        diagnostic.screenshot =
            match tokio::time::timeout(limit, session.page().screenshot()).await {
                Ok(Ok(bytes)) => Some(bytes),
                Ok(Err(e)) => {
                    tracing::warn!("[{}] failure screenshot unavailable: {}", scenario.name, e);
                    None
                }
                Err(_) => {
                    tracing::warn!("[{}] failure screenshot timed out", scenario.name);
                    None
                }
            };
        diagnostic.console = tokio::time::timeout(limit, session.page().console_log())
            .await
            .unwrap_or_default();
        diagnostic.requests = session
            .interceptor()
            .map(|i| i.interceptions())
            .unwrap_or_default();

        if !diagnostic.console.is_empty() {
            tracing::debug!(
                "[{}] console transcript:\n{}",
                scenario.name,
                crate::utils::truncate_transcript(&diagnostic.console_transcript())
            );
        }
        diagnostic
    }

    fn persist(&self, diagnostic: &Diagnostic) -> bool {
        match self.sink.record_failure(diagnostic) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[{}] could not persist diagnostics: {}", diagnostic.scenario, e);
                false
            }
        }
    }

    async fn keep_console(&self, scenario: &Scenario, session: &Session) {
        let limit = self.config.diagnostics_timeout();
        match tokio::time::timeout(limit, session.page().console_log()).await {
            Ok(entries) => {
                if let Err(e) = self.sink.record_console(&scenario.name, &entries) {
                    tracing::warn!("[{}] console transcript not saved: {}", scenario.name, e);
                }
            }
            Err(_) => tracing::warn!("[{}] console transcript timed out", scenario.name),
        }
    }

    async fn final_screenshot(&self, scenario: &Scenario, session: &Session) {
        let limit = self.config.diagnostics_timeout();
        match tokio::time::timeout(limit, session.page().screenshot()).await {
            Ok(Ok(bytes)) => {
                if let Err(e) = self.sink.record_artifact(&scenario.name, "final", &bytes) {
                    tracing::warn!("[{}] final screenshot not saved: {}", scenario.name, e);
                }
            }
            Ok(Err(e)) => tracing::warn!("[{}] final screenshot failed: {}", scenario.name, e),
            Err(_) => tracing::warn!("[{}] final screenshot timed out", scenario.name),
        }
    }
}

fn failure_report(
    scenario: &Scenario,
    step_index: Option<usize>,
    error: &HarnessError,
) -> FailureReport {
    FailureReport {
        step_index,
        step_label: step_index
            .and_then(|i| scenario.steps.get(i))
            .map(|s| s.label.clone()),
        cause: error.kind(),
        message: error.to_string(),
    }
}
