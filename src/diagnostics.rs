//! Failure bundles and the sinks that persist them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::driver::ConsoleEntry;
use crate::error::{FailureKind, HarnessError};
use crate::mock::Interception;
use crate::utils::slugify;

/// Everything captured at the point of the first failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub run_id: Uuid,
    pub scenario: String,
    pub step_index: Option<usize>,
    pub step_label: Option<String>,
    pub cause: FailureKind,
    pub message: String,
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    pub console: Vec<ConsoleEntry>,
    pub requests: Vec<Interception>,
    pub captured_at: DateTime<Utc>,
}

impl Diagnostic {
    pub fn console_transcript(&self) -> String {
        transcript(&self.console)
    }
}

pub fn transcript(entries: &[ConsoleEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append-only destination for diagnostics and named artifacts.
pub trait DiagnosticSink: Send + Sync {
    fn record_failure(&self, diagnostic: &Diagnostic) -> Result<(), HarnessError>;
    fn record_artifact(&self, scenario: &str, name: &str, png: &[u8]) -> Result<(), HarnessError>;
    /// Console output of a run that did not fail.
    fn record_console(&self, scenario: &str, entries: &[ConsoleEntry]) -> Result<(), HarnessError>;
}

/// Writes `<root>/<scenario>/<run-id>/{failure.json,screenshot.png,console.log,requests.json}`.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn failure_dir(&self, scenario: &str, run_id: Uuid) -> PathBuf {
        self.root.join(slugify(scenario)).join(run_id.to_string())
    }
}

impl DiagnosticSink for FsSink {
    fn record_failure(&self, diagnostic: &Diagnostic) -> Result<(), HarnessError> {
        let dir = self.failure_dir(&diagnostic.scenario, diagnostic.run_id);
        std::fs::create_dir_all(&dir)?;

        std::fs::write(
            dir.join("failure.json"),
            serde_json::to_string_pretty(diagnostic)?,
        )?;
        if let Some(png) = &diagnostic.screenshot {
            std::fs::write(dir.join("screenshot.png"), png)?;
        }
        std::fs::write(dir.join("console.log"), diagnostic.console_transcript())?;
        std::fs::write(
            dir.join("requests.json"),
            serde_json::to_string_pretty(&diagnostic.requests)?,
        )?;

        tracing::info!("Diagnostics for '{}' written to {}", diagnostic.scenario, dir.display());
        Ok(())
    }

    fn record_artifact(&self, scenario: &str, name: &str, png: &[u8]) -> Result<(), HarnessError> {
        let dir = self.root.join(slugify(scenario));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.png", slugify(name)));
        std::fs::write(&path, png)?;
        tracing::debug!("Artifact saved to {}", path.display());
        Ok(())
    }

    fn record_console(&self, scenario: &str, entries: &[ConsoleEntry]) -> Result<(), HarnessError> {
        let dir = self.root.join(slugify(scenario));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("console.log");
        std::fs::write(&path, transcript(entries))?;
        tracing::debug!("Console transcript saved to {}", path.display());
        Ok(())
    }
}

/// Keeps everything in memory; used by tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemorySink {
    failures: Mutex<Vec<Diagnostic>>,
    artifacts: Mutex<Vec<(String, String, Vec<u8>)>>,
    consoles: Mutex<Vec<(String, Vec<ConsoleEntry>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<Diagnostic> {
        self.failures.lock().clone()
    }

    pub fn artifact_names(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .iter()
            .map(|(scenario, name, _)| format!("{}/{}", scenario, name))
            .collect()
    }

    pub fn console_for(&self, scenario: &str) -> Option<Vec<ConsoleEntry>> {
        self.consoles
            .lock()
            .iter()
            .find(|(name, _)| name == scenario)
            .map(|(_, entries)| entries.clone())
    }
}

impl DiagnosticSink for MemorySink {
    fn record_failure(&self, diagnostic: &Diagnostic) -> Result<(), HarnessError> {
        self.failures.lock().push(diagnostic.clone());
        Ok(())
    }

    fn record_artifact(&self, scenario: &str, name: &str, png: &[u8]) -> Result<(), HarnessError> {
        self.artifacts
            .lock()
            .push((scenario.to_string(), name.to_string(), png.to_vec()));
        Ok(())
    }

    fn record_console(&self, scenario: &str, entries: &[ConsoleEntry]) -> Result<(), HarnessError> {
        self.consoles
            .lock()
            .push((scenario.to_string(), entries.to_vec()));
        Ok(())
    }
}
