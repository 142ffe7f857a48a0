use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailure { url: String, reason: String },
    #[error("Timed out after {}ms waiting for {condition} (last observed: {last_observed})", waited.as_millis())]
    TimedOut {
        condition: String,
        waited: Duration,
        last_observed: String,
    },
    #[error("Step '{label}' failed: {condition}: {cause}")]
    StepFailure {
        label: String,
        condition: String,
        #[source]
        cause: Box<HarnessError>,
    },
    #[error("No mock rule matched {method} {url}")]
    MockMismatch { method: String, url: String },
    #[error("Cancelled while {0}")]
    Cancelled(String),
    #[error("Browser driver error: {0}")]
    Driver(String),
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Root-cause classification used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NavigationFailure,
    TimedOut,
    StepFailure,
    MockMismatch,
    Cancelled,
    Driver,
    Configuration,
}

impl HarnessError {
    pub fn step(label: impl Into<String>, condition: impl Into<String>, cause: HarnessError) -> Self {
        HarnessError::StepFailure {
            label: label.into(),
            condition: condition.into(),
            cause: Box::new(cause),
        }
    }

    /// Innermost error, looking through `StepFailure` wrappers.
    pub fn root_cause(&self) -> &HarnessError {
        match self {
            HarnessError::StepFailure { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self.root_cause() {
            HarnessError::NavigationFailure { .. } => FailureKind::NavigationFailure,
            HarnessError::TimedOut { .. } => FailureKind::TimedOut,
            HarnessError::StepFailure { .. } => FailureKind::StepFailure,
            HarnessError::MockMismatch { .. } => FailureKind::MockMismatch,
            HarnessError::Cancelled(_) => FailureKind::Cancelled,
            HarnessError::Driver(_) | HarnessError::Io(_) | HarnessError::Serialization(_) => {
                FailureKind::Driver
            }
            HarnessError::InvalidRule(_) | HarnessError::Config(_) => FailureKind::Configuration,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), HarnessError::Cancelled(_))
    }
}

impl From<chromiumoxide::error::CdpError> for HarnessError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        HarnessError::Driver(e.to_string())
    }
}
