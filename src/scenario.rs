//! Scenario definitions, built in code or loaded from TOML/JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FailureKind, HarnessError};
use crate::mock::{MockEngine, MockPolicy, MockRule, DEFAULT_API_PREFIX};
use crate::session::Fixture;
use crate::step::Step;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Falls back to the configured base URL when absent.
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
    #[serde(default)]
    pub mocks: Vec<MockRule>,
    /// Falls back to the configured policy when absent.
    #[serde(default)]
    pub policy: Option<MockPolicy>,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Set on negative scenarios: the run passes only by failing here.
    #[serde(default)]
    pub expect_failure: Option<ExpectedFailure>,
    /// Keep the console transcript of passing runs too.
    #[serde(default)]
    pub capture_console: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedFailure {
    /// Label of the step that must fail.
    pub step: String,
    pub cause: FailureKind,
}

fn default_api_prefix() -> Option<String> {
    Some(DEFAULT_API_PREFIX.to_string())
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_url: None,
            fixtures: Vec::new(),
            mocks: Vec::new(),
            policy: None,
            api_prefix: default_api_prefix(),
            steps: Vec::new(),
            expect_failure: None,
            capture_console: false,
        }
    }

    pub fn target(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn fixture(mut self, fixture: Fixture) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn mock(mut self, rule: MockRule) -> Self {
        self.mocks.push(rule);
        self
    }

    pub fn mocks(mut self, rules: impl IntoIterator<Item = MockRule>) -> Self {
        self.mocks.extend(rules);
        self
    }

    pub fn policy(mut self, policy: MockPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn strict(self) -> Self {
        self.policy(MockPolicy::Strict)
    }

    pub fn api_prefix(mut self, prefix: Option<String>) -> Self {
        self.api_prefix = prefix;
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn expect_failure(mut self, step: impl Into<String>, cause: FailureKind) -> Self {
        self.expect_failure = Some(ExpectedFailure {
            step: step.into(),
            cause,
        });
        self
    }

    pub fn keep_console(mut self) -> Self {
        self.capture_console = true;
        self
    }

    /// A fresh engine holding this scenario's rules in declaration order.
    pub fn mock_engine(&self) -> MockEngine {
        let mut engine = MockEngine::new().with_scope(self.api_prefix.clone());
        for rule in &self.mocks {
            engine.register(rule.clone());
        }
        engine
    }

    pub fn from_toml_str(input: &str) -> Result<Self, HarnessError> {
        toml::from_str(input).map_err(|e| HarnessError::Config(format!("bad scenario: {}", e)))
    }

    pub fn from_json(input: &str) -> Result<Self, HarnessError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Load by extension: `.json` is JSON, anything else TOML.
    pub fn from_path(path: &Path) -> Result<Self, HarnessError> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&raw),
            _ => Self::from_toml_str(&raw),
        }
    }
}
