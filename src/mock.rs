//! Declarative request mocking.
//!
//! Rules are plain data evaluated against a [`RequestDescriptor`]; the browser
//! driver only forwards paused requests and applies the returned [`Decision`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::HarnessError;
use crate::session::Session;

pub const DEFAULT_API_PREFIX: &str = "/api/v1/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Any,
}

impl HttpMethod {
    pub fn matches(&self, method: &str) -> bool {
        match self {
            HttpMethod::Any => true,
            other => other.as_str().eq_ignore_ascii_case(method),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Any => "ANY",
        }
    }
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Any
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum UrlPatternSpec {
    Contains(String),
    Regex(String),
}

/// Substring or regex match against the full request URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "UrlPatternSpec")]
pub enum UrlPattern {
    Contains(String),
    Regex(Regex),
}

impl UrlPattern {
    pub fn contains(fragment: impl Into<String>) -> Self {
        UrlPattern::Contains(fragment.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, HarnessError> {
        Regex::new(pattern)
            .map(UrlPattern::Regex)
            .map_err(|e| HarnessError::InvalidRule(format!("bad url regex '{}': {}", pattern, e)))
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Contains(fragment) => url.contains(fragment.as_str()),
            UrlPattern::Regex(re) => re.is_match(url),
        }
    }
}

impl TryFrom<UrlPatternSpec> for UrlPattern {
    type Error = HarnessError;

    fn try_from(spec: UrlPatternSpec) -> Result<Self, Self::Error> {
        match spec {
            UrlPatternSpec::Contains(s) => Ok(UrlPattern::Contains(s)),
            UrlPatternSpec::Regex(s) => UrlPattern::regex(&s),
        }
    }
}

impl std::fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlPattern::Contains(s) => write!(f, "*{}*", s),
            UrlPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockBody {
    Json(Value),
    Text(String),
    Empty,
}

impl Default for MockBody {
    fn default() -> Self {
        MockBody::Empty
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub body: MockBody,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

fn default_status() -> u16 {
    200
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: MockBody::Json(body),
            headers: Vec::new(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: MockBody::Text(body.into()),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.body {
            MockBody::Json(v) => v.to_string().into_bytes(),
            MockBody::Text(s) => s.clone().into_bytes(),
            MockBody::Empty => Vec::new(),
        }
    }

    /// Headers to send, adding a content type for bodies that lack one.
    pub fn effective_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        let has_content_type = headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            let content_type = match &self.body {
                MockBody::Json(_) => Some("application/json"),
                MockBody::Text(_) => Some("text/plain; charset=utf-8"),
                MockBody::Empty => None,
            };
            if let Some(ct) = content_type {
                headers.push(("Content-Type".to_string(), ct.to_string()));
            }
        }
        headers
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockRule {
    pub url: UrlPattern,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "MockRule::default_response")]
    pub response: MockResponse,
}

impl MockRule {
    pub fn new(url: UrlPattern, method: HttpMethod, response: MockResponse) -> Self {
        Self {
            url,
            method,
            response,
        }
    }

    pub fn get(url_fragment: &str, body: Value) -> Self {
        Self::new(
            UrlPattern::contains(url_fragment),
            HttpMethod::Get,
            MockResponse::json(200, body),
        )
    }

    pub fn post(url_fragment: &str, body: Value) -> Self {
        Self::new(
            UrlPattern::contains(url_fragment),
            HttpMethod::Post,
            MockResponse::json(200, body),
        )
    }

    fn default_response() -> MockResponse {
        MockResponse::json(200, Value::Null)
    }

    pub fn matches(&self, request: &RequestDescriptor) -> bool {
        self.method.matches(&request.method) && self.url.matches(&request.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockPolicy {
    /// Unmatched requests reach the real network.
    #[default]
    PassThrough,
    /// Unmatched requests are failed and recorded as mismatches.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Fulfill { rule: usize, response: MockResponse },
    PassThrough,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InterceptOutcome {
    Mocked { rule: usize },
    PassedThrough,
    OutOfScope,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interception {
    pub method: String,
    pub url: String,
    #[serde(flatten)]
    pub outcome: InterceptOutcome,
    pub at: DateTime<Utc>,
}

/// Rule set under construction. Consumed by [`MockEngine::install`].
#[derive(Debug, Clone)]
pub struct MockEngine {
    rules: Vec<MockRule>,
    scope: Option<String>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            scope: Some(DEFAULT_API_PREFIX.to_string()),
        }
    }

    /// Only requests whose URL contains `prefix` are considered; `None` intercepts everything.
    pub fn with_scope(mut self, prefix: Option<String>) -> Self {
        self.scope = prefix.filter(|p| !p.is_empty());
        self
    }

    pub fn register(&mut self, rule: MockRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[MockRule] {
        &self.rules
    }

    pub fn into_interceptor(self, policy: MockPolicy) -> Interceptor {
        Interceptor {
            rules: self.rules,
            scope: self.scope,
            policy,
            log: Mutex::new(Vec::new()),
        }
    }

    pub async fn install(
        self,
        session: &Session,
        policy: MockPolicy,
    ) -> Result<Arc<Interceptor>, HarnessError> {
        let interceptor = Arc::new(self.into_interceptor(policy));
        session.attach_interceptor(interceptor.clone()).await?;
        tracing::debug!(
            "Installed {} mock rules on session {} ({:?})",
            interceptor.rules.len(),
            session.id(),
            policy
        );
        Ok(interceptor)
    }
}

/// Installed, immutable rule set plus an append-only interception log.
#[derive(Debug)]
pub struct Interceptor {
    rules: Vec<MockRule>,
    scope: Option<String>,
    policy: MockPolicy,
    log: Mutex<Vec<Interception>>,
}

impl Interceptor {
    pub fn policy(&self) -> MockPolicy {
        self.policy
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn in_scope(&self, url: &str) -> bool {
        self.scope.as_deref().map_or(true, |p| url.contains(p))
    }

    /// Decide what to do with a request and record the outcome.
    pub fn resolve(&self, request: &RequestDescriptor) -> Decision {
        let (decision, outcome) = if !self.in_scope(&request.url) {
            (Decision::PassThrough, InterceptOutcome::OutOfScope)
        } else if let Some((idx, rule)) = self
            .rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(request))
        {
            (
                Decision::Fulfill {
                    rule: idx,
                    response: rule.response.clone(),
                },
                InterceptOutcome::Mocked { rule: idx },
            )
        } else {
            match self.policy {
                MockPolicy::PassThrough => (Decision::PassThrough, InterceptOutcome::PassedThrough),
                MockPolicy::Strict => {
                    tracing::warn!("No mock rule for {} {}", request.method, request.url);
                    (Decision::Reject, InterceptOutcome::Rejected)
                }
            }
        };

        self.log.lock().push(Interception {
            method: request.method.clone(),
            url: request.url.clone(),
            outcome,
            at: Utc::now(),
        });
        decision
    }

    pub fn interceptions(&self) -> Vec<Interception> {
        self.log.lock().clone()
    }

    pub fn first_mismatch(&self) -> Option<HarnessError> {
        self.log
            .lock()
            .iter()
            .find(|i| i.outcome == InterceptOutcome::Rejected)
            .map(|i| HarnessError::MockMismatch {
                method: i.method.clone(),
                url: i.url.clone(),
            })
    }

    pub fn saw_request(&self, pattern: &UrlPattern, method: HttpMethod) -> bool {
        self.log
            .lock()
            .iter()
            .any(|i| method.matches(&i.method) && pattern.matches(&i.url))
    }
}
