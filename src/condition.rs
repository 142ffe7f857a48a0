//! Named predicates over page state.

use regex::Regex;
use serde::Deserialize;

use crate::driver::ElementState;
use crate::error::HarnessError;
use crate::locator::Locator;
use crate::mock::{HttpMethod, UrlPattern};
use crate::session::Session;
use crate::wait::Probe;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "until", rename_all = "snake_case")]
pub enum Condition {
    Visible {
        target: Locator,
    },
    /// Holds when nothing matches or every match is invisible.
    Hidden {
        target: Locator,
    },
    Enabled {
        target: Locator,
    },
    TextContains {
        target: Locator,
        text: String,
    },
    TextEquals {
        target: Locator,
        text: String,
    },
    ValueEquals {
        target: Locator,
        value: String,
    },
    ValueNotEmpty {
        target: Locator,
    },
    HasClass {
        target: Locator,
        pattern: ClassPattern,
    },
    TagIs {
        target: Locator,
        tag: String,
    },
    Count {
        target: Locator,
        count: usize,
    },
    RequestSeen {
        url: UrlPattern,
        #[serde(default)]
        method: HttpMethod,
    },
}

/// Matches against each class of an element; compiled when the condition is built.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub enum ClassPattern {
    Name(String),
    Regex(Regex),
}

impl ClassPattern {
    pub fn regex(pattern: &str) -> Result<Self, HarnessError> {
        Regex::new(pattern)
            .map(ClassPattern::Regex)
            .map_err(|e| HarnessError::InvalidRule(format!("bad class pattern '{}': {}", pattern, e)))
    }

    pub fn matches(&self, class: &str) -> bool {
        match self {
            ClassPattern::Name(name) => class == name,
            ClassPattern::Regex(re) => re.is_match(class),
        }
    }
}

impl TryFrom<String> for ClassPattern {
    type Error = HarnessError;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        ClassPattern::regex(&pattern)
    }
}

impl std::fmt::Display for ClassPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassPattern::Name(name) => write!(f, "{:?}", name),
            ClassPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl Condition {
    pub fn visible(target: Locator) -> Self {
        Condition::Visible { target }
    }

    pub fn hidden(target: Locator) -> Self {
        Condition::Hidden { target }
    }

    pub fn enabled(target: Locator) -> Self {
        Condition::Enabled { target }
    }

    pub fn text_contains(target: Locator, text: impl Into<String>) -> Self {
        Condition::TextContains {
            target,
            text: text.into(),
        }
    }

    pub fn value_equals(target: Locator, value: impl Into<String>) -> Self {
        Condition::ValueEquals {
            target,
            value: value.into(),
        }
    }

    pub fn value_not_empty(target: Locator) -> Self {
        Condition::ValueNotEmpty { target }
    }

    pub fn text_equals(target: Locator, text: impl Into<String>) -> Self {
        Condition::TextEquals {
            target,
            text: text.into(),
        }
    }

    /// The element carries exactly this class.
    pub fn has_class(target: Locator, class: impl Into<String>) -> Self {
        Condition::HasClass {
            target,
            pattern: ClassPattern::Name(class.into()),
        }
    }

    pub fn has_class_matching(target: Locator, pattern: &str) -> Result<Self, HarnessError> {
        Ok(Condition::HasClass {
            target,
            pattern: ClassPattern::regex(pattern)?,
        })
    }

    pub fn tag_is(target: Locator, tag: impl Into<String>) -> Self {
        Condition::TagIs {
            target,
            tag: tag.into(),
        }
    }

    pub fn request_seen(url: UrlPattern, method: HttpMethod) -> Self {
        Condition::RequestSeen { url, method }
    }

    pub fn target(&self) -> Option<&Locator> {
        match self {
            Condition::Visible { target }
            | Condition::Hidden { target }
            | Condition::Enabled { target }
            | Condition::TextContains { target, .. }
            | Condition::TextEquals { target, .. }
            | Condition::ValueEquals { target, .. }
            | Condition::ValueNotEmpty { target }
            | Condition::HasClass { target, .. }
            | Condition::TagIs { target, .. }
            | Condition::Count { target, .. } => Some(target),
            Condition::RequestSeen { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Condition::Visible { target } => format!("{} to be visible", target),
            Condition::Hidden { target } => format!("{} to be hidden", target),
            Condition::Enabled { target } => format!("{} to be enabled", target),
            Condition::TextContains { target, text } => {
                format!("{} to contain text {:?}", target, text)
            }
            Condition::TextEquals { target, text } => format!("{} to have text {:?}", target, text),
            Condition::ValueEquals { target, value } => {
                format!("{} to have value {:?}", target, value)
            }
            Condition::ValueNotEmpty { target } => format!("{} to have a non-empty value", target),
            Condition::HasClass { target, pattern } => {
                format!("{} to have class {}", target, pattern)
            }
            Condition::TagIs { target, tag } => format!("{} to be a <{}>", target, tag),
            Condition::Count { target, count } => format!("{} to match {} element(s)", target, count),
            Condition::RequestSeen { url, method } => {
                format!("a {} request to {}", method.as_str(), url)
            }
        }
    }

    /// Evaluate an element condition against an already-fetched state.
    pub fn evaluate(&self, state: &ElementState) -> Result<Probe, HarnessError> {
        let observed = state.summary();
        let present = state.count > 0;
        let satisfied = match self {
            Condition::Visible { .. } => present && state.visible,
            Condition::Hidden { .. } => !present || !state.visible,
            Condition::Enabled { .. } => present && state.enabled,
            Condition::TextContains { text, .. } => present
                && state
                    .text
                    .as_deref()
                    .is_some_and(|t| t.contains(text.as_str())),
            Condition::TextEquals { text, .. } => {
                present && state.text.as_deref().map(str::trim) == Some(text.trim())
            }
            Condition::ValueEquals { value, .. } => {
                present && state.value.as_deref() == Some(value.as_str())
            }
            Condition::ValueNotEmpty { .. } => {
                present && state.value.as_deref().is_some_and(|v| !v.is_empty())
            }
            Condition::HasClass { pattern, .. } => {
                present && state.classes.iter().any(|c| pattern.matches(c))
            }
            Condition::TagIs { tag, .. } => {
                present
                    && state
                        .tag
                        .as_deref()
                        .is_some_and(|t| t.eq_ignore_ascii_case(tag))
            }
            Condition::Count { count, .. } => state.count == *count,
            Condition::RequestSeen { .. } => {
                return Err(HarnessError::Config(
                    "request conditions are evaluated against the interceptor".to_string(),
                ))
            }
        };
        Ok(Probe {
            satisfied,
            observed,
        })
    }

    /// Observe the live session once.
    pub async fn probe(&self, session: &Session) -> Result<Probe, HarnessError> {
        match self {
            Condition::RequestSeen { url, method } => {
                let Some(interceptor) = session.interceptor() else {
                    return Ok(Probe::pending("no interceptor installed"));
                };
                if interceptor.saw_request(url, *method) {
                    Ok(Probe::ready("request observed"))
                } else {
                    Ok(Probe::pending(format!(
                        "{} request(s) intercepted, none matching",
                        interceptor.interceptions().len()
                    )))
                }
            }
            other => {
                let Some(target) = other.target() else {
                    return Ok(Probe::pending("no target"));
                };
                let state = session.page().element_state(target).await?;
                other.evaluate(&state)
            }
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}
