//! Interaction steps.
//!
//! A step performs one action and then waits for its post-conditions, so the
//! next step never races the page's asynchronous rendering.

use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::condition::Condition;
use crate::diagnostics::DiagnosticSink;
use crate::error::HarnessError;
use crate::locator::Locator;
use crate::session::Session;
use crate::wait::{self, bounded, WaitOptions};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Navigate {
        url: String,
    },
    Fill {
        target: Locator,
        value: String,
    },
    Click {
        target: Locator,
    },
    Type {
        target: Locator,
        text: String,
    },
    Press {
        #[serde(default)]
        target: Option<Locator>,
        key: String,
    },
    Blur {
        target: Locator,
    },
    Hover {
        target: Locator,
    },
    AssertVisible {
        target: Locator,
    },
    AssertHidden {
        target: Locator,
    },
    AssertText {
        target: Locator,
        text: String,
    },
    AssertValue {
        target: Locator,
        value: String,
    },
    WaitFor {
        condition: Condition,
    },
    Screenshot {
        name: String,
    },
    Pause {
        ms: u64,
    },
}

impl Action {
    pub fn describe(&self) -> String {
        match self {
            Action::Navigate { url } => format!("navigate to {}", url),
            Action::Fill { target, value } => format!("fill {} with {:?}", target, value),
            Action::Click { target } => format!("click {}", target),
            Action::Type { target, text } => format!("type {:?} into {}", text, target),
            Action::Press {
                target: Some(target),
                key,
            } => format!("press {} on {}", key, target),
            Action::Press { target: None, key } => format!("press {}", key),
            Action::Blur { target } => format!("blur {}", target),
            Action::Hover { target } => format!("hover {}", target),
            Action::AssertVisible { target } => format!("expect {} visible", target),
            Action::AssertHidden { target } => format!("expect {} hidden", target),
            Action::AssertText { target, text } => format!("expect {} text {:?}", target, text),
            Action::AssertValue { target, value } => {
                format!("expect {} value {:?}", target, value)
            }
            Action::WaitFor { condition } => format!("wait for {}", condition),
            Action::Screenshot { name } => format!("screenshot {}", name),
            Action::Pause { ms } => format!("pause {}ms", ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub label: String,
    #[serde(flatten)]
    pub action: Action,
    /// Extra conditions that must hold after the action.
    #[serde(default)]
    pub then: Vec<Condition>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Everything a step needs from the running scenario.
pub struct StepContext<'a> {
    pub scenario: &'a str,
    pub session: &'a Session,
    pub base_url: &'a Url,
    pub wait: WaitOptions,
    pub navigation_timeout: Duration,
    pub cancel: &'a CancellationToken,
    pub sink: &'a dyn DiagnosticSink,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            label: action.describe(),
            action,
            then: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(Action::Navigate { url: url.into() })
    }

    pub fn fill(target: Locator, value: impl Into<String>) -> Self {
        Self::new(Action::Fill {
            target,
            value: value.into(),
        })
    }

    pub fn click(target: Locator) -> Self {
        Self::new(Action::Click { target })
    }

    pub fn type_text(target: Locator, text: impl Into<String>) -> Self {
        Self::new(Action::Type {
            target,
            text: text.into(),
        })
    }

    pub fn press(target: Locator, key: impl Into<String>) -> Self {
        Self::new(Action::Press {
            target: Some(target),
            key: key.into(),
        })
    }

    pub fn press_key(key: impl Into<String>) -> Self {
        Self::new(Action::Press {
            target: None,
            key: key.into(),
        })
    }

    pub fn blur(target: Locator) -> Self {
        Self::new(Action::Blur { target })
    }

    pub fn hover(target: Locator) -> Self {
        Self::new(Action::Hover { target })
    }

    pub fn assert_visible(target: Locator) -> Self {
        Self::new(Action::AssertVisible { target })
    }

    pub fn assert_hidden(target: Locator) -> Self {
        Self::new(Action::AssertHidden { target })
    }

    pub fn assert_text(target: Locator, text: impl Into<String>) -> Self {
        Self::new(Action::AssertText {
            target,
            text: text.into(),
        })
    }

    pub fn assert_value(target: Locator, value: impl Into<String>) -> Self {
        Self::new(Action::AssertValue {
            target,
            value: value.into(),
        })
    }

    pub fn wait_for(condition: Condition) -> Self {
        Self::new(Action::WaitFor { condition })
    }

    pub fn screenshot(name: impl Into<String>) -> Self {
        Self::new(Action::Screenshot { name: name.into() })
    }

    pub fn pause(duration: Duration) -> Self {
        Self::new(Action::Pause {
            ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        })
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn then(mut self, condition: Condition) -> Self {
        self.then.push(condition);
        self
    }

    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    fn wait_options(&self, defaults: WaitOptions) -> WaitOptions {
        match self.timeout_ms {
            Some(ms) => defaults.with_timeout(Duration::from_millis(ms)),
            None => defaults,
        }
    }

    /// Run the action and its post-conditions. Any error comes back as a
    /// `StepFailure` naming this step.
    pub async fn execute(&self, ctx: &StepContext<'_>) -> Result<(), HarnessError> {
        let opts = self.wait_options(ctx.wait);
        tracing::info!("[{}] step: {}", ctx.scenario, self.label);

        self.perform(ctx, opts).await?;

        for condition in &self.then {
            await_condition(ctx, condition, opts)
                .await
                .map_err(|e| self.fail(condition.describe(), e))?;
        }

        ctx.session
            .mock_fault()
            .map_err(|e| self.fail("all requests to match a mock rule", e))
    }

    async fn perform(&self, ctx: &StepContext<'_>, opts: WaitOptions) -> Result<(), HarnessError> {
        let page = ctx.session.page();
        let what = self.action.describe();
        match &self.action {
            Action::Navigate { url } => {
                let resolved = ctx
                    .base_url
                    .join(url)
                    .map_err(|e| self.fail(&what, HarnessError::Config(format!("bad url '{}': {}", url, e))))?;
                bounded(
                    "navigating",
                    ctx.navigation_timeout,
                    ctx.cancel,
                    ctx.session.navigate(resolved.as_str(), ctx.navigation_timeout),
                )
                .await
                .map_err(|e| self.fail(&what, e))
            }
            Action::Fill { target, value } => {
                self.actionable(ctx, target, opts, true).await?;
                bounded("filling", opts.timeout, ctx.cancel, page.fill(target, value))
                    .await
                    .map_err(|e| self.fail(&what, e))?;
                let accepted = Condition::value_equals(target.clone(), value.clone());
                await_condition(ctx, &accepted, opts)
                    .await
                    .map_err(|e| self.fail(accepted.describe(), e))
            }
            Action::Click { target } => {
                self.actionable(ctx, target, opts, true).await?;
                bounded("clicking", opts.timeout, ctx.cancel, page.click(target))
                    .await
                    .map_err(|e| self.fail(&what, e))
            }
            Action::Type { target, text } => {
                self.actionable(ctx, target, opts, true).await?;
                bounded("typing", opts.timeout, ctx.cancel, page.type_text(target, text))
                    .await
                    .map_err(|e| self.fail(&what, e))
            }
            Action::Press { target, key } => {
                if let Some(target) = target {
                    self.actionable(ctx, target, opts, false).await?;
                }
                bounded(
                    "pressing a key",
                    opts.timeout,
                    ctx.cancel,
                    page.press(target.as_ref(), key),
                )
                .await
                .map_err(|e| self.fail(&what, e))
            }
            Action::Blur { target } => {
                self.actionable(ctx, target, opts, false).await?;
                bounded("blurring", opts.timeout, ctx.cancel, page.blur(target))
                    .await
                    .map_err(|e| self.fail(&what, e))
            }
            Action::Hover { target } => {
                self.actionable(ctx, target, opts, false).await?;
                bounded("hovering", opts.timeout, ctx.cancel, page.hover(target))
                    .await
                    .map_err(|e| self.fail(&what, e))
            }
            Action::AssertVisible { target } => {
                self.expect(ctx, Condition::visible(target.clone()), opts).await
            }
            Action::AssertHidden { target } => {
                self.expect(ctx, Condition::hidden(target.clone()), opts).await
            }
            Action::AssertText { target, text } => {
                self.expect(ctx, Condition::text_contains(target.clone(), text.clone()), opts)
                    .await
            }
            Action::AssertValue { target, value } => {
                self.expect(ctx, Condition::value_equals(target.clone(), value.clone()), opts)
                    .await
            }
            Action::WaitFor { condition } => self.expect(ctx, condition.clone(), opts).await,
            Action::Screenshot { name } => {
                let bytes = bounded(
                    "taking a screenshot",
                    opts.timeout,
                    ctx.cancel,
                    page.screenshot(),
                )
                .await
                .map_err(|e| self.fail(&what, e))?;
                ctx.sink
                    .record_artifact(ctx.scenario, name, &bytes)
                    .map_err(|e| self.fail(&what, e))
            }
            Action::Pause { ms } => wait::pause(Duration::from_millis(*ms), ctx.cancel)
                .await
                .map_err(|e| self.fail(&what, e)),
        }
    }

    async fn expect(
        &self,
        ctx: &StepContext<'_>,
        condition: Condition,
        opts: WaitOptions,
    ) -> Result<(), HarnessError> {
        await_condition(ctx, &condition, opts)
            .await
            .map_err(|e| self.fail(condition.describe(), e))
    }

    /// Wait until `target` can receive input.
    async fn actionable(
        &self,
        ctx: &StepContext<'_>,
        target: &Locator,
        opts: WaitOptions,
        needs_enabled: bool,
    ) -> Result<(), HarnessError> {
        self.expect(ctx, Condition::visible(target.clone()), opts).await?;
        if needs_enabled {
            self.expect(ctx, Condition::enabled(target.clone()), opts).await?;
        }
        Ok(())
    }

    fn fail(&self, condition: impl Into<String>, cause: HarnessError) -> HarnessError {
        match cause {
            already @ HarnessError::StepFailure { .. } => already,
            cause => HarnessError::step(self.label.clone(), condition, cause),
        }
    }
}

/// Poll `condition` on the session, failing fast on strict-mode mock mismatches.
pub async fn await_condition(
    ctx: &StepContext<'_>,
    condition: &Condition,
    opts: WaitOptions,
) -> Result<(), HarnessError> {
    let session = ctx.session;
    wait::wait_for(&condition.describe(), opts, ctx.cancel, move || async move {
        session.mock_fault()?;
        condition.probe(session).await
    })
    .await
    .map(|_| ())
}
