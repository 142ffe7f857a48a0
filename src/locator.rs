//! Element locators, resolved inside the page by the driver.
//!
//! Name and text matching is case-insensitive substring unless `exact` is set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum By {
    Css {
        selector: String,
    },
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Label {
        text: String,
    },
    Placeholder {
        text: String,
    },
    Text {
        text: String,
        #[serde(default)]
        exact: bool,
    },
    AltText {
        text: String,
    },
    Title {
        text: String,
    },
    TestId {
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(flatten)]
    pub by: By,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<Box<Locator>>,
}

impl Locator {
    fn from_by(by: By) -> Self {
        Self { by, within: None }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_by(By::Css {
            selector: selector.into(),
        })
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::from_by(By::Role {
            role: role.into(),
            name: Some(name.into()),
        })
    }

    pub fn any_role(role: impl Into<String>) -> Self {
        Self::from_by(By::Role {
            role: role.into(),
            name: None,
        })
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::from_by(By::Label { text: text.into() })
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::from_by(By::Placeholder { text: text.into() })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_by(By::Text {
            text: text.into(),
            exact: false,
        })
    }

    pub fn exact_text(text: impl Into<String>) -> Self {
        Self::from_by(By::Text {
            text: text.into(),
            exact: true,
        })
    }

    pub fn alt_text(text: impl Into<String>) -> Self {
        Self::from_by(By::AltText { text: text.into() })
    }

    pub fn title(text: impl Into<String>) -> Self {
        Self::from_by(By::Title { text: text.into() })
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Self::from_by(By::TestId { id: id.into() })
    }

    /// Restrict this locator to descendants of `parent`.
    pub fn within(mut self, parent: Locator) -> Self {
        self.within = Some(Box::new(parent));
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.by {
            By::Css { selector } => write!(f, "css={}", selector)?,
            By::Role { role, name: Some(name) } => write!(f, "role={}[name={:?}]", role, name)?,
            By::Role { role, name: None } => write!(f, "role={}", role)?,
            By::Label { text } => write!(f, "label={:?}", text)?,
            By::Placeholder { text } => write!(f, "placeholder={:?}", text)?,
            By::Text { text, exact: true } => write!(f, "text={:?}(exact)", text)?,
            By::Text { text, exact: false } => write!(f, "text={:?}", text)?,
            By::AltText { text } => write!(f, "alt={:?}", text)?,
            By::Title { text } => write!(f, "title={:?}", text)?,
            By::TestId { id } => write!(f, "testid={}", id)?,
        }
        if let Some(parent) = &self.within {
            write!(f, " within {}", parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_scope() {
        let dialog = Locator::role("dialog", "Add a new bookmark");
        let url = Locator::css("#url").within(dialog);
        assert_eq!(
            url.to_string(),
            "css=#url within role=dialog[name=\"Add a new bookmark\"]"
        );
    }

    #[test]
    fn test_json_shape_matches_probe_contract() {
        let loc = Locator::label("URL");
        let v: serde_json::Value = serde_json::from_str(&loc.to_json()).unwrap();
        assert_eq!(v["by"], "label");
        assert_eq!(v["text"], "URL");
        assert!(v.get("within").is_none());
    }

    #[test]
    fn test_deserializes_from_toml_table() {
        #[derive(Deserialize)]
        struct Holder {
            target: Locator,
        }
        let holder: Holder = toml::from_str(
            r#"
            target = { by = "role", role = "button", name = "Save bookmark", within = { by = "role", role = "dialog" } }
            "#,
        )
        .unwrap();
        assert_eq!(
            holder.target,
            Locator::role("button", "Save bookmark").within(Locator::any_role("dialog"))
        );
    }
}
