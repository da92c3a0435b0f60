//! Element descriptors: how a UI element is named independent of its position

use serde::{Deserialize, Serialize};
use std::fmt;

/// Property set identifying a UI element, as reported by the provider.
///
/// Optional properties are `None` when the provider did not report them;
/// an empty string is never used to mean "absent".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub control_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, control_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            control_type: control_type.into(),
            automation_id: None,
            class_name: None,
        }
    }

    pub fn with_automation_id(mut self, id: impl Into<String>) -> Self {
        self.automation_id = Some(id.into());
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Whether a property lookup can target this element.
    ///
    /// Unnamed elements cannot be found again by name, so replay goes
    /// straight to coordinates for them.
    pub fn is_addressable(&self) -> bool {
        !self.name.is_empty()
    }

    /// Short label for logs and summaries.
    pub fn label(&self, max_chars: usize) -> String {
        format!("{} '{}'", self.control_type, truncate(&self.name, max_chars))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.control_type, self.name)?;
        if let Some(id) = &self.automation_id {
            write!(f, " #{}", id)?;
        }
        Ok(())
    }
}

/// Truncate to at most `max` characters, marking the cut with "...".
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
