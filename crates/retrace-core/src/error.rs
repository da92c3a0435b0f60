//! Structured errors for provider-boundary failures

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ProviderUnavailable,
    ElementNotFound,
    ActionFailed,
    ClipboardUnavailable,
    Timeout,
    HookUnavailable,
    NotImplemented,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn provider_unavailable(window_title: &str) -> Self {
        Self::new(
            ErrorCode::ProviderUnavailable,
            format!("Could not connect to window: {}", window_title),
        )
        .with_suggestions(vec![format!(
            "Make sure '{}' is running and its main window is open",
            window_title
        )])
    }

    pub fn element_not_found(name: &str, control_type: &str) -> Self {
        Self::new(
            ErrorCode::ElementNotFound,
            format!("No {} element named: {}", control_type, name),
        )
    }

    pub fn action_failed(action: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::ActionFailed,
            format!("{} failed: {}", action, reason),
        )
    }

    pub fn clipboard(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ClipboardUnavailable,
            format!("Clipboard unavailable: {}", reason),
        )
    }

    pub fn timeout(operation: &str, timeout_ms: u64) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Timeout after {}ms waiting for: {}", timeout_ms, operation),
        )
    }

    pub fn hook_unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::HookUnavailable, reason)
    }

    pub fn not_implemented(feature: &str) -> Self {
        Self::new(
            ErrorCode::NotImplemented,
            format!("{} is not supported on this platform", feature),
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake() {
        let err = Error::provider_unavailable("WhatsApp");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "PROVIDER_UNAVAILABLE");
        assert_eq!(json["suggestions"].as_array().unwrap().len(), 1);
        assert!(json.get("context").is_none());
    }

    #[test]
    fn display_includes_code() {
        let err = Error::element_not_found("Chat A", "ListItem");
        assert_eq!(err.to_string(), "[ElementNotFound] No ListItem element named: Chat A");
    }

    #[test]
    fn timeout_names_operation() {
        let err = Error::timeout("element_at_point", 2000);
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(
            err.to_string(),
            "[Timeout] Timeout after 2000ms waiting for: element_at_point"
        );
    }
}
