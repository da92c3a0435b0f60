//! Recorded actions - what the user did, in order
//!
//! Actions serialize as one flat JSON object each, tagged by `type`, so a
//! recording reads naturally as JSON lines.

use chrono::{DateTime, Utc};
use retrace_core::element::truncate;
use retrace_core::Descriptor;
use serde::{Deserialize, Serialize};

/// Detection method recorded on every text capture.
pub const CLIPBOARD_METHOD: &str = "clipboard";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Pointer click, with the element that was under it if one resolved
    Click {
        timestamp: DateTime<Utc>,
        x: i32,
        y: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        descriptor: Option<Descriptor>,
    },

    /// Standalone key press: named keys and ctrl/alt combos
    KeyPress { timestamp: DateTime<Utc>, key: String },

    /// Typed text committed with Enter
    Message { timestamp: DateTime<Utc>, text: String },

    /// Selected text copied out of the target
    TextCapture {
        timestamp: DateTime<Utc>,
        text: String,
        method: String,
    },
}

impl Action {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Action::Click { timestamp, .. }
            | Action::KeyPress { timestamp, .. }
            | Action::Message { timestamp, .. }
            | Action::TextCapture { timestamp, .. } => *timestamp,
        }
    }

    /// Short kind tag, as used in replay artifacts.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::KeyPress { .. } => "key",
            Action::Message { .. } => "message",
            Action::TextCapture { .. } => "capture",
        }
    }

    /// One-line human description.
    pub fn describe(&self) -> String {
        match self {
            Action::Click { x, y, descriptor: Some(d), .. } if d.is_addressable() => {
                format!("Click {} at ({}, {})", d.label(40), x, y)
            }
            Action::Click { x, y, .. } => format!("Click at ({}, {})", x, y),
            Action::KeyPress { key, .. } => format!("Press {}", key),
            Action::Message { text, .. } => format!("Type message: {}", truncate(text, 50)),
            Action::TextCapture { text, .. } => format!("Capture text: {}", truncate(text, 50)),
        }
    }
}

/// Ordered, append-only list of actions.
///
/// Only the recorder can append; once a log leaves the recorder it is
/// read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionLog {
    actions: Vec<Action>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.iter().filter(|a| matches!(a, Action::Message { .. })).count()
    }

    pub fn selected_count(&self) -> usize {
        self.iter().filter(|a| matches!(a, Action::TextCapture { .. })).count()
    }

    /// Texts of every capture, in order.
    pub fn captured_texts(&self) -> Vec<&str> {
        self.iter()
            .filter_map(|a| match a {
                Action::TextCapture { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl From<Vec<Action>> for ActionLog {
    fn from(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}

impl<'a> IntoIterator for &'a ActionLog {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// A finished recording, as handed from the recorder to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSession {
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub log: ActionLog,
}

impl RecordedSession {
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap()
    }

    #[test]
    fn serializes_flat_with_type_tag() {
        let action = Action::Click {
            timestamp: ts(),
            x: 100,
            y: 200,
            descriptor: None,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "click");
        assert_eq!(json["x"], 100);
        assert!(json.get("descriptor").is_none());

        let capture = Action::TextCapture {
            timestamp: ts(),
            text: "Hello".into(),
            method: CLIPBOARD_METHOD.into(),
        };
        let json = serde_json::to_value(&capture).unwrap();
        assert_eq!(json["type"], "text_capture");
        assert_eq!(json["method"], "clipboard");
    }

    #[test]
    fn sub_second_timestamps_survive_json() {
        let precise = ts() + chrono::Duration::nanoseconds(123_456_789);
        let action = Action::KeyPress { timestamp: precise, key: "enter".into() };
        let back: Action = serde_json::from_str(&serde_json::to_string(&action).unwrap()).unwrap();
        assert_eq!(back.timestamp(), precise);
    }

    #[test]
    fn counts_by_kind() {
        let log = ActionLog::from(vec![
            Action::Message { timestamp: ts(), text: "hi".into() },
            Action::KeyPress { timestamp: ts(), key: "up".into() },
            Action::TextCapture { timestamp: ts(), text: "Hello".into(), method: CLIPBOARD_METHOD.into() },
            Action::Message { timestamp: ts(), text: "bye".into() },
        ]);
        assert_eq!(log.len(), 4);
        assert_eq!(log.message_count(), 2);
        assert_eq!(log.selected_count(), 1);
        assert_eq!(log.captured_texts(), vec!["Hello"]);
    }

    #[test]
    fn describe_unnamed_click_as_coordinates() {
        let click = Action::Click {
            timestamp: ts(),
            x: 5,
            y: 6,
            descriptor: Some(Descriptor::new("", "Pane")),
        };
        assert_eq!(click.describe(), "Click at (5, 6)");
    }
}
