//! In-memory provider and clipboard
//!
//! `ScriptedProvider` answers from a fixed script and logs every call.
//! Recorder and replay tests use it as a double; the CLI uses it for
//! dry-run replays.

use crate::element::Descriptor;
use crate::error::{Error, Result};
use crate::provider::{AutomationProvider, ClipboardProvider};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubElement {
    pub name: String,
    pub control_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Connect(String),
    ElementAtPoint { x: i32, y: i32 },
    FindChild { name: String, control_type: String },
    Children { name: String },
    ClickElement { name: String, control_type: String },
    ClickAt { x: i32, y: i32 },
    SendKeys { target: String, keys: String },
}

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    windows: Vec<String>,
    any_window: bool,
    points: HashMap<(i32, i32), Descriptor>,
    findable: HashSet<(String, String)>,
    /// (parent name, child) pairs, in insertion order
    tree: Vec<(String, Descriptor)>,
    find_any: bool,
    fail_lookups: bool,
    fail_element_clicks: bool,
    fail_coordinate_clicks: bool,
    fail_send_keys: bool,
    lookup_delay: Option<Duration>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept any window and find any addressable element. Used for dry runs.
    pub fn permissive() -> Self {
        Self {
            any_window: true,
            find_any: true,
            ..Self::default()
        }
    }

    /// Add a window whose title will satisfy `connect`.
    pub fn accepting_window(mut self, title: impl Into<String>) -> Self {
        self.windows.push(title.into());
        self
    }

    pub fn with_element_at(mut self, x: i32, y: i32, desc: Descriptor) -> Self {
        self.points.insert((x, y), desc);
        self
    }

    /// Make `find_child` succeed for this name and control type.
    pub fn with_findable(mut self, name: impl Into<String>, control_type: impl Into<String>) -> Self {
        self.findable.insert((name.into(), control_type.into()));
        self
    }

    /// Place `child` under the element named `parent` in the control tree.
    /// The connected window is named after the title passed to `connect`.
    pub fn with_child(mut self, parent: impl Into<String>, child: Descriptor) -> Self {
        self.tree.push((parent.into(), child));
        self
    }

    pub fn failing_lookups(mut self) -> Self {
        self.fail_lookups = true;
        self
    }

    pub fn failing_element_clicks(mut self) -> Self {
        self.fail_element_clicks = true;
        self
    }

    pub fn failing_coordinate_clicks(mut self) -> Self {
        self.fail_coordinate_clicks = true;
        self
    }

    pub fn failing_send_keys(mut self) -> Self {
        self.fail_send_keys = true;
        self
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    pub fn find_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ProviderCall::FindChild { .. }))
            .count()
    }

    pub fn coordinate_clicks(&self) -> Vec<(i32, i32)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ProviderCall::ClickAt { x, y } => Some((*x, *y)),
                _ => None,
            })
            .collect()
    }

    pub fn element_clicks(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ProviderCall::ClickElement { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn sent_keys(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ProviderCall::SendKeys { keys, .. } => Some(keys.clone()),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: ProviderCall) {
        self.calls.lock().push(call);
    }

    fn lookup_pause(&self) {
        if let Some(delay) = self.lookup_delay {
            thread::sleep(delay);
        }
    }
}

impl AutomationProvider for ScriptedProvider {
    type Element = StubElement;

    fn connect(&self, window_title: &str) -> Result<StubElement> {
        self.log(ProviderCall::Connect(window_title.to_string()));
        if self.any_window || self.windows.iter().any(|w| w.contains(window_title)) {
            Ok(StubElement {
                name: window_title.to_string(),
                control_type: "Window".to_string(),
            })
        } else {
            Err(Error::provider_unavailable(window_title))
        }
    }

    fn element_at_point(&self, x: i32, y: i32) -> Result<Option<Descriptor>> {
        self.log(ProviderCall::ElementAtPoint { x, y });
        self.lookup_pause();
        if self.fail_lookups {
            return Err(Error::action_failed("element_at_point", "scripted failure"));
        }
        Ok(self.points.get(&(x, y)).cloned())
    }

    fn find_child(
        &self,
        _root: &StubElement,
        name: &str,
        control_type: &str,
    ) -> Result<Option<StubElement>> {
        self.log(ProviderCall::FindChild {
            name: name.to_string(),
            control_type: control_type.to_string(),
        });
        self.lookup_pause();
        if self.fail_lookups {
            return Err(Error::action_failed("find_child", "scripted failure"));
        }
        let key = (name.to_string(), control_type.to_string());
        if self.find_any || self.findable.contains(&key) {
            Ok(Some(StubElement {
                name: key.0,
                control_type: key.1,
            }))
        } else {
            Ok(None)
        }
    }

    fn children(&self, element: &StubElement) -> Result<Vec<StubElement>> {
        self.log(ProviderCall::Children {
            name: element.name.clone(),
        });
        if self.fail_lookups {
            return Err(Error::action_failed("children", "scripted failure"));
        }
        Ok(self
            .tree
            .iter()
            .filter(|(parent, _)| *parent == element.name)
            .map(|(_, child)| StubElement {
                name: child.name.clone(),
                control_type: child.control_type.clone(),
            })
            .collect())
    }

    fn describe(&self, element: &StubElement) -> Result<Descriptor> {
        let scripted = self
            .tree
            .iter()
            .map(|(_, child)| child)
            .find(|d| d.name == element.name && d.control_type == element.control_type);
        Ok(scripted
            .cloned()
            .unwrap_or_else(|| Descriptor::new(&element.name, &element.control_type)))
    }

    fn click_element(&self, element: &StubElement) -> Result<()> {
        self.log(ProviderCall::ClickElement {
            name: element.name.clone(),
            control_type: element.control_type.clone(),
        });
        if self.fail_element_clicks {
            return Err(Error::action_failed("click", "scripted failure"));
        }
        Ok(())
    }

    fn click_at(&self, x: i32, y: i32) -> Result<()> {
        self.log(ProviderCall::ClickAt { x, y });
        if self.fail_coordinate_clicks {
            return Err(Error::action_failed("click_at", "scripted failure"));
        }
        Ok(())
    }

    fn send_keys(&self, target: &StubElement, keys: &str) -> Result<()> {
        self.log(ProviderCall::SendKeys {
            target: target.name.clone(),
            keys: keys.to_string(),
        });
        if self.fail_send_keys {
            return Err(Error::action_failed("send_keys", "scripted failure"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ClipboardState {
    content: String,
    selections: VecDeque<String>,
    unavailable: bool,
}

/// Clipboard held in memory. Clones share the same buffer.
///
/// Queued selections stand in for "whatever the user had highlighted": a
/// read from an empty buffer takes the next one, the way a copy command
/// would have filled it.
#[derive(Debug, Default, Clone)]
pub struct MemoryClipboard {
    state: Arc<Mutex<ClipboardState>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails with `CLIPBOARD_UNAVAILABLE`.
    pub fn unavailable() -> Self {
        let clipboard = Self::default();
        clipboard.state.lock().unavailable = true;
        clipboard
    }

    pub fn queue_selection(&self, text: impl Into<String>) {
        self.state.lock().selections.push_back(text.into());
    }

    pub fn content(&self) -> String {
        self.state.lock().content.clone()
    }

    fn check(state: &ClipboardState) -> Result<()> {
        if state.unavailable {
            Err(Error::clipboard("scripted failure"))
        } else {
            Ok(())
        }
    }
}

impl ClipboardProvider for MemoryClipboard {
    fn clear(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.content.clear();
        Ok(())
    }

    fn read(&mut self) -> Result<String> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        if state.content.is_empty() {
            if let Some(next) = state.selections.pop_front() {
                state.content = next;
            }
        }
        Ok(state.content.clone())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.content = text.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_matches_title_substring() {
        let provider = ScriptedProvider::new().accepting_window("WhatsApp - Chats");
        assert!(provider.connect("WhatsApp").is_ok());
        let err = provider.connect("Slack").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ProviderUnavailable);
    }

    #[test]
    fn clipboard_serves_queued_selection_after_clear() {
        let mut clip = MemoryClipboard::new();
        clip.queue_selection("  Hello  ");
        clip.write("old").unwrap();
        clip.clear().unwrap();
        assert_eq!(clip.read().unwrap(), "  Hello  ");
        // Reading again does not consume another selection
        assert_eq!(clip.read().unwrap(), "  Hello  ");
    }

    #[test]
    fn clones_share_state() {
        let clip = MemoryClipboard::new();
        let mut other = clip.clone();
        other.write("shared").unwrap();
        assert_eq!(clip.content(), "shared");
    }
}
