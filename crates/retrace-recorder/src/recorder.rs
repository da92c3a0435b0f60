//! Action recorder - turns raw input events into typed actions
//!
//! `Idle -> Recording -> Finalizing -> Idle`. The recorder owns its log
//! for the whole session and gives it up, frozen, in `finalize`.

use crate::action::{Action, ActionLog, RecordedSession, CLIPBOARD_METHOD};
use crate::capture::{Hotkey, InputEvent, KeyInput};
use chrono::{DateTime, Utc};
use retrace_core::keys::{combo_name, is_modifier_name, is_sendable_key, Modifiers, NamedKey};
use retrace_core::{AutomationProvider, ClipboardProvider, ElementResolver};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Copy command sent to the target during text capture.
const COPY_KEYS: &str = "^c";

/// How long after the settle delay the hook may still deliver our own copy.
const COPY_ECHO_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Finalizing,
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Key that runs the text-selection capture
    pub capture_hotkey: Hotkey,
    /// Captures shorter than this (in characters, after trimming) are dropped
    pub min_capture_len: usize,
    /// Time given to the target to fill the clipboard after the copy
    pub settle_delay: Duration,
    /// Bound on each element lookup; `None` waits as long as the provider does
    pub resolve_timeout: Option<Duration>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capture_hotkey: Hotkey::parse("f8"),
            min_capture_len: 3,
            settle_delay: Duration::from_millis(250),
            resolve_timeout: Some(Duration::from_secs(2)),
        }
    }
}

/// Result of one text-selection capture attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(String),
    Empty,
    TooShort(String),
    Duplicate(String),
    /// Clipboard or copy command failed
    Failed(String),
}

impl CaptureOutcome {
    pub fn is_captured(&self) -> bool {
        matches!(self, CaptureOutcome::Captured(_))
    }

    pub fn message(&self) -> String {
        match self {
            CaptureOutcome::Captured(text) => format!("Captured: {}", text),
            CaptureOutcome::Empty => "Nothing selected (clipboard empty)".to_string(),
            CaptureOutcome::TooShort(text) => format!("Selection too short: '{}'", text),
            CaptureOutcome::Duplicate(text) => format!("Already captured: {}", text),
            CaptureOutcome::Failed(reason) => format!("Capture failed: {}", reason),
        }
    }
}

/// Progress reported back to whoever drives the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Recorded(String),
    Capture(CaptureOutcome),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("recorder is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: RecorderState,
        actual: RecorderState,
    },

    #[error(transparent)]
    Provider(#[from] retrace_core::Error),

    #[error("recording worker stopped unexpectedly: {0}")]
    Worker(String),
}

struct Target<E> {
    title: String,
    root: E,
}

pub struct ActionRecorder<P: AutomationProvider, C: ClipboardProvider> {
    resolver: ElementResolver<P>,
    clipboard: C,
    config: RecorderConfig,
    state: RecorderState,
    target: Option<Target<P::Element>>,
    started_at: Option<DateTime<Utc>>,
    log: ActionLog,
    buffer: String,
    captured: HashSet<String>,
    /// Copy keystrokes we sent that the input hook has not echoed back yet
    copy_echoes: usize,
    echo_deadline: Option<Instant>,
}

impl<P: AutomationProvider, C: ClipboardProvider> ActionRecorder<P, C> {
    pub fn new(provider: Arc<P>, clipboard: C, config: RecorderConfig) -> Self {
        let mut resolver = ElementResolver::new(provider);
        if let Some(timeout) = config.resolve_timeout {
            resolver = resolver.with_timeout(timeout);
        }
        Self {
            resolver,
            clipboard,
            config,
            state: RecorderState::Idle,
            target: None,
            started_at: None,
            log: ActionLog::new(),
            buffer: String::new(),
            captured: HashSet::new(),
            copy_echoes: 0,
            echo_deadline: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Text typed since the last committed message.
    pub fn pending_message(&self) -> &str {
        &self.buffer
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Connect to the target window and begin a session.
    pub fn start(&mut self, window_title: &str) -> Result<(), RecorderError> {
        self.expect_state(RecorderState::Idle)?;
        let root = self.resolver.provider().connect(window_title)?;

        self.reset();
        self.target = Some(Target {
            title: window_title.to_string(),
            root,
        });
        self.started_at = Some(Utc::now());
        self.state = RecorderState::Recording;
        info!(target_window = window_title, "recording started");
        Ok(())
    }

    /// Feed one captured event. Events outside a session are ignored.
    pub fn handle(&mut self, event: InputEvent) -> Option<Feedback> {
        if self.state != RecorderState::Recording {
            debug!(?event, "event outside a session ignored");
            return None;
        }
        match event {
            InputEvent::Click { x, y } => Some(self.on_click(x, y)),
            InputEvent::Key(key) => self.on_key(&key),
        }
    }

    fn on_click(&mut self, x: i32, y: i32) -> Feedback {
        let descriptor = self.resolver.resolve_at_point(x, y);
        let action = Action::Click {
            timestamp: Utc::now(),
            x,
            y,
            descriptor,
        };
        self.append(action)
    }

    fn on_key(&mut self, input: &KeyInput) -> Option<Feedback> {
        if is_modifier_name(&input.key) || self.swallow_copy_echo(input) {
            return None;
        }
        if self.config.capture_hotkey.matches(input) {
            return Some(Feedback::Capture(self.capture_selection()));
        }

        let lower = input.key.to_lowercase();
        if input.modifiers.is_command() {
            return self.key_press(combo_name(&lower, input.modifiers));
        }

        let mut chars = input.key.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            self.buffer.push(ch);
            return None;
        }

        let named = NamedKey::from_name(&lower);
        match named {
            Some(NamedKey::Space) => {
                self.buffer.push(' ');
                None
            }
            Some(NamedKey::Backspace) if !self.buffer.is_empty() => {
                self.buffer.pop();
                None
            }
            Some(NamedKey::Enter) if !self.buffer.trim().is_empty() => {
                let text = std::mem::take(&mut self.buffer);
                Some(self.append(Action::Message {
                    timestamp: Utc::now(),
                    text,
                }))
            }
            Some(NamedKey::Enter) => {
                self.buffer.clear();
                self.key_press("enter".to_string())
            }
            Some(key) => self.key_press(combo_name(&key.name(), input.modifiers)),
            None => self.key_press(combo_name(&lower, input.modifiers)),
        }
    }

    /// Keys that cannot be written as send-keys notation are dropped so the
    /// log never holds a step replay would fail on.
    fn key_press(&mut self, key: String) -> Option<Feedback> {
        if !is_sendable_key(&key) {
            debug!(%key, "key cannot be replayed, not recorded");
            return None;
        }
        Some(self.append(Action::KeyPress {
            timestamp: Utc::now(),
            key,
        }))
    }

    /// The copy command sent by a capture comes back through the input hook
    /// as an ordinary ctrl+c.
    fn swallow_copy_echo(&mut self, input: &KeyInput) -> bool {
        if self.copy_echoes == 0 {
            return false;
        }
        if self.echo_deadline.map_or(true, |deadline| Instant::now() > deadline) {
            self.copy_echoes = 0;
            self.echo_deadline = None;
            return false;
        }
        let ctrl_only = Modifiers {
            ctrl: true,
            ..Modifiers::NONE
        };
        if input.modifiers != ctrl_only || !input.key.eq_ignore_ascii_case("c") {
            return false;
        }
        self.copy_echoes -= 1;
        debug!("own copy keystroke ignored");
        true
    }

    fn append(&mut self, action: Action) -> Feedback {
        let line = action.describe();
        debug!(action = %line, "recorded");
        self.log.push(action);
        Feedback::Recorded(line)
    }

    /// Copy the target's current selection through the clipboard and keep
    /// it if it is new and long enough.
    pub fn capture_selection(&mut self) -> CaptureOutcome {
        let outcome = self.try_capture();
        match &outcome {
            CaptureOutcome::Captured(text) => info!(chars = text.chars().count(), "text captured"),
            CaptureOutcome::Failed(reason) => warn!(%reason, "text capture failed"),
            other => debug!(?other, "text capture rejected"),
        }
        outcome
    }

    fn try_capture(&mut self) -> CaptureOutcome {
        let Some(target) = &self.target else {
            return CaptureOutcome::Failed("no target connected".to_string());
        };

        if let Err(reason) = caught("clipboard clear", || self.clipboard.clear()) {
            return CaptureOutcome::Failed(reason);
        }

        self.copy_echoes += 1;
        self.echo_deadline = Some(Instant::now() + self.config.settle_delay + COPY_ECHO_WINDOW);
        let provider = self.resolver.provider();
        if let Err(reason) = caught("send_keys", || provider.send_keys(&target.root, COPY_KEYS)) {
            self.copy_echoes -= 1;
            return CaptureOutcome::Failed(reason);
        }
        if !self.config.settle_delay.is_zero() {
            thread::sleep(self.config.settle_delay);
        }

        let raw = match caught("clipboard read", || self.clipboard.read()) {
            Ok(text) => text,
            Err(reason) => return CaptureOutcome::Failed(reason),
        };
        let text = raw.trim().to_string();

        if text.is_empty() {
            return CaptureOutcome::Empty;
        }
        if text.chars().count() < self.config.min_capture_len {
            return CaptureOutcome::TooShort(text);
        }
        if self.captured.contains(&text) {
            return CaptureOutcome::Duplicate(text);
        }

        self.captured.insert(text.clone());
        self.log.push(Action::TextCapture {
            timestamp: Utc::now(),
            text: text.clone(),
            method: CLIPBOARD_METHOD.to_string(),
        });
        CaptureOutcome::Captured(text)
    }

    /// Close the session: flush any unsent message and hand the log out.
    pub fn finalize(&mut self) -> Result<RecordedSession, RecorderError> {
        self.expect_state(RecorderState::Recording)?;
        self.state = RecorderState::Finalizing;

        if !self.buffer.trim().is_empty() {
            let text = std::mem::take(&mut self.buffer);
            self.append(Action::Message {
                timestamp: Utc::now(),
                text,
            });
        }

        let ended_at = Utc::now();
        let session = RecordedSession {
            target: self
                .target
                .as_ref()
                .map(|t| t.title.clone())
                .unwrap_or_default(),
            started_at: self.started_at.unwrap_or(ended_at),
            ended_at,
            log: std::mem::take(&mut self.log),
        };
        self.reset();
        info!(actions = session.log.len(), "recording finalized");
        Ok(session)
    }

    /// Drop the session. Returns how many actions were thrown away.
    pub fn discard(&mut self) -> usize {
        let dropped = self.log.len();
        self.reset();
        info!(actions = dropped, "recording discarded");
        dropped
    }

    fn reset(&mut self) {
        self.state = RecorderState::Idle;
        self.target = None;
        self.started_at = None;
        self.log = ActionLog::new();
        self.buffer.clear();
        self.captured.clear();
        self.copy_echoes = 0;
        self.echo_deadline = None;
    }

    fn expect_state(&self, expected: RecorderState) -> Result<(), RecorderError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RecorderError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

/// Run one clipboard or provider call, turning a panic into a failure.
fn caught<T>(op: &str, f: impl FnOnce() -> retrace_core::Result<T>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("{} panicked", op)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::keys::Modifiers;
    use retrace_core::stub::{MemoryClipboard, ScriptedProvider};
    use retrace_core::Descriptor;

    fn quick_config() -> RecorderConfig {
        RecorderConfig {
            settle_delay: Duration::ZERO,
            resolve_timeout: None,
            ..RecorderConfig::default()
        }
    }

    fn recorder(provider: ScriptedProvider) -> (ActionRecorder<ScriptedProvider, MemoryClipboard>, MemoryClipboard) {
        let clipboard = MemoryClipboard::new();
        let mut rec = ActionRecorder::new(
            Arc::new(provider.accepting_window("WhatsApp")),
            clipboard.clone(),
            quick_config(),
        );
        rec.start("WhatsApp").unwrap();
        (rec, clipboard)
    }

    fn key(name: &str) -> InputEvent {
        InputEvent::Key(KeyInput::new(name))
    }

    fn type_text(rec: &mut ActionRecorder<ScriptedProvider, MemoryClipboard>, text: &str) {
        for ch in text.chars() {
            rec.handle(key(&ch.to_string()));
        }
    }

    #[test]
    fn start_fails_without_window() {
        let mut rec = ActionRecorder::new(
            Arc::new(ScriptedProvider::new()),
            MemoryClipboard::new(),
            quick_config(),
        );
        let err = rec.start("WhatsApp").unwrap_err();
        assert!(matches!(err, RecorderError::Provider(_)));
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[test]
    fn clicks_carry_resolved_descriptor() {
        let provider = ScriptedProvider::new()
            .with_element_at(100, 200, Descriptor::new("Chat A", "ListItem"));
        let (mut rec, _) = recorder(provider);
        rec.handle(InputEvent::Click { x: 100, y: 200 });
        rec.handle(InputEvent::Click { x: 300, y: 400 });

        match &rec.log().actions()[..] {
            [Action::Click { descriptor: Some(d), .. }, Action::Click { descriptor: None, x: 300, y: 400, .. }] => {
                assert_eq!(d.name, "Chat A");
            }
            other => panic!("unexpected log: {:?}", other),
        }
    }

    #[test]
    fn enter_commits_typed_message() {
        let (mut rec, _) = recorder(ScriptedProvider::new());
        type_text(&mut rec, "helo");
        rec.handle(key("backspace"));
        type_text(&mut rec, "lo");
        rec.handle(key("space"));
        type_text(&mut rec, "you");
        let fb = rec.handle(key("enter"));
        assert_eq!(fb, Some(Feedback::Recorded("Type message: hello you".into())));
        assert_eq!(rec.pending_message(), "");
        assert_eq!(rec.log().message_count(), 1);
    }

    #[test]
    fn keys_on_empty_buffer_are_standalone() {
        let (mut rec, _) = recorder(ScriptedProvider::new());
        rec.handle(key("enter"));
        rec.handle(key("backspace"));
        rec.handle(key("up"));
        rec.handle(key("shift"));
        rec.handle(InputEvent::Key(KeyInput::new("a").with_modifiers(Modifiers {
            ctrl: true,
            ..Modifiers::NONE
        })));
        rec.handle(InputEvent::Key(KeyInput::new("tab").with_modifiers(Modifiers {
            shift: true,
            ..Modifiers::NONE
        })));

        let keys: Vec<&str> = rec
            .log()
            .iter()
            .filter_map(|a| match a {
                Action::KeyPress { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["enter", "backspace", "up", "ctrl+a", "shift+tab"]);
    }

    #[test]
    fn finalize_flushes_pending_message() {
        let (mut rec, _) = recorder(ScriptedProvider::new());
        type_text(&mut rec, "unsent");
        let session = rec.finalize().unwrap();
        assert_eq!(session.target, "WhatsApp");
        assert!(matches!(
            session.log.actions(),
            [Action::Message { text, .. }] if text == "unsent"
        ));
        assert_eq!(rec.state(), RecorderState::Idle);
        assert!(rec.finalize().is_err());
    }

    #[test]
    fn blank_buffer_is_not_flushed() {
        let (mut rec, _) = recorder(ScriptedProvider::new());
        rec.handle(key("space"));
        let session = rec.finalize().unwrap();
        assert!(session.log.is_empty());
    }

    #[test]
    fn capture_hotkey_copies_selection() {
        let provider = Arc::new(ScriptedProvider::new().accepting_window("WhatsApp"));
        let clipboard = MemoryClipboard::new();
        let mut rec = ActionRecorder::new(Arc::clone(&provider), clipboard.clone(), quick_config());
        rec.start("WhatsApp").unwrap();

        clipboard.queue_selection("  Hello  ");
        let fb = rec.handle(key("f8"));
        assert_eq!(fb, Some(Feedback::Capture(CaptureOutcome::Captured("Hello".into()))));
        assert_eq!(provider.sent_keys(), vec!["^c".to_string()]);
    }

    #[test]
    fn capture_rejections() {
        let (mut rec, clipboard) = recorder(ScriptedProvider::new());
        clipboard.queue_selection("ok");
        assert_eq!(rec.capture_selection(), CaptureOutcome::TooShort("ok".into()));
        clipboard.queue_selection("   ");
        assert_eq!(rec.capture_selection(), CaptureOutcome::Empty);
        clipboard.queue_selection("Hello");
        assert!(rec.capture_selection().is_captured());
        clipboard.queue_selection("Hello ");
        assert_eq!(rec.capture_selection(), CaptureOutcome::Duplicate("Hello".into()));
        assert_eq!(rec.log().selected_count(), 1);
    }

    #[test]
    fn capture_failure_keeps_recording() {
        let provider = ScriptedProvider::new().failing_send_keys();
        let (mut rec, _) = recorder(provider);
        assert!(matches!(rec.capture_selection(), CaptureOutcome::Failed(_)));
        assert_eq!(rec.state(), RecorderState::Recording);
        rec.handle(InputEvent::Click { x: 1, y: 1 });
        assert_eq!(rec.log().len(), 1);
    }

    #[test]
    fn discard_resets() {
        let (mut rec, _) = recorder(ScriptedProvider::new());
        rec.handle(InputEvent::Click { x: 1, y: 1 });
        assert_eq!(rec.discard(), 1);
        assert_eq!(rec.state(), RecorderState::Idle);
        assert!(rec.handle(InputEvent::Click { x: 1, y: 1 }).is_none());
    }

    #[test]
    fn shifted_space_stays_in_message() {
        let (mut rec, _) = recorder(ScriptedProvider::new());
        let shift = Modifiers {
            shift: true,
            ..Modifiers::NONE
        };
        rec.handle(InputEvent::Key(KeyInput::new("H").with_modifiers(shift)));
        rec.handle(key("i"));
        rec.handle(InputEvent::Key(KeyInput::new("space").with_modifiers(shift)));
        rec.handle(InputEvent::Key(KeyInput::new("Y").with_modifiers(shift)));
        rec.handle(key("o"));
        let fb = rec.handle(key("enter"));

        assert_eq!(fb, Some(Feedback::Recorded("Type message: Hi Yo".into())));
        assert!(matches!(
            rec.log().actions(),
            [Action::Message { text, .. }] if text == "Hi Yo"
        ));
    }

    #[test]
    fn unreplayable_keys_are_not_recorded() {
        let (mut rec, _) = recorder(ScriptedProvider::new());
        assert_eq!(rec.handle(key("printscreen")), None);
        assert_eq!(rec.handle(key("unknown(255)")), None);
        assert_eq!(
            rec.handle(InputEvent::Key(KeyInput::combo("ctrl+numlock"))),
            None
        );
        rec.handle(key("f5"));
        assert!(matches!(
            rec.log().actions(),
            [Action::KeyPress { key, .. }] if key == "f5"
        ));
    }

    #[test]
    fn copy_keystroke_echo_is_swallowed_once() {
        let (mut rec, clipboard) = recorder(ScriptedProvider::new());
        clipboard.queue_selection("invoice 42");
        rec.handle(key("f8"));
        assert_eq!(rec.handle(InputEvent::Key(KeyInput::combo("ctrl+c"))), None);

        // A real ctrl+c afterwards is the user's and is kept
        rec.handle(InputEvent::Key(KeyInput::combo("ctrl+c")));
        assert_eq!(rec.log().len(), 2);
        assert!(matches!(rec.log().actions()[0], Action::TextCapture { .. }));
        assert!(matches!(
            &rec.log().actions()[1],
            Action::KeyPress { key, .. } if key == "ctrl+c"
        ));
    }

    struct PanickingClipboard;

    impl ClipboardProvider for PanickingClipboard {
        fn clear(&mut self) -> retrace_core::Result<()> {
            Ok(())
        }

        fn read(&mut self) -> retrace_core::Result<String> {
            panic!("clipboard backend crashed")
        }

        fn write(&mut self, _text: &str) -> retrace_core::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn panicking_clipboard_fails_capture_only() {
        let provider = ScriptedProvider::new().accepting_window("WhatsApp");
        let mut rec = ActionRecorder::new(Arc::new(provider), PanickingClipboard, quick_config());
        rec.start("WhatsApp").unwrap();

        assert_eq!(
            rec.capture_selection(),
            CaptureOutcome::Failed("clipboard read panicked".into())
        );
        assert_eq!(rec.state(), RecorderState::Recording);
        rec.handle(InputEvent::Click { x: 5, y: 5 });
        assert_eq!(rec.finalize().unwrap().log.len(), 1);
    }
}
