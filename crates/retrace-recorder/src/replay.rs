//! Replay a recorded procedure against the live target
//!
//! Steps run one at a time, in order. A step that cannot be carried out
//! is reported and skipped; the rest of the procedure still runs.

use crate::action::{Action, ActionLog};
use crate::artifact::{message_keys, Pacing, Procedure};
use retrace_core::keys::key_to_send_keys;
use retrace_core::{AutomationProvider, ClipboardProvider, ElementResolver, Error, Result};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Element found by its properties and clicked
    Resolved,
    /// Element lookup or click failed; clicked the recorded point instead
    FallbackSucceeded { reason: String },
    /// No usable element properties; clicked the recorded point
    CoordinateClick,
    KeySent,
    MessageSent,
    ClipboardVerified,
    /// Clipboard did not round-trip the captured text (warning only)
    ClipboardMismatch { reason: String },
    Failed { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed { .. })
    }

    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Outcome::FallbackSucceeded { .. } | Outcome::ClipboardMismatch { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Resolved => "resolved",
            Outcome::FallbackSucceeded { .. } => "fallback",
            Outcome::CoordinateClick => "coordinates",
            Outcome::KeySent => "sent",
            Outcome::MessageSent => "sent",
            Outcome::ClipboardVerified => "verified",
            Outcome::ClipboardMismatch { .. } => "mismatch",
            Outcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub description: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub target: String,
    pub steps: Vec<StepReport>,
}

impl ReplayReport {
    pub fn succeeded(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.steps.len() - self.succeeded()
    }

    pub fn fallbacks(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::FallbackSucceeded { .. }))
            .count()
    }

    pub fn warnings(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_warning()).count()
    }

    /// Every step succeeded (warnings allowed).
    pub fn passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {}/{} steps succeeded, {} via fallback, {} warnings",
            if self.passed() { "PASS" } else { "FAIL" },
            self.succeeded(),
            self.steps.len(),
            self.fallbacks(),
            self.warnings()
        )
    }
}

pub struct ReplayEngine<P: AutomationProvider, C: ClipboardProvider> {
    resolver: ElementResolver<P>,
    clipboard: C,
}

impl<P: AutomationProvider, C: ClipboardProvider> ReplayEngine<P, C> {
    pub fn new(provider: Arc<P>, clipboard: C) -> Self {
        Self {
            resolver: ElementResolver::new(provider),
            clipboard,
        }
    }

    /// Bound each element lookup.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.resolver = self.resolver.with_timeout(timeout);
        self
    }

    /// Replay a procedure. Fails only when the target cannot be reached.
    pub fn play(&mut self, procedure: &Procedure) -> Result<ReplayReport> {
        self.play_with(procedure, |_| {})
    }

    /// Replay an action log with the given pacing.
    pub fn play_log(&mut self, target: &str, log: &ActionLog, pacing: &Pacing) -> Result<ReplayReport> {
        self.play(&Procedure::from_log(target, log, pacing))
    }

    /// Replay, calling `on_step` as each step finishes.
    pub fn play_with<F>(&mut self, procedure: &Procedure, mut on_step: F) -> Result<ReplayReport>
    where
        F: FnMut(&StepReport),
    {
        let root = self.resolver.provider().connect(&procedure.target)?;
        info!(target_window = %procedure.target, steps = procedure.steps.len(), "replay started");

        let mut report = ReplayReport {
            target: procedure.target.clone(),
            steps: Vec::with_capacity(procedure.steps.len()),
        };

        for (i, step) in procedure.steps.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| self.run_step(&root, &step.action)))
                .unwrap_or_else(|_| Outcome::Failed {
                    reason: "provider panicked".to_string(),
                });

            match &outcome {
                Outcome::Failed { reason } => warn!(step = i + 1, %reason, "step failed"),
                Outcome::FallbackSucceeded { reason } => {
                    warn!(step = i + 1, %reason, "used coordinate fallback")
                }
                Outcome::ClipboardMismatch { reason } => {
                    warn!(step = i + 1, %reason, "clipboard check mismatch")
                }
                other => info!(step = i + 1, outcome = other.label(), "step done"),
            }

            let step_report = StepReport {
                step: i + 1,
                description: step.action.describe(),
                outcome,
            };
            on_step(&step_report);
            report.steps.push(step_report);

            if !step.delay.is_zero() {
                thread::sleep(step.delay);
            }
        }

        info!(summary = %report.summary(), "replay finished");
        Ok(report)
    }

    fn run_step(&mut self, root: &P::Element, action: &Action) -> Outcome {
        let provider = Arc::clone(self.resolver.provider());
        match action {
            Action::Click { x, y, descriptor, .. } => {
                let Some(desc) = descriptor.as_ref().filter(|d| d.is_addressable()) else {
                    return match provider.click_at(*x, *y) {
                        Ok(()) => Outcome::CoordinateClick,
                        Err(e) => Outcome::Failed { reason: e.message },
                    };
                };

                let reason = match self.resolver.find_by_descriptor(root, desc) {
                    Some(element) => match provider.click_element(&element) {
                        Ok(()) => return Outcome::Resolved,
                        Err(e) => format!("element click failed: {}", e.message),
                    },
                    None => Error::element_not_found(&desc.name, &desc.control_type).message,
                };

                match provider.click_at(*x, *y) {
                    Ok(()) => Outcome::FallbackSucceeded { reason },
                    Err(e) => Outcome::Failed {
                        reason: format!("{}; coordinate click failed: {}", reason, e.message),
                    },
                }
            }
            Action::KeyPress { key, .. } => match provider.send_keys(root, &key_to_send_keys(key)) {
                Ok(()) => Outcome::KeySent,
                Err(e) => Outcome::Failed { reason: e.message },
            },
            Action::Message { text, .. } => match provider.send_keys(root, &message_keys(text)) {
                Ok(()) => Outcome::MessageSent,
                Err(e) => Outcome::Failed { reason: e.message },
            },
            Action::TextCapture { text, .. } => self.verify_clipboard(text),
        }
    }

    fn verify_clipboard(&mut self, text: &str) -> Outcome {
        if let Err(e) = self.clipboard.write(text) {
            return Outcome::ClipboardMismatch { reason: e.message };
        }
        match self.clipboard.read() {
            Ok(read) if read == text => Outcome::ClipboardVerified,
            Ok(read) => Outcome::ClipboardMismatch {
                reason: format!("read back {} chars, expected {}", read.chars().count(), text.chars().count()),
            },
            Err(e) => Outcome::ClipboardMismatch { reason: e.message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::CLIPBOARD_METHOD;
    use chrono::Utc;
    use retrace_core::stub::{MemoryClipboard, ScriptedProvider};
    use retrace_core::{Descriptor, ErrorCode};

    fn engine(provider: ScriptedProvider) -> (ReplayEngine<ScriptedProvider, MemoryClipboard>, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider.accepting_window("WhatsApp"));
        (ReplayEngine::new(Arc::clone(&provider), MemoryClipboard::new()), provider)
    }

    fn click(x: i32, y: i32, desc: Option<Descriptor>) -> Action {
        Action::Click { timestamp: Utc::now(), x, y, descriptor: desc }
    }

    #[test]
    fn unreachable_target_is_fatal() {
        let mut engine = ReplayEngine::new(Arc::new(ScriptedProvider::new()), MemoryClipboard::new());
        let log = ActionLog::from(vec![click(1, 1, None)]);
        let err = engine.play_log("WhatsApp", &log, &Pacing::none()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ProviderUnavailable);
    }

    #[test]
    fn resolved_click_skips_coordinates() {
        let (mut engine, provider) = engine(ScriptedProvider::new().with_findable("Send", "Button"));
        let log = ActionLog::from(vec![click(5, 5, Some(Descriptor::new("Send", "Button")))]);
        let report = engine.play_log("WhatsApp", &log, &Pacing::none()).unwrap();
        assert_eq!(report.steps[0].outcome, Outcome::Resolved);
        assert_eq!(provider.element_clicks(), vec!["Send".to_string()]);
        assert!(provider.coordinate_clicks().is_empty());
    }

    #[test]
    fn failed_element_click_falls_back() {
        let provider = ScriptedProvider::new()
            .with_findable("Send", "Button")
            .failing_element_clicks();
        let (mut engine, provider) = engine(provider);
        let log = ActionLog::from(vec![click(5, 6, Some(Descriptor::new("Send", "Button")))]);
        let report = engine.play_log("WhatsApp", &log, &Pacing::none()).unwrap();
        assert!(matches!(report.steps[0].outcome, Outcome::FallbackSucceeded { .. }));
        assert_eq!(provider.coordinate_clicks(), vec![(5, 6)]);
    }

    #[test]
    fn lookup_errors_fall_back() {
        let (mut engine, provider) = engine(ScriptedProvider::new().failing_lookups());
        let log = ActionLog::from(vec![click(7, 8, Some(Descriptor::new("Chat A", "ListItem")))]);
        let report = engine.play_log("WhatsApp", &log, &Pacing::none()).unwrap();
        assert!(matches!(report.steps[0].outcome, Outcome::FallbackSucceeded { .. }));
        assert_eq!(provider.coordinate_clicks(), vec![(7, 8)]);
    }

    #[test]
    fn unnamed_descriptor_goes_straight_to_coordinates() {
        let (mut engine, provider) = engine(ScriptedProvider::new());
        let log = ActionLog::from(vec![click(1, 2, Some(Descriptor::new("", "Pane")))]);
        let report = engine.play_log("WhatsApp", &log, &Pacing::none()).unwrap();
        assert_eq!(report.steps[0].outcome, Outcome::CoordinateClick);
        assert_eq!(provider.find_calls(), 0);
    }

    #[test]
    fn failures_do_not_stop_replay() {
        let (mut engine, provider) = engine(ScriptedProvider::new().failing_send_keys());
        let log = ActionLog::from(vec![
            Action::KeyPress { timestamp: Utc::now(), key: "up".into() },
            Action::Message { timestamp: Utc::now(), text: "hi {there}".into() },
            click(3, 4, None),
        ]);
        let report = engine.play_log("WhatsApp", &log, &Pacing::none()).unwrap();
        assert_eq!(report.failed(), 2);
        assert_eq!(report.steps[2].outcome, Outcome::CoordinateClick);
        assert!(!report.passed());
        assert!(report.summary().starts_with("FAIL: 1/3"));
        assert_eq!(provider.sent_keys(), vec!["{UP}".to_string(), "hi {{}there{}}{ENTER}".to_string()]);
    }

    #[test]
    fn capture_steps_check_clipboard() {
        let (mut engine, _) = engine(ScriptedProvider::new());
        let log = ActionLog::from(vec![Action::TextCapture {
            timestamp: Utc::now(),
            text: "Hello".into(),
            method: CLIPBOARD_METHOD.into(),
        }]);
        let report = engine.play_log("WhatsApp", &log, &Pacing::none()).unwrap();
        assert_eq!(report.steps[0].outcome, Outcome::ClipboardVerified);

        let mut broken = ReplayEngine::new(
            Arc::new(ScriptedProvider::new().accepting_window("WhatsApp")),
            MemoryClipboard::unavailable(),
        );
        let report = broken.play_log("WhatsApp", &log, &Pacing::none()).unwrap();
        assert!(matches!(report.steps[0].outcome, Outcome::ClipboardMismatch { .. }));
        assert!(report.passed());
        assert_eq!(report.warnings(), 1);
    }

    #[test]
    fn report_serializes_flat() {
        let report = StepReport {
            step: 1,
            description: "Click at (1, 2)".into(),
            outcome: Outcome::FallbackSucceeded { reason: "gone".into() },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "fallback_succeeded");
        assert_eq!(json["reason"], "gone");
    }
}
