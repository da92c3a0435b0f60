//! Replay artifacts - recorded sessions as readable procedures
//!
//! An artifact carries everything replay needs: the target window, and
//! for each step the action, both ways of reaching its element and the
//! delay that follows it.
//!
//! ```text
//! # retrace replay procedure
//! target "WhatsApp"
//!
//! step 1 click at 2026-10-17T10:00:01.123456Z
//!   find name="Chat A" control_type="ListItem"
//!   or click 100 200
//!   wait 1000
//! end
//! ```

use crate::action::{Action, ActionLog, RecordedSession, CLIPBOARD_METHOD};
use chrono::{DateTime, SecondsFormat, Utc};
use retrace_core::keys::{key_to_send_keys, text_to_send_keys};
use retrace_core::Descriptor;
use std::fmt::Write as _;
use std::iter::Peekable;
use std::str::Chars;
use std::time::Duration;
use thiserror::Error;

pub const HEADER: &str = "# retrace replay procedure";

/// Delay after each kind of step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub click: Duration,
    pub key: Duration,
    pub message: Duration,
    pub capture: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            click: Duration::from_millis(1000),
            key: Duration::from_millis(500),
            message: Duration::from_millis(1000),
            capture: Duration::from_millis(1000),
        }
    }
}

impl Pacing {
    /// No delays at all.
    pub fn none() -> Self {
        Self {
            click: Duration::ZERO,
            key: Duration::ZERO,
            message: Duration::ZERO,
            capture: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, action: &Action) -> Duration {
        match action {
            Action::Click { .. } => self.click,
            Action::KeyPress { .. } => self.key,
            Action::Message { .. } => self.message,
            Action::TextCapture { .. } => self.capture,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub delay: Duration,
}

/// Parsed form of a replay artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    pub target: String,
    pub steps: Vec<Step>,
}

impl Procedure {
    pub fn from_log(target: impl Into<String>, log: &ActionLog, pacing: &Pacing) -> Self {
        Self {
            target: target.into(),
            steps: log
                .iter()
                .map(|action| Step {
                    action: action.clone(),
                    delay: pacing.delay_for(action),
                })
                .collect(),
        }
    }

    pub fn from_session(session: &RecordedSession, pacing: &Pacing) -> Self {
        Self::from_log(session.target.clone(), &session.log, pacing)
    }

    /// Replace every step's delay.
    pub fn with_pacing(mut self, pacing: &Pacing) -> Self {
        for step in &mut self.steps {
            step.delay = pacing.delay_for(&step.action);
        }
        self
    }

    pub fn actions(&self) -> ActionLog {
        ActionLog::from(self.steps.iter().map(|s| s.action.clone()).collect::<Vec<_>>())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("artifact has no target line")]
    MissingTarget,

    #[error("step {step} starting on line {line} has no 'end'")]
    UnterminatedStep { step: usize, line: usize },
}

// ============================================================================
// Generation
// ============================================================================

pub fn generate(procedure: &Procedure) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", HEADER);
    let _ = writeln!(out, "# {} steps; each click tries the element first, then its coordinates", procedure.steps.len());
    let _ = writeln!(out, "target {}", quote(&procedure.target));

    for (i, step) in procedure.steps.iter().enumerate() {
        out.push('\n');
        write_step(&mut out, i + 1, step);
    }
    out
}

fn write_step(out: &mut String, number: usize, step: &Step) {
    let action = &step.action;
    let _ = writeln!(
        out,
        "step {} {} at {}",
        number,
        action.kind(),
        action.timestamp().to_rfc3339_opts(SecondsFormat::AutoSi, true)
    );

    match action {
        Action::Click { x, y, descriptor: Some(d), .. } if d.is_addressable() => {
            let _ = writeln!(out, "  find {}", descriptor_attrs(d));
            let _ = writeln!(out, "  or click {} {}", x, y);
        }
        Action::Click { x, y, descriptor, .. } => {
            if let Some(d) = descriptor {
                let _ = writeln!(out, "  note {}", descriptor_attrs(d));
            }
            let _ = writeln!(out, "  click {} {}", x, y);
        }
        Action::KeyPress { key, .. } => {
            let _ = writeln!(out, "  press {} send={}", quote(key), quote(&key_to_send_keys(key)));
        }
        Action::Message { text, .. } => {
            let _ = writeln!(out, "  type {} send={}", quote(text), quote(&message_keys(text)));
        }
        Action::TextCapture { text, method, .. } => {
            let _ = writeln!(out, "  verify {} method={}", quote(text), quote(method));
        }
    }

    let _ = writeln!(out, "  wait {}", step.delay.as_millis());
    out.push_str("end\n");
}

/// Send-keys for typing a message and submitting it.
pub fn message_keys(text: &str) -> String {
    format!("{}{{ENTER}}", text_to_send_keys(text))
}

fn descriptor_attrs(d: &Descriptor) -> String {
    let mut s = format!("name={} control_type={}", quote(&d.name), quote(&d.control_type));
    if let Some(id) = &d.automation_id {
        let _ = write!(s, " automation_id={}", quote(id));
    }
    if let Some(class) = &d.class_name {
        let _ = write!(s, " class_name={}", quote(class));
    }
    s
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Eq,
}

struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn consume_while<F>(&mut self, predicate: F) -> String
    where
        F: Fn(char) -> bool,
    {
        let mut result = String::new();
        while let Some(&c) = self.chars.peek() {
            if predicate(c) {
                result.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        result
    }

    fn quoted(&mut self) -> Result<String, String> {
        self.chars.next(); // opening quote
        let mut result = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '"' => return Ok(result),
                '\\' => match self.chars.next() {
                    Some('\\') => result.push('\\'),
                    Some('"') => result.push('"'),
                    Some('n') => result.push('\n'),
                    Some('r') => result.push('\r'),
                    Some('t') => result.push('\t'),
                    Some(other) => return Err(format!("unknown escape '\\{}'", other)),
                    None => break,
                },
                c => result.push(c),
            }
        }
        Err("unterminated string".to_string())
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token, String>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }

        let c = *self.chars.peek()?;
        if c == '"' {
            return Some(self.quoted().map(Token::Str));
        }
        if c == '=' {
            self.chars.next();
            return Some(Ok(Token::Eq));
        }
        let word = self.consume_while(|c| !c.is_whitespace() && c != '=' && c != '"');
        Some(Ok(Token::Word(word)))
    }
}

/// Tokens of one line, consumed front to back.
struct Line {
    number: usize,
    tokens: std::vec::IntoIter<Token>,
}

impl Line {
    fn error(&self, message: impl Into<String>) -> ArtifactError {
        ArtifactError::Syntax {
            line: self.number,
            message: message.into(),
        }
    }

    fn word(&mut self, what: &str) -> Result<String, ArtifactError> {
        match self.tokens.next() {
            Some(Token::Word(w)) => Ok(w),
            _ => Err(self.error(format!("expected {}", what))),
        }
    }

    fn keyword(&mut self, expected: &str) -> Result<(), ArtifactError> {
        match self.tokens.next() {
            Some(Token::Word(w)) if w == expected => Ok(()),
            _ => Err(self.error(format!("expected '{}'", expected))),
        }
    }

    fn string(&mut self, what: &str) -> Result<String, ArtifactError> {
        match self.tokens.next() {
            Some(Token::Str(s)) => Ok(s),
            _ => Err(self.error(format!("expected quoted {}", what))),
        }
    }

    fn number<T: std::str::FromStr>(&mut self, what: &str) -> Result<T, ArtifactError> {
        let word = self.word(what)?;
        word.parse()
            .map_err(|_| self.error(format!("invalid {}: '{}'", what, word)))
    }

    /// Remaining `key="value"` pairs.
    fn attrs(&mut self) -> Result<Vec<(String, String)>, ArtifactError> {
        let mut attrs = Vec::new();
        while let Some(token) = self.tokens.next() {
            let Token::Word(key) = token else {
                return Err(self.error("expected attribute name"));
            };
            if self.tokens.next() != Some(Token::Eq) {
                return Err(self.error(format!("expected '=' after {}", key)));
            }
            let value = self.string(&key)?;
            attrs.push((key, value));
        }
        Ok(attrs)
    }

    fn finish(&mut self) -> Result<(), ArtifactError> {
        match self.tokens.next() {
            None => Ok(()),
            Some(t) => Err(self.error(format!("unexpected {:?}", t))),
        }
    }
}

#[derive(Default)]
struct StepBuilder {
    line: usize,
    number: usize,
    kind: String,
    timestamp: Option<DateTime<Utc>>,
    descriptor: Option<Descriptor>,
    point: Option<(i32, i32)>,
    text: Option<String>,
    method: Option<String>,
    delay: Option<Duration>,
}

impl StepBuilder {
    fn build(self, line: &Line) -> Result<Step, ArtifactError> {
        let timestamp = self
            .timestamp
            .ok_or_else(|| line.error("step has no timestamp"))?;
        let action = match self.kind.as_str() {
            "click" => {
                let (x, y) = self
                    .point
                    .ok_or_else(|| line.error(format!("click step {} has no coordinates", self.number)))?;
                Action::Click {
                    timestamp,
                    x,
                    y,
                    descriptor: self.descriptor,
                }
            }
            "key" => Action::KeyPress {
                timestamp,
                key: self
                    .text
                    .ok_or_else(|| line.error(format!("key step {} has no press line", self.number)))?,
            },
            "message" => Action::Message {
                timestamp,
                text: self
                    .text
                    .ok_or_else(|| line.error(format!("message step {} has no type line", self.number)))?,
            },
            "capture" => Action::TextCapture {
                timestamp,
                text: self
                    .text
                    .ok_or_else(|| line.error(format!("capture step {} has no verify line", self.number)))?,
                method: self.method.unwrap_or_else(|| CLIPBOARD_METHOD.to_string()),
            },
            other => return Err(line.error(format!("unknown step kind '{}'", other))),
        };
        let delay = self
            .delay
            .unwrap_or_else(|| Pacing::default().delay_for(&action));
        Ok(Step { action, delay })
    }
}

fn descriptor_from(line: &Line, attrs: Vec<(String, String)>) -> Result<Descriptor, ArtifactError> {
    let mut name = None;
    let mut control_type = None;
    let mut automation_id = None;
    let mut class_name = None;
    for (key, value) in attrs {
        match key.as_str() {
            "name" => name = Some(value),
            "control_type" => control_type = Some(value),
            "automation_id" => automation_id = Some(value),
            "class_name" => class_name = Some(value),
            other => return Err(line.error(format!("unknown element property '{}'", other))),
        }
    }
    Ok(Descriptor {
        name: name.ok_or_else(|| line.error("element has no name"))?,
        control_type: control_type.ok_or_else(|| line.error("element has no control_type"))?,
        automation_id,
        class_name,
    })
}

/// Parse an artifact produced by [`generate`].
pub fn parse(input: &str) -> Result<Procedure, ArtifactError> {
    let mut target = None;
    let mut steps = Vec::new();
    let mut current: Option<StepBuilder> = None;

    for (idx, raw) in input.lines().enumerate() {
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let tokens = Tokenizer::new(text)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| ArtifactError::Syntax { line: idx + 1, message })?;
        let mut line = Line {
            number: idx + 1,
            tokens: tokens.into_iter(),
        };
        let head = line.word("keyword")?;

        if current.is_none() {
            match head.as_str() {
                "target" => {
                    target = Some(line.string("window title")?);
                    line.finish()?;
                }
                "step" => {
                    let number: usize = line.number("step number")?;
                    if number != steps.len() + 1 {
                        return Err(line.error(format!(
                            "expected step {}, found step {}",
                            steps.len() + 1,
                            number
                        )));
                    }
                    let kind = line.word("step kind")?;
                    line.keyword("at")?;
                    let stamp = line.word("timestamp")?;
                    let timestamp = DateTime::parse_from_rfc3339(&stamp)
                        .map_err(|e| line.error(format!("bad timestamp '{}': {}", stamp, e)))?
                        .with_timezone(&Utc);
                    line.finish()?;
                    current = Some(StepBuilder {
                        line: line.number,
                        number,
                        kind,
                        timestamp: Some(timestamp),
                        ..StepBuilder::default()
                    });
                }
                other => return Err(line.error(format!("expected 'target' or 'step', found '{}'", other))),
            }
            continue;
        }
        let Some(step) = current.as_mut() else {
            continue;
        };

        match head.as_str() {
            "find" | "note" => {
                let attrs = line.attrs()?;
                step.descriptor = Some(descriptor_from(&line, attrs)?);
            }
            "or" | "click" => {
                if head == "or" {
                    line.keyword("click")?;
                }
                let x = line.number("x coordinate")?;
                let y = line.number("y coordinate")?;
                line.finish()?;
                step.point = Some((x, y));
            }
            "press" | "type" => {
                step.text = Some(line.string("text")?);
                // send= is derived from the text; accepted and ignored
                line.attrs()?;
            }
            "verify" => {
                step.text = Some(line.string("text")?);
                for (key, value) in line.attrs()? {
                    if key == "method" {
                        step.method = Some(value);
                    }
                }
            }
            "wait" => {
                let ms: u64 = line.number("delay")?;
                line.finish()?;
                step.delay = Some(Duration::from_millis(ms));
            }
            "end" => {
                line.finish()?;
                if let Some(builder) = current.take() {
                    steps.push(builder.build(&line)?);
                }
            }
            other => return Err(line.error(format!("unknown instruction '{}'", other))),
        }
    }

    if let Some(open) = current {
        return Err(ArtifactError::UnterminatedStep {
            step: open.number,
            line: open.line,
        });
    }

    Ok(Procedure {
        target: target.ok_or(ArtifactError::MissingTarget)?,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, sec).unwrap() + chrono::Duration::microseconds(123_456)
    }

    fn sample_log() -> ActionLog {
        ActionLog::from(vec![
            Action::Click {
                timestamp: ts(1),
                x: 100,
                y: 200,
                descriptor: Some(Descriptor::new("Chat A", "ListItem").with_automation_id("chat-a")),
            },
            Action::Click {
                timestamp: ts(2),
                x: 300,
                y: 400,
                descriptor: None,
            },
            Action::Click {
                timestamp: ts(3),
                x: -5,
                y: 7,
                descriptor: Some(Descriptor::new("", "Pane").with_class_name("Chrome_WidgetWin_1")),
            },
            Action::KeyPress { timestamp: ts(4), key: "ctrl+a".into() },
            Action::Message {
                timestamp: ts(5),
                text: "say \"hi\" \\ 🦋\nnext line\ttab".into(),
            },
            Action::TextCapture {
                timestamp: ts(6),
                text: "Hello 👋".into(),
                method: CLIPBOARD_METHOD.into(),
            },
        ])
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let procedure = Procedure::from_log("WhatsApp", &sample_log(), &Pacing::default());
        let text = generate(&procedure);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed, procedure);
        assert_eq!(parsed.actions(), sample_log());
    }

    #[test]
    fn clicks_get_lookup_or_coordinate_blocks() {
        let text = generate(&Procedure::from_log("WhatsApp", &sample_log(), &Pacing::default()));
        assert_eq!(text.matches("  find ").count(), 1);
        assert_eq!(text.matches("  or click ").count(), 1);
        assert!(text.contains("  find name=\"Chat A\" control_type=\"ListItem\" automation_id=\"chat-a\"\n  or click 100 200"));
        assert!(text.contains("  click 300 400\n"));
        assert!(text.contains("  note name=\"\" control_type=\"Pane\""));
    }

    #[test]
    fn steps_carry_send_keys_and_pacing() {
        let text = generate(&Procedure::from_log("WhatsApp", &sample_log(), &Pacing::default()));
        assert!(text.contains("press \"ctrl+a\" send=\"^a\"\n  wait 500"));
        assert!(text.contains("verify \"Hello 👋\" method=\"clipboard\"\n  wait 1000"));
        assert!(text.contains("next line\\ttab\" send="));
    }

    #[test]
    fn pacing_override() {
        let procedure = Procedure::from_log("App", &sample_log(), &Pacing::default()).with_pacing(&Pacing::none());
        assert!(procedure.steps.iter().all(|s| s.delay.is_zero()));
    }

    #[test]
    fn missing_wait_uses_default_pacing() {
        let text = "target \"App\"\nstep 1 key at 2026-10-17T10:00:00Z\n  press \"up\"\nend\n";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.steps[0].delay, Duration::from_millis(500));
    }

    #[test]
    fn parse_errors_name_the_line() {
        let err = parse("target \"App\"\nstep 1 click at 2026-10-17T10:00:00Z\n  click 1\nend\n").unwrap_err();
        assert!(matches!(err, ArtifactError::Syntax { line: 3, .. }));

        let err = parse("step 1 key at 2026-10-17T10:00:00Z\n  press \"up\"\nend\n").unwrap_err();
        assert_eq!(err, ArtifactError::MissingTarget);

        let err = parse("target \"App\"\nstep 1 key at 2026-10-17T10:00:00Z\n  press \"up\"\n").unwrap_err();
        assert_eq!(err, ArtifactError::UnterminatedStep { step: 1, line: 2 });

        let err = parse("target \"App\n").unwrap_err();
        assert!(matches!(err, ArtifactError::Syntax { line: 1, .. }));

        let err = parse("target \"App\"\nstep 2 key at 2026-10-17T10:00:00Z\n").unwrap_err();
        assert!(matches!(err, ArtifactError::Syntax { line: 2, .. }));
    }

    #[test]
    fn empty_procedure_round_trips() {
        let procedure = Procedure { target: "WhatsApp".into(), steps: Vec::new() };
        assert_eq!(parse(&generate(&procedure)).unwrap(), procedure);
    }
}
