//! Key names and send-keys notation
//!
//! Recorded key presses are stored by name (`up`, `enter`, `ctrl+a`, `x`).
//! Providers are driven with a compact send-keys notation:
//!
//!   {UP} {ENTER} {F5}   - named keys
//!   ^c  +a  %{F4}       - ctrl / shift / alt applied to the next key
//!   {+} {^} {{} {}}     - literal special characters
//!   ~                   - enter

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const SPECIAL_CHARS: &[char] = &['+', '^', '%', '~', '(', ')', '{', '}', '[', ']'];

const MODIFIER_NAMES: &[&str] = &[
    "ctrl", "control", "left ctrl", "right ctrl",
    "shift", "left shift", "right shift",
    "alt", "altgr", "alt gr", "left alt", "right alt",
    "meta", "win", "windows", "left windows", "right windows", "cmd", "command",
    "caps lock", "capslock",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { ctrl: false, shift: false, alt: false };

    /// Ctrl or Alt held: the key is a command, not typed text.
    pub fn is_command(&self) -> bool {
        self.ctrl || self.alt
    }

    fn name_prefix(&self) -> String {
        let mut s = String::new();
        if self.ctrl { s.push_str("ctrl+"); }
        if self.alt { s.push_str("alt+"); }
        if self.shift { s.push_str("shift+"); }
        s
    }

    fn notation_prefix(&self) -> String {
        let mut s = String::new();
        if self.ctrl { s.push('^'); }
        if self.alt { s.push('%'); }
        if self.shift { s.push('+'); }
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Insert,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Space,
    F(u8),
}

impl NamedKey {
    /// Parse a recorded key name.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        Some(match lower.as_str() {
            "enter" | "return" => Self::Enter,
            "tab" => Self::Tab,
            "esc" | "escape" => Self::Escape,
            "backspace" => Self::Backspace,
            "delete" | "del" => Self::Delete,
            "insert" => Self::Insert,
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "home" => Self::Home,
            "end" => Self::End,
            "page up" | "pageup" | "page_up" => Self::PageUp,
            "page down" | "pagedown" | "page_down" => Self::PageDown,
            "space" => Self::Space,
            f if f.starts_with('f') => {
                let n: u8 = f[1..].parse().ok()?;
                if (1..=24).contains(&n) { Self::F(n) } else { return None; }
            }
            _ => return None,
        })
    }

    /// Canonical recorded name.
    pub fn name(&self) -> String {
        match self {
            Self::Enter => "enter".into(),
            Self::Tab => "tab".into(),
            Self::Escape => "esc".into(),
            Self::Backspace => "backspace".into(),
            Self::Delete => "delete".into(),
            Self::Insert => "insert".into(),
            Self::Up => "up".into(),
            Self::Down => "down".into(),
            Self::Left => "left".into(),
            Self::Right => "right".into(),
            Self::Home => "home".into(),
            Self::End => "end".into(),
            Self::PageUp => "page up".into(),
            Self::PageDown => "page down".into(),
            Self::Space => "space".into(),
            Self::F(n) => format!("f{}", n),
        }
    }

    /// Token used inside braces in send-keys notation.
    pub fn token(&self) -> String {
        match self {
            Self::Enter => "ENTER".into(),
            Self::Tab => "TAB".into(),
            Self::Escape => "ESC".into(),
            Self::Backspace => "BACKSPACE".into(),
            Self::Delete => "DELETE".into(),
            Self::Insert => "INSERT".into(),
            Self::Up => "UP".into(),
            Self::Down => "DOWN".into(),
            Self::Left => "LEFT".into(),
            Self::Right => "RIGHT".into(),
            Self::Home => "HOME".into(),
            Self::End => "END".into(),
            Self::PageUp => "PGUP".into(),
            Self::PageDown => "PGDN".into(),
            Self::Space => "SPACE".into(),
            Self::F(n) => format!("F{}", n),
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        let upper = token.to_uppercase();
        Some(match upper.as_str() {
            "ENTER" => Self::Enter,
            "TAB" => Self::Tab,
            "ESC" | "ESCAPE" => Self::Escape,
            "BACKSPACE" | "BS" | "BKSP" => Self::Backspace,
            "DELETE" | "DEL" => Self::Delete,
            "INSERT" | "INS" => Self::Insert,
            "PGUP" | "PAGEUP" => Self::PageUp,
            "PGDN" | "PAGEDOWN" => Self::PageDown,
            "SPACE" => Self::Space,
            "UP" => Self::Up,
            "DOWN" => Self::Down,
            "LEFT" => Self::Left,
            "RIGHT" => Self::Right,
            "HOME" => Self::Home,
            "END" => Self::End,
            f if f.starts_with('F') && f.len() > 1 => {
                let n: u8 = f[1..].parse().ok()?;
                if (1..=24).contains(&n) { Self::F(n) } else { return None; }
            }
            _ => return None,
        })
    }
}

/// One key press decoded from send-keys notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStroke {
    Char { ch: char, modifiers: Modifiers },
    Named { key: NamedKey, modifiers: Modifiers },
}

/// Whether `name` is a bare modifier key (these are never recorded).
pub fn is_modifier_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    MODIFIER_NAMES.contains(&lower.as_str())
}

/// Split `ctrl+shift+a` into its modifiers and base key.
pub fn split_combo(key: &str) -> (Modifiers, &str) {
    let mut mods = Modifiers::default();
    let mut rest = key;
    loop {
        let lower = rest.to_lowercase();
        let (prefix_len, flag) = if lower.starts_with("ctrl+") {
            (5, &mut mods.ctrl)
        } else if lower.starts_with("alt+") {
            (4, &mut mods.alt)
        } else if lower.starts_with("shift+") {
            (6, &mut mods.shift)
        } else {
            break;
        };
        // A bare "ctrl+" has no base key left, so it is not a combo
        if rest.len() == prefix_len {
            break;
        }
        *flag = true;
        rest = &rest[prefix_len..];
    }
    (mods, rest)
}

/// Build the recorded name for a key pressed with `modifiers`.
pub fn combo_name(base: &str, modifiers: Modifiers) -> String {
    format!("{}{}", modifiers.name_prefix(), base)
}

/// Convert a recorded key name into send-keys notation.
pub fn key_to_send_keys(key: &str) -> String {
    let (mods, base) = split_combo(key);
    let body = if let Some(named) = NamedKey::from_name(base) {
        format!("{{{}}}", named.token())
    } else if base.chars().count() == 1 {
        escape_char(base.chars().next().unwrap_or(' '))
    } else {
        format!("{{{}}}", base.to_uppercase())
    };
    format!("{}{}", mods.notation_prefix(), body)
}

/// Whether a recorded key name can be replayed through send-keys notation.
pub fn is_sendable_key(key: &str) -> bool {
    parse_send_keys(&key_to_send_keys(key)).is_ok()
}

/// Convert literal text into send-keys notation that types it verbatim.
pub fn text_to_send_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' => out.push_str("{ENTER}"),
            '\r' => {}
            '\t' => out.push_str("{TAB}"),
            c => out.push_str(&escape_char(c)),
        }
    }
    out
}

fn escape_char(ch: char) -> String {
    if SPECIAL_CHARS.contains(&ch) {
        format!("{{{}}}", ch)
    } else {
        ch.to_string()
    }
}

/// Decode send-keys notation into individual key strokes.
pub fn parse_send_keys(keys: &str) -> Result<Vec<KeyStroke>> {
    let mut strokes = Vec::new();
    let mut mods = Modifiers::default();
    let mut chars = keys.chars();

    while let Some(c) = chars.next() {
        match c {
            '^' => mods.ctrl = true,
            '+' => mods.shift = true,
            '%' => mods.alt = true,
            '~' | '\n' => {
                strokes.push(KeyStroke::Named { key: NamedKey::Enter, modifiers: mods });
                mods = Modifiers::default();
            }
            '{' => {
                // First char is always content so "{}}" yields a literal '}'
                let first = chars
                    .next()
                    .ok_or_else(|| invalid(keys, "unterminated '{'"))?;
                let mut token = String::from(first);
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => token.push(ch),
                        None => return Err(invalid(keys, "unterminated '{'")),
                    }
                }
                let stroke = if token.chars().count() == 1 {
                    KeyStroke::Char { ch: first, modifiers: mods }
                } else {
                    let key = NamedKey::from_token(&token)
                        .ok_or_else(|| invalid(keys, &format!("unknown key {{{}}}", token)))?;
                    KeyStroke::Named { key, modifiers: mods }
                };
                strokes.push(stroke);
                mods = Modifiers::default();
            }
            ch => {
                strokes.push(KeyStroke::Char { ch, modifiers: mods });
                mods = Modifiers::default();
            }
        }
    }

    if mods != Modifiers::default() {
        return Err(invalid(keys, "modifier without a key"));
    }
    Ok(strokes)
}

fn invalid(keys: &str, reason: &str) -> Error {
    Error::action_failed("send_keys", &format!("{} in '{}'", reason, keys))
}
