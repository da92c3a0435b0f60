//! Global hooks through rdev
//!
//! `rdev::listen` blocks its thread for the life of the process and cannot
//! be stopped, so one listener thread is started on first use and feeds
//! whichever sink is currently installed.

use crate::capture::{HookSink, InputEvent, InputSource, KeyInput};
use parking_lot::{const_mutex, Mutex};
use rdev::{Button, Event, EventType, Key};
use retrace_core::keys::Modifiers;
use retrace_core::{Error, Result};
use std::sync::Once;
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

static SINK: Mutex<Option<HookSink>> = const_mutex(None);
static LISTEN_ERROR: Mutex<Option<String>> = const_mutex(None);
static LISTENER: Once = Once::new();

/// Time allowed for the listener to report a startup failure.
const STARTUP_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub struct RdevSource;

impl InputSource for RdevSource {
    fn subscribe(&mut self, sink: HookSink) -> Result<()> {
        if let Some(reason) = LISTEN_ERROR.lock().clone() {
            return Err(Error::hook_unavailable(reason));
        }
        *SINK.lock() = Some(sink);

        let mut started = false;
        LISTENER.call_once(|| {
            started = true;
            let spawned = thread::Builder::new()
                .name("rdev-listen".into())
                .spawn(listen);
            if let Err(e) = spawned {
                *LISTEN_ERROR.lock() = Some(format!("could not start hook thread: {}", e));
            }
        });

        if started {
            thread::sleep(STARTUP_GRACE);
        }
        if let Some(reason) = LISTEN_ERROR.lock().clone() {
            SINK.lock().take();
            return Err(Error::hook_unavailable(reason).with_suggestions(vec![
                "On macOS, grant Input Monitoring and Accessibility to your terminal".to_string(),
            ]));
        }
        Ok(())
    }

    fn unsubscribe(&mut self) {
        SINK.lock().take();
    }
}

fn listen() {
    let mut state = HookState::default();
    if let Err(e) = rdev::listen(move |event| {
        if let Some(input) = state.translate(&event) {
            if let Some(sink) = SINK.lock().as_ref() {
                sink.deliver(input);
            }
        }
    }) {
        error!(error = ?e, "global input hook failed");
        *LISTEN_ERROR.lock() = Some(format!("global input hook failed: {:?}", e));
    }
}

/// Modifier and pointer state carried between raw hook events.
#[derive(Debug, Default)]
struct HookState {
    modifiers: Modifiers,
    pointer: Option<(f64, f64)>,
}

impl HookState {
    fn translate(&mut self, event: &Event) -> Option<InputEvent> {
        match event.event_type {
            EventType::MouseMove { x, y } => {
                self.pointer = Some((x, y));
                None
            }
            EventType::ButtonPress(Button::Left) => {
                let Some((x, y)) = self.pointer else {
                    debug!("click before any pointer position, ignored");
                    return None;
                };
                Some(InputEvent::Click {
                    x: x.round() as i32,
                    y: y.round() as i32,
                })
            }
            EventType::KeyPress(key) => {
                if self.set_modifier(key, true) {
                    return None;
                }
                let Some(name) = key_name(key, event.name.as_deref(), self.modifiers) else {
                    debug!(?key, "key has no replayable name, ignored");
                    return None;
                };
                Some(InputEvent::Key(KeyInput::new(name).with_modifiers(self.modifiers)))
            }
            EventType::KeyRelease(key) => {
                self.set_modifier(key, false);
                None
            }
            _ => None,
        }
    }

    /// Track a modifier key. Returns false for every other key.
    fn set_modifier(&mut self, key: Key, down: bool) -> bool {
        match key {
            Key::ControlLeft | Key::ControlRight => self.modifiers.ctrl = down,
            Key::ShiftLeft | Key::ShiftRight => self.modifiers.shift = down,
            Key::Alt | Key::AltGr => self.modifiers.alt = down,
            Key::MetaLeft | Key::MetaRight | Key::CapsLock => {}
            _ => return false,
        }
        true
    }
}

/// Recorded name for a key, or `None` for keys send-keys notation cannot
/// express (print screen, lock keys, vendor keys).
fn key_name(key: Key, typed: Option<&str>, mods: Modifiers) -> Option<String> {
    if let Some(named) = named_key(key) {
        return Some(named.to_string());
    }
    // With ctrl/alt held the typed text is a control code; use the base key
    if mods.is_command() {
        if let Some(c) = base_char(key) {
            return Some(c.to_string());
        }
    }
    if let Some(text) = typed {
        let mut chars = text.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if !c.is_control() {
                return Some(c.to_string());
            }
        }
    }
    match base_char(key) {
        Some(c) if mods.shift => Some(c.to_ascii_uppercase().to_string()),
        Some(c) => Some(c.to_string()),
        None => None,
    }
}

fn named_key(key: Key) -> Option<&'static str> {
    Some(match key {
        Key::Return | Key::KpReturn => "enter",
        Key::Tab => "tab",
        Key::Escape => "esc",
        Key::Backspace => "backspace",
        Key::Delete | Key::KpDelete => "delete",
        Key::Insert => "insert",
        Key::UpArrow => "up",
        Key::DownArrow => "down",
        Key::LeftArrow => "left",
        Key::RightArrow => "right",
        Key::Home => "home",
        Key::End => "end",
        Key::PageUp => "page up",
        Key::PageDown => "page down",
        Key::Space => "space",
        Key::F1 => "f1",
        Key::F2 => "f2",
        Key::F3 => "f3",
        Key::F4 => "f4",
        Key::F5 => "f5",
        Key::F6 => "f6",
        Key::F7 => "f7",
        Key::F8 => "f8",
        Key::F9 => "f9",
        Key::F10 => "f10",
        Key::F11 => "f11",
        Key::F12 => "f12",
        _ => return None,
    })
}

fn base_char(key: Key) -> Option<char> {
    Some(match key {
        Key::KeyA => 'a', Key::KeyB => 'b', Key::KeyC => 'c', Key::KeyD => 'd',
        Key::KeyE => 'e', Key::KeyF => 'f', Key::KeyG => 'g', Key::KeyH => 'h',
        Key::KeyI => 'i', Key::KeyJ => 'j', Key::KeyK => 'k', Key::KeyL => 'l',
        Key::KeyM => 'm', Key::KeyN => 'n', Key::KeyO => 'o', Key::KeyP => 'p',
        Key::KeyQ => 'q', Key::KeyR => 'r', Key::KeyS => 's', Key::KeyT => 't',
        Key::KeyU => 'u', Key::KeyV => 'v', Key::KeyW => 'w', Key::KeyX => 'x',
        Key::KeyY => 'y', Key::KeyZ => 'z',
        Key::Num0 => '0', Key::Num1 => '1', Key::Num2 => '2', Key::Num3 => '3',
        Key::Num4 => '4', Key::Num5 => '5', Key::Num6 => '6', Key::Num7 => '7',
        Key::Num8 => '8', Key::Num9 => '9',
        Key::Minus | Key::KpMinus => '-',
        Key::KpPlus => '+',
        Key::KpMultiply => '*',
        Key::KpDivide => '/',
        Key::Kp0 => '0', Key::Kp1 => '1', Key::Kp2 => '2', Key::Kp3 => '3',
        Key::Kp4 => '4', Key::Kp5 => '5', Key::Kp6 => '6', Key::Kp7 => '7',
        Key::Kp8 => '8', Key::Kp9 => '9',
        Key::Equal => '=',
        Key::LeftBracket => '[',
        Key::RightBracket => ']',
        Key::SemiColon => ';',
        Key::Quote => '\'',
        Key::BackSlash => '\\',
        Key::Comma => ',',
        Key::Dot => '.',
        Key::Slash => '/',
        Key::BackQuote => '`',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::keys::{combo_name, is_sendable_key};
    use std::time::SystemTime;

    fn event(event_type: EventType, name: Option<&str>) -> Event {
        Event {
            time: SystemTime::now(),
            name: name.map(String::from),
            event_type,
        }
    }

    #[test]
    fn click_uses_last_pointer_position() {
        let mut state = HookState::default();
        assert_eq!(state.translate(&event(EventType::ButtonPress(Button::Left), None)), None);
        state.translate(&event(EventType::MouseMove { x: 99.6, y: 200.2 }, None));
        assert_eq!(
            state.translate(&event(EventType::ButtonPress(Button::Left), None)),
            Some(InputEvent::Click { x: 100, y: 200 })
        );
    }

    #[test]
    fn ctrl_combo_reports_base_key() {
        let mut state = HookState::default();
        assert_eq!(state.translate(&event(EventType::KeyPress(Key::ControlLeft), None)), None);
        let got = state.translate(&event(EventType::KeyPress(Key::KeyR), Some("\u{12}")));
        assert_eq!(got, Some(InputEvent::Key(KeyInput::combo("ctrl+r"))));
        state.translate(&event(EventType::KeyRelease(Key::ControlLeft), None));
        let got = state.translate(&event(EventType::KeyPress(Key::KeyR), Some("r")));
        assert_eq!(got, Some(InputEvent::Key(KeyInput::new("r"))));
    }

    #[test]
    fn typed_text_wins_for_printable_keys() {
        let mut state = HookState::default();
        state.translate(&event(EventType::KeyPress(Key::ShiftLeft), None));
        let got = state.translate(&event(EventType::KeyPress(Key::Num1), Some("!")));
        assert!(matches!(got, Some(InputEvent::Key(KeyInput { ref key, .. })) if key == "!"));
        let got = state.translate(&event(EventType::KeyPress(Key::F8), None));
        assert!(matches!(got, Some(InputEvent::Key(KeyInput { ref key, .. })) if key == "f8"));
    }

    #[test]
    fn every_reported_key_is_replayable() {
        let keys = [
            Key::Return, Key::KpReturn, Key::Tab, Key::Escape, Key::Backspace,
            Key::Delete, Key::KpDelete, Key::Insert, Key::UpArrow, Key::DownArrow,
            Key::LeftArrow, Key::RightArrow, Key::Home, Key::End, Key::PageUp,
            Key::PageDown, Key::Space, Key::F1, Key::F5, Key::F12,
            Key::KeyA, Key::KeyZ, Key::Num0, Key::Num9, Key::Minus, Key::Equal,
            Key::LeftBracket, Key::RightBracket, Key::SemiColon, Key::Quote,
            Key::BackSlash, Key::Comma, Key::Dot, Key::Slash, Key::BackQuote,
            Key::KpMinus, Key::KpPlus, Key::KpMultiply, Key::KpDivide, Key::Kp0,
            Key::Kp9, Key::PrintScreen, Key::ScrollLock, Key::Pause, Key::NumLock,
            Key::Unknown(255),
        ];

        let held = [
            Modifiers::NONE,
            Modifiers { shift: true, ..Modifiers::NONE },
            Modifiers { ctrl: true, ..Modifiers::NONE },
            Modifiers { ctrl: true, alt: true, shift: true },
        ];
        let mut reported = 0;
        for mods in held {
            for key in &keys {
                let mut state = HookState { modifiers: mods, pointer: None };
                let Some(InputEvent::Key(input)) = state.translate(&event(EventType::KeyPress(*key), None)) else {
                    continue;
                };
                reported += 1;
                let name = combo_name(&input.key.to_lowercase(), input.modifiers);
                assert!(is_sendable_key(&name), "{:?} reported as unsendable '{}'", key, name);
            }
        }
        assert!(reported > 0);

        let mut state = HookState::default();
        for key in [Key::PrintScreen, Key::NumLock, Key::Pause, Key::ScrollLock, Key::Unknown(255)] {
            assert_eq!(state.translate(&event(EventType::KeyPress(key), None)), None);
        }
    }
}
