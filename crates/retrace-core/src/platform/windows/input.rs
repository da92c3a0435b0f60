//! Windows input injection via SendInput

use std::thread;
use std::time::Duration;

use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSE_EVENT_FLAGS, MOUSEINPUT, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::SetCursorPos;

use crate::keys::{KeyStroke, Modifiers, NamedKey};
use crate::{Error, ErrorCode, Result};

pub fn move_mouse(x: i32, y: i32) -> Result<()> {
    unsafe {
        SetCursorPos(x, y).map_err(|e| {
            Error::new(ErrorCode::ActionFailed, format!("Failed to move mouse: {:?}", e))
        })?;
    }
    Ok(())
}

pub fn click_at(x: i32, y: i32) -> Result<()> {
    move_mouse(x, y)?;
    thread::sleep(Duration::from_millis(10));
    send_inputs(&[
        make_mouse_input(MOUSEEVENTF_LEFTDOWN),
        make_mouse_input(MOUSEEVENTF_LEFTUP),
    ])
}

/// Inject decoded key strokes, wrapping each in its modifiers.
pub fn send_strokes(strokes: &[KeyStroke]) -> Result<()> {
    let mut inputs = Vec::new();
    for stroke in strokes {
        match *stroke {
            KeyStroke::Named { key, modifiers } => {
                with_modifiers(&mut inputs, modifiers, |inputs| {
                    inputs.push(make_key_input(named_vk(key), false));
                    inputs.push(make_key_input(named_vk(key), true));
                });
            }
            KeyStroke::Char { ch, modifiers } if modifiers != Modifiers::NONE => {
                // Shortcuts need virtual keys; unicode input ignores modifiers
                let code = char_vk(ch).ok_or_else(|| {
                    Error::action_failed("send_keys", &format!("no virtual key for '{}'", ch))
                })?;
                with_modifiers(&mut inputs, modifiers, |inputs| {
                    inputs.push(make_key_input(code, false));
                    inputs.push(make_key_input(code, true));
                });
            }
            KeyStroke::Char { ch, .. } => {
                let mut buf = [0u16; 2];
                for unit in ch.encode_utf16(&mut buf) {
                    inputs.push(make_unicode_input(*unit, false));
                    inputs.push(make_unicode_input(*unit, true));
                }
            }
        }
    }
    send_inputs(&inputs)
}

fn with_modifiers(inputs: &mut Vec<INPUT>, mods: Modifiers, body: impl FnOnce(&mut Vec<INPUT>)) {
    let held: Vec<u16> = [(mods.ctrl, vk::CONTROL), (mods.shift, vk::SHIFT), (mods.alt, vk::ALT)]
        .into_iter()
        .filter_map(|(on, code)| on.then_some(code))
        .collect();
    for &code in &held {
        inputs.push(make_key_input(code, false));
    }
    body(inputs);
    for &code in held.iter().rev() {
        inputs.push(make_key_input(code, true));
    }
}

fn named_vk(key: NamedKey) -> u16 {
    match key {
        NamedKey::Enter => vk::RETURN,
        NamedKey::Tab => vk::TAB,
        NamedKey::Escape => vk::ESCAPE,
        NamedKey::Backspace => vk::BACKSPACE,
        NamedKey::Delete => vk::DELETE,
        NamedKey::Insert => vk::INSERT,
        NamedKey::Up => vk::UP,
        NamedKey::Down => vk::DOWN,
        NamedKey::Left => vk::LEFT,
        NamedKey::Right => vk::RIGHT,
        NamedKey::Home => vk::HOME,
        NamedKey::End => vk::END,
        NamedKey::PageUp => vk::PAGE_UP,
        NamedKey::PageDown => vk::PAGE_DOWN,
        NamedKey::Space => vk::SPACE,
        NamedKey::F(n) => vk::F1 + u16::from(n.saturating_sub(1)),
    }
}

fn char_vk(ch: char) -> Option<u16> {
    match ch.to_ascii_uppercase() {
        c @ ('A'..='Z' | '0'..='9') => Some(c as u16),
        ' ' => Some(vk::SPACE),
        _ => None,
    }
}

fn make_mouse_input(flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn make_key_input(code: u16, key_up: bool) -> INPUT {
    let flags = if key_up { KEYEVENTF_KEYUP } else { KEYBD_EVENT_FLAGS(0) };

    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(code),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn make_unicode_input(unit: u16, key_up: bool) -> INPUT {
    let mut flags = KEYEVENTF_UNICODE;
    if key_up {
        flags |= KEYEVENTF_KEYUP;
    }

    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(0),
                wScan: unit,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send_inputs(inputs: &[INPUT]) -> Result<()> {
    if inputs.is_empty() {
        return Ok(());
    }
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };

    if sent as usize != inputs.len() {
        return Err(Error::new(
            ErrorCode::ActionFailed,
            format!("SendInput failed: sent {} of {} inputs", sent, inputs.len()),
        ));
    }

    Ok(())
}

/// Virtual key codes used by the send-keys decoder
pub mod vk {
    pub const BACKSPACE: u16 = 0x08;
    pub const TAB: u16 = 0x09;
    pub const RETURN: u16 = 0x0D;
    pub const SHIFT: u16 = 0x10;
    pub const CONTROL: u16 = 0x11;
    pub const ALT: u16 = 0x12;
    pub const ESCAPE: u16 = 0x1B;
    pub const SPACE: u16 = 0x20;
    pub const PAGE_UP: u16 = 0x21;
    pub const PAGE_DOWN: u16 = 0x22;
    pub const END: u16 = 0x23;
    pub const HOME: u16 = 0x24;
    pub const LEFT: u16 = 0x25;
    pub const UP: u16 = 0x26;
    pub const RIGHT: u16 = 0x27;
    pub const DOWN: u16 = 0x28;
    pub const INSERT: u16 = 0x2D;
    pub const DELETE: u16 = 0x2E;
    pub const F1: u16 = 0x70;
}
