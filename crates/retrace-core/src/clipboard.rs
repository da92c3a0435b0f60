//! System clipboard backed by arboard

use crate::error::{Error, Result};
use crate::provider::ClipboardProvider;

/// Opens the OS clipboard for every call; nothing is held between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Self {
        Self
    }

    fn open() -> Result<arboard::Clipboard> {
        arboard::Clipboard::new().map_err(Error::clipboard)
    }
}

impl ClipboardProvider for SystemClipboard {
    fn clear(&mut self) -> Result<()> {
        Self::open()?.clear().map_err(Error::clipboard)
    }

    fn read(&mut self) -> Result<String> {
        match Self::open()?.get_text() {
            Ok(text) => Ok(text),
            // Empty or non-text clipboard reads as ""
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(e) => Err(Error::clipboard(e)),
        }
    }

    fn write(&mut self, text: &str) -> Result<()> {
        Self::open()?
            .set_text(text.to_string())
            .map_err(Error::clipboard)
    }
}
