//! retrace-core - Automation seams for recording and replaying GUI sessions
//!
//! Everything that touches the live desktop goes through two traits,
//! [`AutomationProvider`] and [`ClipboardProvider`]. On top of them sit the
//! typed element [`Descriptor`], the failure-absorbing [`ElementResolver`],
//! control tree dumps in [`inspect`] and the send-keys notation in [`keys`].
//!
//! ## Platform Support
//!
//! - **Windows**: UI Automation + SendInput
//! - **macOS / Linux**: provider reports `NOT_IMPLEMENTED`; the scripted
//!   provider in [`stub`] still works everywhere

pub mod clipboard;
pub mod element;
pub mod error;
pub mod inspect;
pub mod keys;
pub mod platform;
pub mod provider;
pub mod resolver;
pub mod stub;

pub use clipboard::SystemClipboard;
pub use element::Descriptor;
pub use error::{Error, ErrorCode, Result};
pub use provider::{AutomationProvider, ClipboardProvider};
pub use resolver::ElementResolver;

pub mod prelude {
    pub use crate::clipboard::SystemClipboard;
    pub use crate::element::Descriptor;
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::platform::DesktopProvider;
    pub use crate::provider::{AutomationProvider, ClipboardProvider};
    pub use crate::resolver::ElementResolver;
}
