//! Seams to the external automation and clipboard layers
//!
//! The recorder and replay engine only ever talk to the desktop through
//! these two traits. Platform implementations live in [`crate::platform`],
//! test doubles in [`crate::stub`].

use crate::element::Descriptor;
use crate::error::Result;

/// Accessibility/automation layer used to inspect and drive the target app.
pub trait AutomationProvider: Send + Sync + 'static {
    /// Live element handle. Handles are cheap to clone and may be moved to
    /// a helper thread for time-bounded queries.
    type Element: Clone + Send + 'static;

    /// Attach to the top-level window whose title contains `window_title`.
    fn connect(&self, window_title: &str) -> Result<Self::Element>;

    /// Describe the element under a screen point, if any.
    fn element_at_point(&self, x: i32, y: i32) -> Result<Option<Descriptor>>;

    /// Find a descendant of `root` whose name and control type both match
    /// exactly.
    fn find_child(
        &self,
        root: &Self::Element,
        name: &str,
        control_type: &str,
    ) -> Result<Option<Self::Element>>;

    /// Direct children of `element` in the control view, in order.
    fn children(&self, element: &Self::Element) -> Result<Vec<Self::Element>>;

    /// Properties of a live element.
    fn describe(&self, element: &Self::Element) -> Result<Descriptor>;

    fn click_element(&self, element: &Self::Element) -> Result<()>;

    fn click_at(&self, x: i32, y: i32) -> Result<()>;

    /// Send keys in send-keys notation (see [`crate::keys`]) to `target`.
    fn send_keys(&self, target: &Self::Element, keys: &str) -> Result<()>;
}

/// System-wide text buffer.
pub trait ClipboardProvider: Send {
    fn clear(&mut self) -> Result<()>;
    fn read(&mut self) -> Result<String>;
    fn write(&mut self, text: &str) -> Result<()>;
}

impl<C: ClipboardProvider + ?Sized> ClipboardProvider for Box<C> {
    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn read(&mut self) -> Result<String> {
        (**self).read()
    }

    fn write(&mut self, text: &str) -> Result<()> {
        (**self).write(text)
    }
}
