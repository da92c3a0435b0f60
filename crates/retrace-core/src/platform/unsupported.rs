//! Provider for platforms without an automation backend

use crate::element::Descriptor;
use crate::provider::AutomationProvider;
use crate::{Error, Result};

pub type DesktopProvider = UnsupportedProvider;

pub fn provider() -> Result<DesktopProvider> {
    Ok(UnsupportedProvider)
}

/// Fails every call with `NOT_IMPLEMENTED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedProvider;

fn unavailable() -> Error {
    Error::not_implemented("UI automation").with_suggestions(vec![
        "Run retrace on Windows to record or replay against a live window".to_string(),
        "Use `retrace replay --dry-run` to check an artifact on this machine".to_string(),
    ])
}

impl AutomationProvider for UnsupportedProvider {
    type Element = ();

    fn connect(&self, _window_title: &str) -> Result<()> {
        Err(unavailable())
    }

    fn element_at_point(&self, _x: i32, _y: i32) -> Result<Option<Descriptor>> {
        Err(unavailable())
    }

    fn find_child(&self, _root: &(), _name: &str, _control_type: &str) -> Result<Option<()>> {
        Err(unavailable())
    }

    fn children(&self, _element: &()) -> Result<Vec<()>> {
        Err(unavailable())
    }

    fn describe(&self, _element: &()) -> Result<Descriptor> {
        Err(unavailable())
    }

    fn click_element(&self, _element: &()) -> Result<()> {
        Err(unavailable())
    }

    fn click_at(&self, _x: i32, _y: i32) -> Result<()> {
        Err(unavailable())
    }

    fn send_keys(&self, _target: &(), _keys: &str) -> Result<()> {
        Err(unavailable())
    }
}
