//! Windows provider: UI Automation for lookups, SendInput for input

pub mod accessibility;
pub mod input;

use std::cell::Cell;

use tracing::debug;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{CoInitializeEx, COINIT_MULTITHREADED};

use crate::element::Descriptor;
use crate::keys::parse_send_keys;
use crate::provider::AutomationProvider;
use crate::{Error, ErrorCode, Result};

use accessibility::{Automation, Element};

pub type DesktopProvider = UiaProvider;

pub fn provider() -> Result<DesktopProvider> {
    UiaProvider::new()
}

thread_local! {
    static COM_READY: Cell<bool> = const { Cell::new(false) };
}

/// Join the multithreaded apartment once per thread.
///
/// Lookups may run on short-lived helper threads, so every entry point
/// calls this before touching UI Automation.
pub(crate) fn init_com() -> Result<()> {
    if COM_READY.with(|c| c.get()) {
        return Ok(());
    }
    let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
    // A thread already in an STA can still make UIA calls
    if hr.is_err() && hr != RPC_E_CHANGED_MODE {
        return Err(Error::new(
            ErrorCode::ProviderUnavailable,
            format!("COM init failed: {:?}", hr),
        ));
    }
    COM_READY.with(|c| c.set(true));
    Ok(())
}

pub struct UiaProvider {
    automation: Automation,
}

impl UiaProvider {
    pub fn new() -> Result<Self> {
        Ok(Self {
            automation: Automation::new()?,
        })
    }
}

impl AutomationProvider for UiaProvider {
    type Element = Element;

    fn connect(&self, window_title: &str) -> Result<Element> {
        init_com()?;
        accessibility::find_window(&self.automation, window_title)?
            .ok_or_else(|| Error::provider_unavailable(window_title))
    }

    fn element_at_point(&self, x: i32, y: i32) -> Result<Option<Descriptor>> {
        init_com()?;
        let element = self.automation.element_at(x, y)?;
        Ok(Some(element.descriptor()))
    }

    fn find_child(&self, root: &Element, name: &str, control_type: &str) -> Result<Option<Element>> {
        init_com()?;
        let walker = self.automation.tree_walker()?;
        Ok(accessibility::find_descendant(&walker, root, name, control_type))
    }

    fn children(&self, element: &Element) -> Result<Vec<Element>> {
        init_com()?;
        let walker = self.automation.tree_walker()?;
        Ok(accessibility::children(&walker, element))
    }

    fn describe(&self, element: &Element) -> Result<Descriptor> {
        init_com()?;
        Ok(element.descriptor())
    }

    fn click_element(&self, element: &Element) -> Result<()> {
        init_com()?;
        let (x, y) = element.clickable_point().ok_or_else(|| {
            Error::action_failed("click", "element has no clickable point")
        })?;
        input::click_at(x, y)
    }

    fn click_at(&self, x: i32, y: i32) -> Result<()> {
        input::click_at(x, y)
    }

    fn send_keys(&self, target: &Element, keys: &str) -> Result<()> {
        init_com()?;
        let strokes = parse_send_keys(keys)?;
        if let Err(e) = target.set_focus() {
            debug!(error = %e, "could not focus target before sending keys");
        }
        input::send_strokes(&strokes)
    }
}
