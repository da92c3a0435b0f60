//! No global hooks on this platform

use crate::capture::{HookSink, InputSource};
use retrace_core::{Error, Result};

#[derive(Debug, Default)]
pub struct NoHooks;

impl InputSource for NoHooks {
    fn subscribe(&mut self, _sink: HookSink) -> Result<()> {
        Err(Error::hook_unavailable(
            "Global input hooks are not available on this platform",
        )
        .with_suggestions(vec!["Record on Windows or macOS".to_string()]))
    }

    fn unsubscribe(&mut self) {}
}
