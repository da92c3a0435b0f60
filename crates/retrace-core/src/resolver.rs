//! Failure-absorbing element lookups
//!
//! Every provider error, panic or timeout becomes `None` plus a log line.
//! Callers fall back (coordinates, skip) instead of aborting.

use crate::element::Descriptor;
use crate::error::Error;
use crate::provider::AutomationProvider;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ElementResolver<P: AutomationProvider> {
    provider: Arc<P>,
    timeout: Option<Duration>,
}

impl<P: AutomationProvider> Clone for ElementResolver<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            timeout: self.timeout,
        }
    }
}

impl<P: AutomationProvider> ElementResolver<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    /// Bound each query. Queries that run past the bound are abandoned on
    /// their helper thread and reported as "not found".
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Describe the element under a screen point.
    pub fn resolve_at_point(&self, x: i32, y: i32) -> Option<Descriptor> {
        let found = self.guarded("element_at_point", move |p| p.element_at_point(x, y));
        match found {
            Some(Some(desc)) => Some(desc),
            _ => {
                debug!(x, y, "no element at point");
                None
            }
        }
    }

    /// Locate a live element under `root` by exact name and control type.
    pub fn find_by_descriptor(&self, root: &P::Element, desc: &Descriptor) -> Option<P::Element> {
        if !desc.is_addressable() {
            return None;
        }
        let root = root.clone();
        let name = desc.name.clone();
        let control_type = desc.control_type.clone();
        match self.guarded("find_child", move |p| p.find_child(&root, &name, &control_type)) {
            Some(Some(el)) => Some(el),
            _ => {
                debug!(target_element = %desc, "descriptor did not resolve");
                None
            }
        }
    }

    fn guarded<T, F>(&self, op: &'static str, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&P) -> crate::Result<T> + Send + 'static,
    {
        let Some(timeout) = self.timeout else {
            return run_caught(op, self.provider.as_ref(), f);
        };

        let (tx, rx) = bounded(1);
        let provider = Arc::clone(&self.provider);
        let spawned = thread::Builder::new()
            .name(format!("resolve-{}", op))
            .spawn(move || {
                let _ = tx.send(run_caught(op, provider.as_ref(), f));
            });
        if let Err(e) = spawned {
            warn!(op, error = %e, "could not spawn lookup thread");
            return None;
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let err = Error::timeout(op, timeout.as_millis() as u64);
                warn!(op, error = %err, "lookup abandoned");
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

fn run_caught<P, T, F>(op: &'static str, provider: &P, f: F) -> Option<T>
where
    F: FnOnce(&P) -> crate::Result<T>,
{
    match catch_unwind(AssertUnwindSafe(|| f(provider))) {
        Ok(Ok(v)) => Some(v),
        Ok(Err(e)) => {
            debug!(op, error = %e, "lookup failed");
            None
        }
        Err(_) => {
            warn!(op, "provider panicked during lookup");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::ScriptedProvider;
    use std::time::Instant;

    #[test]
    fn resolves_known_point() {
        let provider = ScriptedProvider::new()
            .with_element_at(10, 20, Descriptor::new("Chat A", "ListItem"));
        let resolver = ElementResolver::new(Arc::new(provider));
        assert_eq!(
            resolver.resolve_at_point(10, 20),
            Some(Descriptor::new("Chat A", "ListItem"))
        );
        assert_eq!(resolver.resolve_at_point(0, 0), None);
    }

    #[test]
    fn provider_errors_become_none() {
        let provider = ScriptedProvider::new().failing_lookups();
        let resolver = ElementResolver::new(Arc::new(provider));
        assert_eq!(resolver.resolve_at_point(10, 20), None);
    }

    #[test]
    fn slow_lookup_times_out() {
        let provider = ScriptedProvider::new()
            .with_element_at(1, 1, Descriptor::new("Slow", "Button"))
            .with_lookup_delay(Duration::from_millis(500));
        let resolver =
            ElementResolver::new(Arc::new(provider)).with_timeout(Duration::from_millis(50));
        let started = Instant::now();
        assert_eq!(resolver.resolve_at_point(1, 1), None);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn unnamed_descriptor_is_never_queried() {
        let provider = Arc::new(ScriptedProvider::new().accepting_window("App"));
        let resolver = ElementResolver::new(Arc::clone(&provider));
        let root = provider.connect("App").unwrap();
        assert!(resolver
            .find_by_descriptor(&root, &Descriptor::new("", "Pane"))
            .is_none());
        assert_eq!(provider.find_calls(), 0);
    }
}
