//! Event capture - bridges global input hooks to the recorder
//!
//! Hook callbacks run on threads we do not own. They only ever touch a
//! [`HookSink`]: an armed flag, a latched control signal and a bounded
//! channel. Everything slower happens on the consumer side of the channel.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use retrace_core::keys::{combo_name, split_combo, Modifiers};
use retrace_core::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A key press as reported by a hook, modifiers already folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    /// Printable character (`a`, `A`, `?`) or key name (`enter`, `f8`)
    pub key: String,
    pub modifiers: Modifiers,
}

impl KeyInput {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifiers: Modifiers::NONE,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// `ctrl+r` style combo.
    pub fn combo(key: &str) -> Self {
        let (modifiers, base) = split_combo(key);
        Self::new(base).with_modifiers(modifiers)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Click { x: i32, y: i32 },
    Key(KeyInput),
}

/// Key plus exact modifier set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotkey {
    key: String,
    modifiers: Modifiers,
}

impl Hotkey {
    /// Parse `ctrl+r`, `esc`, `f8`.
    pub fn parse(spec: &str) -> Self {
        let (modifiers, base) = split_combo(spec.trim());
        Self {
            key: base.to_lowercase(),
            modifiers,
        }
    }

    pub fn matches(&self, input: &KeyInput) -> bool {
        input.modifiers == self.modifiers && input.key.to_lowercase() == self.key
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&combo_name(&self.key, self.modifiers))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop and save the session
    Stop,
    /// Cancel and discard the session
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Armed,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub stop_hotkey: Hotkey,
    pub cancel_hotkey: Hotkey,
    /// How often the control loop checks for a signal
    pub poll_interval: Duration,
    /// Events buffered between hook and recorder before drops start
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stop_hotkey: Hotkey::parse("ctrl+r"),
            cancel_hotkey: Hotkey::parse("esc"),
            poll_interval: Duration::from_millis(100),
            channel_capacity: 1024,
        }
    }
}

/// Source of global input events (OS hooks, or a script in tests).
pub trait InputSource {
    /// Start delivering events to `sink`.
    fn subscribe(&mut self, sink: HookSink) -> Result<()>;

    /// Stop delivering events. Must be safe to call more than once.
    fn unsubscribe(&mut self);
}

struct SinkShared {
    armed: AtomicBool,
    signal: Mutex<Option<ControlSignal>>,
    stop: Hotkey,
    cancel: Hotkey,
    dropped: AtomicUsize,
}

/// What hook callbacks talk to. Never blocks.
#[derive(Clone)]
pub struct HookSink {
    shared: Arc<SinkShared>,
    tx: Sender<InputEvent>,
}

impl HookSink {
    fn new(tx: Sender<InputEvent>, config: &CaptureConfig) -> Self {
        Self {
            shared: Arc::new(SinkShared {
                armed: AtomicBool::new(false),
                signal: Mutex::new(None),
                stop: config.stop_hotkey.clone(),
                cancel: config.cancel_hotkey.clone(),
                dropped: AtomicUsize::new(0),
            }),
            tx,
        }
    }

    /// Hand one event over from a hook callback.
    pub fn deliver(&self, event: InputEvent) {
        if !self.is_armed() {
            return;
        }

        if let InputEvent::Key(key) = &event {
            if self.shared.stop.matches(key) {
                self.latch(ControlSignal::Stop);
                return;
            }
            if self.shared.cancel.matches(key) {
                self.latch(ControlSignal::Cancel);
                return;
            }
        }

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("input queue full, event dropped");
            }
            Err(TrySendError::Disconnected(_)) => debug!("input queue closed"),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::Acquire)
    }

    /// The latched control signal, if any.
    pub fn signal(&self) -> Option<ControlSignal> {
        *self.shared.signal.lock()
    }

    /// Events lost to a full queue.
    pub fn dropped(&self) -> usize {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Record `signal` unless one is already latched; disarms either way.
    fn latch(&self, signal: ControlSignal) {
        let mut slot = self.shared.signal.lock();
        self.shared.armed.store(false, Ordering::Release);
        if slot.is_none() {
            info!(?signal, "control signal received");
            *slot = Some(signal);
        }
    }

    fn set_armed(&self, armed: bool) {
        self.shared.armed.store(armed, Ordering::Release);
    }
}

/// Hook lifecycle: `Idle -> Armed -> Stopped`.
pub struct EventCapture<S: InputSource> {
    source: S,
    config: CaptureConfig,
    state: CaptureState,
    sink: Option<HookSink>,
}

impl<S: InputSource> EventCapture<S> {
    pub fn new(source: S, config: CaptureConfig) -> Self {
        Self {
            source,
            config,
            state: CaptureState::Idle,
            sink: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Subscribe the source and start forwarding events. Returns the
    /// consumer end of the event queue.
    pub fn arm(&mut self) -> Result<Receiver<InputEvent>> {
        if self.state != CaptureState::Idle {
            return Err(Error::hook_unavailable("capture was already armed"));
        }

        let (tx, rx) = bounded(self.config.channel_capacity.max(1));
        let sink = HookSink::new(tx, &self.config);
        sink.set_armed(true);
        if let Err(e) = self.source.subscribe(sink.clone()) {
            sink.set_armed(false);
            return Err(e);
        }

        info!(
            stop = %self.config.stop_hotkey,
            cancel = %self.config.cancel_hotkey,
            "capture armed"
        );
        self.sink = Some(sink);
        self.state = CaptureState::Armed;
        Ok(rx)
    }

    /// Block until a control signal is latched or `interrupt` is raised.
    ///
    /// An interrupt counts as Cancel. Returns `None` when not armed.
    pub fn wait_for_signal(&self, interrupt: &AtomicBool) -> Option<ControlSignal> {
        let sink = self.sink.as_ref()?;
        loop {
            if let Some(signal) = sink.signal() {
                return Some(signal);
            }
            if interrupt.load(Ordering::SeqCst) {
                sink.latch(ControlSignal::Cancel);
                continue;
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Unsubscribe the source. Queued events stay in the channel.
    pub fn disarm(&mut self) -> Option<ControlSignal> {
        let signal = self.sink.as_ref().and_then(|s| {
            s.set_armed(false);
            s.signal()
        });
        self.source.unsubscribe();
        if let Some(sink) = self.sink.take() {
            let dropped = sink.dropped();
            if dropped > 0 {
                warn!(dropped, "events were dropped during capture");
            }
        }
        self.state = CaptureState::Stopped;
        signal
    }
}

/// Delivers a fixed list of events from its own thread.
///
/// Stands in for OS hooks in tests and demos.
pub struct ScriptedSource {
    events: Vec<InputEvent>,
    interval: Duration,
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ScriptedSource {
    pub fn new(events: Vec<InputEvent>) -> Self {
        Self {
            events,
            interval: Duration::from_millis(5),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl InputSource for ScriptedSource {
    fn subscribe(&mut self, sink: HookSink) -> Result<()> {
        let events = std::mem::take(&mut self.events);
        let interval = self.interval;
        let stop = Arc::clone(&self.stop);
        let worker = thread::Builder::new()
            .name("scripted-input".into())
            .spawn(move || {
                for event in events {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    thread::sleep(interval);
                    sink.deliver(event);
                }
            })
            .map_err(|e| Error::hook_unavailable(format!("could not start input thread: {}", e)))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_with(capacity: usize) -> (HookSink, Receiver<InputEvent>) {
        let config = CaptureConfig {
            channel_capacity: capacity,
            ..CaptureConfig::default()
        };
        let (tx, rx) = bounded(capacity);
        let sink = HookSink::new(tx, &config);
        sink.set_armed(true);
        (sink, rx)
    }

    #[test]
    fn hotkey_requires_exact_modifiers() {
        let stop = Hotkey::parse("ctrl+r");
        assert!(stop.matches(&KeyInput::combo("ctrl+r")));
        assert!(stop.matches(&KeyInput::combo("ctrl+R")));
        assert!(!stop.matches(&KeyInput::new("r")));
        assert!(!stop.matches(&KeyInput::combo("ctrl+shift+r")));
        assert_eq!(stop.to_string(), "ctrl+r");
    }

    #[test]
    fn sink_forwards_ordinary_events() {
        let (sink, rx) = sink_with(8);
        sink.deliver(InputEvent::Click { x: 1, y: 2 });
        sink.deliver(InputEvent::Key(KeyInput::new("a")));
        assert_eq!(rx.try_recv().unwrap(), InputEvent::Click { x: 1, y: 2 });
        assert_eq!(rx.try_recv().unwrap(), InputEvent::Key(KeyInput::new("a")));
    }

    #[test]
    fn first_signal_wins_and_disarms() {
        let (sink, rx) = sink_with(8);
        sink.deliver(InputEvent::Key(KeyInput::new("esc")));
        sink.deliver(InputEvent::Key(KeyInput::combo("ctrl+r")));
        sink.deliver(InputEvent::Click { x: 1, y: 1 });
        assert_eq!(sink.signal(), Some(ControlSignal::Cancel));
        assert!(!sink.is_armed());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (sink, rx) = sink_with(1);
        sink.deliver(InputEvent::Click { x: 1, y: 1 });
        sink.deliver(InputEvent::Click { x: 2, y: 2 });
        assert_eq!(sink.dropped(), 1);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn capture_lifecycle() {
        let source = ScriptedSource::new(vec![
            InputEvent::Click { x: 10, y: 10 },
            InputEvent::Key(KeyInput::combo("ctrl+r")),
        ]);
        let mut capture = EventCapture::new(source, CaptureConfig::default());
        assert_eq!(capture.state(), CaptureState::Idle);

        let rx = capture.arm().unwrap();
        assert_eq!(capture.state(), CaptureState::Armed);
        assert!(capture.arm().is_err());

        let interrupt = AtomicBool::new(false);
        assert_eq!(capture.wait_for_signal(&interrupt), Some(ControlSignal::Stop));
        assert_eq!(capture.disarm(), Some(ControlSignal::Stop));
        assert_eq!(capture.state(), CaptureState::Stopped);
        assert_eq!(rx.try_recv().unwrap(), InputEvent::Click { x: 10, y: 10 });
    }

    #[test]
    fn interrupt_counts_as_cancel() {
        let mut capture = EventCapture::new(ScriptedSource::new(Vec::new()), CaptureConfig::default());
        let _rx = capture.arm().unwrap();
        let interrupt = AtomicBool::new(true);
        assert_eq!(capture.wait_for_signal(&interrupt), Some(ControlSignal::Cancel));
    }
}
