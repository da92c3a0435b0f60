//! Recording session driver
//!
//! Wires the pieces together: the capture hooks feed a bounded queue, a
//! worker thread owns the recorder and drains the queue in order, and the
//! calling thread polls for Stop / Cancel.

use crate::action::RecordedSession;
use crate::capture::{ControlSignal, EventCapture, InputEvent, InputSource};
use crate::recorder::{ActionRecorder, Feedback, RecorderError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use retrace_core::{AutomationProvider, ClipboardProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
pub enum SessionOutcome {
    Saved(RecordedSession),
    Discarded { actions: usize },
}

/// Record one session against `window_title` until a control signal.
///
/// `feedback` runs on the worker thread after every recorded action or
/// capture attempt. `interrupt` is treated as Cancel when raised.
pub fn run_recording<P, C, S, F>(
    mut recorder: ActionRecorder<P, C>,
    capture: &mut EventCapture<S>,
    window_title: &str,
    interrupt: &AtomicBool,
    feedback: F,
) -> Result<SessionOutcome, RecorderError>
where
    P: AutomationProvider,
    C: ClipboardProvider + 'static,
    S: InputSource,
    F: FnMut(Feedback) + Send + 'static,
{
    recorder.start(window_title)?;
    let events = match capture.arm() {
        Ok(rx) => rx,
        Err(e) => {
            recorder.discard();
            return Err(e.into());
        }
    };

    let done = Arc::new(AtomicBool::new(false));
    let poll = capture.config().poll_interval;
    let spawned = {
        let done = Arc::clone(&done);
        thread::Builder::new()
            .name("retrace-recorder".into())
            .spawn(move || consume(recorder, events, done, poll, feedback))
    };
    let worker = match spawned {
        Ok(handle) => handle,
        Err(e) => {
            capture.disarm();
            return Err(RecorderError::Worker(e.to_string()));
        }
    };

    let signal = capture.wait_for_signal(interrupt).unwrap_or(ControlSignal::Cancel);
    capture.disarm();
    done.store(true, Ordering::SeqCst);

    let mut recorder = worker
        .join()
        .map_err(|_| RecorderError::Worker("worker thread panicked".into()))?;

    match signal {
        ControlSignal::Stop => {
            let session = recorder.finalize()?;
            info!(actions = session.log.len(), "session stopped");
            Ok(SessionOutcome::Saved(session))
        }
        ControlSignal::Cancel => Ok(SessionOutcome::Discarded {
            actions: recorder.discard(),
        }),
    }
}

fn consume<P, C, F>(
    mut recorder: ActionRecorder<P, C>,
    events: Receiver<InputEvent>,
    done: Arc<AtomicBool>,
    poll: Duration,
    mut feedback: F,
) -> ActionRecorder<P, C>
where
    P: AutomationProvider,
    C: ClipboardProvider,
    F: FnMut(Feedback),
{
    while !done.load(Ordering::SeqCst) {
        match events.recv_timeout(poll) {
            Ok(event) => {
                if let Some(fb) = recorder.handle(event) {
                    feedback(fb);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Whatever was queued before the signal still belongs to the session
    let mut drained = 0usize;
    while let Ok(event) = events.try_recv() {
        drained += 1;
        if let Some(fb) = recorder.handle(event) {
            feedback(fb);
        }
    }
    if drained > 0 {
        debug!(drained, "drained queued events after signal");
    }
    recorder
}
