//! retrace-recorder - Record a GUI session and replay it later
//!
//! Clicks and keystrokes are turned into an [`ActionLog`] by the
//! [`ActionRecorder`], written out as a replay [`Procedure`] plus a JSON
//! data file by the [`SessionStore`], and played back by the
//! [`ReplayEngine`].
//!
//! ## Platform Support
//!
//! - **Windows / macOS**: global hooks via rdev
//! - **Linux**: no hook backend; replay and history still work

pub mod action;
pub mod artifact;
pub mod capture;
pub mod platform;
pub mod recorder;
pub mod replay;
pub mod session;
pub mod storage;

pub use action::{Action, ActionLog, RecordedSession};
pub use artifact::{ArtifactError, Pacing, Procedure, Step};
pub use capture::{CaptureConfig, EventCapture, Hotkey, InputEvent, InputSource, KeyInput};
pub use platform::{system_source, SystemSource};
pub use recorder::{ActionRecorder, CaptureOutcome, Feedback, RecorderConfig, RecorderError};
pub use replay::{Outcome, ReplayEngine, ReplayReport, StepReport};
pub use session::{run_recording, SessionOutcome};
pub use storage::{HistoryStore, SessionRecord, SessionStore};

pub mod prelude {
    pub use crate::action::{Action, ActionLog, RecordedSession};
    pub use crate::artifact::{Pacing, Procedure};
    pub use crate::capture::{CaptureConfig, EventCapture, InputEvent, InputSource};
    pub use crate::platform::{system_source, SystemSource};
    pub use crate::recorder::{ActionRecorder, Feedback, RecorderConfig};
    pub use crate::replay::{ReplayEngine, ReplayReport};
    pub use crate::session::{run_recording, SessionOutcome};
    pub use crate::storage::{SessionRecord, SessionStore};
}
