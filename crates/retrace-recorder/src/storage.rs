//! Session storage - JSON lines data files, replay artifacts, history
//!
//! Layout of the storage directory:
//!
//!   recorded_actions_<ts>.jsonl   one metadata line, then one action per line
//!   replay_<ts>.retrace           the replay artifact
//!   recording_history.json        the last 50 session records

use crate::action::{Action, ActionLog, RecordedSession};
use crate::artifact::{self, Pacing, Procedure};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const HISTORY_CAPACITY: usize = 50;
pub const SUMMARY_LINES: usize = 10;
pub const HISTORY_FILE: &str = "recording_history.json";
pub const HOME_ENV: &str = "RETRACE_HOME";

/// History entry for one saved session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Fractional seconds on disk
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub action_count: usize,
    pub message_count: usize,
    pub selected_count: usize,
    pub artifact_ref: PathBuf,
    pub data_ref: PathBuf,
    #[serde(default)]
    pub summary: Vec<String>,
}

impl SessionRecord {
    /// Actions not covered by the summary lines.
    pub fn unsummarized(&self) -> usize {
        self.action_count.saturating_sub(self.summary.len())
    }

    pub fn artifact_exists(&self) -> bool {
        self.artifact_ref.is_file()
    }

    pub fn data_exists(&self) -> bool {
        self.data_ref.is_file()
    }
}

mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// Most recent sessions, oldest first, never more than [`HISTORY_CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryStore {
    records: VecDeque<SessionRecord>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, evicting the oldest entries beyond capacity.
    pub fn push(&mut self, record: SessionRecord) {
        self.records.push_back(record);
        while self.records.len() > HISTORY_CAPACITY {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&SessionRecord> {
        self.records.back()
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &SessionRecord> {
        self.records.iter().rev().take(limit)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionRecord> {
        self.records.iter()
    }
}

/// Up to [`SUMMARY_LINES`] one-line descriptions.
pub fn summarize(log: &ActionLog) -> Vec<String> {
    log.iter().take(SUMMARY_LINES).map(Action::describe).collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionMeta {
    target: String,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    actions: usize,
}

pub struct SessionStore {
    dir: PathBuf,
    pacing: Pacing,
}

impl SessionStore {
    /// `$RETRACE_HOME`, else `~/.retrace`.
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(HOME_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .context("could not determine home directory")?
                .join(".retrace"),
        };
        Self::with_dir(dir)
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
        Ok(Self {
            dir,
            pacing: Pacing::default(),
        })
    }

    /// Delays written into generated artifacts.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Write the data file and the replay artifact. Returns
    /// `(artifact_ref, data_ref)`.
    pub fn persist(&self, session: &RecordedSession) -> Result<(PathBuf, PathBuf)> {
        let (artifact_path, data_path) = self.free_paths(&session.ended_at);

        let file = File::create(&data_path)
            .with_context(|| format!("Failed to create {}", data_path.display()))?;
        let mut w = BufWriter::new(file);

        // First line: metadata
        let meta = SessionMeta {
            target: session.target.clone(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            actions: session.log.len(),
        };
        serde_json::to_writer(&mut w, &meta)?;
        writeln!(w)?;

        // Remaining lines: actions
        for action in &session.log {
            serde_json::to_writer(&mut w, action)?;
            writeln!(w)?;
        }
        w.flush()
            .with_context(|| format!("Failed to write {}", data_path.display()))?;

        let procedure = Procedure::from_session(session, &self.pacing);
        fs::write(&artifact_path, artifact::generate(&procedure))
            .with_context(|| format!("Failed to write {}", artifact_path.display()))?;

        debug!(artifact = %artifact_path.display(), data = %data_path.display(), "session persisted");
        Ok((artifact_path, data_path))
    }

    /// Timestamped file names that do not collide with earlier sessions.
    fn free_paths(&self, at: &DateTime<Utc>) -> (PathBuf, PathBuf) {
        let ts = at.format("%Y%m%d_%H%M%S").to_string();
        let mut suffix = String::new();
        let mut n = 1;
        loop {
            let artifact = self.dir.join(format!("replay_{}{}.retrace", ts, suffix));
            let data = self.dir.join(format!("recorded_actions_{}{}.jsonl", ts, suffix));
            if !artifact.exists() && !data.exists() {
                return (artifact, data);
            }
            n += 1;
            suffix = format!("_{}", n);
        }
    }

    /// Read a data file back. Relative paths resolve against the storage
    /// directory.
    pub fn load_session(&self, path: impl AsRef<Path>) -> Result<RecordedSession> {
        let path = self.resolve(path.as_ref());
        let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        let meta_line = lines.next().context("Empty data file")??;
        let meta: SessionMeta =
            serde_json::from_str(&meta_line).context("Invalid metadata line")?;

        let mut actions = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let action: Action = serde_json::from_str(&line)
                .with_context(|| format!("Invalid action on line {}", i + 2))?;
            actions.push(action);
        }
        if actions.len() != meta.actions {
            warn!(expected = meta.actions, found = actions.len(), "data file action count mismatch");
        }

        Ok(RecordedSession {
            target: meta.target,
            started_at: meta.started_at,
            ended_at: meta.ended_at,
            log: ActionLog::from(actions),
        })
    }

    /// Read and parse a replay artifact.
    pub fn load_procedure(&self, path: impl AsRef<Path>) -> Result<Procedure> {
        let path = self.resolve(path.as_ref());
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        artifact::parse(&text).with_context(|| format!("Invalid artifact {}", path.display()))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_relative() && !path.exists() {
            self.dir.join(path)
        } else {
            path.to_path_buf()
        }
    }

    /// Load history; a missing or unreadable file is an empty history.
    pub fn load_history(&self) -> HistoryStore {
        let path = self.history_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no history file yet");
                return HistoryStore::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read history, starting empty");
                return HistoryStore::new();
            }
        };
        match serde_json::from_str::<HistoryStore>(&text) {
            Ok(mut history) => {
                // Files written by hand may hold more than the cap
                while history.records.len() > HISTORY_CAPACITY {
                    history.records.pop_front();
                }
                history
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "history file is corrupt, starting empty");
                HistoryStore::new()
            }
        }
    }

    /// Append a record and rewrite the history file atomically.
    pub fn append_history(&self, record: SessionRecord) -> Result<HistoryStore> {
        let mut history = self.load_history();
        history.push(record);

        let path = self.history_path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&history)?;
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(history)
    }

    /// Persist a session and add it to history. The session is only
    /// borrowed so a failed save can be retried.
    pub fn save(&self, session: &RecordedSession) -> Result<SessionRecord> {
        if session.ended_at < session.started_at {
            bail!("session ends before it starts");
        }
        let (artifact_ref, data_ref) = self.persist(session)?;
        let record = SessionRecord {
            start_time: session.started_at,
            end_time: session.ended_at,
            duration: session.duration().to_std().unwrap_or_default(),
            action_count: session.log.len(),
            message_count: session.log.message_count(),
            selected_count: session.log.selected_count(),
            artifact_ref,
            data_ref,
            summary: summarize(&session.log),
        };
        let history = self.append_history(record.clone())?;
        info!(
            actions = record.action_count,
            sessions = history.len(),
            artifact = %record.artifact_ref.display(),
            "session saved"
        );
        Ok(record)
    }

    pub fn last(&self) -> Option<SessionRecord> {
        self.load_history().last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::CLIPBOARD_METHOD;
    use chrono::TimeZone;
    use retrace_core::Descriptor;

    fn session(actions: Vec<Action>) -> RecordedSession {
        let start = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
        RecordedSession {
            target: "WhatsApp".into(),
            started_at: start,
            ended_at: start + chrono::Duration::milliseconds(12_500),
            log: ActionLog::from(actions),
        }
    }

    fn sample() -> RecordedSession {
        let t = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 1).unwrap();
        session(vec![
            Action::Click {
                timestamp: t,
                x: 100,
                y: 200,
                descriptor: Some(Descriptor::new("Chat A", "ListItem")),
            },
            Action::Message { timestamp: t, text: "hello".into() },
            Action::TextCapture { timestamp: t, text: "Hello".into(), method: CLIPBOARD_METHOD.into() },
        ])
    }

    #[test]
    fn data_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_dir(dir.path()).unwrap();
        let original = sample();
        let (artifact_ref, data_ref) = store.persist(&original).unwrap();

        assert!(artifact_ref.file_name().unwrap().to_string_lossy().starts_with("replay_"));
        let first = fs::read_to_string(&data_ref).unwrap();
        assert!(first.lines().next().unwrap().contains("\"target\":\"WhatsApp\""));

        let loaded = store.load_session(&data_ref).unwrap();
        assert_eq!(loaded, original);

        let procedure = store.load_procedure(&artifact_ref).unwrap();
        assert_eq!(procedure.actions(), original.log);
    }

    #[test]
    fn same_second_sessions_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_dir(dir.path()).unwrap();
        let (a1, d1) = store.persist(&sample()).unwrap();
        let (a2, d2) = store.persist(&sample()).unwrap();
        assert_ne!(a1, a2);
        assert_ne!(d1, d2);
    }

    #[test]
    fn save_builds_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_dir(dir.path()).unwrap();
        let record = store.save(&sample()).unwrap();

        assert_eq!(record.action_count, 3);
        assert_eq!(record.message_count, 1);
        assert_eq!(record.selected_count, 1);
        assert_eq!(record.duration, Duration::from_millis(12_500));
        assert_eq!(record.summary[0], "Click ListItem 'Chat A' at (100, 200)");
        assert!(record.artifact_exists() && record.data_exists());
        assert_eq!(store.last(), Some(record));
    }

    #[test]
    fn duration_is_fractional_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_dir(dir.path()).unwrap();
        store.save(&sample()).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.history_path()).unwrap()).unwrap();
        assert_eq!(raw[0]["duration"], 12.5);
    }

    #[test]
    fn summary_is_capped() {
        let t = Utc::now();
        let log = ActionLog::from(
            (0..25)
                .map(|i| Action::KeyPress { timestamp: t, key: format!("f{}", i % 12 + 1) })
                .collect::<Vec<_>>(),
        );
        assert_eq!(summarize(&log).len(), SUMMARY_LINES);
    }

    #[test]
    fn corrupt_history_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::with_dir(dir.path()).unwrap();
        fs::write(store.history_path(), "{ not json").unwrap();
        assert!(store.load_history().is_empty());

        store.save(&sample()).unwrap();
        assert_eq!(store.load_history().len(), 1);
    }

    #[test]
    fn failed_save_can_be_retried() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("sessions");
        let store = SessionStore::with_dir(&dir).unwrap();
        let session = sample();

        fs::remove_dir_all(&dir).unwrap();
        assert!(store.save(&session).is_err());
        assert_eq!(session.log.len(), 3);

        fs::create_dir_all(&dir).unwrap();
        let record = store.save(&session).unwrap();
        assert_eq!(record.action_count, session.log.len());
        assert!(record.data_exists());
        assert_eq!(store.load_history().len(), 1);
        assert_eq!(store.load_session(&record.data_ref).unwrap().log, session.log);
    }
}
