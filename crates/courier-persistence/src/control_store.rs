//! Control requests and the worker's session snapshot.
//!
//! Listeners never touch worker state directly. Mutating commands become
//! create-only request files that the worker drains; the worker in turn is
//! the only writer of `session.json`, which listeners read for status
//! replies.
//!
//! ```text
//! base_path/
//! └── control/
//!     ├── session.json
//!     └── requests/
//!         ├── req-abc123.json
//!         └── req-def456.json
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use courier_models::{EventId, JobId, RequestId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::atomic::{atomic_create_json, atomic_write_json, ensure_dir, read_json, read_json_optional};
use crate::error::{PersistenceError, Result};

/// Which job a stop request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopTarget {
    /// Whatever job is running when the request is seen.
    Active,
    /// Only the job with this id.
    Job(JobId),
}

/// A state change requested by a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
    /// Forget the agent session so the next job starts fresh.
    NewSession,
    /// Stop the worker so its supervisor restarts it.
    Restart,
    /// Switch between FIFO (`true`) and interrupt (`false`) queue modes.
    SetQueue { enabled: bool },
    /// Cancel a running job.
    Stop { target: StopTarget },
}

/// A persisted control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub id: RequestId,
    #[serde(flatten)]
    pub action: ControlAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl ControlRequest {
    /// Creates a request stamped with the current instant.
    pub fn new(action: ControlAction, conversation: Option<String>) -> Self {
        Self {
            id: RequestId::new(),
            action,
            conversation,
            requested_at: Utc::now(),
        }
    }
}

/// The job the worker is currently running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveJob {
    pub job_id: JobId,
    pub event_id: EventId,
    pub source: String,
    pub started_at: DateTime<Utc>,
}

/// Worker-owned session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Agent session to resume, if one has been established.
    #[serde(default)]
    pub session_id: Option<String>,
    /// When the current session started.
    pub started_at: DateTime<Utc>,
    /// FIFO queue mode (true) or interrupt mode (false).
    #[serde(default = "default_queue_enabled")]
    pub queue_enabled: bool,
    /// Jobs completed in the current session.
    #[serde(default)]
    pub jobs_completed: u64,
    /// The running job, if any.
    #[serde(default)]
    pub active_job: Option<ActiveJob>,
    /// Last time the worker wrote this snapshot.
    pub updated_at: DateTime<Utc>,
}

fn default_queue_enabled() -> bool {
    true
}

impl Default for SessionState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            session_id: None,
            started_at: now,
            queue_enabled: true,
            jobs_completed: 0,
            active_job: None,
            updated_at: now,
        }
    }
}

impl SessionState {
    /// Starts a fresh session, keeping the queue mode.
    pub fn reset(&mut self) {
        let queue_enabled = self.queue_enabled;
        *self = Self {
            queue_enabled,
            ..Self::default()
        };
    }
}

/// Manages control requests and the session snapshot.
pub struct ControlStore {
    base_path: PathBuf,
}

impl ControlStore {
    /// Creates a new ControlStore with the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the control directory.
    fn control_dir(&self) -> PathBuf {
        self.base_path.join("control")
    }

    /// Returns the request directory.
    fn requests_dir(&self) -> PathBuf {
        self.control_dir().join("requests")
    }

    /// Returns the session snapshot path.
    fn session_path(&self) -> PathBuf {
        self.control_dir().join("session.json")
    }

    /// Persists a new control request.
    pub fn submit(&self, action: ControlAction, conversation: Option<String>) -> Result<ControlRequest> {
        let request = ControlRequest::new(action, conversation);
        let path = self.requests_dir().join(format!("{}.json", request.id));
        atomic_create_json(&path, &request)?;
        debug!(request_id = %request.id, action = ?request.action, "Control request submitted");
        Ok(request)
    }

    /// Lists outstanding requests, oldest first, without consuming them.
    pub fn pending_requests(&self) -> Result<Vec<ControlRequest>> {
        Ok(self
            .scan_requests()?
            .into_iter()
            .filter_map(|(_, request)| request)
            .collect())
    }

    /// Removes and returns all outstanding requests, oldest first.
    ///
    /// Unreadable request files are removed with a warning.
    pub fn take_requests(&self) -> Result<Vec<ControlRequest>> {
        let mut taken = Vec::new();
        for (path, request) in self.scan_requests()? {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(PersistenceError::WriteError { path, source }),
            }
            if let Some(request) = request {
                taken.push(request);
            }
        }
        Ok(taken)
    }

    /// Reads every request file, sorted by request time then id.
    fn scan_requests(&self) -> Result<Vec<(PathBuf, Option<ControlRequest>)>> {
        let dir = self.requests_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|source| PersistenceError::ReadError {
            path: dir.clone(),
            source,
        })?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PersistenceError::ReadError {
                path: dir.clone(),
                source,
            })?;

            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match read_json::<ControlRequest>(&path) {
                    Ok(request) => found.push((path, Some(request))),
                    Err(PersistenceError::ReadError { source, .. })
                        if source.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Discarding unreadable control request");
                        found.push((path, None));
                    }
                }
            }
        }

        found.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => a
                .requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.id.cmp(&b.id)),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        Ok(found)
    }

    /// Loads the session snapshot, or a fresh default if none was written.
    pub fn load_session(&self) -> Result<SessionState> {
        Ok(read_json_optional(&self.session_path())?.unwrap_or_default())
    }

    /// Writes the session snapshot atomically.
    pub fn save_session(&self, session: &SessionState) -> Result<()> {
        ensure_dir(&self.control_dir())?;
        let mut session = session.clone();
        session.updated_at = Utc::now();
        atomic_write_json(&self.session_path(), &session)
    }
}
