//! Executes parsed commands on behalf of listeners.

use std::path::PathBuf;

use courier_core::{describe, CommandType, ParsedCommand};
use courier_models::JobId;
use courier_persistence::{ControlAction, ControlStore, HistoryStore, SessionState, StopTarget};
use courier_queue::EventQueue;
use tracing::info;

use crate::error::Result;

/// Transcript length when `/memory transcript` gives none.
pub const DEFAULT_TRANSCRIPT_LINES: usize = 20;

/// Applies commands against shared state.
///
/// Mutating commands are forwarded to the worker as control requests;
/// queries read the worker's session snapshot and the history store.
pub struct ControlPlane {
    control: ControlStore,
    history: HistoryStore,
    queue: EventQueue,
}

impl ControlPlane {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            control: ControlStore::new(&base_path),
            history: HistoryStore::new(&base_path),
            queue: EventQueue::new(base_path),
        }
    }

    /// Applies `command` and returns the reply text for the user.
    pub fn apply(&self, command: &ParsedCommand, conversation: Option<&str>) -> Result<String> {
        if command.command_type.is_mutating() {
            if let Some(action) = control_action(command) {
                let request = self.control.submit(action, conversation.map(str::to_string))?;
                info!(
                    request_id = %request.id,
                    command = %command.command_type,
                    conversation = ?conversation,
                    "Control request submitted"
                );
            }
            return Ok(describe(command));
        }

        match command.command_type {
            CommandType::QueueStatus => self.queue_status(),
            CommandType::MemorySession => self.session_status(),
            CommandType::MemoryStatus => self.memory_status(conversation),
            CommandType::MemoryTranscript => self.transcript(
                conversation,
                command.lines().unwrap_or(DEFAULT_TRANSCRIPT_LINES),
            ),
            _ => Ok(describe(command)),
        }
    }

    fn queue_status(&self) -> Result<String> {
        let session = self.control.load_session()?;
        let pending = self.queue.pending_count()?;
        let mode = if session.queue_enabled {
            "on (messages wait their turn)"
        } else {
            "off (new messages interrupt the running job)"
        };

        let mut lines = vec![
            format!("Queue mode: {}", mode),
            format!("Pending messages: {}", pending),
        ];
        lines.push(active_job_line(&session));
        Ok(lines.join("\n"))
    }

    fn session_status(&self) -> Result<String> {
        let session = self.control.load_session()?;
        Ok([
            format!(
                "Session: {}",
                session.session_id.as_deref().unwrap_or("none yet")
            ),
            format!("Started: {}", session.started_at.format("%Y-%m-%d %H:%M:%S UTC")),
            format!("Jobs completed: {}", session.jobs_completed),
            active_job_line(&session),
        ]
        .join("\n"))
    }

    fn memory_status(&self, conversation: Option<&str>) -> Result<String> {
        let Some(key) = conversation else {
            return Ok("No conversation to report on.".to_string());
        };
        let count = self.history.len(key)?;
        Ok(format!("{} messages stored for {}.", count, key))
    }

    fn transcript(&self, conversation: Option<&str>, lines: usize) -> Result<String> {
        let Some(key) = conversation else {
            return Ok("No conversation to show.".to_string());
        };
        let messages = self.history.recent(key, lines)?;
        if messages.is_empty() {
            return Ok("No messages yet.".to_string());
        }
        Ok(messages
            .iter()
            .map(|m| format!("{}: {}", m.speaker(), m.text))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Control request for a mutating command.
fn control_action(command: &ParsedCommand) -> Option<ControlAction> {
    match command.command_type {
        CommandType::New => Some(ControlAction::NewSession),
        CommandType::Restart => Some(ControlAction::Restart),
        CommandType::QueueOn => Some(ControlAction::SetQueue { enabled: true }),
        CommandType::QueueOff => Some(ControlAction::SetQueue { enabled: false }),
        CommandType::Stop => Some(ControlAction::Stop {
            target: StopTarget::Active,
        }),
        CommandType::StopJob => Some(ControlAction::Stop {
            target: match command.job_id() {
                Some(id) => StopTarget::Job(JobId::from_string(id)),
                None => StopTarget::Active,
            },
        }),
        CommandType::MemorySession
        | CommandType::MemoryTranscript
        | CommandType::MemoryStatus
        | CommandType::QueueStatus => None,
    }
}

fn active_job_line(session: &SessionState) -> String {
    match &session.active_job {
        Some(job) => format!("Active job: {} ({}, event {})", job.job_id, job.source, job.event_id),
        None => "Active job: none".to_string(),
    }
}
