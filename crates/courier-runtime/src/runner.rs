//! Agent job execution.

use std::process::Stdio;

use courier_models::{Event, JobId, StreamEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Result, RuntimeError};

/// Buffered stream events per job before the reader waits on the dispatcher.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a runner needs to start one job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: JobId,
    pub event: Event,
    pub prompt: String,
    /// Agent session to continue, if any.
    pub resume_session: Option<String>,
}

impl JobRequest {
    /// Builds a request for `event` with a fresh job id.
    pub fn for_event(event: &Event, resume_session: Option<String>) -> Self {
        Self {
            job_id: JobId::new(),
            event: event.clone(),
            prompt: build_prompt(event),
            resume_session,
        }
    }
}

/// A started job: its stream of events and a handle to cancel it.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: JobId,
    pub events: mpsc::Receiver<StreamEvent>,
    pub cancel: CancellationToken,
}

/// Starts agent jobs.
///
/// `start` only has to launch the job; its output arrives on the handle.
/// It must be called from within a Tokio runtime.
pub trait JobRunner: Send + Sync {
    fn start(&self, request: &JobRequest) -> Result<JobHandle>;
}

/// Renders an event into the agent prompt.
pub fn build_prompt(event: &Event) -> String {
    let payload = event.typed_payload();
    let body = match payload.text() {
        Some(text) => text.to_string(),
        None => serde_json::Value::Object(event.payload().clone()).to_string(),
    };

    match payload.sender_name() {
        Some(name) => format!("[{} via {}] {}", name, event.source(), body),
        None => format!("[via {}] {}", event.source(), body),
    }
}

/// Runs the agent as a child process speaking JSON lines on stdout.
#[derive(Debug, Clone)]
pub struct CliRunner {
    program: String,
    args: Vec<String>,
    working_dir: Option<std::path::PathBuf>,
}

impl CliRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            program: config.agent_program.clone(),
            args: config.agent_args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    /// Full argument list for a request.
    fn command_args(&self, request: &JobRequest) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(session) = &request.resume_session {
            args.push("--resume".to_string());
            args.push(session.clone());
        }
        args.push(request.prompt.clone());
        args
    }
}

impl JobRunner for CliRunner {
    fn start(&self, request: &JobRequest) -> Result<JobHandle> {
        let args = self.command_args(request);
        debug!(job_id = %request.job_id, program = %self.program, args = ?args, "Spawning agent");

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| RuntimeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let job_id = request.job_id.clone();

        if let Some(stderr) = stderr {
            let job_id = job_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.is_empty() {
                        warn!(job_id = %job_id, stderr = %line, "Agent stderr");
                    }
                }
            });
        }

        let token = cancel.clone();
        tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            info!(job_id = %job_id, "Cancelling agent process");
                            break;
                        }
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => {
                                if line.trim().is_empty() {
                                    continue;
                                }
                                match StreamEvent::parse_line(&line) {
                                    Ok(event) => {
                                        if tx.send(event).await.is_err() {
                                            debug!(job_id = %job_id, "Dispatcher gone, stopping reader");
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        warn!(job_id = %job_id, error = %e, "Skipping unparseable agent output");
                                    }
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                warn!(job_id = %job_id, error = %e, "Failed to read agent output");
                                break;
                            }
                        }
                    }
                }
            }

            // Closing the sender tells the dispatcher the stream is over.
            drop(tx);

            if token.is_cancelled() {
                if let Err(e) = child.kill().await {
                    warn!(job_id = %job_id, error = %e, "Failed to kill agent process");
                }
                return;
            }

            match child.wait().await {
                Ok(status) if status.success() => debug!(job_id = %job_id, "Agent exited"),
                Ok(status) => warn!(job_id = %job_id, code = ?status.code(), "Agent exited with failure"),
                Err(e) => warn!(job_id = %job_id, error = %e, "Failed to wait for agent"),
            }
        });

        info!(job_id = %request.job_id, event_id = %request.event.id(), "Job started");
        Ok(JobHandle {
            job_id: request.job_id.clone(),
            events: rx,
            cancel,
        })
    }
}
