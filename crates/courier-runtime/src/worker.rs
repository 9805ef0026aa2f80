//! The single consumer: claims events, runs jobs and applies control requests.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use courier_models::{Event, EventId, JobId, Message};
use courier_persistence::{
    ActiveJob, ControlAction, ControlRequest, ControlStore, HistoryStore, SessionState, StopTarget,
};
use courier_queue::{ConsumerLock, EventQueue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::Channel;
use crate::config::WorkerConfig;
use crate::delivery::ChannelRegistry;
use crate::dispatcher::{DispatchOutcome, DispatchReport, Dispatcher};
use crate::error::Result;
use crate::runner::{JobRequest, JobRunner};

/// Exit code asking a supervisor to restart the worker.
pub const RESTART_EXIT_CODE: i32 = 75;

/// Why the worker loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested.
    Shutdown,
    /// A `/restart` command was received.
    Restart,
}

impl WorkerExit {
    /// Process exit code for this reason.
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerExit::Shutdown => 0,
            WorkerExit::Restart => RESTART_EXIT_CODE,
        }
    }
}

/// Result of one claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub event_id: EventId,
    pub job_id: JobId,
    pub outcome: DispatchOutcome,
}

/// Control state gathered while a job runs.
#[derive(Debug, Default)]
struct JobControl {
    fresh_session: bool,
    restart: bool,
}

/// Consumes the event queue, one job at a time.
pub struct Worker {
    config: WorkerConfig,
    queue: EventQueue,
    control: ControlStore,
    history: HistoryStore,
    registry: ChannelRegistry,
    runner: Arc<dyn JobRunner>,
    session: SessionState,
    restart_requested: bool,
    _lock: ConsumerLock,
}

impl Worker {
    /// Creates the worker, taking the consumer lock.
    ///
    /// Fails with `ConsumerActive` if another worker holds the queue.
    pub fn new(
        base_path: impl Into<PathBuf>,
        config: WorkerConfig,
        runner: Arc<dyn JobRunner>,
        registry: ChannelRegistry,
    ) -> Result<Self> {
        let base_path = base_path.into();
        let queue = EventQueue::new(&base_path);
        let lock = ConsumerLock::acquire(&queue)?;
        let control = ControlStore::new(&base_path);

        let mut session = control.load_session()?;
        if let Some(job) = session.active_job.take() {
            warn!(job_id = %job.job_id, event_id = %job.event_id, "Previous worker stopped mid-job");
        }
        control.save_session(&session)?;

        info!(
            base_path = %base_path.display(),
            pid = lock.pid(),
            queue_enabled = session.queue_enabled,
            sources = ?registry.sources(),
            "Worker ready"
        );

        Ok(Self {
            config,
            queue,
            control,
            history: HistoryStore::new(&base_path),
            registry,
            runner,
            session,
            restart_requested: false,
            _lock: lock,
        })
    }

    /// Current session snapshot.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// True once a restart has been requested.
    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    /// Runs until shutdown or a restart request.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<WorkerExit> {
        loop {
            if self.restart_requested {
                return Ok(WorkerExit::Restart);
            }
            if shutdown.is_cancelled() {
                return Ok(WorkerExit::Shutdown);
            }

            self.apply_pending_requests()?;
            if self.restart_requested {
                continue;
            }

            match self.run_once(&shutdown).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Worker cannot claim work");
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "Job failed to start, will retry");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Claims and runs the oldest pending event, if any.
    pub async fn run_once(&mut self, shutdown: &CancellationToken) -> Result<Option<JobSummary>> {
        let resume = self.session.session_id.clone();
        let runner = Arc::clone(&self.runner);

        let claimed = self.queue.pop_with(|event| {
            let request = JobRequest::for_event(event, resume.clone());
            runner.start(&request)
        })?;

        let Some((event, handle)) = claimed else {
            return Ok(None);
        };
        let job_id = handle.job_id.clone();

        self.session.active_job = Some(ActiveJob {
            job_id: job_id.clone(),
            event_id: event.id().clone(),
            source: event.source().to_string(),
            started_at: Utc::now(),
        });
        self.save_session();

        let delivery = self.registry.get(event.source());
        if delivery.is_none() {
            debug!(source = %event.source(), "No delivery registered for source");
        }
        let mut channel = Channel::new(event.clone(), delivery)
            .with_partial_capacity(self.config.partial_capacity);

        let dispatcher = Dispatcher::new(self.config.flush_interval, self.config.control_interval);
        let mut job_control = JobControl::default();
        let report = dispatcher
            .dispatch(&mut channel, handle, || {
                shutdown.is_cancelled() || self.check_running_job(&job_id, &mut job_control)
            })
            .await;

        self.finish_job(&event, report.clone(), job_control);

        Ok(Some(JobSummary {
            event_id: event.id().clone(),
            job_id,
            outcome: report.outcome,
        }))
    }

    /// Records a finished job in the session and history.
    fn finish_job(&mut self, event: &Event, report: DispatchReport, job_control: JobControl) {
        self.session.active_job = None;

        if let DispatchOutcome::Completed { reply, .. } = &report.outcome {
            self.session.jobs_completed += 1;

            if let (Some(reply), Some(key)) = (reply, event.conversation_key()) {
                if let Err(e) = self.history.append(&key, &Message::assistant(reply.as_str())) {
                    warn!(conversation = %key, error = %e, "Failed to record reply in history");
                }
            }
        }

        if job_control.fresh_session {
            self.session.reset();
        } else if let Some(session_id) = report.session_id {
            if self.session.session_id.as_deref() != Some(session_id.as_str()) {
                debug!(session_id = %session_id, "Agent session updated");
            }
            self.session.session_id = Some(session_id);
        }

        if job_control.restart {
            self.restart_requested = true;
        }
        self.save_session();
    }

    /// Applies control requests while a job runs. Returns true to cancel it.
    fn check_running_job(&mut self, job_id: &JobId, job_control: &mut JobControl) -> bool {
        let mut cancel = false;

        for request in self.take_requests() {
            match &request.action {
                ControlAction::NewSession => {
                    info!(request_id = %request.id, "New session after current job");
                    job_control.fresh_session = true;
                }
                ControlAction::Restart => {
                    info!(request_id = %request.id, job_id = %job_id, "Restart requested, cancelling job");
                    job_control.restart = true;
                    cancel = true;
                }
                ControlAction::SetQueue { enabled } => self.set_queue(*enabled),
                ControlAction::Stop { target } => match target {
                    StopTarget::Active => {
                        info!(request_id = %request.id, job_id = %job_id, "Stopping active job");
                        cancel = true;
                    }
                    StopTarget::Job(target) if target == job_id => {
                        info!(request_id = %request.id, job_id = %job_id, "Stopping job");
                        cancel = true;
                    }
                    StopTarget::Job(target) => {
                        info!(request_id = %request.id, target = %target, running = %job_id, "Stop target is not running");
                    }
                },
            }
        }

        if !cancel && !self.session.queue_enabled {
            match self.queue.pending_count() {
                Ok(0) => {}
                Ok(pending) => {
                    info!(job_id = %job_id, pending, "Interrupting job for newer message");
                    cancel = true;
                }
                Err(e) => warn!(error = %e, "Failed to check pending events"),
            }
        }

        cancel
    }

    /// Applies outstanding control requests while no job is running.
    pub fn apply_pending_requests(&mut self) -> Result<()> {
        let requests = self.control.take_requests()?;
        if requests.is_empty() {
            return Ok(());
        }

        for request in requests {
            match request.action {
                ControlAction::NewSession => {
                    info!(request_id = %request.id, "Starting new session");
                    self.session.reset();
                }
                ControlAction::Restart => {
                    info!(request_id = %request.id, "Restart requested");
                    self.restart_requested = true;
                }
                ControlAction::SetQueue { enabled } => self.set_queue(enabled),
                ControlAction::Stop { target } => {
                    debug!(request_id = %request.id, target = ?target, "No job running to stop");
                }
            }
        }

        self.save_session();
        Ok(())
    }

    fn set_queue(&mut self, enabled: bool) {
        if self.session.queue_enabled != enabled {
            info!(queue_enabled = enabled, "Queue mode changed");
        }
        self.session.queue_enabled = enabled;
        self.save_session();
    }

    fn take_requests(&self) -> Vec<ControlRequest> {
        self.control.take_requests().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read control requests");
            Vec::new()
        })
    }

    fn save_session(&self) {
        if let Err(e) = self.control.save_session(&self.session) {
            warn!(error = %e, "Failed to save session state");
        }
    }
}
