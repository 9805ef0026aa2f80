//! Drives one job's stream into its channel.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::channel::Channel;
use crate::runner::JobHandle;

/// How a dispatched job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The terminal event arrived.
    Completed {
        exit_code: i32,
        reply: Option<String>,
    },
    /// The job was cancelled before completing; output was discarded.
    Cancelled,
    /// The stream ended without a terminal event; output was discarded.
    Interrupted,
}

/// Outcome plus what the stream told us about the agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    /// Last agent session id seen on the stream.
    pub session_id: Option<String>,
}

/// Feeds stream events to a channel until the job ends.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    flush_interval: Duration,
    control_interval: Duration,
}

impl Dispatcher {
    pub fn new(flush_interval: Duration, control_interval: Duration) -> Self {
        Self {
            flush_interval,
            control_interval,
        }
    }

    /// Runs the job to completion, cancellation or interruption.
    ///
    /// `should_cancel` is polled every control interval; returning `true`
    /// cancels the job. Buffered output is only delivered if the terminal
    /// event arrives before cancellation.
    pub async fn dispatch<F>(
        &self,
        channel: &mut Channel,
        handle: JobHandle,
        mut should_cancel: F,
    ) -> DispatchReport
    where
        F: FnMut() -> bool,
    {
        let JobHandle {
            job_id,
            mut events,
            cancel,
        } = handle;

        let mut flush = interval(self.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut control = interval(self.control_interval);
        control.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut session_id = None;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    channel.abort().await;
                    break DispatchOutcome::Cancelled;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(id) = event.session_id() {
                            session_id = Some(id.to_string());
                        }
                        channel.on_stream_event(&event).await;
                        if channel.is_complete() {
                            break DispatchOutcome::Completed {
                                exit_code: channel.exit_code().unwrap_or(1),
                                reply: channel.reply(),
                            };
                        }
                    }
                    None => {
                        channel.abort().await;
                        break DispatchOutcome::Interrupted;
                    }
                },
                _ = flush.tick() => {
                    channel.flush_partial().await;
                }
                _ = control.tick() => {
                    if should_cancel() {
                        debug!(job_id = %job_id, "Cancellation requested");
                        cancel.cancel();
                    }
                }
            }
        };

        info!(job_id = %job_id, outcome = ?outcome, "Dispatch finished");
        DispatchReport { outcome, session_id }
    }
}
