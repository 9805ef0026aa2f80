//! Per-job output accumulation and delivery.
//!
//! A [`Channel`] receives a job's [`StreamEvent`]s in order and delivers the
//! reply to the event's surface exactly once:
//!
//! ```text
//! Active ──result──▶ Completing ──▶ Done
//!    └──────abort──────────────────▲
//! ```
//!
//! Once `Done`, every call is a no-op.

use std::fmt;
use std::sync::Arc;

use courier_models::{Event, StreamEvent, Verbosity};
use courier_queue::Inbox;
use tracing::{debug, info, warn};

use crate::delivery::Delivery;

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Receiving events.
    Active,
    /// Terminal event observed, reply being delivered.
    Completing,
    /// Finished; no further effect.
    Done,
}

/// Accumulates one job's output for one external surface.
pub struct Channel {
    event: Event,
    verbosity: Verbosity,
    delivery: Option<Arc<dyn Delivery>>,
    buffer: String,
    partials: Inbox<String>,
    state: ChannelState,
    exit_code: Option<i32>,
    delivered: bool,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("event_id", self.event.id())
            .field("verbosity", &self.verbosity)
            .field("delivery", &self.delivery.as_ref().map(|d| d.name().to_string()))
            .field("buffer_len", &self.buffer.len())
            .field("state", &self.state)
            .finish()
    }
}

impl Channel {
    /// Creates a channel using the event's own verbosity policy.
    pub fn new(event: Event, delivery: Option<Arc<dyn Delivery>>) -> Self {
        let verbosity = event.verbosity();
        Self::with_verbosity(event, delivery, verbosity)
    }

    pub fn with_verbosity(
        event: Event,
        delivery: Option<Arc<dyn Delivery>>,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            event,
            verbosity,
            delivery,
            buffer: String::new(),
            partials: Inbox::unbounded(),
            state: ChannelState::Active,
            exit_code: None,
            delivered: false,
        }
    }

    /// Bounds the number of fragments held between flushes.
    pub fn with_partial_capacity(mut self, capacity: usize) -> Self {
        self.partials = Inbox::new(capacity);
        self
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Accumulated output so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_complete(&self) -> bool {
        self.state == ChannelState::Done
    }

    /// Exit code recorded at completion.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Whether the final reply reached the delivery collaborator.
    pub fn delivered(&self) -> bool {
        self.delivered
    }

    /// Trimmed reply, if any text was produced.
    pub fn reply(&self) -> Option<String> {
        let trimmed = self.buffer.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Feeds one stream event.
    pub async fn on_stream_event(&mut self, event: &StreamEvent) {
        if self.state != ChannelState::Active {
            debug!(event_id = %self.event.id(), "Ignoring stream event after completion");
            return;
        }

        if let Some(exit_code) = event.exit_code() {
            self.complete(exit_code).await;
            return;
        }

        let text = event.text();
        if text.is_empty() {
            return;
        }
        self.buffer.push_str(&text);

        if self.verbosity == Verbosity::Streaming && self.partials.push(text).is_some() {
            debug!(event_id = %self.event.id(), "Partial buffer full, dropped oldest fragment");
        }
    }

    /// Completes the job. Only the first call has any effect.
    ///
    /// Delivery failures are logged and swallowed.
    pub async fn complete(&mut self, exit_code: i32) -> bool {
        if self.state != ChannelState::Active {
            return false;
        }
        self.state = ChannelState::Completing;
        self.exit_code = Some(exit_code);
        // Anything still pending is covered by the final reply.
        self.partials.drain();

        match self.reply() {
            None => self.discard().await,
            Some(reply) => match &self.delivery {
                Some(delivery) => match delivery.send(&self.event, &reply).await {
                    Ok(()) => self.delivered = true,
                    Err(e) => {
                        warn!(
                            event_id = %self.event.id(),
                            delivery = delivery.name(),
                            error = %e,
                            "Failed to deliver reply"
                        );
                    }
                },
                None => {
                    warn!(
                        event_id = %self.event.id(),
                        source = %self.event.source(),
                        "No delivery registered for source, reply dropped"
                    );
                }
            },
        }

        info!(
            event_id = %self.event.id(),
            source = %self.event.source(),
            exit_code,
            reply_len = self.buffer.trim().len(),
            delivered = self.delivered,
            "Job completed"
        );

        self.state = ChannelState::Done;
        true
    }

    /// Ends the job without delivering, discarding buffered output.
    pub async fn abort(&mut self) {
        if self.state != ChannelState::Active {
            return;
        }
        let discarded = self.buffer.len();
        self.buffer.clear();
        self.partials.drain();
        self.state = ChannelState::Done;
        self.discard().await;
        info!(event_id = %self.event.id(), discarded, "Job output discarded");
    }

    /// Tells the delivery no reply is coming for this event.
    async fn discard(&self) {
        let Some(delivery) = &self.delivery else {
            return;
        };
        if let Err(e) = delivery.discard(&self.event).await {
            warn!(
                event_id = %self.event.id(),
                delivery = delivery.name(),
                error = %e,
                "Failed to discard partial output"
            );
        }
    }

    /// Forwards fragments gathered since the last flush.
    pub async fn flush_partial(&self) {
        if self.state != ChannelState::Active || self.verbosity != Verbosity::Streaming {
            return;
        }
        let fragments = self.partials.drain();
        if fragments.is_empty() {
            return;
        }
        let Some(delivery) = &self.delivery else {
            return;
        };

        let text = fragments.concat();
        if let Err(e) = delivery.send_partial(&self.event, &text).await {
            warn!(
                event_id = %self.event.id(),
                delivery = delivery.name(),
                error = %e,
                "Failed to forward partial output"
            );
        }
    }
}
