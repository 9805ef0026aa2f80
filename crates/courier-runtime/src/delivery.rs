//! Outbound delivery to external surfaces.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_models::{Event, EventId};
use courier_persistence::atomic::append_line;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeliveryError;

/// Sends a job's output to the surface its event came from.
///
/// Implementations are thin transport adapters; the dispatcher decides
/// when to call them and swallows their failures.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Delivers the final reply for `event`.
    async fn send(&self, event: &Event, text: &str) -> Result<(), DeliveryError>;

    /// Forwards newly streamed text for `event`.
    ///
    /// Only called for streaming channels. The default drops the fragment.
    async fn send_partial(&self, _event: &Event, _fragment: &str) -> Result<(), DeliveryError> {
        Ok(())
    }

    /// Called when a job for `event` ends without a reply. Releases any
    /// per-event state; the default does nothing.
    async fn discard(&self, _event: &Event) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Maps event sources to their delivery.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    deliveries: HashMap<String, Arc<dyn Delivery>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `delivery` for events whose source is `source`.
    pub fn register(&mut self, source: impl Into<String>, delivery: Arc<dyn Delivery>) {
        let source = source.into();
        debug!(source = %source, delivery = delivery.name(), "Registered delivery");
        self.deliveries.insert(source, delivery);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, source: impl Into<String>, delivery: Arc<dyn Delivery>) -> Self {
        self.register(source, delivery);
        self
    }

    pub fn get(&self, source: &str) -> Option<Arc<dyn Delivery>> {
        self.deliveries.get(source).cloned()
    }

    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<_> = self.deliveries.keys().map(String::as_str).collect();
        sources.sort_unstable();
        sources
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}

/// Kind of outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxKind {
    Partial,
    Final,
}

/// One line of the dashboard outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    pub kind: OutboxKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Delivers dashboard replies by appending to a JSON-lines outbox.
#[derive(Debug, Clone)]
pub struct DashboardDelivery {
    outbox: PathBuf,
}

impl DashboardDelivery {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
        }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    fn append(&self, event: &Event, kind: OutboxKind, text: &str) -> Result<(), DeliveryError> {
        let record = OutboxRecord {
            event_id: event.id().clone(),
            conversation: event.conversation_key(),
            kind,
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        let line = serde_json::to_string(&record).map_err(|e| DeliveryError::Outbox(e.into()))?;
        append_line(&self.outbox, &line)?;
        Ok(())
    }
}

#[async_trait]
impl Delivery for DashboardDelivery {
    fn name(&self) -> &str {
        "dashboard"
    }

    async fn send(&self, event: &Event, text: &str) -> Result<(), DeliveryError> {
        self.append(event, OutboxKind::Final, text)
    }

    async fn send_partial(&self, event: &Event, fragment: &str) -> Result<(), DeliveryError> {
        self.append(event, OutboxKind::Partial, fragment)
    }
}
