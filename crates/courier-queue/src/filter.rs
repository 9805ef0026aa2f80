//! Event filtering for queue listings.

use chrono::{DateTime, Utc};
use courier_models::Event;

/// Filter criteria for listing queued events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by source channel.
    pub source: Option<String>,
    /// Filter by event type tag.
    pub event_type: Option<String>,
    /// Only events created at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// Creates a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source filter.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the event type filter.
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the lower time bound.
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Returns true if the event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref source) = self.source {
            if event.source() != source {
                return false;
            }
        }

        if let Some(ref event_type) = self.event_type {
            if event.event_type() != event_type {
                return false;
            }
        }

        if let Some(since) = self.since {
            if event.timestamp() < since {
                return false;
            }
        }

        true
    }
}
