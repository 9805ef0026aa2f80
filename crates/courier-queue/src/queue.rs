//! EventQueue - durable mailbox between listeners and the worker.
//!
//! Every event is one JSON file keyed by its id:
//! ```text
//! base_path/
//! └── queue/
//!     ├── consumer.lock
//!     ├── pending/
//!     │   └── evt-abc123.json
//!     └── processed/
//!         └── evt-def456.json
//! ```
//!
//! Producers only ever create new files (temp file + no-clobber rename), so
//! any number of listener processes can push without coordination and a
//! reader never observes a half-written entry. The pending → processed
//! transition is a single `rename`, so an entry is never materialized in
//! both directories at once.

use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use courier_models::{Event, EventId};
use courier_persistence::atomic::{atomic_create_json, move_file, read_json};
use courier_persistence::PersistenceError;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{QueueError, Result};
use crate::filter::EventFilter;

/// What `mark_processed` found.
///
/// Both non-`Moved` outcomes are no-ops; they are reported separately so
/// callers can tell a duplicate acknowledgement from an id that never
/// existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The event moved from pending to processed.
    Moved,
    /// The event was already in processed storage.
    AlreadyProcessed,
    /// No event with this id exists in either namespace.
    Unknown,
}

/// Durable multi-producer, single-consumer event queue.
///
/// # Consumer contract
///
/// Producers may run in any number of processes. The consumer side
/// (`pop`, `pop_with`, `mark_processed`) assumes exactly one consumer; hold a
/// [`ConsumerLock`](crate::ConsumerLock) for as long as you consume.
///
/// # Example
///
/// ```no_run
/// use courier_queue::EventQueue;
/// use serde_json::Map;
///
/// let queue = EventQueue::new("/tmp/courier");
/// queue.push("email:message", "email", Map::new()).unwrap();
///
/// for event in queue.list_pending().unwrap() {
///     println!("{} {}", event.id(), event.event_type());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct EventQueue {
    base_path: PathBuf,
}

impl EventQueue {
    /// Creates a new EventQueue with the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the queue root directory.
    pub fn queue_dir(&self) -> PathBuf {
        self.base_path.join("queue")
    }

    /// Returns the pending directory.
    fn pending_dir(&self) -> PathBuf {
        self.queue_dir().join("pending")
    }

    /// Returns the processed directory.
    fn processed_dir(&self) -> PathBuf {
        self.queue_dir().join("processed")
    }

    /// Returns the file for an event id inside `dir`.
    fn entry_path(dir: &Path, id: &EventId) -> Result<PathBuf> {
        if !id.is_path_safe() {
            return Err(QueueError::InvalidId(id.to_string()));
        }
        Ok(dir.join(format!("{}.json", id)))
    }

    /// Creates and persists a new event, returning its id.
    pub fn push(
        &self,
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Result<EventId> {
        let event = Event::new(event_type, source, payload);
        self.push_event(&event)
    }

    /// Persists an already constructed event.
    pub fn push_event(&self, event: &Event) -> Result<EventId> {
        let path = Self::entry_path(&self.pending_dir(), event.id())?;
        atomic_create_json(&path, event)?;

        info!(
            event_id = %event.id(),
            event_type = %event.event_type(),
            source = %event.source(),
            "Event queued"
        );
        Ok(event.id().clone())
    }

    /// Lists pending events, oldest first (ties broken by id).
    pub fn list_pending(&self) -> Result<Vec<Event>> {
        Self::scan(&self.pending_dir())
    }

    /// Lists pending events matching a filter, oldest first.
    pub fn list_pending_filtered(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        Ok(self
            .list_pending()?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect())
    }

    /// Lists processed events, oldest first.
    pub fn list_processed(&self) -> Result<Vec<Event>> {
        Self::scan(&self.processed_dir())
    }

    /// Number of readable pending events.
    ///
    /// Malformed entries are not counted, matching [`list_pending`](Self::list_pending).
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.list_pending()?.len())
    }

    /// Returns the oldest pending event without claiming it.
    pub fn peek(&self) -> Result<Option<Event>> {
        Ok(self.list_pending()?.into_iter().next())
    }

    /// Moves an event from pending to processed.
    ///
    /// Absent ids are a silent no-op; the outcome says which kind.
    pub fn mark_processed(&self, id: &EventId) -> Result<MarkOutcome> {
        let from = Self::entry_path(&self.pending_dir(), id)?;
        let to = Self::entry_path(&self.processed_dir(), id)?;

        if move_file(&from, &to)? {
            debug!(event_id = %id, "Event marked processed");
            return Ok(MarkOutcome::Moved);
        }

        let outcome = if to.exists() {
            MarkOutcome::AlreadyProcessed
        } else {
            MarkOutcome::Unknown
        };
        debug!(event_id = %id, outcome = ?outcome, "mark_processed was a no-op");
        Ok(outcome)
    }

    /// Claims the oldest pending event.
    pub fn pop(&self) -> Result<Option<Event>> {
        Ok(self
            .pop_with(|_| Ok::<(), QueueError>(()))?
            .map(|(event, ())| event))
    }

    /// Claims the oldest pending event after handing it off.
    ///
    /// `handoff` runs first; the event is moved to processed only if it
    /// succeeds. A failed hand-off (or a crash before the move) leaves the
    /// event pending, so it is retried on the next scan.
    pub fn pop_with<T, E, F>(&self, handoff: F) -> std::result::Result<Option<(Event, T)>, E>
    where
        F: FnOnce(&Event) -> std::result::Result<T, E>,
        E: From<QueueError>,
    {
        let Some(event) = self.peek()? else {
            return Ok(None);
        };

        let value = handoff(&event)?;

        match self.mark_processed(event.id())? {
            MarkOutcome::Moved => {}
            outcome => {
                // Only possible if a second consumer is running.
                warn!(
                    event_id = %event.id(),
                    outcome = ?outcome,
                    "Event was claimed elsewhere during hand-off"
                );
            }
        }

        Ok(Some((event, value)))
    }

    /// Reads every entry in `dir`, skipping malformed ones.
    fn scan(dir: &Path) -> Result<Vec<Event>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistenceError::ReadError {
                    path: dir.to_path_buf(),
                    source,
                }
                .into())
            }
        };

        let mut events = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PersistenceError::ReadError {
                path: dir.to_path_buf(),
                source,
            })?;

            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }

            match read_json::<Event>(&path) {
                Ok(event) => {
                    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                    if stem != event.id().as_str() {
                        warn!(
                            path = %path.display(),
                            event_id = %event.id(),
                            "Skipping queue entry whose id does not match its key"
                        );
                        continue;
                    }
                    events.push(event);
                }
                // Claimed by the consumer between read_dir and read.
                Err(PersistenceError::ReadError { source, .. })
                    if source.kind() == ErrorKind::NotFound => {}
                Err(PersistenceError::SerializeError(e)) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed queue entry");
                }
                Err(e) => return Err(e.into()),
            }
        }

        events.sort_by(compare_events);
        Ok(events)
    }
}

/// Orders events by timestamp, then id.
fn compare_events(a: &Event, b: &Event) -> Ordering {
    a.timestamp()
        .cmp(&b.timestamp())
        .then_with(|| a.id().cmp(b.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    fn make_queue() -> (tempfile::TempDir, EventQueue) {
        let dir = tempdir().unwrap();
        let queue = EventQueue::new(dir.path());
        (dir, queue)
    }

    fn payload(text: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("text".to_string(), json!(text));
        map
    }

    #[test]
    fn test_push_and_list() {
        let (_dir, queue) = make_queue();

        let id = queue.push("test:message", "test", payload("hi")).unwrap();
        let pending = queue.list_pending().unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), &id);
        assert_eq!(pending[0].payload()["text"], "hi");
        assert_eq!(queue.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_empty_queue() {
        let (_dir, queue) = make_queue();

        assert!(queue.list_pending().unwrap().is_empty());
        assert!(queue.pop().unwrap().is_none());
        assert_eq!(queue.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_ordering_by_timestamp() {
        let (_dir, queue) = make_queue();
        let now = Utc::now();

        let late = Event::new("t", "s", payload("late")).with_timestamp(now);
        let early = Event::new("t", "s", payload("early")).with_timestamp(now - Duration::seconds(5));
        queue.push_event(&late).unwrap();
        queue.push_event(&early).unwrap();

        let texts: Vec<_> = queue
            .list_pending()
            .unwrap()
            .iter()
            .map(|e| e.payload()["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["early", "late"]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let (_dir, queue) = make_queue();
        let now = Utc::now();

        let a = Event::new("t", "s", Map::new()).with_timestamp(now);
        let b = Event::new("t", "s", Map::new()).with_timestamp(now);
        queue.push_event(&a).unwrap();
        queue.push_event(&b).unwrap();

        let mut expected = vec![a.id().clone(), b.id().clone()];
        expected.sort();
        let ids: Vec<_> = queue.list_pending().unwrap().iter().map(|e| e.id().clone()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_pop_moves_to_processed() {
        let (_dir, queue) = make_queue();
        let id = queue.push("t", "s", payload("x")).unwrap();

        let popped = queue.pop().unwrap().unwrap();
        assert_eq!(popped.id(), &id);
        assert!(queue.list_pending().unwrap().is_empty());

        let processed = queue.list_processed().unwrap();
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0], popped);
    }

    #[test]
    fn test_processed_content_is_byte_identical() {
        let (dir, queue) = make_queue();
        let id = queue.push("t", "s", payload("bytes")).unwrap();

        let pending_path = dir.path().join(format!("queue/pending/{}.json", id));
        let before = fs::read(&pending_path).unwrap();

        queue.pop().unwrap();

        let processed_path = dir.path().join(format!("queue/processed/{}.json", id));
        assert_eq!(fs::read(processed_path).unwrap(), before);
        assert!(!pending_path.exists());
    }

    #[test]
    fn test_mark_processed_outcomes() {
        let (_dir, queue) = make_queue();
        let id = queue.push("t", "s", Map::new()).unwrap();

        assert_eq!(queue.mark_processed(&id).unwrap(), MarkOutcome::Moved);
        assert_eq!(queue.mark_processed(&id).unwrap(), MarkOutcome::AlreadyProcessed);
        assert_eq!(
            queue.mark_processed(&EventId::new()).unwrap(),
            MarkOutcome::Unknown
        );
        assert_eq!(queue.list_processed().unwrap().len(), 1);
    }

    #[test]
    fn test_mark_processed_rejects_unsafe_id() {
        let (_dir, queue) = make_queue();
        let result = queue.mark_processed(&EventId::from_string("../../etc"));
        assert!(matches!(result, Err(QueueError::InvalidId(_))));
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        let (dir, queue) = make_queue();
        queue.push("t", "s", payload("good")).unwrap();
        fs::write(dir.path().join("queue/pending/evt-broken.json"), "{\"id\":").unwrap();

        let pending = queue.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload()["text"], "good");
    }

    #[test]
    fn test_non_utf8_entry_does_not_block_queue() {
        let (dir, queue) = make_queue();
        let id = queue.push("t", "s", payload("good")).unwrap();
        fs::write(dir.path().join("queue/pending/evt-bad.json"), [0xff, 0xfe, 0x00]).unwrap();

        assert_eq!(queue.list_pending().unwrap().len(), 1);
        let popped = queue.pop().unwrap().unwrap();
        assert_eq!(popped.id(), &id);
        assert!(queue.pop().unwrap().is_none());
    }

    #[test]
    fn test_pending_count_ignores_malformed_entries() {
        let (dir, queue) = make_queue();
        queue.push("t", "s", payload("good")).unwrap();
        fs::write(dir.path().join("queue/pending/evt-oops.json"), "{oops").unwrap();

        assert_eq!(queue.pending_count().unwrap(), 1);
        queue.pop().unwrap();
        assert_eq!(queue.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_mismatched_key_is_skipped() {
        let (dir, queue) = make_queue();
        let event = Event::new("t", "s", Map::new());
        let json = serde_json::to_string(&event).unwrap();
        fs::create_dir_all(dir.path().join("queue/pending")).unwrap();
        fs::write(dir.path().join("queue/pending/evt-other.json"), json).unwrap();

        assert!(queue.list_pending().unwrap().is_empty());
    }

    #[test]
    fn test_pop_with_failed_handoff_leaves_pending() {
        let (_dir, queue) = make_queue();
        let id = queue.push("t", "s", Map::new()).unwrap();

        let result: std::result::Result<Option<(Event, ())>, QueueError> =
            queue.pop_with(|_| Err(QueueError::InvalidId("spawn failed".into())));
        assert!(result.is_err());

        let pending = queue.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), &id);
        assert!(queue.list_processed().unwrap().is_empty());
    }

    #[test]
    fn test_pop_with_returns_handoff_value() {
        let (_dir, queue) = make_queue();
        queue.push("t", "s", payload("job")).unwrap();

        let (event, started) = queue
            .pop_with(|e| Ok::<_, QueueError>(format!("started {}", e.id())))
            .unwrap()
            .unwrap();
        assert_eq!(started, format!("started {}", event.id()));
        assert_eq!(queue.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_filtered_listing() {
        let (_dir, queue) = make_queue();
        queue.push("telegram:message", "telegram", Map::new()).unwrap();
        queue.push("email:message", "email", Map::new()).unwrap();

        let only_email = queue
            .list_pending_filtered(&EventFilter::new().with_source("email"))
            .unwrap();
        assert_eq!(only_email.len(), 1);
        assert_eq!(only_email[0].source(), "email");

        let only_telegram = queue
            .list_pending_filtered(&EventFilter::new().with_event_type("telegram:message"))
            .unwrap();
        assert_eq!(only_telegram.len(), 1);
        assert_eq!(only_telegram[0].source(), "telegram");
    }

    #[test]
    fn test_temp_files_are_ignored() {
        let (dir, queue) = make_queue();
        queue.push("t", "s", Map::new()).unwrap();
        fs::write(dir.path().join("queue/pending/.tmpXYZ"), "partial").unwrap();

        assert_eq!(queue.list_pending().unwrap().len(), 1);
        assert_eq!(queue.pending_count().unwrap(), 1);
    }
}
