//! Integration tests for the event queue across producers and a consumer.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;

use courier_models::EventId;
use courier_queue::{ConsumerLock, EventQueue, MarkOutcome, QueueError};
use serde_json::{json, Map, Value};
use tempfile::tempdir;

fn payload(n: usize) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("n".to_string(), json!(n));
    map
}

#[test]
fn test_every_push_is_popped_exactly_once() {
    let dir = tempdir().unwrap();
    let queue = EventQueue::new(dir.path());

    let pushed: HashSet<EventId> = (0..20)
        .map(|n| queue.push("test:message", "test", payload(n)).unwrap())
        .collect();

    let mut popped = HashSet::new();
    while let Some(event) = queue.pop().unwrap() {
        assert!(popped.insert(event.id().clone()), "popped twice: {}", event.id());
    }

    assert_eq!(popped, pushed);
    assert_eq!(queue.pending_count().unwrap(), 0);
    assert_eq!(queue.list_processed().unwrap().len(), 20);
}

#[test]
fn test_concurrent_producers() {
    let dir = tempdir().unwrap();
    let queue = Arc::new(EventQueue::new(dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                (0..25)
                    .map(|n| queue.push("test:message", format!("producer-{}", t), payload(n)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.extend(handle.join().unwrap());
    }

    assert_eq!(ids.len(), 100);
    let listed: HashSet<_> = queue
        .list_pending()
        .unwrap()
        .into_iter()
        .map(|e| e.id().clone())
        .collect();
    assert_eq!(listed, ids);
}

#[test]
fn test_listing_is_idempotent() {
    let dir = tempdir().unwrap();
    let queue = EventQueue::new(dir.path());
    for n in 0..5 {
        queue.push("t", "s", payload(n)).unwrap();
    }

    let first = queue.list_pending().unwrap();
    let second = queue.list_pending().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_timestamps_are_non_decreasing() {
    let dir = tempdir().unwrap();
    let queue = EventQueue::new(dir.path());
    for n in 0..10 {
        queue.push("t", "s", payload(n)).unwrap();
    }

    let pending = queue.list_pending().unwrap();
    assert!(pending.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
}

#[test]
fn test_consumer_survives_corrupt_entry() {
    let dir = tempdir().unwrap();
    let queue = EventQueue::new(dir.path());
    let good = queue.push("t", "s", payload(1)).unwrap();
    fs::write(
        queue.queue_dir().join("pending").join("evt-corrupt.json"),
        b"\x00\x01not json",
    )
    .unwrap();

    let event = queue.pop().unwrap().unwrap();
    assert_eq!(event.id(), &good);
    assert!(queue.pop().unwrap().is_none());
}

#[test]
fn test_mark_processed_twice_is_noop() {
    let dir = tempdir().unwrap();
    let queue = EventQueue::new(dir.path());
    let id = queue.push("t", "s", payload(0)).unwrap();

    assert_eq!(queue.mark_processed(&id).unwrap(), MarkOutcome::Moved);
    assert_eq!(queue.mark_processed(&id).unwrap(), MarkOutcome::AlreadyProcessed);
    assert_eq!(queue.list_processed().unwrap().len(), 1);
    assert!(queue.list_pending().unwrap().is_empty());
}

#[test]
fn test_single_consumer_lock() {
    let dir = tempdir().unwrap();
    let queue = EventQueue::new(dir.path());

    let lock = ConsumerLock::acquire(&queue).unwrap();
    assert!(matches!(
        ConsumerLock::acquire(&queue),
        Err(QueueError::ConsumerActive { .. })
    ));

    // Producers are unaffected by the lock.
    queue.push("t", "s", payload(0)).unwrap();
    drop(lock);
    assert!(ConsumerLock::acquire(&queue).is_ok());
}
