//! Durable multi-producer, single-consumer event queue for Courier.
//!
//! This crate provides the `EventQueue` mailbox between listener processes
//! and the worker:
//! - Create-only, atomic writes so producers never coordinate
//! - Timestamp-ordered scans that skip corrupt entries
//! - Pending → processed transition as a single rename
//! - `ConsumerLock` to keep the consumer a singleton
//! - `Inbox` for in-process drain-and-clear buffering
//!
//! # Example
//!
//! ```no_run
//! use courier_queue::{ConsumerLock, EventQueue};
//! use serde_json::Map;
//!
//! let queue = EventQueue::new("/tmp/courier");
//!
//! // Any number of producers
//! let id = queue.push("telegram:message", "telegram", Map::new()).unwrap();
//!
//! // Exactly one consumer
//! let _lock = ConsumerLock::acquire(&queue).unwrap();
//! if let Some(event) = queue.pop().unwrap() {
//!     assert_eq!(event.id(), &id);
//! }
//! ```

pub mod error;
pub mod filter;
pub mod inbox;
pub mod lock;
pub mod queue;

pub use error::{QueueError, Result};
pub use filter::EventFilter;
pub use inbox::Inbox;
pub use lock::ConsumerLock;
pub use queue::{EventQueue, MarkOutcome};
