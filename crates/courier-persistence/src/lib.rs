//! Persistence layer for Courier.
//!
//! This crate provides crash-safe persistence for Courier state using
//! atomic file operations (write to temp file, then rename) and
//! append-only JSON-lines logs.
//!
//! # Example
//!
//! ```no_run
//! use courier_persistence::HistoryStore;
//! use courier_models::Message;
//!
//! let store = HistoryStore::new("/home/user/.courier");
//!
//! store.append("telegram:42", &Message::user(None, "hello")).unwrap();
//! let recent = store.recent("telegram:42", 10).unwrap();
//! ```

pub mod atomic;
pub mod control_store;
pub mod error;
pub mod history_store;

pub use control_store::{ActiveJob, ControlAction, ControlRequest, ControlStore, SessionState, StopTarget};
pub use error::{PersistenceError, Result};
pub use history_store::HistoryStore;
