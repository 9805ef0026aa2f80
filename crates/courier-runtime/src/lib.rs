//! Courier Runtime - turns queued events into agent jobs and replies.
//!
//! - [`Listener`]: producer path; commands or queued events
//! - [`ControlPlane`]: command execution against shared state
//! - [`Worker`]: the single consumer loop
//! - [`Dispatcher`] and [`Channel`]: per-job stream handling with
//!   exactly-once completion
//! - [`Delivery`]: the seam to external surfaces
//! - [`JobRunner`] / [`CliRunner`]: agent process execution

pub mod channel;
pub mod config;
pub mod control;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod runner;
pub mod worker;

pub use channel::{Channel, ChannelState};
pub use config::WorkerConfig;
pub use control::ControlPlane;
pub use delivery::{ChannelRegistry, DashboardDelivery, Delivery, OutboxKind, OutboxRecord};
pub use dispatcher::{DispatchOutcome, DispatchReport, Dispatcher};
pub use error::{DeliveryError, Result, RuntimeError};
pub use listener::{InboundMessage, Listener, ListenerOutcome};
pub use runner::{build_prompt, CliRunner, JobHandle, JobRequest, JobRunner};
pub use worker::{JobSummary, Worker, WorkerExit, RESTART_EXIT_CODE};
