//! Core data models for Courier.
//!
//! This crate provides the value types shared by every Courier process:
//! queued events and their typed payloads, conversation history messages,
//! and the stream events a running job emits.

pub mod event;
pub mod ids;
pub mod message;
pub mod stream;

// Re-export main types
pub use event::{
    ChatSpaceMessage, DashboardMessage, EmailMessage, Event, EventPayload, TelegramMessage,
    Verbosity,
};
pub use ids::{EventId, JobId, RequestId};
pub use message::{Message, Role};
pub use stream::{AssistantMessage, ContentBlock, Delta, StreamEvent};
