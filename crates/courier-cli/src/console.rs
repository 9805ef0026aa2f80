//! Delivery that prints replies to the worker's stdout.

use std::io::Write;

use async_trait::async_trait;
use courier_models::Event;
use courier_runtime::{Delivery, DeliveryError};

/// Source name for messages typed into `courier listen-stdin`.
pub const CONSOLE_SOURCE: &str = "cli";

/// Writes each reply to stdout, prefixed with the conversation it answers.
#[derive(Debug, Default)]
pub struct ConsoleDelivery;

impl ConsoleDelivery {
    pub fn new() -> Self {
        Self
    }
}

/// Renders a reply the way the console shows it.
pub fn render_reply(event: &Event, text: &str) -> String {
    let label = event
        .conversation_key()
        .unwrap_or_else(|| event.id().to_string());
    format!("[{}] {}", label, text)
}

#[async_trait]
impl Delivery for ConsoleDelivery {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, event: &Event, text: &str) -> Result<(), DeliveryError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", render_reply(event, text))
            .and_then(|_| stdout.flush())
            .map_err(|e| DeliveryError::Unreachable(format!("stdout: {}", e)))
    }
}
