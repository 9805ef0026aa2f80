//! Command handlers for CLI subcommands.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use courier_core::{outbox_file, parse};
use courier_models::{DashboardMessage, Event, EventPayload, Verbosity};
use courier_persistence::HistoryStore;
use courier_queue::{EventFilter, EventQueue};
use courier_runtime::{
    ChannelRegistry, CliRunner, ControlPlane, DashboardDelivery, InboundMessage, Listener,
    ListenerOutcome, Worker, WorkerConfig, WorkerExit,
};
use courier_telegram::TelegramDelivery;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Commands, OutputFormat};
use crate::console::{ConsoleDelivery, CONSOLE_SOURCE};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Longest text shown per row in listings.
const PREVIEW_CHARS: usize = 60;

/// Execute a CLI command, returning the process exit code.
pub fn execute(command: Commands, state_dir: &Path) -> Result<i32> {
    match command {
        Commands::Worker { agent, cwd } => return cmd_worker(state_dir, agent.as_deref(), cwd),
        Commands::Push {
            source,
            event_type,
            text,
            conversation,
            verbosity,
        } => cmd_push(
            state_dir,
            &source,
            event_type,
            &text,
            conversation,
            verbosity.unwrap_or_default(),
        )?,
        Commands::Pending {
            source,
            event_type,
            format,
        } => cmd_pending(state_dir, source, event_type, format)?,
        Commands::Processed { format } => cmd_processed(state_dir, format)?,
        Commands::History { key, lines } => cmd_history(state_dir, &key, lines)?,
        Commands::Command { text, conversation } => {
            cmd_command(state_dir, &text, conversation.as_deref())?
        }
        Commands::ListenStdin {
            source,
            conversation,
        } => cmd_listen_stdin(state_dir, &source, conversation)?,
    }
    Ok(0)
}

fn cmd_worker(state_dir: &Path, agent: Option<&str>, cwd: Option<PathBuf>) -> Result<i32> {
    let mut config = WorkerConfig::from_env()?;
    if let Some(agent) = agent {
        config = config.with_agent_command(agent)?;
    }
    if let Some(cwd) = cwd {
        config = config.with_working_dir(cwd);
    }

    let registry = build_registry(state_dir);
    let runner = Arc::new(CliRunner::from_config(&config));
    let runtime = tokio::runtime::Runtime::new()?;

    let exit = runtime.block_on(async {
        let mut worker = Worker::new(state_dir, config, runner, registry)?;

        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                on_signal.cancel();
            }
        });

        println!("Courier worker running. Press Ctrl+C to stop.");
        worker.run(shutdown).await
    })?;

    match exit {
        WorkerExit::Restart => {
            println!("Restart requested; exiting with code {}", exit.exit_code());
        }
        WorkerExit::Shutdown => info!("Worker stopped"),
    }
    Ok(exit.exit_code())
}

/// Deliveries for every surface this process can reach.
pub fn build_registry(state_dir: &Path) -> ChannelRegistry {
    let mut registry = ChannelRegistry::new()
        .with(
            "dashboard",
            Arc::new(DashboardDelivery::new(outbox_file(state_dir))),
        )
        .with(CONSOLE_SOURCE, Arc::new(ConsoleDelivery::new()));

    match TelegramDelivery::from_env() {
        Some(telegram) => registry.register("telegram", Arc::new(telegram)),
        None => warn!("TELEGRAM_BOT_TOKEN not set; telegram replies will not be delivered"),
    }

    registry
}

fn cmd_push(
    state_dir: &Path,
    source: &str,
    event_type: Option<String>,
    text: &str,
    conversation: Option<String>,
    verbosity: Verbosity,
) -> Result<()> {
    let event_type = event_type.unwrap_or_else(|| format!("{}:message", source));
    let mut fields = Map::new();
    fields.insert("text".to_string(), Value::String(text.to_string()));
    if let Some(conversation) = conversation {
        fields.insert("conversation".to_string(), Value::String(conversation));
    }

    let payload = EventPayload::Opaque { event_type, fields };
    let event = Event::from_payload(source, &payload, verbosity);
    let id = EventQueue::new(state_dir).push_event(&event)?;

    println!("{}", id);
    Ok(())
}

fn cmd_pending(
    state_dir: &Path,
    source: Option<String>,
    event_type: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut filter = EventFilter::new();
    if let Some(source) = source {
        filter = filter.with_source(source);
    }
    if let Some(event_type) = event_type {
        filter = filter.with_event_type(event_type);
    }
    let events = EventQueue::new(state_dir).list_pending_filtered(&filter)?;
    print_events(&events, format, "No pending events.")?;
    Ok(())
}

fn cmd_processed(state_dir: &Path, format: OutputFormat) -> Result<()> {
    let events = EventQueue::new(state_dir).list_processed()?;
    print_events(&events, format, "No processed events.")?;
    Ok(())
}

fn print_events(events: &[Event], format: OutputFormat, empty: &str) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(events)?);
        }
        OutputFormat::Table => {
            if events.is_empty() {
                println!("{}", empty);
                return Ok(());
            }
            println!("{:<40} {:<20} {:<12} {}", "ID", "TIME", "SOURCE", "TEXT");
            for event in events {
                println!("{}", format_event_row(event));
            }
        }
    }
    Ok(())
}

/// One table row for an event.
pub fn format_event_row(event: &Event) -> String {
    format!(
        "{:<40} {:<20} {:<12} {}",
        event.id().to_string(),
        event.timestamp().format("%Y-%m-%d %H:%M:%S").to_string(),
        event.source(),
        preview(&event.text().unwrap_or_default())
    )
}

/// Single-line preview of `text`, cut at `PREVIEW_CHARS`.
fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

fn cmd_history(state_dir: &Path, key: &str, lines: usize) -> Result<()> {
    let messages = HistoryStore::new(state_dir).recent(key, lines)?;
    if messages.is_empty() {
        println!("No history for '{}'.", key);
        return Ok(());
    }
    for message in messages {
        println!(
            "{} [{}] {}",
            message.timestamp.format("%Y-%m-%d %H:%M:%S"),
            message.speaker(),
            message.text
        );
    }
    Ok(())
}

fn cmd_command(state_dir: &Path, text: &str, conversation: Option<&str>) -> Result<()> {
    let command = parse(text).ok_or_else(|| format!("Not a command: {}", text))?;
    let reply = ControlPlane::new(state_dir).apply(&command, conversation)?;
    println!("{}", reply);
    Ok(())
}

/// Inbound message for a line typed into `listen-stdin`.
pub fn stdin_message(source: &str, conversation: &str, text: &str) -> InboundMessage {
    let payload = if source == "dashboard" {
        EventPayload::Dashboard(DashboardMessage {
            session: conversation.to_string(),
            text: text.to_string(),
        })
    } else {
        let mut fields = Map::new();
        fields.insert("text".to_string(), Value::String(text.to_string()));
        fields.insert(
            "conversation".to_string(),
            Value::String(conversation.to_string()),
        );
        EventPayload::Opaque {
            event_type: format!("{}:message", source),
            fields,
        }
    };
    InboundMessage::new(payload)
}

fn cmd_listen_stdin(state_dir: &Path, source: &str, conversation: Option<String>) -> Result<()> {
    let conversation = conversation.unwrap_or_else(|| match source {
        "dashboard" => "stdin".to_string(),
        _ => format!("{}:stdin", source),
    });
    let listener = Listener::new(state_dir, source);

    eprintln!("Listening on stdin as '{}'. Ctrl+D to stop.", source);
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        match listener.handle(stdin_message(source, &conversation, &line))? {
            ListenerOutcome::Queued { event_id } => println!("queued {}", event_id),
            ListenerOutcome::Command { reply, .. } => println!("{}", reply),
            ListenerOutcome::Ignored => {}
        }
    }
    Ok(())
}
