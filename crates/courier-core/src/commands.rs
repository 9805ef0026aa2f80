//! Slash-command parsing.
//!
//! Recognized grammar (keywords are case-insensitive, arguments are not):
//!
//! ```text
//! /new
//! /restart
//! /memory session
//! /memory transcript [N]
//! /memory
//! /queue on | /queue off
//! /queue
//! /stop [JOB_ID]
//! ```
//!
//! A Telegram-style `@botname` suffix on the keyword is ignored. Any other
//! text, including unknown slash-text, is ordinary chat content and parses
//! to `None`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Channels whose listeners interpret slash-commands.
pub const COMMAND_CHANNELS: &[&str] = &["telegram", "chatspace", "dashboard"];

/// Splits `/keyword[@bot] rest`.
static COMMAND_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^/([A-Za-z]+)(?:@[A-Za-z0-9_]+)?(?:\s+(.*))?$").expect("Invalid command regex")
});

/// `/memory transcript [N]` suffix.
static TRANSCRIPT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:transcript)(?:\s+([0-9]+))?$").expect("Invalid transcript regex")
});

/// The closed set of command intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    New,
    Restart,
    MemorySession,
    MemoryTranscript,
    MemoryStatus,
    QueueOn,
    QueueOff,
    QueueStatus,
    Stop,
    StopJob,
}

impl CommandType {
    /// Wire name of the command type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::New => "new",
            CommandType::Restart => "restart",
            CommandType::MemorySession => "memory_session",
            CommandType::MemoryTranscript => "memory_transcript",
            CommandType::MemoryStatus => "memory_status",
            CommandType::QueueOn => "queue_on",
            CommandType::QueueOff => "queue_off",
            CommandType::QueueStatus => "queue_status",
            CommandType::Stop => "stop",
            CommandType::StopJob => "stop_job",
        }
    }

    /// True for commands that change worker state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            CommandType::New
                | CommandType::Restart
                | CommandType::QueueOn
                | CommandType::QueueOff
                | CommandType::Stop
                | CommandType::StopJob
        )
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional command arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
}

/// A recognized command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<CommandArgs>,
    /// The trimmed input text.
    pub raw: String,
}

impl ParsedCommand {
    fn new(command_type: CommandType, args: Option<CommandArgs>, raw: &str) -> Self {
        Self {
            command_type,
            args,
            raw: raw.to_string(),
        }
    }

    /// Requested transcript length, if given.
    pub fn lines(&self) -> Option<usize> {
        self.args.as_ref().and_then(|a| a.lines)
    }

    /// Targeted job id, if given.
    pub fn job_id(&self) -> Option<&str> {
        self.args.as_ref().and_then(|a| a.job_id.as_deref())
    }
}

/// Parse text into a command.
///
/// Pure; returns `None` for anything that is not a recognized command.
///
/// # Example
/// ```
/// use courier_core::commands::{parse, CommandType};
///
/// let cmd = parse("/memory transcript 50").unwrap();
/// assert_eq!(cmd.command_type, CommandType::MemoryTranscript);
/// assert_eq!(cmd.lines(), Some(50));
///
/// assert!(parse("hello").is_none());
/// ```
pub fn parse(text: &str) -> Option<ParsedCommand> {
    let raw = text.trim();
    let caps = COMMAND_REGEX.captures(raw)?;
    let keyword = caps.get(1)?.as_str().to_ascii_lowercase();
    let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

    let bare = |command_type| rest.is_empty().then(|| ParsedCommand::new(command_type, None, raw));

    match keyword.as_str() {
        "new" => bare(CommandType::New),
        "restart" => bare(CommandType::Restart),
        "memory" => parse_memory(rest, raw),
        "queue" => match rest.to_ascii_lowercase().as_str() {
            "on" => Some(ParsedCommand::new(CommandType::QueueOn, None, raw)),
            "off" => Some(ParsedCommand::new(CommandType::QueueOff, None, raw)),
            "" => Some(ParsedCommand::new(CommandType::QueueStatus, None, raw)),
            _ => None,
        },
        "stop" => match rest.split_whitespace().next() {
            Some(token) => Some(ParsedCommand::new(
                CommandType::StopJob,
                Some(CommandArgs {
                    job_id: Some(token.to_string()),
                    lines: None,
                }),
                raw,
            )),
            None => Some(ParsedCommand::new(CommandType::Stop, None, raw)),
        },
        _ => None,
    }
}

/// Parses the suffix of `/memory`, most specific form first.
fn parse_memory(rest: &str, raw: &str) -> Option<ParsedCommand> {
    if rest.eq_ignore_ascii_case("session") {
        return Some(ParsedCommand::new(CommandType::MemorySession, None, raw));
    }

    if let Some(caps) = TRANSCRIPT_REGEX.captures(rest) {
        let args = match caps.get(1) {
            // Out-of-range counts make the text ordinary content.
            Some(n) => Some(CommandArgs {
                job_id: None,
                lines: Some(n.as_str().parse().ok()?),
            }),
            None => None,
        };
        return Some(ParsedCommand::new(CommandType::MemoryTranscript, args, raw));
    }

    rest.is_empty()
        .then(|| ParsedCommand::new(CommandType::MemoryStatus, None, raw))
}

/// Human-readable acknowledgement for a command.
pub fn describe(command: &ParsedCommand) -> String {
    match command.command_type {
        CommandType::New => "Starting a new session.".to_string(),
        CommandType::Restart => "Restarting the worker.".to_string(),
        CommandType::MemorySession => "Showing the current session.".to_string(),
        CommandType::MemoryTranscript => match command.lines() {
            Some(n) => format!("Showing the last {} transcript lines.", n),
            None => "Showing the recent transcript.".to_string(),
        },
        CommandType::MemoryStatus => "Showing memory status.".to_string(),
        CommandType::QueueOn => "Queue mode on. Messages will be answered in order.".to_string(),
        CommandType::QueueOff => {
            "Queue mode off. A new message interrupts the running job.".to_string()
        }
        CommandType::QueueStatus => "Showing queue status.".to_string(),
        CommandType::Stop => "Stopping the active job.".to_string(),
        CommandType::StopJob => match command.job_id() {
            Some(id) => format!("Stopping job {}.", id),
            None => "Stopping the active job.".to_string(),
        },
    }
}

/// Whether listeners for `channel` interpret slash-commands.
pub fn supports_commands(channel: &str) -> bool {
    COMMAND_CHANNELS.contains(&channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kind(text: &str) -> Option<CommandType> {
        parse(text).map(|c| c.command_type)
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(kind("/new"), Some(CommandType::New));
        assert_eq!(kind("/restart"), Some(CommandType::Restart));
        assert_eq!(kind("/memory"), Some(CommandType::MemoryStatus));
        assert_eq!(kind("/queue"), Some(CommandType::QueueStatus));
        assert_eq!(kind("/stop"), Some(CommandType::Stop));
    }

    #[test]
    fn test_specific_forms_win_over_bare() {
        assert_eq!(kind("/queue on"), Some(CommandType::QueueOn));
        assert_eq!(kind("/queue off"), Some(CommandType::QueueOff));
        assert_eq!(kind("/memory session"), Some(CommandType::MemorySession));
        assert_eq!(kind("/memory transcript"), Some(CommandType::MemoryTranscript));
    }

    #[test]
    fn test_transcript_lines() {
        let cmd = parse("/memory transcript 50").unwrap();
        assert_eq!(cmd.command_type, CommandType::MemoryTranscript);
        assert_eq!(cmd.lines(), Some(50));

        let cmd = parse("/memory transcript").unwrap();
        assert!(cmd.args.is_none());

        assert!(parse("/memory transcript -3").is_none());
        assert!(parse("/memory transcript lots").is_none());
    }

    #[test]
    fn test_stop_job() {
        let cmd = parse("/stop job-42").unwrap();
        assert_eq!(cmd.command_type, CommandType::StopJob);
        assert_eq!(cmd.job_id(), Some("job-42"));

        let cmd = parse("/stop  Job-7   now please").unwrap();
        assert_eq!(cmd.job_id(), Some("Job-7"));
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(kind("  /QUEUE On  "), Some(CommandType::QueueOn));
        assert_eq!(kind("/New"), Some(CommandType::New));
        assert_eq!(kind("/Memory  TRANSCRIPT  5"), Some(CommandType::MemoryTranscript));
        assert_eq!(parse(" /stop X ").unwrap().raw, "/stop X");
    }

    #[test]
    fn test_bot_suffix_is_ignored() {
        assert_eq!(kind("/new@courier_bot"), Some(CommandType::New));
        assert_eq!(kind("/queue@courier_bot off"), Some(CommandType::QueueOff));
    }

    #[test]
    fn test_non_commands() {
        assert!(parse("hello").is_none());
        assert!(parse("/bogus").is_none());
        assert!(parse("").is_none());
        assert!(parse("/").is_none());
        assert!(parse("/queue maybe").is_none());
        assert!(parse("/new session please").is_none());
        assert!(parse("please /new").is_none());
        assert!(parse("/newer").is_none());
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(parse("/stop job-42").unwrap()).unwrap();
        assert_eq!(value["type"], "stop_job");
        assert_eq!(value["args"], json!({"jobId": "job-42"}));

        let value = serde_json::to_value(parse("/queue on").unwrap()).unwrap();
        assert_eq!(value["type"], "queue_on");
        assert!(value.get("args").is_none());
    }

    #[test]
    fn test_describe_is_total() {
        let inputs = [
            "/new",
            "/restart",
            "/memory",
            "/memory session",
            "/memory transcript",
            "/memory transcript 7",
            "/queue",
            "/queue on",
            "/queue off",
            "/stop",
            "/stop job-1",
        ];
        for input in inputs {
            let cmd = parse(input).unwrap();
            assert!(!describe(&cmd).is_empty(), "{}", input);
        }

        assert!(describe(&parse("/memory transcript 7").unwrap()).contains('7'));
        assert!(describe(&parse("/stop job-1").unwrap()).contains("job-1"));
    }

    #[test]
    fn test_queries_are_not_mutating() {
        assert!(CommandType::QueueOff.is_mutating());
        assert!(CommandType::StopJob.is_mutating());
        assert!(!CommandType::QueueStatus.is_mutating());
        assert!(!CommandType::MemoryTranscript.is_mutating());
    }

    #[test]
    fn test_supports_commands() {
        assert!(supports_commands("telegram"));
        assert!(supports_commands("chatspace"));
        assert!(supports_commands("dashboard"));
        assert!(!supports_commands("email"));
        assert!(!supports_commands("Telegram"));
    }
}
