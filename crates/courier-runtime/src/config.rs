//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, RuntimeError};

/// Environment variable for the idle queue poll interval in milliseconds.
pub const POLL_INTERVAL_ENV: &str = "COURIER_POLL_INTERVAL_MS";

/// Environment variable for the agent command line.
pub const AGENT_COMMAND_ENV: &str = "COURIER_AGENT_COMMAND";

/// Default agent command line.
pub const DEFAULT_AGENT_COMMAND: &str = "claude -p --output-format stream-json --verbose";

/// Configuration for the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to poll an idle queue.
    pub poll_interval: Duration,
    /// How often control requests are checked while a job runs.
    pub control_interval: Duration,
    /// How often streaming channels forward buffered fragments.
    pub flush_interval: Duration,
    /// Agent executable.
    pub agent_program: String,
    /// Arguments placed before `--resume` and the prompt.
    pub agent_args: Vec<String>,
    /// Working directory for the agent process.
    pub working_dir: Option<PathBuf>,
    /// Maximum streaming fragments held between flushes.
    pub partial_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let (agent_program, agent_args) = split_command(DEFAULT_AGENT_COMMAND).unwrap_or_default();
        Self {
            poll_interval: Duration::from_secs(1),
            control_interval: Duration::from_millis(500),
            flush_interval: Duration::from_secs(1),
            agent_program,
            agent_args,
            working_dir: None,
            partial_capacity: 1024,
        }
    }
}

impl WorkerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `COURIER_POLL_INTERVAL_MS` and
    /// `COURIER_AGENT_COMMAND`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var(POLL_INTERVAL_ENV) {
            let ms: u64 = value.trim().parse().map_err(|_| {
                RuntimeError::InvalidConfig(format!("{} must be milliseconds, got {:?}", POLL_INTERVAL_ENV, value))
            })?;
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Ok(value) = std::env::var(AGENT_COMMAND_ENV) {
            config = config.with_agent_command(&value)?;
        }

        Ok(config)
    }

    /// Sets the idle poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the control check interval.
    pub fn with_control_interval(mut self, interval: Duration) -> Self {
        self.control_interval = interval;
        self
    }

    /// Sets the streaming flush interval.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the agent command from a whitespace-separated command line.
    pub fn with_agent_command(mut self, command: &str) -> Result<Self> {
        let (program, args) = split_command(command)
            .ok_or_else(|| RuntimeError::InvalidConfig("agent command is empty".to_string()))?;
        self.agent_program = program;
        self.agent_args = args;
        Ok(self)
    }

    /// Sets the agent working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

fn split_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.control_interval, Duration::from_millis(500));
        assert_eq!(config.agent_program, "claude");
        assert_eq!(
            config.agent_args,
            vec!["-p", "--output-format", "stream-json", "--verbose"]
        );
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerConfig::new()
            .with_poll_interval(Duration::from_millis(50))
            .with_flush_interval(Duration::from_millis(20))
            .with_agent_command("  my-agent --json ")
            .unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.flush_interval, Duration::from_millis(20));
        assert_eq!(config.agent_program, "my-agent");
        assert_eq!(config.agent_args, vec!["--json"]);
    }

    #[test]
    fn test_empty_agent_command_rejected() {
        assert!(matches!(
            WorkerConfig::new().with_agent_command("   "),
            Err(RuntimeError::InvalidConfig(_))
        ));
    }
}
