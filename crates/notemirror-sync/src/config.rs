//! Sync orchestrator configuration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use notemirror_core::defaults::{REACTION_CLEAR_DELAY_MS, REACTION_STATUSES};
use notemirror_core::{Error, NoteStatus};

/// What a bulk pass does with a malformed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidResourcePolicy {
    /// Log the record, count it as skipped and continue with the next note.
    #[default]
    Skip,
    /// Fail the whole pass.
    Abort,
}

impl InvalidResourcePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidResourcePolicy::Skip => "skip",
            InvalidResourcePolicy::Abort => "abort",
        }
    }
}

impl fmt::Display for InvalidResourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidResourcePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(InvalidResourcePolicy::Skip),
            "abort" => Ok(InvalidResourcePolicy::Abort),
            other => Err(Error::Config(format!(
                "unknown invalid resource policy '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Handling of malformed records during bulk passes.
    pub invalid_resource_policy: InvalidResourcePolicy,
    /// Delay before a status reaction is removed from its message.
    pub reaction_clear_delay_ms: u64,
    /// Reaction emoji to the status it sets.
    pub reaction_statuses: HashMap<String, NoteStatus>,
}

fn default_reaction_statuses() -> HashMap<String, NoteStatus> {
    REACTION_STATUSES
        .iter()
        .filter_map(|(emoji, status)| Some((emoji.to_string(), status.parse().ok()?)))
        .collect()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            invalid_resource_policy: InvalidResourcePolicy::default(),
            reaction_clear_delay_ms: REACTION_CLEAR_DELAY_MS,
            reaction_statuses: default_reaction_statuses(),
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NOTEMIRROR_INVALID_RESOURCE_POLICY` | `skip` | `skip` or `abort` on malformed records |
    /// | `NOTEMIRROR_REACTION_CLEAR_DELAY_MS` | `3000` | Delay before a status reaction is cleared |
    pub fn from_env() -> Self {
        let invalid_resource_policy = match std::env::var("NOTEMIRROR_INVALID_RESOURCE_POLICY") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: Error| {
                warn!(
                    subsystem = "sync",
                    component = "config",
                    error = %e,
                    "Falling back to the default invalid resource policy"
                );
                InvalidResourcePolicy::default()
            }),
            Err(_) => InvalidResourcePolicy::default(),
        };

        let reaction_clear_delay_ms = std::env::var("NOTEMIRROR_REACTION_CLEAR_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(REACTION_CLEAR_DELAY_MS);

        Self {
            invalid_resource_policy,
            reaction_clear_delay_ms,
            reaction_statuses: default_reaction_statuses(),
        }
    }

    pub fn with_invalid_resource_policy(mut self, policy: InvalidResourcePolicy) -> Self {
        self.invalid_resource_policy = policy;
        self
    }

    pub fn with_reaction_clear_delay_ms(mut self, ms: u64) -> Self {
        self.reaction_clear_delay_ms = ms;
        self
    }

    /// Map an additional reaction, or remap an existing one.
    pub fn with_reaction_status(mut self, emoji: impl Into<String>, status: NoteStatus) -> Self {
        self.reaction_statuses.insert(emoji.into(), status);
        self
    }

    pub fn reaction_clear_delay(&self) -> Duration {
        Duration::from_millis(self.reaction_clear_delay_ms)
    }

    /// Status a reaction stands for, if any.
    pub fn status_for_reaction(&self, emoji: &str) -> Option<NoteStatus> {
        self.reaction_statuses.get(emoji.trim()).copied()
    }
}
