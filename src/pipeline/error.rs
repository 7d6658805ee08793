//! Pipeline error taxonomy.

use std::time::Duration;

use super::state::RunState;

/// Failure to execute an external command at all (as opposed to it exiting non-zero).
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Command is empty")]
    EmptyCommand,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s", secs = .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a stage failed. Every variant is terminal for the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("Tests failed: {0}")]
    TestFailure(String),

    #[error("Image build failed: {0}")]
    BuildFailure(String),

    #[error("Publish failed: {0}")]
    PublishFailure(String),

    /// Some tags reached the registry and some did not. Nothing is rolled back.
    #[error("Partial publish: pushed [{}], failed [{}]", .pushed.join(", "), .failed.join(", "))]
    PartialPublish {
        pushed: Vec<String>,
        failed: Vec<String>,
    },

    #[error("Refusing to overwrite immutable tag {0}")]
    TagExists(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Invalid transition from {state}: {signal}")]
    InvalidTransition { state: RunState, signal: String },

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Invalid pipeline configuration: {0}")]
    Config(String),

    /// `publish` was handed a run that did not stop at PUBLISHING.
    #[error("Run is {0}, not awaiting publish")]
    NotAwaitingPublish(RunState),

    #[error("Run record rejected for publishing: {0}")]
    Handoff(String),

    /// Registry credentials are visible to a process that runs untrusted code.
    #[error("Registry credentials must not be set while tests and builds run: {}", .0.join(", "))]
    CredentialsExposed(Vec<String>),

    #[error("Failed to read run record: {0}")]
    Record(#[from] serde_json::Error),
}
