//! Error types for container-harness

use thiserror::Error;

/// Errors that can occur while building images or running agent containers
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Container engine executable could not be started
    #[error("failed to start {engine}: {source}")]
    Spawn {
        engine: String,
        #[source]
        source: std::io::Error,
    },

    /// Image build exited non-zero
    #[error("image build failed: {stderr}")]
    BuildFailed { stderr: String },

    /// Working directory named by a fixture does not exist
    #[error("working directory not found: {0}")]
    WorkingDirNotFound(String),

    /// Container produced no events and exited non-zero
    #[error("container failed: {status} (stderr: {stderr})")]
    ContainerFailed { status: String, stderr: String },

    /// Container exited cleanly but produced no events, with diagnostics on stderr
    #[error("no events received from container (stderr: {0})")]
    NoEventsWithStderr(String),

    /// Container exited cleanly and produced nothing at all
    #[error("no events received from container")]
    NoEvents,

    /// Cancellation fired while a build or run was in flight
    #[error("context cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}
