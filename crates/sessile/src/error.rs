//! Error types for session registry operations.

/// Error type for session registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The registry was used before its reaper was started.
    #[error("Session registry not initialized: call start() before resolving sessions")]
    NotInitialized,

    /// `start()` was called on a registry whose reaper is already running.
    #[error("Session registry already started")]
    AlreadyStarted,

    /// The reaper needs a tokio runtime and none is running.
    #[error("Session reaper must be started from within a tokio runtime")]
    NoRuntime,

    /// The registry has been shut down.
    #[error("Session registry has been shut down")]
    ShutDown,

    /// A process-wide registry was already installed.
    #[error("A process-wide session registry is already installed")]
    AlreadyInstalled,

    /// The reaper loop is no longer receiving refresh signals.
    #[error("Reaper stopped, refresh signal dropped")]
    ReaperStopped,

    /// Configuration failed validation.
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A typed session value could not be converted.
    #[error("Session value serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for session registry operations.
pub type Result<T> = std::result::Result<T, Error>;
