use thiserror::Error;

/// Errors surfaced to callers of the session registry.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The live-session cap is already reached
    #[error("maximum number of sessions ({max}) reached")]
    CapacityExceeded { max: usize },

    /// No live session is registered for the tab
    #[error("no session found for tab '{0}'")]
    NoSuchSession(String),

    /// The tab already owns a live session
    #[error("tab '{0}' already has a session")]
    TabInUse(String),

    /// The backing process could not be started or adopted
    #[error("failed to start session: {0}")]
    SpawnFailure(String),

    /// A single terminal read or write failed
    #[error("terminal I/O failed: {0}")]
    TransientIo(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
