//! clustermeta error types

/// clustermeta error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetaError {
    // Fetch errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("decode error: {0}")]
    Decode(String),

    // Registry errors
    #[error("consumer already registered: {0}")]
    AlreadyRegistered(String),

    // Lifecycle errors
    #[error("refresh loop is already running")]
    AlreadyRunning,

    #[error("refresh loop has stopped")]
    Stopped,

    #[error("metadata has not been fetched yet")]
    NotYetFetched,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MetaError {
    /// Whether this error came out of a fetch (transport, status or decode).
    ///
    /// Only used for labelling logs and metrics; no cache changes its retry
    /// cadence based on the error kind.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            MetaError::Transport(_) | MetaError::Status { .. } | MetaError::Decode(_)
        )
    }

    /// Short, stable label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            MetaError::Transport(_) => "transport",
            MetaError::Status { .. } => "status",
            MetaError::Decode(_) => "decode",
            MetaError::AlreadyRegistered(_) => "already_registered",
            MetaError::AlreadyRunning => "already_running",
            MetaError::Stopped => "stopped",
            MetaError::NotYetFetched => "not_yet_fetched",
            MetaError::Configuration(_) => "configuration",
        }
    }
}

/// Result type alias for clustermeta operations
pub type Result<T> = std::result::Result<T, MetaError>;
