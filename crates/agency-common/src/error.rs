//! Agency Common Error Types
//!
//! Centralized error handling for all Agency components

use std::fmt;

/// Main error type for Agency operations
#[derive(Debug)]
pub enum AgencyError {
    /// Malformed input from a client (bad address scheme, out-of-range paging)
    InvalidInput(String),
    /// A remote agent could not be reached or returned an unusable descriptor
    UpstreamUnreachable(String),
    /// A uniqueness rule was violated
    Conflict(String),
    /// A lookup or delete found nothing
    NotFound(String),
    /// The operation is deliberately not supported (task cancellation)
    UnsupportedOperation(String),
    /// A precondition that cannot be recovered from (no seed message for a task)
    FatalPrecondition(String),
    /// A task state change that the state machine does not allow
    InvalidTransition(String),
    /// The consumer side of an event queue went away
    QueueClosed,
    /// Database/storage errors
    Storage(String),
    /// IO-related errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serde(serde_json::Error),
    /// Configuration errors
    Config(String),
    /// Generic error with message
    Generic(String),
}

/// Stable, client-facing classification of an [`AgencyError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    UpstreamUnreachable,
    Conflict,
    NotFound,
    UnsupportedOperation,
    FatalPrecondition,
    Internal,
}

impl ErrorKind {
    /// The wire name of this kind, used in error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::UpstreamUnreachable => "upstream-unreachable",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not-found",
            ErrorKind::UnsupportedOperation => "unsupported-operation",
            ErrorKind::FatalPrecondition => "fatal-precondition",
            ErrorKind::Internal => "internal",
        }
    }

    /// HTTP status code the servers answer with for this kind
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::UnsupportedOperation => 501,
            ErrorKind::UpstreamUnreachable => 502,
            ErrorKind::FatalPrecondition | ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AgencyError {
    /// Classify this error for clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgencyError::InvalidInput(_) => ErrorKind::InvalidInput,
            AgencyError::UpstreamUnreachable(_) => ErrorKind::UpstreamUnreachable,
            AgencyError::Conflict(_) => ErrorKind::Conflict,
            AgencyError::NotFound(_) => ErrorKind::NotFound,
            AgencyError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            AgencyError::FatalPrecondition(_) => ErrorKind::FatalPrecondition,
            _ => ErrorKind::Internal,
        }
    }

    /// The bare message without the category prefix used by `Display`
    pub fn detail(&self) -> String {
        match self {
            AgencyError::InvalidInput(msg)
            | AgencyError::UpstreamUnreachable(msg)
            | AgencyError::Conflict(msg)
            | AgencyError::NotFound(msg)
            | AgencyError::UnsupportedOperation(msg)
            | AgencyError::FatalPrecondition(msg)
            | AgencyError::InvalidTransition(msg)
            | AgencyError::Storage(msg)
            | AgencyError::Config(msg)
            | AgencyError::Generic(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AgencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgencyError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AgencyError::UpstreamUnreachable(msg) => write!(f, "Upstream unreachable: {}", msg),
            AgencyError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AgencyError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AgencyError::UnsupportedOperation(msg) => {
                write!(f, "Unsupported operation: {}", msg)
            }
            AgencyError::FatalPrecondition(msg) => write!(f, "Fatal precondition: {}", msg),
            AgencyError::InvalidTransition(msg) => write!(f, "Invalid task transition: {}", msg),
            AgencyError::QueueClosed => write!(f, "Event queue closed"),
            AgencyError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AgencyError::Io(err) => write!(f, "IO error: {}", err),
            AgencyError::Serde(err) => write!(f, "Serialization error: {}", err),
            AgencyError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AgencyError::Generic(msg) => write!(f, "Agency error: {}", msg),
        }
    }
}

impl std::error::Error for AgencyError {}

/// Convenience result type for Agency operations
pub type Result<T> = std::result::Result<T, AgencyError>;

// Implement From traits for common error types
impl From<std::io::Error> for AgencyError {
    fn from(err: std::io::Error) -> Self {
        AgencyError::Io(err)
    }
}

impl From<serde_json::Error> for AgencyError {
    fn from(err: serde_json::Error) -> Self {
        AgencyError::Serde(err)
    }
}

impl From<anyhow::Error> for AgencyError {
    fn from(err: anyhow::Error) -> Self {
        AgencyError::Generic(err.to_string())
    }
}
