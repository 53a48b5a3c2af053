//! Error types shared across the engine.

/// Failure of the key-value storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Storage error: {0}")]
pub struct StorageError(pub String);

/// Network or HTTP failure while fetching a script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status}: {status_text}")]
    Status { status: u16, status_text: String },
    #[error("Request failed: {0}")]
    Network(String),
    #[error("Request timed out")]
    Timeout,
}

/// Failure to execute a payload in page context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Injection failed: {0}")]
pub struct InjectionError(pub String);

/// Failure reported by the browser host (tabs, notifications).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Host error: {0}")]
pub struct HostError(pub String);

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("A script named \"{0}\" already exists. Please use a different name.")]
    DuplicateName(String),
    #[error("A script with id \"{0}\" already exists.")]
    DuplicateId(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Injection(#[from] InjectionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("No active tab found")]
    NoActiveTab,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
