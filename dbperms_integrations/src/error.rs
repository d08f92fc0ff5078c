use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable failure classes reported back to the tool caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownTool,
    InvalidParams,
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    ClientError,
    ServerError,
    Timeout,
    TransportError,
    ShuttingDown,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::InvalidParams => "InvalidParams",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ClientError => "ClientError",
            ErrorKind::ServerError => "ServerError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::ShuttingDown => "ShuttingDown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single outbound call, after the retry policy was applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            400..=499 => ErrorKind::ClientError,
            _ => ErrorKind::ServerError,
        };
        Self::new(kind, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationReason {
    AmbiguousPrincipal,
    UnknownPermissionLevel,
    DuplicatePrincipal,
    UnsupportedValue,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub reason: ValidationReason,
    pub message: String,
}

impl ValidationError {
    pub fn new(reason: ValidationReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Everything an adapter operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    InvalidParams(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Error::InvalidParams(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidParams(_) => ErrorKind::InvalidParams,
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Transport(e) => e.kind,
        }
    }

    /// Message without the kind prefix; the envelope carries the kind separately.
    pub fn message(&self) -> String {
        match self {
            Error::InvalidParams(message) => message.clone(),
            Error::Validation(e) => e.message.clone(),
            Error::Transport(e) => e.message.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABRICKS_HOST is not set or empty")]
    MissingHost,
    #[error("DATABRICKS_TOKEN is not set or empty")]
    MissingToken,
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
