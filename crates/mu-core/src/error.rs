//! Error types for the Melody Unmix client

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum UnmixError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Another upload is still being processed. Wait for it to finish before uploading again.")]
    Concurrency,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Temporary failure: {0}")]
    Transient(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        field_errors: BTreeMap<String, String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl UnmixError {
    /// Map a non-success HTTP status and its parsed body onto the taxonomy.
    ///
    /// 401/403 are authentication failures, 404/410 mean the resource is gone,
    /// 408/425/429 and every 5xx are worth retrying, and any other 4xx is a
    /// definitive rejection.
    pub fn from_status(status: u16, general: String, field_errors: BTreeMap<String, String>) -> Self {
        match status {
            401 | 403 => UnmixError::Auth(general),
            404 | 410 => UnmixError::NotFound(general),
            408 | 425 | 429 | 500..=599 => {
                UnmixError::Transient(format!("server answered {status}: {general}"))
            }
            _ => UnmixError::Rejected {
                status,
                message: general,
                field_errors,
            },
        }
    }

    /// True for failures a background loop may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UnmixError::Transient(_) | UnmixError::Io(_) | UnmixError::Serialization(_)
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, UnmixError::Auth(_))
    }
}

impl From<serde_json::Error> for UnmixError {
    fn from(err: serde_json::Error) -> Self {
        UnmixError::Serialization(err.to_string())
    }
}

/// Result type alias
pub type UnmixResult<T> = Result<T, UnmixError>;

/// What a client-side check rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationKind {
    /// Nothing was selected
    Empty,
    /// Wrong file type
    Type,
    /// File over the size limit
    Size,
    /// A form field failed its rule
    Field(String),
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationKind::Empty => write!(f, "empty"),
            ValidationKind::Type => write!(f, "type"),
            ValidationKind::Size => write!(f, "size"),
            ValidationKind::Field(name) => write!(f, "field:{name}"),
        }
    }
}

/// Client-detectable bad input. Never sent to the server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn field(name: &str, message: impl Into<String>) -> Self {
        Self::new(ValidationKind::Field(name.to_string()), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let none = BTreeMap::new;
        assert!(matches!(
            UnmixError::from_status(401, "expired".into(), none()),
            UnmixError::Auth(_)
        ));
        assert!(matches!(
            UnmixError::from_status(403, "forbidden".into(), none()),
            UnmixError::Auth(_)
        ));
        assert!(matches!(
            UnmixError::from_status(404, "gone".into(), none()),
            UnmixError::NotFound(_)
        ));
        assert!(matches!(
            UnmixError::from_status(410, "gone".into(), none()),
            UnmixError::NotFound(_)
        ));
        assert!(UnmixError::from_status(503, "busy".into(), none()).is_transient());
        assert!(UnmixError::from_status(429, "slow down".into(), none()).is_transient());
        assert!(matches!(
            UnmixError::from_status(400, "bad".into(), none()),
            UnmixError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn test_validation_message_is_display() {
        let err: UnmixError =
            ValidationError::new(ValidationKind::Size, "The limit is 50 MB.").into();
        assert_eq!(err.to_string(), "The limit is 50 MB.");
        assert!(!err.is_transient());
    }
}
