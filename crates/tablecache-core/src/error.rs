use std::path::PathBuf;

use thiserror::Error;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Source returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected payload shape: {0}")]
    UnexpectedShape(String),

    #[error("Cache file error at {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to compute fingerprint: {0}")]
    Hash(String),

    #[error("No lookup table available")]
    Unavailable,

    /// Failure of a refresh attempt made on behalf of another caller.
    #[error("Refresh failed: {message}")]
    Shared {
        kind: FailureKind,
        shape: bool,
        message: String,
    },
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Source unreachable right now; try again on the next tick.
    Transport,
    /// Source answered but the document is not what we expect.
    Decode,
    Persistence,
    Hash,
    Unavailable,
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        CacheError::Status {
            status,
            body: Self::truncate_body(body),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            CacheError::Transport(_) | CacheError::Status { .. } => FailureKind::Transport,
            CacheError::Decode(_) | CacheError::UnexpectedShape(_) => FailureKind::Decode,
            CacheError::Persistence { .. } => FailureKind::Persistence,
            CacheError::Hash(_) => FailureKind::Hash,
            CacheError::Unavailable => FailureKind::Unavailable,
            CacheError::Shared { kind, .. } => *kind,
        }
    }

    /// True when the source answered with well-formed JSON of the wrong shape,
    /// which usually means the upstream schema drifted.
    pub fn is_shape_error(&self) -> bool {
        match self {
            CacheError::UnexpectedShape(_) => true,
            CacheError::Shared { shape, .. } => *shape,
            _ => false,
        }
    }

    /// Copy of this error that can be handed to every caller waiting on the
    /// same attempt. Keeps the kind and message, drops the source chain.
    pub fn shared_copy(&self) -> CacheError {
        match self {
            CacheError::Shared {
                kind,
                shape,
                message,
            } => CacheError::Shared {
                kind: *kind,
                shape: *shape,
                message: message.clone(),
            },
            other => CacheError::Shared {
                kind: other.kind(),
                shape: other.is_shape_error(),
                message: other.to_string(),
            },
        }
    }
}
