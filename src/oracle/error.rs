use std::fmt::Display;
use thiserror::Error;

/// Failure of an oracle call.
///
/// `Request` is a transport/service failure and aborts whatever protocol is
/// running. `Malformed` means the service answered with something that could
/// not be understood; callers recover from it locally.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("{operation} call failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} returned malformed output: {detail}")]
    Malformed {
        operation: &'static str,
        detail: String,
    },
}

impl OracleError {
    pub fn request(operation: &'static str, err: impl Display) -> Self {
        Self::Request {
            operation,
            message: err.to_string(),
        }
    }

    pub fn malformed(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            operation,
            detail: detail.into(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Request { operation, .. } | Self::Malformed { operation, .. } => operation,
        }
    }
}
