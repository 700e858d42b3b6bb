//! Error taxonomy shared by the console and its transports.

use thiserror::Error;

/// Human-readable category of a failed admin API call.
///
/// Only a fixed set of HTTP statuses is recognised; everything else,
/// including failures that never produced a status, is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    BadRequest,
    Unauthorized,
    Forbidden,
    InternalServerError,
    ServiceUnavailable,
    Unknown,
}

impl StatusCategory {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            500 => Self::InternalServerError,
            503 => Self::ServiceUnavailable,
            _ => Self::Unknown,
        }
    }

    /// Operator-facing message for this category.
    pub fn message(self) -> &'static str {
        match self {
            Self::BadRequest => "Server understood the request, but request content was invalid.",
            Self::Unauthorized => "Unauthorized access.",
            Self::Forbidden => "Forbidden resource can't be accessed.",
            Self::InternalServerError => "Internal server error.",
            Self::ServiceUnavailable => "Service unavailable.",
            Self::Unknown => "Unknown error",
        }
    }
}

/// A single admin API call that did not produce a usable payload.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {}", StatusCategory::from_status(*status).message())]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid JSON payload: {0}")]
    Decode(String),

    #[error("endpoint must be relative to the API base: '{0}'")]
    InvalidEndpoint(String),
}

impl TransportError {
    /// HTTP status of the response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn category(&self) -> StatusCategory {
        self.status()
            .map(StatusCategory::from_status)
            .unwrap_or(StatusCategory::Unknown)
    }

    /// Shorthand for `self.category().message()`.
    pub fn message(&self) -> &'static str {
        self.category().message()
    }
}

/// The router was handed a tab identifier outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tab '{0}'")]
pub struct UnknownTabError(pub String);

/// Startup configuration problems. These disable POST-capable features but
/// never read-only polling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("CSRF credential missing: {0}")]
    MissingCsrfCredential(String),

    #[error("invalid CSRF header name '{0}'")]
    InvalidCsrfHeader(String),

    #[error("invalid API base URL '{0}'")]
    InvalidBaseUrl(String),
}
