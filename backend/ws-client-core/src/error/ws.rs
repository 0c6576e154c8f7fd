use common::{ErrorLocation, HttpStatusCode};

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::panic::Location;
use std::time::Duration;

use thiserror::Error as ThisError;
use tokio_tungstenite::tungstenite::Error as TungsteniteError;

/// Structured classification of a [`WsError`].
///
/// Callers branch on this instead of matching on error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WsErrorKind {
    DeadlineExceeded,
    TransportClosed,
    Transport,
    UpgradeFailed,
    Application,
    Cancelled,
    Validation,
    Json,
}

impl WsErrorKind {
    /// Stable code reported to routers in [`DeepgramError::err_code`](crate::DeepgramError).
    pub fn code(&self) -> &'static str {
        match self {
            WsErrorKind::DeadlineExceeded => "DEADLINE_EXCEEDED",
            WsErrorKind::TransportClosed => "TRANSPORT_CLOSED",
            WsErrorKind::Transport => "TRANSPORT_ERROR",
            WsErrorKind::UpgradeFailed => "UPGRADE_FAILED",
            WsErrorKind::Application => "APPLICATION_ERROR",
            WsErrorKind::Cancelled => "CANCELLED",
            WsErrorKind::Validation => "VALIDATION_ERROR",
            WsErrorKind::Json => "JSON_ERROR",
        }
    }
}

impl Display for WsErrorKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(self.code())
    }
}

#[derive(Debug, ThisError)]
pub enum WsError {
    #[error("Deadline Error: deadline exceeded after {deadline:?} writing {bytes} bytes {location}")]
    DeadlineExceeded {
        deadline: Duration,
        bytes: usize,
        location: ErrorLocation,
    },

    #[error("Transport Closed Error: {message} {location}")]
    TransportClosed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Transport Error: {message} {location}")]
    Transport {
        message: String,
        location: ErrorLocation,
    },

    #[error("Upgrade Error: {message} {location}")]
    UpgradeFailed {
        message: String,
        status: Option<HttpStatusCode>,
        location: ErrorLocation,
    },

    #[error("Application Error: {message} {location}")]
    Application {
        message: String,
        location: ErrorLocation,
    },

    #[error("Cancelled Error: {message} {location}")]
    Cancelled {
        message: String,
        location: ErrorLocation,
    },

    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },

    #[error("JSON Error: {message} {location}")]
    Json {
        message: String,
        location: ErrorLocation,
    },
}

impl WsError {
    pub fn kind(&self) -> WsErrorKind {
        match self {
            WsError::DeadlineExceeded { .. } => WsErrorKind::DeadlineExceeded,
            WsError::TransportClosed { .. } => WsErrorKind::TransportClosed,
            WsError::Transport { .. } => WsErrorKind::Transport,
            WsError::UpgradeFailed { .. } => WsErrorKind::UpgradeFailed,
            WsError::Application { .. } => WsErrorKind::Application,
            WsError::Cancelled { .. } => WsErrorKind::Cancelled,
            WsError::Validation { .. } => WsErrorKind::Validation,
            WsError::Json { .. } => WsErrorKind::Json,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        self.kind() == WsErrorKind::DeadlineExceeded
    }

    pub fn location(&self) -> ErrorLocation {
        match self {
            WsError::DeadlineExceeded { location, .. }
            | WsError::TransportClosed { location, .. }
            | WsError::Transport { location, .. }
            | WsError::UpgradeFailed { location, .. }
            | WsError::Application { location, .. }
            | WsError::Cancelled { location, .. }
            | WsError::Validation { location, .. }
            | WsError::Json { location, .. } => *location,
        }
    }

    #[track_caller]
    pub fn application(message: impl Into<String>) -> Self {
        WsError::Application {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn transport_closed(message: impl Into<String>) -> Self {
        WsError::TransportClosed {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn cancelled(message: impl Into<String>) -> Self {
        WsError::Cancelled {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn validation(message: impl Into<String>) -> Self {
        WsError::Validation {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Classify a failure of the opening handshake.
    ///
    /// Every error out of `connect_async` is an upgrade failure; an HTTP
    /// response other than `101` keeps its status code.
    #[track_caller]
    pub fn upgrade_failed(error: TungsteniteError) -> Self {
        let status = match &error {
            TungsteniteError::Http(response) => {
                Some(HttpStatusCode::from(response.status().as_u16()))
            }
            _ => None,
        };

        WsError::UpgradeFailed {
            message: format!("WebSocket upgrade failed: {error}"),
            status,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<TungsteniteError> for WsError {
    #[track_caller]
    fn from(error: TungsteniteError) -> Self {
        let location = ErrorLocation::from(Location::caller());
        match error {
            TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed => {
                WsError::TransportClosed {
                    message: error.to_string(),
                    location,
                }
            }
            other => WsError::Transport {
                message: other.to_string(),
                location,
            },
        }
    }
}

impl From<serde_json::Error> for WsError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        WsError::Json {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
