use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error;
use ws_client_core::error::config::ConfigError;
use ws_client_core::error::ws::WsError;

/// Errors surfaced by the `ws-stream` binary.
#[derive(Debug, Error)]
pub enum StreamAppError {
    /// Error from this App
    #[error("Stream App Error: {message} {location}")]
    App {
        message: String,
        location: ErrorLocation,
    },

    /// Error from ws-client-core (config, connect, write)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// Reading the input failed
    #[error("Input Error: {message} {location}")]
    Input {
        message: String,
        location: ErrorLocation,
    },
}

impl From<WsError> for StreamAppError {
    #[track_caller]
    fn from(error: WsError) -> Self {
        Self::Core {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<ConfigError> for StreamAppError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        Self::Core {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
