//! Capability traits the client dispatches to, and the event values they receive.
//!
//! A [`WebSocketHandler`] sees the connection lifecycle and every raw frame.
//! A [`Router`] sees categorized events. Both are called from the read loop
//! task, so implementations must be `Send + Sync` and should return quickly.

use crate::error::ws::WsError;

use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::{Deserialize, Serialize};

const OPEN_TYPE: &str = "Open";
const CLOSE_TYPE: &str = "Close";
const ERROR_TYPE: &str = "Error";

/// Kind of data frame handed to [`WebSocketHandler::process_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenResponse {
    #[serde(rename = "type")]
    pub type_field: String,
}

impl Default for OpenResponse {
    fn default() -> Self {
        Self {
            type_field: OPEN_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResponse {
    #[serde(rename = "type")]
    pub type_field: String,
}

impl Default for CloseResponse {
    fn default() -> Self {
        Self {
            type_field: CLOSE_TYPE.to_string(),
        }
    }
}

/// Service or protocol level failure reported to [`Router::error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepgramError {
    #[serde(rename = "type")]
    pub type_field: String,
    pub err_code: String,
    pub description: String,
    pub message: String,
    pub variant: String,
}

impl DeepgramError {
    /// Error for a close frame whose code is not a normal closure.
    pub fn from_close(code: u16, reason: &str) -> Self {
        Self {
            type_field: ERROR_TYPE.to_string(),
            err_code: code.to_string(),
            description: reason.to_string(),
            message: format!("server closed the connection with code {code}"),
            variant: String::new(),
        }
    }
}

impl From<&WsError> for DeepgramError {
    fn from(error: &WsError) -> Self {
        Self {
            type_field: ERROR_TYPE.to_string(),
            err_code: error.kind().code().to_string(),
            description: error.to_string(),
            message: String::new(),
            variant: String::new(),
        }
    }
}

impl Display for DeepgramError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        write!(formatter, "{}: {}", self.err_code, self.description)
    }
}

/// Lifecycle and raw-message callbacks.
pub trait WebSocketHandler: Send + Sync {
    /// Build the URL to connect to from the configured host.
    fn get_url(&self, host: &str) -> Result<String, WsError>;

    /// Called once the upgrade completed, before any inbound frame.
    fn start(&self);

    /// Called once the connection closed normally or was cancelled.
    fn finish(&self);

    fn process_message(&self, message_type: MessageType, payload: &[u8]) -> Result<(), WsError>;

    fn process_error(&self, error: &WsError) -> Result<(), WsError>;

    /// Text sent to the server before the close frame, if any.
    fn get_close_msg(&self) -> Option<Vec<u8>>;
}

/// Categorized event sink.
pub trait Router: Send + Sync {
    fn open(&self, response: &OpenResponse) -> Result<(), WsError>;

    fn close(&self, response: &CloseResponse) -> Result<(), WsError>;

    fn binary(&self, payload: &[u8]) -> Result<(), WsError>;

    fn message(&self, payload: &[u8]) -> Result<(), WsError>;

    fn error(&self, error: &DeepgramError) -> Result<(), WsError>;
}
