//! Ready-made [`WebSocketHandler`] and [`Router`] implementations.

use crate::config::ClientOptions;
use crate::error::ws::WsError;
use crate::ws::interfaces::{
    CloseResponse, DeepgramError, MessageType, OpenResponse, Router, WebSocketHandler,
};

use log::{debug, error, info, trace};
use url::Url;

/// Text sent before the close frame to ask the service to flush and finish.
pub const CLOSE_STREAM_MESSAGE: &str = r#"{"type":"CloseStream"}"#;

/// Builds the URL from host and configured path; no-op lifecycle callbacks.
#[derive(Debug, Clone, Default)]
pub struct DefaultHandler {
    path: Option<String>,
}

impl DefaultHandler {
    pub fn new(path: Option<String>) -> Self {
        Self { path }
    }

    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(options.path.clone())
    }
}

impl WebSocketHandler for DefaultHandler {
    fn get_url(&self, host: &str) -> Result<String, WsError> {
        let mut url = Url::parse(host)
            .map_err(|e| WsError::validation(format!("Invalid host URL {host}: {e}")))?;

        if let Some(ref path) = self.path {
            url.set_path(path);
        }

        Ok(url.to_string())
    }

    fn start(&self) {
        debug!("Handler started");
    }

    fn finish(&self) {
        debug!("Handler finished");
    }

    fn process_message(&self, message_type: MessageType, payload: &[u8]) -> Result<(), WsError> {
        trace!("Received {message_type:?} frame of {} bytes", payload.len());
        Ok(())
    }

    fn process_error(&self, error: &WsError) -> Result<(), WsError> {
        debug!("Handler saw error: {error}");
        Ok(())
    }

    fn get_close_msg(&self) -> Option<Vec<u8>> {
        Some(CLOSE_STREAM_MESSAGE.as_bytes().to_vec())
    }
}

/// Logs every routed event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRouter;

impl Router for LoggingRouter {
    fn open(&self, response: &OpenResponse) -> Result<(), WsError> {
        info!("Connection event: {}", response.type_field);
        Ok(())
    }

    fn close(&self, response: &CloseResponse) -> Result<(), WsError> {
        info!("Connection event: {}", response.type_field);
        Ok(())
    }

    fn binary(&self, payload: &[u8]) -> Result<(), WsError> {
        debug!("Binary message: {} bytes", payload.len());
        Ok(())
    }

    fn message(&self, payload: &[u8]) -> Result<(), WsError> {
        info!("Message: {}", String::from_utf8_lossy(payload));
        Ok(())
    }

    fn error(&self, error: &DeepgramError) -> Result<(), WsError> {
        error!("Service error: {error}");
        Ok(())
    }
}
