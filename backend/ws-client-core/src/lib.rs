pub mod config;
pub mod error;
pub mod ws;

#[cfg(test)]
mod tests;

pub use config::ClientOptions;
pub use error::ws::{WsError, WsErrorKind};
pub use ws::{
    CLOSE_STREAM_MESSAGE, ClientState, CloseResponse, DeepgramError, DefaultHandler,
    KEEP_ALIVE_MESSAGE, LoggingRouter, MessageType, OpenResponse, Router, WebSocketHandler,
    WriteGate, WsClient,
};

pub const CLIENT_NAME: &str = "ws-client-core";
pub const DEFAULT_USER_AGENT: &str =
    const_format::concatcp!(CLIENT_NAME, "/", env!("CARGO_PKG_VERSION"));
