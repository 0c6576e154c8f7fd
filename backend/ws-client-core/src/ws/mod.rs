//! WebSocket client with deadline-bounded writes.
//!
//! - [`WsClient`]: connection lifecycle, writes, read loop
//! - [`WriteGate`]: per-write deadline
//! - [`WebSocketHandler`] / [`Router`]: pluggable callbacks
//!
//! # Concurrency
//!
//! The connection is split into a read half, owned by a spawned read loop,
//! and a write half behind an async mutex. Writes are serialized in lock
//! order and never wait on the read loop.

mod client;
mod defaults;
mod interfaces;
mod listen;
mod state;
mod write_gate;

pub use client::WsClient;
pub use defaults::{CLOSE_STREAM_MESSAGE, DefaultHandler, LoggingRouter};
pub use interfaces::{
    CloseResponse, DeepgramError, MessageType, OpenResponse, Router, WebSocketHandler,
};
pub use listen::KEEP_ALIVE_MESSAGE;
pub use state::ClientState;
pub use write_gate::WriteGate;
