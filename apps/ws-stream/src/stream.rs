//! Streams a file to a WebSocket endpoint in binary chunks.
//!
//! Connection settings come from `client.json` in the config directory,
//! then `WS_CLIENT_*` environment variables, then `--host`.

use crate::error::StreamAppError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{debug, info, warn};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ws_client_core::{ClientOptions, DefaultHandler, LoggingRouter, WsClient};

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Largest frame tungstenite accepts by default.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

fn parse_chunk_size(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("invalid value '{value}': {error}"))?;
    if !(1..=MAX_CHUNK_SIZE).contains(&parsed) {
        return Err(format!("value must be in range 1..={MAX_CHUNK_SIZE}"));
    }
    Ok(parsed)
}

fn parse_pace(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| format!("invalid duration '{value}': {error}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "ws-stream",
    about = "Stream a file to a WebSocket endpoint as binary frames",
    version
)]
pub struct StreamArgs {
    #[arg(help = "File to stream")]
    pub input: PathBuf,

    #[arg(
        long,
        help = "Endpoint URL (ws:// or wss://); overrides client.json and WS_CLIENT_HOST"
    )]
    pub host: Option<String>,

    #[arg(
        long = "chunk-size",
        default_value_t = DEFAULT_CHUNK_SIZE,
        value_parser = parse_chunk_size,
        help = "Bytes per binary frame"
    )]
    pub chunk_size: usize,

    #[arg(
        long,
        value_parser = parse_pace,
        help = "Pause between frames to approximate a live source, e.g. 20ms"
    )]
    pub pace: Option<Duration>,
}

/// Saved options, then environment, then the `--host` argument.
pub fn resolve_options(
    config_dir: &Path,
    host: Option<&str>,
) -> Result<ClientOptions, StreamAppError> {
    let mut options = ClientOptions::load(config_dir)?;
    options.apply_env_overrides()?;
    if let Some(host) = host {
        options.host = host.to_string();
    }
    options.validate()?;
    Ok(options)
}

/// Cancel `cancel` on the first Ctrl-C.
///
/// The task ends without cancelling when `cancel` fires for another reason.
pub fn cancel_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("Shutdown requested, closing stream");
                    cancel.cancel();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
            }
        }
    })
}

#[track_caller]
fn cancelled_after(sent: u64) -> StreamAppError {
    StreamAppError::App {
        message: format!("Cancelled after {sent} bytes"),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Write `input` to the connected client, `chunk_size` bytes per frame.
///
/// Returns the number of bytes written. Stops between frames with
/// [`StreamAppError::App`] if `cancel` fires.
pub async fn stream_file(
    client: &WsClient,
    input: &Path,
    chunk_size: usize,
    pace: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<u64, StreamAppError> {
    let mut file = File::open(input)
        .await
        .map_err(|e| StreamAppError::Input {
            message: format!("Failed to open {}: {e}", input.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let mut buffer = vec![0u8; chunk_size];
    let mut sent = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled_after(sent));
        }

        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| StreamAppError::Input {
                message: format!("Failed to read {}: {e}", input.display()),
                location: ErrorLocation::from(Location::caller()),
            })?;
        if read == 0 {
            break;
        }

        client.write_binary(&buffer[..read]).await?;
        sent += read as u64;
        debug!("Sent {read} bytes ({sent} total)");

        if let Some(pace) = pace {
            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled_after(sent)),
                _ = tokio::time::sleep(pace) => {}
            }
        }
    }

    Ok(sent)
}

/// Connect, stream the input, close.
///
/// `cancel` stops the stream between frames; the connection is then closed
/// with the usual handshake, so the server still receives the close message.
/// The connection is closed even when streaming fails; the streaming error
/// wins over a close error.
pub async fn run(
    args: &StreamArgs,
    config_dir: &Path,
    cancel: CancellationToken,
) -> Result<u64, StreamAppError> {
    let options = resolve_options(config_dir, args.host.as_deref())?;
    let handler = Arc::new(DefaultHandler::from_options(&options));

    // The client's own token only aborts the upgrade; an open connection is
    // always closed through `close`.
    let connect_cancel = CancellationToken::new();
    let client = WsClient::new(connect_cancel.clone(), options, handler, Arc::new(LoggingRouter))?;

    let connect = client.connect();
    tokio::pin!(connect);
    let connected = tokio::select! {
        result = &mut connect => result,
        _ = cancel.cancelled() => {
            connect_cancel.cancel();
            connect.await
        }
    };
    connected?;

    let streamed = stream_file(&client, &args.input, args.chunk_size, args.pace, &cancel).await;
    let closed = client.close().await;

    let sent = streamed?;
    closed?;
    info!("Streamed {sent} bytes from {}", args.input.display());
    Ok(sent)
}
