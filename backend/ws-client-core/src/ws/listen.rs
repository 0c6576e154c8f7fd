//! Background tasks of an open connection: the read loop and keep-alive.

use crate::error::ws::WsError;
use crate::ws::client::{Shared, WsSource};
use crate::ws::interfaces::{DeepgramError, MessageType};
use crate::ws::state::ClientState;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, trace, warn};
use tokio::time::{MissedTickBehavior, interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

/// Text frame sent on every keep-alive tick.
pub const KEEP_ALIVE_MESSAGE: &str = r#"{"type":"KeepAlive"}"#;

/// Read frames until the peer closes, the transport fails, or `token` fires.
///
/// `generation` is the session this loop belongs to; once a newer session
/// exists the loop no longer changes client state.
pub(crate) async fn listen(
    shared: Arc<Shared>,
    mut source: WsSource,
    token: CancellationToken,
    generation: u64,
) {
    debug!("[{}] Read loop started for session {generation}", shared.id);

    loop {
        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => {
                close_on_cancel(&shared, generation).await;
                break;
            }
            frame = source.next() => frame,
        };

        match frame {
            Some(Ok(Message::Binary(data))) => {
                if let Err(e) = dispatch(&shared, generation, MessageType::Binary, &data).await {
                    report_dispatch_error(&shared, &e);
                }
            }
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = dispatch(&shared, generation, MessageType::Text, text.as_bytes()).await {
                    report_dispatch_error(&shared, &e);
                }
            }
            Some(Ok(Message::Close(frame))) => {
                close_from_peer(&shared, generation, frame).await;
                break;
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                trace!("[{}] Control frame received", shared.id);
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                let err = WsError::from(e);
                shared.fail_session(generation, &err).await;
                break;
            }
            None => {
                let err = WsError::transport_closed("connection ended without a close frame");
                shared.fail_session(generation, &err).await;
                break;
            }
        }
    }

    debug!("[{}] Read loop stopped", shared.id);
}

/// Send a keep-alive text frame every `period` until `token` fires or a write fails.
pub(crate) async fn keep_alive(shared: Arc<Shared>, token: CancellationToken, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = shared.write(Message::Text(KEEP_ALIVE_MESSAGE.to_string().into())).await {
                    warn!("[{}] Keep-alive write failed: {e}", shared.id);
                    break;
                }
                trace!("[{}] Keep-alive sent", shared.id);
            }
        }
    }
}

/// Raw frame to the handler, then the categorized event to the router.
///
/// Callback errors come back as [`WsError::Application`]; they are not retried.
async fn dispatch(
    shared: &Shared,
    generation: u64,
    message_type: MessageType,
    payload: &[u8],
) -> Result<(), WsError> {
    if !shared.is_live(generation).await {
        trace!("[{}] Dropping {message_type:?} frame received while closing", shared.id);
        return Ok(());
    }

    shared
        .handler
        .process_message(message_type, payload)
        .map_err(|e| WsError::application(format!("handler rejected {message_type:?} frame: {e}")))?;

    let routed = match message_type {
        MessageType::Binary => shared.router.binary(payload),
        MessageType::Text => shared.router.message(payload),
    };
    routed.map_err(|e| WsError::application(format!("router rejected {message_type:?} frame: {e}")))
}

/// Callback failures are reported to the handler; the connection stays open.
fn report_dispatch_error(shared: &Shared, error: &WsError) {
    warn!("[{}] {error}", shared.id);
    if let Err(e) = shared.handler.process_error(error) {
        warn!("[{}] Handler rejected error report: {e}", shared.id);
    }
}

async fn close_on_cancel(shared: &Shared, generation: u64) {
    if !shared
        .transition_session(
            generation,
            &[ClientState::Connecting, ClientState::Connected],
            ClientState::Closing,
        )
        .await
    {
        return;
    }

    info!("[{}] Cancelled, dropping connection", shared.id);
    shared.drop_sink();
    shared.finish().await;
}

async fn close_from_peer(shared: &Shared, generation: u64, frame: Option<CloseFrame>) {
    if !shared
        .transition_session(generation, &[ClientState::Connected], ClientState::Closing)
        .await
    {
        // Reply to our own close handshake, or a superseded session.
        debug!("[{}] Close frame received while shutting down", shared.id);
        return;
    }

    match frame {
        Some(frame) if frame.code != CloseCode::Normal => {
            let code = u16::from(frame.code);
            let reason = frame.reason.as_str();
            info!("[{}] Server closed connection: {code} {reason}", shared.id);
            let err = WsError::transport_closed(format!(
                "server closed connection with code {code}: {reason}"
            ));
            shared.report_error(&err, &DeepgramError::from_close(code, reason));
        }
        _ => info!("[{}] Server closed connection", shared.id),
    }

    // Stops keep-alive; the peer will not read anything else.
    shared.cancel_session();
    shared.drop_sink();
    shared.finish().await;
}
