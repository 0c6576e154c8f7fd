// Unit tests for session bookkeeping that is not visible through the public API
// End-to-end behavior lives in integration_tests/

use crate::config::ClientOptions;
use crate::ws::{ClientState, DefaultHandler, LoggingRouter, WsClient};

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

/// Test helper: Server that closes every connection normally right after the upgrade.
async fn start_closing_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("listener has address");

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: String::new().into(),
                };
                if ws.send(Message::Close(Some(frame))).await.is_ok() {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            });
        }
    });

    format!("ws://{addr}")
}

async fn wait_for_state(client: &WsClient, expected: ClientState) -> ClientState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let state = client.state().await;
        if state == expected || tokio::time::Instant::now() >= deadline {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// **VALUE**: Verifies a server-initiated close stops the whole session, not just the
/// read loop.
///
/// **WHY THIS MATTERS**: The keep-alive task shares the session token. Left running, it
/// keeps ticking against a closed connection and holds the writer alive.
///
/// **BUG THIS CATCHES**: Would catch if the peer-close path stops reading but forgets
/// to cancel the session token.
#[tokio::test]
async fn given_server_closes_when_read_loop_handles_close_then_session_cancelled() {
    // GIVEN: A connected client with keep-alive running
    let url = start_closing_server().await;
    let options = ClientOptions::new(url).with_keep_alive_interval(Duration::from_millis(20));
    let client = WsClient::new(
        CancellationToken::new(),
        options,
        Arc::new(DefaultHandler::default()),
        Arc::new(LoggingRouter),
    )
    .expect("client");
    client.connect().await.expect("Failed to connect");

    // WHEN: The server closes
    let state = wait_for_state(&client, ClientState::Closed).await;

    // THEN: Closed, and the session token is cancelled
    assert_eq!(state, ClientState::Closed);
    assert!(client.session_is_cancelled(), "Session must stop with the peer close");
}

#[tokio::test]
async fn given_new_client_when_created_then_session_not_cancelled() {
    let client = WsClient::new(
        CancellationToken::new(),
        ClientOptions::new("ws://127.0.0.1:9"),
        Arc::new(DefaultHandler::default()),
        Arc::new(LoggingRouter),
    )
    .expect("client");

    assert!(!client.session_is_cancelled());
    assert_eq!(client.state().await, ClientState::Disconnected);
}
