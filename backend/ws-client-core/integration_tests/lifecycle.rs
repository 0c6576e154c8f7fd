use crate::helpers::{
    Event, mock_client, next_frame, recording_client, start_echo_server, start_recording_server,
    start_rejecting_server, start_silent_server, wait_for_events,
};

use ws_client_core::{ClientOptions, ClientState, KEEP_ALIVE_MESSAGE, WsError, WsErrorKind};

use std::time::Duration;

use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Connection lifecycle: connect, close, cancel, upgrade failures
// ============================================================================

/// **VALUE**: Verifies connect runs start and open before the client reports connected.
///
/// **WHY THIS MATTERS**: Handlers initialize per-session state in `start`; routers
/// announce the session on `open`. Both must happen before any frame is dispatched.
///
/// **BUG THIS CATCHES**: Would catch if the order of `start`/`open` changes or either
/// callback is skipped.
#[tokio::test]
async fn given_running_server_when_connect_then_start_and_open_called() {
    // GIVEN: An echo server and a recording client
    let url = start_echo_server().await;
    let cancel = CancellationToken::new();
    let (client, log) = recording_client(cancel, ClientOptions::new(url), None, None);
    assert_eq!(client.state().await, ClientState::Disconnected);

    // WHEN: Connecting
    client.connect().await.expect("Failed to connect");

    // THEN: Connected, start then open
    assert!(client.is_connected().await);
    let events = wait_for_events(&log, |events| events.len() >= 2).await;
    assert_eq!(events, vec![Event::Start, Event::Open]);

    // AND: Connecting again is a no-op
    client.connect().await.expect("Second connect should be a no-op");
    assert_eq!(crate::helpers::snapshot(&log).len(), 2);

    client.close().await.expect("close");
}

/// **VALUE**: Verifies close sends the handler's close message and a normal close frame.
///
/// **WHY THIS MATTERS**: Streaming services flush final results when they receive the
/// close message; skipping it loses the tail of the stream.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The close message is not sent or sent as binary
/// - The close frame is missing or not a normal closure
/// - finish/close callbacks are skipped
#[tokio::test]
async fn given_connected_client_when_close_then_close_message_and_frame_sent() {
    // GIVEN: A recording server and a client with a close message
    let (url, mut frames) = start_recording_server().await;
    let cancel = CancellationToken::new();
    let options = ClientOptions::new(url).with_write_deadline(Duration::from_secs(1));
    let (client, log) = recording_client(cancel, options, Some(b"bye".to_vec()), None);
    client.connect().await.expect("Failed to connect");

    // WHEN: Closing
    client.close().await.expect("close should succeed");

    // THEN: Server saw the close message then a normal close frame
    assert_eq!(next_frame(&mut frames).await, Message::Text("bye".to_string().into()));
    match next_frame(&mut frames).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("Expected close frame, got {other:?}"),
    }

    // THEN: Closed, finish then close callbacks
    assert_eq!(client.state().await, ClientState::Closed);
    let events = crate::helpers::snapshot(&log);
    assert_eq!(
        events,
        vec![Event::Start, Event::Open, Event::Finish, Event::Close]
    );
}

#[tokio::test]
async fn given_closed_client_when_connect_again_then_reconnects() {
    let url = start_echo_server().await;
    let cancel = CancellationToken::new();
    let client = mock_client(cancel, ClientOptions::new(url));
    client.connect().await.expect("first connect");
    client.close().await.expect("close");
    assert_eq!(client.state().await, ClientState::Closed);

    client.connect().await.expect("reconnect");

    assert!(client.is_connected().await);
    client.close().await.expect("close");
}

/// **VALUE**: Verifies cancellation tears down an open connection without a handshake.
///
/// **WHY THIS MATTERS**: Cancellation is how an application shuts everything down at
/// once; it must not depend on the server cooperating.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The read loop ignores the token
/// - The client stays Connected after cancel
/// - finish/close callbacks are skipped
/// - Connect after cancellation starts a new connection
#[tokio::test]
async fn given_connected_client_when_cancel_then_closed_and_connect_refused() {
    // GIVEN: A connected recording client
    let url = start_echo_server().await;
    let cancel = CancellationToken::new();
    let (client, log) = recording_client(cancel, ClientOptions::new(url), None, None);
    client.connect().await.expect("Failed to connect");

    // WHEN: Cancelling
    client.cancel().await;

    // THEN: Closed with finish and close callbacks
    assert_eq!(client.state().await, ClientState::Closed);
    let events = crate::helpers::snapshot(&log);
    assert!(events.contains(&Event::Finish));
    assert!(events.contains(&Event::Close));

    // THEN: Connect refuses with Cancelled
    let err = client.connect().await.expect_err("must refuse");
    assert_eq!(err.kind(), WsErrorKind::Cancelled);
}

/// **VALUE**: Verifies the caller's token stops the read loop even when the caller
/// never calls `cancel()` on the client.
///
/// **BUG THIS CATCHES**: Would catch if the session token is not a child of the
/// caller's token.
#[tokio::test]
async fn given_connected_client_when_caller_token_cancelled_then_client_closes() {
    let url = start_echo_server().await;
    let cancel = CancellationToken::new();
    let (client, log) = recording_client(cancel.clone(), ClientOptions::new(url), None, None);
    client.connect().await.expect("Failed to connect");

    cancel.cancel();

    let events = wait_for_events(&log, |events| events.contains(&Event::Close)).await;
    assert!(events.contains(&Event::Finish));
    assert_eq!(client.state().await, ClientState::Closed);
}

/// **VALUE**: Verifies cancellation aborts a connect stuck in the upgrade and still
/// runs the shutdown callbacks.
///
/// **WHY THIS MATTERS**: A server that accepts TCP but never answers would otherwise
/// hang `connect` forever. Handlers release per-session resources in `finish`, so it
/// must run on every path to `Closed`.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - `connect` does not race the upgrade against the cancellation token
/// - The cancelled connect skips `finish`/`close`
#[tokio::test]
async fn given_silent_server_when_cancelled_during_connect_then_cancelled_error() {
    // GIVEN: A server that never answers the upgrade
    let url = start_silent_server().await;
    let cancel = CancellationToken::new();
    let (client, log) = recording_client(cancel.clone(), ClientOptions::new(url), None, None);

    // WHEN: Cancelling shortly after connect starts
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    let result = tokio::time::timeout(Duration::from_secs(2), client.connect())
        .await
        .expect("connect should return after cancellation");

    // THEN: Cancelled, Closed
    let err = result.expect_err("must be cancelled");
    assert_eq!(err.kind(), WsErrorKind::Cancelled);
    assert_eq!(client.state().await, ClientState::Closed);

    // THEN: finish and close ran, nothing else
    assert_eq!(
        crate::helpers::snapshot(&log),
        vec![Event::Finish, Event::Close]
    );
}

/// **VALUE**: Verifies a rejected upgrade is reported with its HTTP status.
///
/// **WHY THIS MATTERS**: A 401/403 means bad credentials, a 5xx means the service is
/// down. Callers need the status to tell them apart.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The status code is dropped
/// - The client does not enter Failed
/// - The router is not told about the failure
#[tokio::test]
async fn given_rejecting_server_when_connect_then_upgrade_failed_with_status() {
    // GIVEN: A server answering 403
    let url = start_rejecting_server("HTTP/1.1 403 Forbidden").await;
    let cancel = CancellationToken::new();
    let (client, log) = recording_client(cancel, ClientOptions::new(url), None, None);

    // WHEN: Connecting
    let err = client.connect().await.expect_err("must fail");

    // THEN: UpgradeFailed with status 403
    match err {
        WsError::UpgradeFailed { status, .. } => {
            let status = status.expect("status should be captured");
            assert_eq!(status.0, 403);
            assert!(status.is_auth_rejection());
        }
        other => panic!("Expected UpgradeFailed, got {other:?}"),
    }
    assert_eq!(client.state().await, ClientState::Failed);
    let events = crate::helpers::snapshot(&log);
    assert!(events.contains(&Event::HandlerError(WsErrorKind::UpgradeFailed)));
    assert!(events.contains(&Event::RouterError("UPGRADE_FAILED".to_string())));
    assert!(!events.contains(&Event::Start), "start must not run on failure");
}

#[tokio::test]
async fn given_nothing_listening_when_connect_then_upgrade_failed() {
    // GIVEN: A port with no listener
    let (listener, addr) = crate::helpers::bind_loopback().await;
    drop(listener);
    let cancel = CancellationToken::new();
    let client = mock_client(cancel, ClientOptions::new(format!("ws://{addr}")));

    // WHEN/THEN: UpgradeFailed without status
    let err = client.connect().await.expect_err("must fail");
    assert_eq!(err.kind(), WsErrorKind::UpgradeFailed);
    assert_eq!(client.state().await, ClientState::Failed);
}

#[test]
fn given_invalid_options_when_client_created_then_validation_error() {
    let result = ws_client_core::WsClient::new(
        CancellationToken::new(),
        ClientOptions::new("http://example.com"),
        std::sync::Arc::new(crate::helpers::MockWebSocketHandler),
        std::sync::Arc::new(crate::helpers::MockRouter),
    );

    match result {
        Err(err) => assert_eq!(err.kind(), WsErrorKind::Validation),
        Ok(_) => panic!("http host must be rejected"),
    }
}

/// **VALUE**: Verifies keep-alive frames are sent on the configured interval.
///
/// **WHY THIS MATTERS**: Streaming services close idle sockets; keep-alive frames hold
/// the session open between bursts of audio.
///
/// **BUG THIS CATCHES**: Would catch if the keep-alive task is never spawned or sends
/// the wrong payload.
#[tokio::test]
async fn given_keep_alive_interval_when_idle_then_keep_alive_frames_sent() {
    // GIVEN: A recording server and a client with a 50ms keep-alive
    let (url, mut frames) = start_recording_server().await;
    let cancel = CancellationToken::new();
    let options = ClientOptions::new(url).with_keep_alive_interval(Duration::from_millis(50));
    let client = mock_client(cancel, options);
    client.connect().await.expect("Failed to connect");

    // WHEN: Staying idle
    let first = next_frame(&mut frames).await;
    let second = next_frame(&mut frames).await;

    // THEN: Keep-alive text frames
    let expected = Message::Text(KEEP_ALIVE_MESSAGE.to_string().into());
    assert_eq!(first, expected);
    assert_eq!(second, expected);

    client.close().await.expect("close");
}
