use crate::helpers::{Event, recording_client, start_scripted_server, wait_for_events};

use ws_client_core::{ClientOptions, ClientState, MessageType, WsErrorKind};

use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Inbound frame dispatch to handler and router
// ============================================================================

/// **VALUE**: Verifies every inbound data frame reaches the handler first, then the
/// router callback for its frame type.
///
/// **WHY THIS MATTERS**: Handlers may keep per-frame state (sequence counters,
/// buffers) that routers rely on. Mixing up text and binary would hand JSON results to
/// an audio consumer.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Text frames are routed to `binary` or vice versa
/// - The router runs before the handler
/// - Frames are dropped or reordered
#[tokio::test]
async fn given_text_and_binary_frames_when_received_then_handler_then_router_in_order() {
    // GIVEN: A server that sends a text frame then a binary frame
    let url = start_scripted_server(vec![
        Message::Text(r#"{"type":"Results"}"#.to_string().into()),
        Message::Binary(vec![1u8, 2, 3].into()),
    ])
    .await;
    let cancel = CancellationToken::new();
    let (client, log) = recording_client(cancel, ClientOptions::new(url), None, None);

    // WHEN: Connecting and waiting for both frames
    client.connect().await.expect("Failed to connect");
    let events = wait_for_events(&log, |events| {
        events.iter().any(|event| matches!(event, Event::Binary(_)))
    })
    .await;

    // THEN: Handler then router, for each frame, in arrival order
    let text = br#"{"type":"Results"}"#.to_vec();
    assert_eq!(
        events,
        vec![
            Event::Start,
            Event::Open,
            Event::HandlerMessage(MessageType::Text, text.clone()),
            Event::Message(text),
            Event::HandlerMessage(MessageType::Binary, vec![1, 2, 3]),
            Event::Binary(vec![1, 2, 3]),
        ]
    );

    client.close().await.expect("close");
}

/// **VALUE**: Verifies a non-normal close from the server is surfaced as an error
/// carrying the close code, then closes the client.
///
/// **WHY THIS MATTERS**: Streaming services report fatal conditions (bad audio,
/// auth expiry) through close codes. Swallowing the code hides why a stream ended.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The close code is not forwarded to the router
/// - finish/close callbacks are skipped on a server-initiated close
/// - The client is left Connected after the server closed
#[tokio::test]
async fn given_abnormal_close_from_server_when_received_then_error_reported_and_closed() {
    // GIVEN: A server that closes with 1011 right after the upgrade
    let url = start_scripted_server(vec![Message::Close(Some(CloseFrame {
        code: CloseCode::Error,
        reason: "internal".to_string().into(),
    }))])
    .await;
    let cancel = CancellationToken::new();
    let (client, log) = recording_client(cancel, ClientOptions::new(url), None, None);

    // WHEN: Connecting
    client.connect().await.expect("Failed to connect");
    let events = wait_for_events(&log, |events| events.contains(&Event::Close)).await;

    // THEN: Error with the close code, then finish and close
    assert!(
        events.contains(&Event::RouterError("1011".to_string())),
        "Expected close code error, got {events:?}"
    );
    assert!(events.contains(&Event::HandlerError(WsErrorKind::TransportClosed)));
    let error_at = events
        .iter()
        .position(|event| matches!(event, Event::RouterError(_)))
        .expect("error event");
    let close_at = events
        .iter()
        .position(|event| *event == Event::Close)
        .expect("close event");
    assert!(error_at < close_at, "Error must be reported before close");
    assert!(events.contains(&Event::Finish));
    assert_eq!(client.state().await, ClientState::Closed);
}

#[tokio::test]
async fn given_normal_close_from_server_when_received_then_closed_without_error() {
    let url = start_scripted_server(vec![Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: String::new().into(),
    }))])
    .await;
    let cancel = CancellationToken::new();
    let (client, log) = recording_client(cancel, ClientOptions::new(url), None, None);

    client.connect().await.expect("Failed to connect");
    let events = wait_for_events(&log, |events| events.contains(&Event::Close)).await;

    assert_eq!(
        events,
        vec![Event::Start, Event::Open, Event::Finish, Event::Close]
    );
    assert_eq!(client.state().await, ClientState::Closed);
}

/// **VALUE**: Verifies a router error on one frame is reported without closing the
/// connection or stopping later frames.
///
/// **WHY THIS MATTERS**: One malformed result must not end a long-running stream.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - A callback error tears down the read loop
/// - The error is not reported to the handler
/// - The error kind is not Application
#[tokio::test]
async fn given_router_rejects_frame_when_received_then_error_reported_and_stream_continues() {
    // GIVEN: A router that refuses "bad", and a server sending "bad" then "good"
    let url = start_scripted_server(vec![
        Message::Text("bad".to_string().into()),
        Message::Text("good".to_string().into()),
    ])
    .await;
    let cancel = CancellationToken::new();
    let (client, log) =
        recording_client(cancel, ClientOptions::new(url), None, Some(b"bad".to_vec()));

    // WHEN: Connecting and waiting for the second frame
    client.connect().await.expect("Failed to connect");
    let events = wait_for_events(&log, |events| {
        events.contains(&Event::Message(b"good".to_vec()))
    })
    .await;

    // THEN: Application error for the first frame, second frame delivered
    assert!(events.contains(&Event::HandlerError(WsErrorKind::Application)));
    assert!(!events.contains(&Event::Message(b"bad".to_vec())));
    assert!(events.contains(&Event::Message(b"good".to_vec())));

    // THEN: Still connected
    assert_eq!(client.state().await, ClientState::Connected);

    client.close().await.expect("close");
}
