use crate::helpers::{
    Event, OVERSIZED_PAYLOAD_LEN, STALL_DURATION, mock_client, next_frame, recording_client,
    start_echo_server, start_recording_server, start_stalled_server, wait_for_events,
};

use ws_client_core::{ClientOptions, ClientState, WsErrorKind};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Deadline-bounded writes over a real loopback connection
// ============================================================================

/// **VALUE**: Verifies that a write larger than the socket buffers fails with a deadline
/// error when the server stops reading.
///
/// **WHY THIS MATTERS**: This is the contract the client exists for. A streaming caller
/// must get control back within the configured deadline instead of hanging until the
/// server wakes up.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The deadline is not applied to binary writes
/// - The error text no longer contains "deadline exceeded"
/// - The error kind is not DeadlineExceeded
/// - The write blocks until the server drops the connection
#[tokio::test]
async fn given_stalled_server_when_write_binary_exceeds_deadline_then_deadline_exceeded() {
    // GIVEN: A server that upgrades and then never reads
    let url = start_stalled_server().await;

    // GIVEN: A connected client with a very short write deadline
    let cancel = CancellationToken::new();
    let options = ClientOptions::new(url).with_write_deadline(Duration::from_millis(100));
    let client = mock_client(cancel.clone(), options);
    client.connect().await.expect("Failed to connect");

    // WHEN: Writing a payload larger than the loopback buffers
    let payload = vec![0u8; OVERSIZED_PAYLOAD_LEN];
    let started = Instant::now();
    let result = client.write_binary(&payload).await;
    let elapsed = started.elapsed();

    // THEN: Deadline error, long before the server's stall ends
    let err = result.expect_err("Expected timeout error, got Ok");
    assert!(
        err.to_string().contains("deadline exceeded"),
        "Expected deadline exceeded error, got: {err}"
    );
    assert_eq!(err.kind(), WsErrorKind::DeadlineExceeded);
    assert!(
        elapsed < STALL_DURATION,
        "Write should return at the deadline, took {elapsed:?}"
    );

    cancel.cancel();
}

/// **VALUE**: Verifies small writes succeed with no deadline configured.
///
/// **WHY THIS MATTERS**: An unset deadline means "no bound", not "zero time". A client
/// with default options must be able to write.
///
/// **BUG THIS CATCHES**: Would catch if an unset deadline is treated as an
/// already-expired timer.
#[tokio::test]
async fn given_no_deadline_when_write_small_payload_then_succeeds() {
    // GIVEN: An echo server and a client without a deadline
    let url = start_echo_server().await;
    let cancel = CancellationToken::new();
    let client = mock_client(cancel.clone(), ClientOptions::new(url));
    client.connect().await.expect("Failed to connect");

    // WHEN: Writing 1KB
    let result = client.write_binary(&[7u8; 1024]).await;

    // THEN: Success
    assert!(result.is_ok(), "Write should succeed: {result:?}");
    assert_eq!(client.state().await, ClientState::Connected);

    client.close().await.expect("close");
}

#[tokio::test]
async fn given_zero_deadline_when_write_small_payload_then_succeeds() {
    let url = start_echo_server().await;
    let cancel = CancellationToken::new();
    let options = ClientOptions::new(url).with_write_deadline(Duration::ZERO);
    let client = mock_client(cancel.clone(), options);
    client.connect().await.expect("Failed to connect");

    let result = client.write_binary(&[1u8; 1024]).await;

    assert!(result.is_ok(), "Zero deadline means unbounded: {result:?}");
    client.close().await.expect("close");
}

/// **VALUE**: Verifies a timed-out write fails the connection and a reconnect restores
/// writes with a fresh deadline.
///
/// **WHY THIS MATTERS**: A write abandoned mid-frame leaves the stream's framing
/// corrupt, so the connection must not be reused. The next deadline must be
/// independent of the one that fired.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Writes keep going to the corrupted connection after a timeout
/// - The handler and router are not told about the failure
/// - The gate carries the expired deadline into the next connection
#[tokio::test]
async fn given_timed_out_write_when_reconnected_then_fresh_write_succeeds() {
    // GIVEN: A stalled server and a recording client
    let url = start_stalled_server().await;
    let cancel = CancellationToken::new();
    let options = ClientOptions::new(url).with_write_deadline(Duration::from_millis(100));
    let (client, log) = recording_client(cancel.clone(), options, None, None);
    client.connect().await.expect("Failed to connect");

    // GIVEN: A write that timed out
    let payload = vec![0u8; OVERSIZED_PAYLOAD_LEN];
    let err = client.write_binary(&payload).await.expect_err("must time out");
    assert!(err.is_deadline_exceeded());

    // THEN: Connection failed, callbacks saw the error
    assert_eq!(client.state().await, ClientState::Failed);
    let events = wait_for_events(&log, |events| {
        events.contains(&Event::RouterError("DEADLINE_EXCEEDED".to_string()))
    })
    .await;
    assert!(events.contains(&Event::HandlerError(WsErrorKind::DeadlineExceeded)));
    assert!(events.contains(&Event::RouterError("DEADLINE_EXCEEDED".to_string())));

    // THEN: Further writes on the failed connection are refused
    let refused = client.write_binary(&[1u8; 16]).await.expect_err("must refuse");
    assert_eq!(refused.kind(), WsErrorKind::TransportClosed);

    // WHEN: Reconnecting and writing a payload that fits the socket buffers
    client.connect().await.expect("Failed to reconnect");
    let result = client.write_binary(&[2u8; 1024]).await;

    // THEN: Fresh deadline, write succeeds
    assert!(result.is_ok(), "Write after reconnect should succeed: {result:?}");

    cancel.cancel();
}

/// **VALUE**: Verifies text and JSON writes go through the same gate and arrive intact.
///
/// **BUG THIS CATCHES**: Would catch if `write_text`/`write_json` bypass the sink lock
/// or send the wrong frame type.
#[tokio::test]
async fn given_connected_client_when_write_text_and_json_then_server_receives_text_frames() {
    // GIVEN: A recording server
    let (url, mut frames) = start_recording_server().await;
    let cancel = CancellationToken::new();
    let options = ClientOptions::new(url).with_write_deadline(Duration::from_secs(1));
    let client = mock_client(cancel.clone(), options);
    client.connect().await.expect("Failed to connect");

    // WHEN: Writing text and JSON
    client.write_text("hello").await.expect("text write");
    client
        .write_json(&serde_json::json!({"type": "Configure"}))
        .await
        .expect("json write");

    // THEN: Two text frames in order
    assert_eq!(next_frame(&mut frames).await, Message::Text("hello".to_string().into()));
    assert_eq!(
        next_frame(&mut frames).await,
        Message::Text(r#"{"type":"Configure"}"#.to_string().into())
    );

    client.close().await.expect("close");
}

/// **VALUE**: Verifies concurrent writers are serialized without corrupting frames.
///
/// **WHY THIS MATTERS**: Keep-alive frames and caller writes share one connection.
/// Interleaved partial frames would break the protocol.
///
/// **BUG THIS CATCHES**: Would catch if the sink lock is removed or held per-chunk
/// instead of per-message.
#[tokio::test]
async fn given_concurrent_writers_when_writing_then_every_frame_arrives_intact() {
    // GIVEN: A recording server and a shared client
    let (url, mut frames) = start_recording_server().await;
    let cancel = CancellationToken::new();
    let options = ClientOptions::new(url).with_write_deadline(Duration::from_secs(2));
    let client = Arc::new(mock_client(cancel.clone(), options));
    client.connect().await.expect("Failed to connect");

    // WHEN: Ten tasks write 64KB frames concurrently
    let mut handles = Vec::new();
    for i in 0..10u8 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            client.write_binary(&vec![i; 64 * 1024]).await
        }));
    }
    for handle in handles {
        handle.await.expect("task").expect("write");
    }

    // THEN: Ten complete frames, each uniform
    let mut seen = Vec::new();
    for _ in 0..10 {
        match next_frame(&mut frames).await {
            Message::Binary(data) => {
                assert_eq!(data.len(), 64 * 1024);
                assert!(data.iter().all(|b| *b == data[0]), "Frame was interleaved");
                seen.push(data[0]);
            }
            other => panic!("Expected binary frame, got {other:?}"),
        }
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..10u8).collect::<Vec<_>>());

    client.close().await.expect("close");
}

#[tokio::test]
async fn given_disconnected_client_when_write_then_transport_closed() {
    let cancel = CancellationToken::new();
    let client = mock_client(cancel, ClientOptions::new("ws://127.0.0.1:9"));

    let err = client.write_binary(b"data").await.expect_err("must fail");

    assert_eq!(err.kind(), WsErrorKind::TransportClosed);
}

/// **VALUE**: Verifies a client can fail and reconnect repeatedly, and the old session's
/// read loop never touches the new one.
///
/// **WHY THIS MATTERS**: After a timeout the old read loop is still winding down when
/// the caller reconnects. If it treats the new `Connecting` state as its own, it closes
/// the fresh connection and fires `finish`/`close` for a session that never ended.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - `connect` enters `Connecting` before the previous session's tasks have stopped
/// - A stale read loop can change the state of a newer session
/// - Reconnect returns Cancelled
#[tokio::test]
async fn given_repeated_timeouts_when_reconnecting_each_time_then_no_stale_shutdown() {
    // GIVEN: A stalled server and a recording client
    let url = start_stalled_server().await;
    let cancel = CancellationToken::new();
    let options = ClientOptions::new(url).with_write_deadline(Duration::from_millis(100));
    let (client, log) = recording_client(cancel.clone(), options, None, None);
    client.connect().await.expect("Failed to connect");

    let payload = vec![0u8; OVERSIZED_PAYLOAD_LEN];
    for round in 0..3 {
        // WHEN: A write times out and the caller reconnects immediately
        let err = client
            .write_binary(&payload)
            .await
            .expect_err("oversized write must time out");
        assert!(err.is_deadline_exceeded(), "round {round}: {err}");

        client
            .connect()
            .await
            .unwrap_or_else(|e| panic!("round {round}: reconnect failed: {e}"));

        // THEN: The new session stays connected
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            client.state().await,
            ClientState::Connected,
            "round {round}: stale read loop closed the new session"
        );
    }

    // THEN: No orderly shutdown was ever reported, only failures
    let events = crate::helpers::snapshot(&log);
    assert!(!events.contains(&Event::Finish), "Spurious finish: {events:?}");
    assert!(!events.contains(&Event::Close), "Spurious close: {events:?}");
    assert_eq!(
        events.iter().filter(|event| **event == Event::Start).count(),
        4,
        "One start per successful connect"
    );

    cancel.cancel();
}
