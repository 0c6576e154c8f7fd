// Unit tests for WriteGate against in-memory sinks
// Real-socket behavior is covered in integration_tests/write_deadline.rs

use crate::error::ws::WsErrorKind;
use crate::ws::WriteGate;

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::Sink;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};

/// Never accepts a message, like a socket whose peer stopped reading.
struct StalledSink;

impl Sink<Message> for StalledSink {
    type Error = TungsteniteError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Accepts and flushes everything immediately.
#[derive(Default, Debug)]
struct RecordingSink {
    sent: Vec<Message>,
}

impl Sink<Message> for RecordingSink {
    type Error = TungsteniteError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.sent.push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Rejects every message as if the connection had already closed.
struct ClosedSink;

impl Sink<Message> for ClosedSink {
    type Error = TungsteniteError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Err(TungsteniteError::AlreadyClosed))
    }

    fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
        Err(TungsteniteError::AlreadyClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Err(TungsteniteError::AlreadyClosed))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

fn binary(len: usize) -> Message {
    Message::Binary(vec![0u8; len].into())
}

/// **VALUE**: Verifies a stalled write fails with DeadlineExceeded close to the deadline.
///
/// **WHY THIS MATTERS**: This is the whole point of the gate: a caller streaming audio
/// must never hang on a peer that stopped reading.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The timer is not armed (test would hang)
/// - The error kind is wrong
/// - The overshoot is unbounded
#[tokio::test]
async fn given_stalled_sink_when_write_with_deadline_then_deadline_exceeded() {
    // GIVEN: A gate with a 50ms deadline and a sink that never accepts
    let gate = WriteGate::new(Some(Duration::from_millis(50)));
    let mut sink = StalledSink;

    // WHEN: Writing
    let started = Instant::now();
    let result = gate.write(&mut sink, binary(1024 * 1024)).await;
    let elapsed = started.elapsed();

    // THEN: DeadlineExceeded, after the deadline but not much later
    let err = result.expect_err("stalled write must fail");
    assert_eq!(err.kind(), WsErrorKind::DeadlineExceeded);
    assert!(err.to_string().contains("deadline exceeded"));
    assert!(elapsed >= Duration::from_millis(40), "Returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "Overshot: {elapsed:?}");
}

/// **VALUE**: Verifies deadlines are armed per call, not shared across calls.
///
/// **WHY THIS MATTERS**: A timed-out write must not poison the next one; each write
/// gets a fresh deadline.
///
/// **BUG THIS CATCHES**: Would catch if the gate stored an absolute expiry on the first
/// write and reused it, making every later write fail immediately.
#[tokio::test]
async fn given_prior_timeout_when_next_write_on_ready_sink_then_succeeds() {
    // GIVEN: A gate that has already timed out once
    let gate = WriteGate::new(Some(Duration::from_millis(30)));
    let mut stalled = StalledSink;
    let first = gate.write(&mut stalled, binary(16)).await;
    assert!(first.is_err());

    // WHEN: Waiting past the old deadline and writing to a ready sink
    tokio::time::sleep(Duration::from_millis(60)).await;
    let mut ready = RecordingSink::default();
    let second = gate.write(&mut ready, binary(16)).await;

    // THEN: Success
    assert!(second.is_ok(), "Fresh write should succeed: {second:?}");
    assert_eq!(ready.sent.len(), 1);
}

#[tokio::test]
async fn given_no_deadline_when_write_then_message_flushed() {
    let gate = WriteGate::new(None);
    let mut sink = RecordingSink::default();

    gate.write(&mut sink, Message::Text("hello".to_string().into()))
        .await
        .expect("write should succeed");

    assert_eq!(sink.sent, vec![Message::Text("hello".to_string().into())]);
}

#[test]
fn given_zero_deadline_when_gate_created_then_unbounded() {
    let gate = WriteGate::new(Some(Duration::ZERO));

    assert_eq!(gate.deadline(), None);
}

/// **VALUE**: Verifies closed-connection failures are not reported as deadline failures.
///
/// **BUG THIS CATCHES**: Would catch if every write error is mapped to DeadlineExceeded,
/// hiding that the connection is gone.
#[tokio::test]
async fn given_closed_sink_when_write_then_transport_closed() {
    let gate = WriteGate::new(Some(Duration::from_secs(1)));
    let mut sink = ClosedSink;

    let err = gate
        .write(&mut sink, binary(8))
        .await
        .expect_err("closed sink must fail");

    assert_eq!(err.kind(), WsErrorKind::TransportClosed);
}

/// **VALUE**: Verifies time spent queued for a busy writer counts against the deadline.
///
/// **WHY THIS MATTERS**: A caller stuck behind a keep-alive frame or a close handshake
/// must still get control back within its own deadline.
///
/// **BUG THIS CATCHES**: Would catch if the timer only starts once the writer lock is
/// acquired, letting queueing time stretch a write far past the deadline.
#[tokio::test]
async fn given_writer_held_elsewhere_when_lock_until_then_deadline_exceeded() {
    // GIVEN: A writer slot locked by someone else for longer than the deadline
    let gate = WriteGate::new(Some(Duration::from_millis(50)));
    let writer = Mutex::new(Some(RecordingSink::default()));
    let held = writer.lock().await;

    // WHEN: Queueing for the writer
    let started = Instant::now();
    let result = gate.lock_until(&writer, gate.expiry(), 1024).await;
    let elapsed = started.elapsed();

    // THEN: DeadlineExceeded near the deadline, holder untouched
    let err = result.expect_err("queued write must time out");
    assert_eq!(err.kind(), WsErrorKind::DeadlineExceeded);
    assert!(elapsed < Duration::from_millis(1000), "Overshot: {elapsed:?}");
    assert!(held.is_some(), "Queue timeout must not touch the sink");
}

/// **VALUE**: Verifies the queue wait and the send share one deadline.
///
/// **BUG THIS CATCHES**: Would catch if `write_until` re-arms a full deadline after the
/// lock was acquired.
#[tokio::test]
async fn given_deadline_spent_waiting_when_write_until_then_fails_immediately() {
    // GIVEN: An expiry that has already passed
    let gate = WriteGate::new(Some(Duration::from_secs(5)));
    let expires = gate.expiry();
    let mut sink = StalledSink;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let expired = expires.map(|at| at - Duration::from_secs(5));

    // WHEN: Sending against the spent budget
    let started = Instant::now();
    let result = gate.write_until(&mut sink, binary(16), expired).await;

    // THEN: Fails right away instead of waiting a fresh five seconds
    assert_eq!(
        result.expect_err("spent budget must fail").kind(),
        WsErrorKind::DeadlineExceeded
    );
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn given_free_writer_when_lock_until_then_guard_returned() {
    let gate = WriteGate::new(Some(Duration::from_millis(50)));
    let writer = Mutex::new(Some(RecordingSink::default()));

    let mut guard = gate
        .lock_until(&writer, gate.expiry(), 0)
        .await
        .expect("free writer should lock");
    let sink = guard.as_mut().expect("sink present");
    gate.write_until(sink, binary(4), gate.expiry())
        .await
        .expect("write should succeed");

    assert_eq!(sink.sent.len(), 1);
}
