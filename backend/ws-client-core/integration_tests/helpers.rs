//! Test helpers for client integration tests.
//!
//! - Loopback WebSocket servers with scripted behavior
//! - No-op and recording Handler/Router implementations
//! - Polling helper for events produced by the read loop

use ws_client_core::{
    ClientOptions, CloseResponse, DeepgramError, MessageType, OpenResponse, Router,
    WebSocketHandler, WsClient, WsError, WsErrorKind,
};

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tokio_util::sync::CancellationToken;

pub type ServerStream = WebSocketStream<TcpStream>;

/// How long a stalled server holds the connection without reading.
pub const STALL_DURATION: Duration = Duration::from_secs(2);

/// Large enough to exceed loopback socket buffers on both ends.
pub const OVERSIZED_PAYLOAD_LEN: usize = 32 * 1024 * 1024;

/// Test helper: Bind a loopback listener on an ephemeral port.
pub async fn bind_loopback() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("listener has address");
    (listener, addr)
}

/// Test helper: Start a WebSocket server that runs `behavior` per connection.
///
/// Returns the `ws://` URL of the server.
pub async fn start_ws_server<F, Fut>(behavior: F) -> String
where
    F: Fn(ServerStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (listener, addr) = bind_loopback().await;
    let behavior = Arc::new(behavior);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let behavior = Arc::clone(&behavior);
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(stream).await {
                    behavior(ws).await;
                }
            });
        }
    });

    format!("ws://{addr}")
}

/// Server that completes the upgrade and then never reads.
pub async fn start_stalled_server() -> String {
    start_ws_server(|ws| async move {
        tokio::time::sleep(STALL_DURATION).await;
        drop(ws);
    })
    .await
}

/// Server that echoes every data frame until the client closes.
pub async fn start_echo_server() -> String {
    start_ws_server(|mut ws| async move {
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(_) | Message::Binary(_) => {
                    if ws.send(message).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    })
    .await
}

/// Server that forwards every frame it receives (close included) to the test.
pub async fn start_recording_server() -> (String, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let url = start_ws_server(move |mut ws| {
        let tx = tx.clone();
        async move {
            while let Some(Ok(message)) = ws.next().await {
                let is_close = matches!(message, Message::Close(_));
                let _ = tx.send(message);
                if is_close {
                    break;
                }
            }
        }
    })
    .await;
    (url, rx)
}

/// Server that sends `frames` right after the upgrade, then drains until close.
pub async fn start_scripted_server(frames: Vec<Message>) -> String {
    start_ws_server(move |mut ws| {
        let frames = frames.clone();
        async move {
            for frame in frames {
                if ws.send(frame).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(message)) = ws.next().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
            }
        }
    })
    .await
}

/// Plain TCP server that answers the upgrade request with `status_line`.
pub async fn start_rejecting_server(status_line: &'static str) -> String {
    let (listener, addr) = bind_loopback().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
                let response = format!("{status_line}\r\nContent-Length: 0\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("ws://{addr}")
}

/// Plain TCP server that accepts connections and never answers the upgrade.
pub async fn start_silent_server() -> String {
    let (listener, addr) = bind_loopback().await;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("ws://{addr}")
}

/// Handler whose callbacks all succeed and do nothing.
pub struct MockWebSocketHandler;

impl WebSocketHandler for MockWebSocketHandler {
    fn get_url(&self, host: &str) -> Result<String, WsError> {
        Ok(host.to_string())
    }
    fn start(&self) {}
    fn finish(&self) {}
    fn process_message(&self, _message_type: MessageType, _payload: &[u8]) -> Result<(), WsError> {
        Ok(())
    }
    fn process_error(&self, _error: &WsError) -> Result<(), WsError> {
        Ok(())
    }
    fn get_close_msg(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Router whose callbacks all succeed and do nothing.
pub struct MockRouter;

impl Router for MockRouter {
    fn open(&self, _response: &OpenResponse) -> Result<(), WsError> {
        Ok(())
    }
    fn close(&self, _response: &CloseResponse) -> Result<(), WsError> {
        Ok(())
    }
    fn binary(&self, _payload: &[u8]) -> Result<(), WsError> {
        Ok(())
    }
    fn message(&self, _payload: &[u8]) -> Result<(), WsError> {
        Ok(())
    }
    fn error(&self, _error: &DeepgramError) -> Result<(), WsError> {
        Ok(())
    }
}

/// Everything a recording handler/router saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Finish,
    HandlerMessage(MessageType, Vec<u8>),
    HandlerError(WsErrorKind),
    Open,
    Close,
    Binary(Vec<u8>),
    Message(Vec<u8>),
    RouterError(String),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn new_event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(log: &EventLog) -> Vec<Event> {
    log.lock().expect("event log lock").clone()
}

fn record(log: &EventLog, event: Event) {
    log.lock().expect("event log lock").push(event);
}

pub struct RecordingHandler {
    pub log: EventLog,
    pub close_msg: Option<Vec<u8>>,
}

impl WebSocketHandler for RecordingHandler {
    fn get_url(&self, host: &str) -> Result<String, WsError> {
        Ok(host.to_string())
    }
    fn start(&self) {
        record(&self.log, Event::Start);
    }
    fn finish(&self) {
        record(&self.log, Event::Finish);
    }
    fn process_message(&self, message_type: MessageType, payload: &[u8]) -> Result<(), WsError> {
        record(&self.log, Event::HandlerMessage(message_type, payload.to_vec()));
        Ok(())
    }
    fn process_error(&self, error: &WsError) -> Result<(), WsError> {
        record(&self.log, Event::HandlerError(error.kind()));
        Ok(())
    }
    fn get_close_msg(&self) -> Option<Vec<u8>> {
        self.close_msg.clone()
    }
}

pub struct RecordingRouter {
    pub log: EventLog,
    /// Text payload the router refuses, to exercise callback errors.
    pub reject_text: Option<Vec<u8>>,
}

impl Router for RecordingRouter {
    fn open(&self, _response: &OpenResponse) -> Result<(), WsError> {
        record(&self.log, Event::Open);
        Ok(())
    }
    fn close(&self, _response: &CloseResponse) -> Result<(), WsError> {
        record(&self.log, Event::Close);
        Ok(())
    }
    fn binary(&self, payload: &[u8]) -> Result<(), WsError> {
        record(&self.log, Event::Binary(payload.to_vec()));
        Ok(())
    }
    fn message(&self, payload: &[u8]) -> Result<(), WsError> {
        if self.reject_text.as_deref() == Some(payload) {
            return Err(WsError::application("router refused message"));
        }
        record(&self.log, Event::Message(payload.to_vec()));
        Ok(())
    }
    fn error(&self, error: &DeepgramError) -> Result<(), WsError> {
        record(&self.log, Event::RouterError(error.err_code.clone()));
        Ok(())
    }
}

/// Test helper: Client with no-op mocks.
pub fn mock_client(cancel: CancellationToken, options: ClientOptions) -> WsClient {
    WsClient::new(
        cancel,
        options,
        Arc::new(MockWebSocketHandler),
        Arc::new(MockRouter),
    )
    .expect("Failed to create client")
}

/// Test helper: Client with recording handler and router sharing one log.
pub fn recording_client(
    cancel: CancellationToken,
    options: ClientOptions,
    close_msg: Option<Vec<u8>>,
    reject_text: Option<Vec<u8>>,
) -> (WsClient, EventLog) {
    let log = new_event_log();
    let handler = RecordingHandler {
        log: Arc::clone(&log),
        close_msg,
    };
    let router = RecordingRouter {
        log: Arc::clone(&log),
        reject_text,
    };
    let client = WsClient::new(cancel, options, Arc::new(handler), Arc::new(router))
        .expect("Failed to create client");
    (client, log)
}

/// Test helper: Poll the log until `predicate` holds or two seconds pass.
pub async fn wait_for_events<P>(log: &EventLog, predicate: P) -> Vec<Event>
where
    P: Fn(&[Event]) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let events = snapshot(log);
        if predicate(&events) || tokio::time::Instant::now() >= deadline {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Test helper: Receive the next frame recorded by a recording server.
pub async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Timed out waiting for frame")
        .expect("Server channel closed")
}
