//! The client: connection lifecycle, serialized writes, cancellation.
//!
//! # State machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Closing -> Closed
//!                     |             |
//!                     +--> Failed <-+
//! ```
//!
//! `connect` may be called again from `Closed` or `Failed`. A write that
//! misses its deadline fails the connection: the half-written frame would
//! corrupt framing, so the sink is dropped and the caller must reconnect.
//!
//! Every `connect` starts a new session generation. Background tasks carry
//! the generation they were spawned for, and their state changes are
//! ignored once a newer session exists.

use crate::config::ClientOptions;
use crate::error::ws::WsError;
use crate::ws::interfaces::{
    CloseResponse, DeepgramError, OpenResponse, Router, WebSocketHandler,
};
use crate::ws::listen::{keep_alive, listen};
use crate::ws::state::ClientState;
use crate::ws::write_gate::WriteGate;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::spawn as TokioSpawn;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

/// State shared by the client, its read loop, and its keep-alive task.
pub(crate) struct Shared {
    pub(crate) id: Uuid,
    pub(crate) handler: Arc<dyn WebSocketHandler>,
    pub(crate) router: Arc<dyn Router>,
    pub(crate) gate: WriteGate,
    state: RwLock<ClientState>,
    generation: AtomicU64,
    sink: Mutex<Option<WsSink>>,
    session: StdMutex<CancellationToken>,
}

impl Shared {
    pub(crate) async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Move to `to` if the current state is one of `from`.
    pub(crate) async fn transition(&self, from: &[ClientState], to: ClientState) -> bool {
        self.transition_session(self.generation(), from, to).await
    }

    /// Like [`transition`](Self::transition), but only while `generation` is
    /// still the current session.
    pub(crate) async fn transition_session(
        &self,
        generation: u64,
        from: &[ClientState],
        to: ClientState,
    ) -> bool {
        let mut state = self.state.write().await;
        if generation != self.generation() {
            debug!("[{}] Ignoring {to} from stale session {generation}", self.id);
            return false;
        }
        if from.contains(&*state) {
            debug!("[{}] {} -> {}", self.id, *state, to);
            *state = to;
            true
        } else {
            false
        }
    }

    /// True while `generation` is the current session and it is connected.
    pub(crate) async fn is_live(&self, generation: u64) -> bool {
        let state = self.state.read().await;
        *state == ClientState::Connected && generation == self.generation()
    }

    async fn set_state(&self, to: ClientState) {
        let mut state = self.state.write().await;
        debug!("[{}] {} -> {}", self.id, *state, to);
        *state = to;
    }

    pub(crate) fn cancel_session(&self) {
        match self.session.lock() {
            Ok(token) => token.cancel(),
            Err(poisoned) => poisoned.into_inner().cancel(),
        }
    }

    fn replace_session(&self, token: CancellationToken) {
        let mut guard = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.cancel();
        *guard = token;
    }

    #[cfg(test)]
    pub(crate) fn session_is_cancelled(&self) -> bool {
        match self.session.lock() {
            Ok(token) => token.is_cancelled(),
            Err(poisoned) => poisoned.into_inner().is_cancelled(),
        }
    }

    /// Write one message through the gate while `Connected`.
    ///
    /// The deadline covers queueing behind other writers as well as the
    /// send. Timing out in the queue leaves the connection open; any error
    /// from the send itself leaves it `Failed`.
    pub(crate) async fn write(&self, message: Message) -> Result<(), WsError> {
        let expires = self.gate.expiry();
        let generation = {
            let state = self.state.read().await;
            if *state != ClientState::Connected {
                return Err(WsError::transport_closed(format!(
                    "cannot write while {}",
                    *state
                )));
            }
            self.generation()
        };

        let mut guard = self
            .gate
            .lock_until(&self.sink, expires, message.len())
            .await?;
        if generation != self.generation() {
            return Err(WsError::transport_closed("connection was replaced"));
        }
        let Some(sink) = guard.as_mut() else {
            return Err(WsError::transport_closed("connection has no writer"));
        };

        match self.gate.write_until(sink, message, expires).await {
            Ok(()) => Ok(()),
            Err(err) => {
                guard.take();
                drop(guard);
                self.fail_session(generation, &err).await;
                Err(err)
            }
        }
    }

    /// Hand an error to the handler and the router.
    pub(crate) fn report_error(&self, error: &WsError, service_error: &DeepgramError) {
        if let Err(e) = self.handler.process_error(error) {
            warn!("[{}] Handler rejected error report: {e}", self.id);
        }
        if let Err(e) = self.router.error(service_error) {
            warn!("[{}] Router rejected error report: {e}", self.id);
        }
    }

    /// Enter `Failed` from `Connecting`/`Connected`, stop the session, report.
    ///
    /// No-op once the connection is already closing, closed, or failed, or
    /// once `generation` has been superseded by a newer `connect`.
    pub(crate) async fn fail_session(&self, generation: u64, error: &WsError) {
        if !self
            .transition_session(
                generation,
                &[ClientState::Connecting, ClientState::Connected],
                ClientState::Failed,
            )
            .await
        {
            debug!("[{}] Ignoring error after shutdown: {error}", self.id);
            return;
        }

        error!("[{}] Connection failed: {error}", self.id);
        self.cancel_session();
        self.drop_sink();
        self.report_error(error, &DeepgramError::from(error));
    }

    /// Drop the writer without a close handshake.
    ///
    /// A writer still holding the lock keeps the sink until its write ends;
    /// the state check in [`write`](Self::write) stops any later use of it.
    pub(crate) fn drop_sink(&self) {
        match self.sink.try_lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(_) => debug!("[{}] Writer busy, leaving sink to the in-flight write", self.id),
        }
    }

    /// Final step of every orderly shutdown: callbacks, then `Closed`.
    pub(crate) async fn finish(&self) {
        self.handler.finish();
        if let Err(e) = self.router.close(&CloseResponse::default()) {
            warn!("[{}] Router rejected close event: {e}", self.id);
        }
        self.set_state(ClientState::Closed).await;
        info!("[{}] Connection closed", self.id);
    }
}

struct SessionTasks {
    token: CancellationToken,
    listener: JoinHandle<()>,
    keep_alive: Option<JoinHandle<()>>,
}

impl SessionTasks {
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.listener.await {
            warn!("Read loop ended abnormally: {e}");
        }
        if let Some(handle) = self.keep_alive {
            if let Err(e) = handle.await {
                warn!("Keep-alive task ended abnormally: {e}");
            }
        }
    }
}

/// WebSocket client wrapper with deadline-bounded writes.
///
/// One client per logical session. Inbound frames are dispatched from a
/// background read loop to the [`WebSocketHandler`] and [`Router`].
pub struct WsClient {
    options: ClientOptions,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    tasks: Mutex<Option<SessionTasks>>,
}

impl WsClient {
    /// Create a client in the `Disconnected` state.
    ///
    /// `cancel` aborts an in-progress [`connect`](Self::connect) and stops the
    /// read loop of any open connection.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Validation`] if the options are invalid.
    pub fn new(
        cancel: CancellationToken,
        options: ClientOptions,
        handler: Arc<dyn WebSocketHandler>,
        router: Arc<dyn Router>,
    ) -> Result<Self, WsError> {
        options
            .validate()
            .map_err(|e| WsError::validation(format!("Invalid client options: {e}")))?;

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            handler,
            router,
            gate: WriteGate::new(options.effective_write_deadline()),
            state: RwLock::new(ClientState::Disconnected),
            generation: AtomicU64::new(0),
            sink: Mutex::new(None),
            session: StdMutex::new(CancellationToken::new()),
        });

        debug!(
            "[{}] Client created for {} (write deadline: {:?})",
            shared.id,
            options.host,
            shared.gate.deadline()
        );

        Ok(Self {
            options,
            cancel,
            shared,
            tasks: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub async fn state(&self) -> ClientState {
        self.shared.state().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ClientState::Connected
    }

    #[cfg(test)]
    pub(crate) fn session_is_cancelled(&self) -> bool {
        self.shared.session_is_cancelled()
    }

    /// Open the connection.
    ///
    /// Returns immediately when already connected. On success the handler's
    /// `start` and the router's `open` have run and the read loop is running.
    ///
    /// # Errors
    ///
    /// - [`WsError::Validation`] - connect/close already in progress, or the
    ///   handler produced an unusable URL or header
    /// - [`WsError::Cancelled`] - the cancellation token fired first
    /// - [`WsError::UpgradeFailed`] - the handshake failed
    pub async fn connect(&self) -> Result<(), WsError> {
        // Held for the whole connect: one connect at a time, and the previous
        // session's tasks are gone before the new session starts.
        let mut tasks = self.tasks.lock().await;

        match self.state().await {
            ClientState::Connected => {
                debug!("[{}] Connect requested while already connected", self.id());
                return Ok(());
            }
            current if !current.can_connect() => {
                return Err(WsError::validation(format!(
                    "cannot connect while {current}"
                )));
            }
            _ => {}
        }

        if let Some(previous) = tasks.take() {
            previous.stop().await;
        }

        let generation = {
            let mut state = self.shared.state.write().await;
            if !state.can_connect() {
                return Err(WsError::validation(format!("cannot connect while {}", *state)));
            }
            *state = ClientState::Connecting;
            self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let request = match self.build_request() {
            Ok(request) => request,
            Err(err) => {
                self.shared.fail_session(generation, &err).await;
                return Err(err);
            }
        };

        info!("[{}] Connecting to {}", self.id(), request.uri());

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = connect_async(request) => Some(result),
        };

        let stream = match outcome {
            None => {
                info!("[{}] Connect cancelled", self.id());
                if self
                    .shared
                    .transition_session(generation, &[ClientState::Connecting], ClientState::Closing)
                    .await
                {
                    self.shared.finish().await;
                }
                return Err(WsError::cancelled("connect cancelled"));
            }
            Some(Err(e)) => {
                let err = WsError::upgrade_failed(e);
                self.shared.fail_session(generation, &err).await;
                return Err(err);
            }
            Some(Ok((stream, response))) => {
                debug!(
                    "[{}] Upgrade completed with status {}",
                    self.id(),
                    response.status()
                );
                stream
            }
        };

        let (sink, source) = stream.split();
        let token = self.cancel.child_token();
        *self.shared.sink.lock().await = Some(sink);
        self.shared.replace_session(token.clone());

        if !self
            .shared
            .transition_session(generation, &[ClientState::Connecting], ClientState::Connected)
            .await
        {
            self.shared.drop_sink();
            return Err(WsError::cancelled("connection shut down during connect"));
        }

        info!("[{}] Connected to {}", self.id(), self.options.host);

        self.shared.handler.start();
        if let Err(e) = self.shared.router.open(&OpenResponse::default()) {
            warn!("[{}] Router rejected open event: {e}", self.id());
            if let Err(e) = self.shared.handler.process_error(&e) {
                warn!("[{}] Handler rejected error report: {e}", self.id());
            }
        }

        let listener = TokioSpawn(listen(
            Arc::clone(&self.shared),
            source,
            token.clone(),
            generation,
        ));
        let keep_alive = self.options.keep_alive_interval.map(|interval| {
            TokioSpawn(keep_alive(Arc::clone(&self.shared), token.clone(), interval))
        });

        *tasks = Some(SessionTasks {
            token,
            listener,
            keep_alive,
        });

        Ok(())
    }

    /// Write a binary frame, bounded by the write deadline.
    ///
    /// The deadline starts when this is called, so time spent queued behind
    /// another writer (keep-alive, close handshake, a concurrent caller)
    /// counts against it.
    ///
    /// # Errors
    ///
    /// - [`WsError::DeadlineExceeded`] - not flushed in time; the connection is
    ///   now `Failed`. If the deadline passed while still queued, nothing was
    ///   sent and the connection stays open
    /// - [`WsError::TransportClosed`] - not connected
    /// - [`WsError::Transport`] - I/O failure
    pub async fn write_binary(&self, payload: &[u8]) -> Result<(), WsError> {
        self.shared
            .write(Message::Binary(payload.to_vec().into()))
            .await
    }

    /// Write a text frame, bounded by the write deadline.
    pub async fn write_text(&self, text: &str) -> Result<(), WsError> {
        self.shared
            .write(Message::Text(text.to_owned().into()))
            .await
    }

    /// Serialize `value` to JSON and write it as a text frame.
    pub async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), WsError> {
        let json = serde_json::to_string(value)?;
        self.write_text(&json).await
    }

    /// Close the connection with a close handshake.
    ///
    /// Sends the handler's close message (if any) and a normal close frame,
    /// each bounded by the write deadline, then stops the read loop and runs
    /// `finish`/`close` callbacks. The connection ends `Closed` even when a
    /// write fails; that write error is returned.
    pub async fn close(&self) -> Result<(), WsError> {
        if !self
            .shared
            .transition(&[ClientState::Connected], ClientState::Closing)
            .await
        {
            let state = self.state().await;
            debug!("[{}] Close requested while {state}", self.id());
            if state != ClientState::Connecting {
                self.stop_tasks().await;
            }
            return Ok(());
        }

        info!("[{}] Closing connection", self.id());
        let result = self.send_close_handshake().await;
        if let Err(ref e) = result {
            warn!("[{}] Close handshake failed: {e}", self.id());
        }
        self.shared.drop_sink();

        self.stop_tasks().await;
        self.shared.finish().await;
        result
    }

    /// Cancel the caller's token and wait for the connection to wind down.
    ///
    /// The open connection (if any) goes `Closing -> Closed` without a close
    /// handshake. Later `connect` calls return [`WsError::Cancelled`].
    pub async fn cancel(&self) {
        info!("[{}] Cancelling client", self.id());
        self.cancel.cancel();
        self.stop_tasks().await;
    }

    async fn send_close_handshake(&self) -> Result<(), WsError> {
        let gate = &self.shared.gate;
        let mut guard = gate.lock_until(&self.shared.sink, gate.expiry(), 0).await?;
        let Some(sink) = guard.as_mut() else {
            return Err(WsError::transport_closed("connection has no writer"));
        };

        if let Some(close_msg) = self.shared.handler.get_close_msg() {
            let message = match String::from_utf8(close_msg) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => Message::Binary(e.into_bytes().into()),
            };
            self.shared.gate.write(sink, message).await?;
        }

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: String::new().into(),
        };
        self.shared
            .gate
            .write(sink, Message::Close(Some(frame)))
            .await
    }

    async fn stop_tasks(&self) {
        if let Some(tasks) = self.tasks.lock().await.take() {
            tasks.stop().await;
        }
    }

    fn build_request(&self) -> Result<Request, WsError> {
        let url = self.shared.handler.get_url(&self.options.host)?;

        let mut request = url
            .into_client_request()
            .map_err(|e| WsError::validation(format!("Invalid WebSocket URL: {e}")))?;

        let headers = request.headers_mut();
        let user_agent = HeaderValue::from_str(&self.options.user_agent)
            .map_err(|e| WsError::validation(format!("Invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, user_agent);

        for (name, value) in &self.options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WsError::validation(format!("Invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| WsError::validation(format!("Invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        Ok(request)
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.shared.cancel_session();
    }
}
