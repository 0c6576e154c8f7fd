//! Deadline-bounded writes.
//!
//! A [`WriteGate`] turns `SinkExt::send` (feed + flush) into an operation that
//! returns [`WsError::DeadlineExceeded`] once the configured deadline elapses.
//! The timer is armed per call; the gate keeps no state between writes. A
//! caller that must first queue for a shared writer starts the timer with
//! [`WriteGate::expiry`] so the wait counts against the same deadline.
//!
//! A write abandoned at the deadline may have left part of a frame in the
//! transport's buffer, so the sink must not be reused afterwards.

use crate::error::ws::WsError;

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use log::{trace, warn};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{Instant, timeout_at};
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteGate {
    deadline: Option<Duration>,
}

impl WriteGate {
    /// A zero deadline is treated the same as no deadline.
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            deadline: deadline.filter(|deadline| !deadline.is_zero()),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// When a write started now must be done by, if there is a deadline.
    pub fn expiry(&self) -> Option<Instant> {
        self.deadline.map(|deadline| Instant::now() + deadline)
    }

    /// Send `message` and flush it, failing once the deadline elapses.
    ///
    /// # Errors
    ///
    /// - [`WsError::DeadlineExceeded`] - the sink did not accept and flush the
    ///   whole message in time
    /// - [`WsError::TransportClosed`] - the connection is already closed
    /// - [`WsError::Transport`] - any other transport failure
    #[track_caller]
    pub fn write<'a, S>(
        &'a self,
        sink: &'a mut S,
        message: Message,
    ) -> impl Future<Output = Result<(), WsError>> + 'a
    where
        S: Sink<Message, Error = TungsteniteError> + Unpin,
    {
        let location = ErrorLocation::from(Location::caller());
        let expires = self.expiry();
        self.send_until(sink, message, expires, location)
    }

    /// Like [`write`](Self::write), but against a deadline already started
    /// by [`expiry`](Self::expiry).
    #[track_caller]
    pub fn write_until<'a, S>(
        &'a self,
        sink: &'a mut S,
        message: Message,
        expires: Option<Instant>,
    ) -> impl Future<Output = Result<(), WsError>> + 'a
    where
        S: Sink<Message, Error = TungsteniteError> + Unpin,
    {
        let location = ErrorLocation::from(Location::caller());
        self.send_until(sink, message, expires, location)
    }

    /// Wait for the writer lock, failing once `expires` passes.
    ///
    /// Nothing has been written when this fails, so the guarded sink is
    /// still usable.
    #[track_caller]
    pub fn lock_until<'a, T>(
        &'a self,
        writer: &'a Mutex<T>,
        expires: Option<Instant>,
        bytes: usize,
    ) -> impl Future<Output = Result<MutexGuard<'a, T>, WsError>> + 'a {
        let location = ErrorLocation::from(Location::caller());
        async move {
            let (Some(expires), Some(deadline)) = (expires, self.deadline) else {
                return Ok(writer.lock().await);
            };

            match timeout_at(expires, writer.lock()).await {
                Ok(guard) => Ok(guard),
                Err(_) => {
                    warn!("Deadline of {deadline:?} passed waiting for the writer ({bytes} bytes)");
                    Err(WsError::DeadlineExceeded {
                        deadline,
                        bytes,
                        location,
                    })
                }
            }
        }
    }

    async fn send_until<S>(
        &self,
        sink: &mut S,
        message: Message,
        expires: Option<Instant>,
        location: ErrorLocation,
    ) -> Result<(), WsError>
    where
        S: Sink<Message, Error = TungsteniteError> + Unpin,
    {
        let bytes = message.len();

        let (Some(expires), Some(deadline)) = (expires, self.deadline) else {
            sink.send(message).await?;
            trace!("Wrote {bytes} bytes (no deadline)");
            return Ok(());
        };

        match timeout_at(expires, sink.send(message)).await {
            Ok(result) => {
                result?;
                trace!("Wrote {bytes} bytes within {deadline:?}");
                Ok(())
            }
            Err(_) => {
                warn!("Write of {bytes} bytes exceeded deadline of {deadline:?}");
                Err(WsError::DeadlineExceeded {
                    deadline,
                    bytes,
                    location,
                })
            }
        }
    }
}
