use std::fmt::{Display, Formatter, Result as FormatResult};

/// Lifecycle state of a [`WsClient`](crate::WsClient).
///
/// `Closed` and `Failed` both allow a fresh `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
    Failed,
}

impl ClientState {
    pub fn can_connect(&self) -> bool {
        matches!(
            self,
            ClientState::Disconnected | ClientState::Closed | ClientState::Failed
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ClientState::Connecting | ClientState::Connected)
    }
}

impl Display for ClientState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Connecting => "connecting",
            ClientState::Connected => "connected",
            ClientState::Closing => "closing",
            ClientState::Closed => "closed",
            ClientState::Failed => "failed",
        };
        formatter.write_str(name)
    }
}
