pub mod config;
pub mod ws;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Ws(#[from] ws::WsError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
