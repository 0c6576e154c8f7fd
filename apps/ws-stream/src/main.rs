use ws_stream::error::StreamAppError;
use ws_stream::logger::{DEFAULT_LOG_LEVEL, initialize as LoggerInitialize};
use ws_stream::stream::{StreamArgs, cancel_on_ctrl_c, run};

use common::ErrorLocation;

use std::fs::create_dir_all;
use std::panic::Location;
use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use tokio_util::sync::CancellationToken;

const APP_DIR_NAME: &str = "ws-stream";

#[track_caller]
fn app_dir(base: Option<PathBuf>, what: &str) -> Result<PathBuf, StreamAppError> {
    let dir = base
        .map(|base| base.join(APP_DIR_NAME))
        .ok_or_else(|| StreamAppError::App {
            message: format!("No {what} directory on this platform"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    create_dir_all(&dir).map_err(|e| StreamAppError::App {
        message: format!("Failed to create {what} directory {}: {e}", dir.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;

    Ok(dir)
}

#[tokio::main]
async fn main() -> Result<(), StreamAppError> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    let args = StreamArgs::parse();

    let log_dir = app_dir(dirs::data_local_dir(), "log")?;
    LoggerInitialize(&log_dir, DEFAULT_LOG_LEVEL)?;
    let config_dir = app_dir(dirs::config_dir(), "config")?;

    info!("ws-stream starting");
    info!("Config directory: {}", config_dir.display());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel_on_ctrl_c(cancel.clone());

    let result = run(&args, &config_dir, cancel.clone()).await;
    // Ends the Ctrl-C watcher
    cancel.cancel();
    let _ = ctrl_c.await;

    match result {
        Ok(sent) => {
            info!("Done, {sent} bytes sent");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e)
        }
    }
}
