pub mod duration_format;

use crate::DEFAULT_USER_AGENT;
use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use url::Url;

const CONFIG_FILE_NAME: &str = "client.json";
const WS_SCHEME: &str = "ws";
const WSS_SCHEME: &str = "wss";

pub const ENV_HOST: &str = "WS_CLIENT_HOST";
pub const ENV_WRITE_DEADLINE: &str = "WS_CLIENT_WRITE_DEADLINE";

/// Connection settings for a [`WsClient`](crate::WsClient).
///
/// The client takes its own copy at construction; nothing here changes while
/// a connection is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Endpoint URL, `ws://` or `wss://`.
    #[serde(default)]
    pub host: String,

    /// Path the default handler puts on the URL, replacing the host's path.
    #[serde(default)]
    pub path: Option<String>,

    /// Upper bound on a single write. Unset or zero means no bound.
    #[serde(default, with = "duration_format")]
    pub write_deadline: Option<Duration>,

    /// Interval for keep-alive text frames. Unset disables them.
    #[serde(default, with = "duration_format")]
    pub keep_alive_interval: Option<Duration>,

    /// Extra headers sent with the upgrade request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            path: None,
            write_deadline: None,
            keep_alive_interval: None,
            headers: BTreeMap::new(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl ClientOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_write_deadline(mut self, deadline: Duration) -> Self {
        self.write_deadline = Some(deadline);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The deadline writes actually run under; a zero duration counts as unset.
    pub fn effective_write_deadline(&self) -> Option<Duration> {
        self.write_deadline.filter(|deadline| !deadline.is_zero())
    }

    /// Load options from {config_dir}/client.json.
    ///
    /// # Returns
    ///
    /// Returns `Ok(ClientOptions)` if loaded successfully or defaults if file missing.
    /// Returns `Err(ConfigError)` if file exists but is corrupted/invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Client config not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read client config: {e}");
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let options: ClientOptions = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse client config JSON: {e}");
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        info!("Client config loaded from {}", config_path.display());
        Ok(options)
    }

    /// Save options to {config_dir}/client.json using temp file + rename.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation, directory creation, serialization,
    /// write, or rename fails.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Client config saved to {}", config_path.display());
        Ok(())
    }

    /// Override host and write deadline from the environment (or a `.env` file).
    ///
    /// `WS_CLIENT_HOST` replaces the host; `WS_CLIENT_WRITE_DEADLINE` takes a
    /// humantime duration such as `250ms`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = dotenvy::var(ENV_HOST) {
            info!("Host overridden from {ENV_HOST}: {host}");
            self.host = host;
        }

        if let Ok(raw) = dotenvy::var(ENV_WRITE_DEADLINE) {
            let deadline =
                humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::EnvError {
                    location: ErrorLocation::from(Location::caller()),
                    variable: ENV_WRITE_DEADLINE,
                    reason: format!("invalid duration {raw:?}: {e}"),
                })?;
            info!("Write deadline overridden from {ENV_WRITE_DEADLINE}: {deadline:?}");
            self.write_deadline = Some(deadline);
        }

        Ok(())
    }

    /// Validate option values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "host is required".to_string(),
            });
        }

        let url = Url::parse(&self.host).map_err(|e| ConfigError::ValidationError {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("Invalid host URL {}: {e}", self.host),
        })?;

        if url.scheme() != WS_SCHEME && url.scheme() != WSS_SCHEME {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid host scheme: {} (expected {WS_SCHEME} or {WSS_SCHEME})",
                    url.scheme()
                ),
            });
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("Host URL has no host: {}", self.host),
            });
        }

        if let Some(ref path) = self.path {
            if !path.starts_with('/') {
                return Err(ConfigError::ValidationError {
                    location: ErrorLocation::from(Location::caller()),
                    reason: format!("path must start with '/': {path}"),
                });
            }
        }

        if self.keep_alive_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "keep_alive_interval cannot be zero".to_string(),
            });
        }

        HeaderValue::from_str(&self.user_agent).map_err(|e| ConfigError::ValidationError {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("Invalid user agent {:?}: {e}", self.user_agent),
        })?;

        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::ValidationError {
                    location: ErrorLocation::from(Location::caller()),
                    reason: format!("Invalid header name {name:?}: {e}"),
                }
            })?;
            HeaderValue::from_str(value).map_err(|e| ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("Invalid value for header {name:?}: {e}"),
            })?;
        }

        Ok(())
    }
}
