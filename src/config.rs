//! Server configuration
//!
//! Settings are read from an `appsettings.json`-style document. Everything
//! lives under the `AppConfig` section; missing keys take their defaults.
//!
//! ```json
//! {
//!     "AppConfig": {
//!         "ServerDisplayName": "Ryan's Super Server",
//!         "ServerAddress": "10.0.1.201",
//!         "ServerPort": 6000,
//!         "ShowDetailedOutput": true
//!     }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Display name used when the settings file doesn't provide one
pub const DEFAULT_DISPLAY_NAME: &str = "(Default Name)";

/// Relay settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServerConfig {
    /// Chat name announced in the viewer welcome
    #[serde(rename = "ServerDisplayName")]
    pub display_name: String,
    /// Address the listener binds to
    #[serde(rename = "ServerAddress")]
    pub bind_address: String,
    /// Port the listener binds to (0 picks a free port)
    #[serde(rename = "ServerPort")]
    pub port: u16,
    /// Detailed diagnostic output
    #[serde(rename = "ShowDetailedOutput")]
    pub verbose: bool,
    /// Idle interval between ticks
    pub tick_interval_ms: u64,
    /// Upper bound on waiting for a new connection's handshake line
    pub handshake_timeout_ms: u64,
    /// Upper bound on a single outbound write
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 6000,
            verbose: false,
            tick_interval_ms: 10,
            handshake_timeout_ms: 1000,
            write_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(rename = "AppConfig", default)]
    app_config: ServerConfig,
}

impl ServerConfig {
    /// Parse settings from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let settings: SettingsFile = serde_json::from_str(json)?;
        Ok(settings.app_config)
    }

    /// Load settings from a file
    ///
    /// Returns None when the file doesn't exist, leaving the choice of
    /// defaults (and reporting it) to the caller.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, AppError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json_str(&json).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
