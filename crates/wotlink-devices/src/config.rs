//! Configuration loading and shared constants.
//!
//! Devices are configured in a TOML file:
//!
//! ```toml
//! poll_interval_secs = 30
//!
//! [[devices]]
//! id = "weather"
//! name = "Garden Weather Station"
//! base_url = "http://192.168.1.40"
//! auth_type = "bearer"
//! token = "abc123"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthType, DeviceAuth};
use crate::error::{WotError, WotResult};

/// Default values
pub mod defaults {
    use std::time::Duration;

    pub const POLL_INTERVAL_SECS: u64 = 30;
    /// Shortest poll interval a service will run with
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// Timeout for TD discovery and property reads
    pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
    pub const ACTION_TIMEOUT: Duration = Duration::from_secs(30);
    /// Timeout for the TD check during connection validation
    pub const TD_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEVICE_NAME: &str = "WoT Device";
}

/// Fixed device endpoints
pub mod paths {
    pub const WELL_KNOWN_TD: &str = "/.well-known/wot";
    pub const ROOT: &str = "/";
    /// Tried in order when no TD describes the device
    pub const FALLBACK: [&str; 3] = ["/properties", "/", "/state"];
}

/// Key under which polled data carries the raw Thing Description.
pub const THING_DESCRIPTION_KEY: &str = "_thing_description";

/// Environment variable names
pub mod env_vars {
    pub const POLL_INTERVAL: &str = "WOTLINK_POLL_INTERVAL";
    pub const LOG_JSON: &str = "WOTLINK_LOG_JSON";

    /// Poll interval from the environment, if set and valid.
    pub fn poll_interval_secs() -> Option<u64> {
        std::env::var(POLL_INTERVAL)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0)
    }

    /// Whether JSON log output is requested.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }
}

fn default_poll_interval() -> u64 {
    defaults::POLL_INTERVAL_SECS
}

fn default_device_name() -> String {
    defaults::DEVICE_NAME.to_string()
}

/// One configured WoT device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Caller-supplied identifier, unique per configuration
    pub id: String,
    #[serde(default = "default_device_name")]
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub auth_type: AuthType,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl DeviceConfig {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: default_device_name(),
            base_url: base_url.into(),
            auth_type: AuthType::None,
            username: None,
            password: None,
            token: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_type = AuthType::Basic;
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.auth_type = AuthType::Bearer;
        self.token = Some(token.into());
        self
    }

    pub fn auth(&self) -> DeviceAuth {
        DeviceAuth::from_parts(
            self.auth_type,
            self.username.as_deref(),
            self.password.as_deref(),
            self.token.as_deref(),
        )
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WotConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Default for WotConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
            devices: Vec::new(),
        }
    }
}

impl WotConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> WotResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| WotError::Parse(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> WotResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(secs) = env_vars::poll_interval_secs() {
            config.poll_interval_secs = secs;
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn validate(&self) -> WotResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(WotError::Validation(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(WotError::Validation("Device id cannot be empty".to_string()));
            }
            if device.base_url.trim().is_empty() {
                return Err(WotError::Validation(format!(
                    "Device '{}' has an empty base_url",
                    device.id
                )));
            }
            if !seen.insert(device.id.as_str()) {
                return Err(WotError::Validation(format!("Duplicate device id '{}'", device.id)));
            }
        }
        Ok(())
    }
}
