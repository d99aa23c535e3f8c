use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 5222;
pub const DEFAULT_CLIENT_NAME: &str = "harmonyjs#iOS6.0.1#iPhone";

/// Address of a hub's XMPP endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HubEndpoint {
    pub host: String,
    pub port: u16,
}

impl HubEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HubEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Client settings, loadable from TOML:
///
/// ```toml
/// host = "192.168.1.106"
/// port = 5222
/// label = "living-room"
/// request_timeout_ms = 30000
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name announced to the hub when pairing.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Prefix of this client's log records.
    #[serde(default = "default_label")]
    pub label: String,
    /// Default per-request deadline; `0` waits forever.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_pairing_timeout_ms")]
    pub pairing_timeout_ms: u64,
    /// Capacity of the engine event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_owned()
}

fn default_label() -> String {
    "hub".to_owned()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_pairing_timeout_ms() -> u64 {
    10_000
}

fn default_event_capacity() -> usize {
    64
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            client_name: default_client_name(),
            label: default_label(),
            request_timeout_ms: default_request_timeout_ms(),
            pairing_timeout_ms: default_pairing_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "host",
                message: "must not be empty".into(),
            });
        }
        if self.pairing_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "pairing_timeout_ms",
                message: "must be greater than zero".into(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "event_capacity",
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn endpoint(&self) -> HubEndpoint {
        HubEndpoint::new(self.host.clone(), self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_millis(self.pairing_timeout_ms.max(1))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_pairing_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.pairing_timeout_ms = timeout_ms;
        self
    }
}
