//! Session configuration
//!
//! Plain serde struct with defaults for everything except the host. Loaded
//! from JSON, validated before a session is built.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lib3270::device::DeviceType;
use crate::protocol_common::ebcdic::{CodePageRegistry, CodePageTranslator, DEFAULT_CODE_PAGE};

pub const DEFAULT_PORT: u16 = 23;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_code_page() -> String {
    DEFAULT_CODE_PAGE.to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub device_type: DeviceType,
    /// LU name requested with TN3270E CONNECT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default = "default_code_page")]
    pub code_page: String,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Buffered lifecycle events per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            device_type: DeviceType::default(),
            device_name: None,
            code_page: default_code_page(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Parse and set the device type; only the eight IBM-327x names are accepted
    pub fn with_device_type(mut self, device_type: &str) -> Result<Self, ConfigError> {
        self.device_type = device_type.parse()?;
        Ok(self)
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub fn with_code_page(mut self, code_page: impl Into<String>) -> Self {
        self.code_page = code_page.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Check the fields that do not depend on registered code pages
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        Ok(())
    }

    /// Look up the configured code page
    pub fn resolve_code_page(
        &self,
        registry: &CodePageRegistry,
    ) -> Result<Arc<dyn CodePageTranslator>, ConfigError> {
        registry
            .get(&self.code_page)
            .ok_or_else(|| ConfigError::UnknownCodePage(self.code_page.clone()))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("loading configuration from {}", path.display());
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Where the CLI looks for a configuration file
///
/// `TN3270R_CONFIG` wins, then the platform config directory, then
/// `./session.json`.
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TN3270R_CONFIG") {
        return PathBuf::from(p);
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        return base.join("tn3270r").join("session.json");
    }

    #[cfg(target_os = "macos")]
    {
        let base = std::env::var_os("HOME")
            .map(|h| Path::new(&h).join("Library").join("Application Support"))
            .unwrap_or_else(|| PathBuf::from("."));
        return base.join("tn3270r").join("session.json");
    }

    #[cfg(target_os = "windows")]
    {
        let base = std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        return base.join("tn3270r").join("session.json");
    }

    #[allow(unreachable_code)]
    PathBuf::from("session.json")
}
