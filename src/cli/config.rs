//! Configuration management for filebridge
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.filebridge/config.toml

use crate::bridge::{
    BridgeSettings, Durability, Mailbox, DEFAULT_DEBOUNCE, DEFAULT_EVENT_CAPACITY,
    DEFAULT_REQUEST_FILE, DEFAULT_RESPONSE_FILE,
};
use crate::cli::Args;
use crate::errors::{BridgeError, Result};
use crate::streaming::client::{
    ClientSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_ENDPOINT, DEFAULT_IDLE_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Complete configuration for filebridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Mailbox file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub request: String,
    pub response: String,
    pub durability: Durability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_marker: Option<String>,
}

/// Completion service connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Event loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub debounce_ms: u64,
    pub event_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            request: DEFAULT_REQUEST_FILE.to_string(),
            response: DEFAULT_RESPONSE_FILE.to_string(),
            durability: Durability::default(),
            completion_marker: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            request_timeout_secs: None,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".filebridge").join("config.toml"))
    }

    /// Apply command-line overrides, then re-validate
    pub fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(input) = &args.input {
            self.files.request = input.to_string_lossy().into_owned();
        }
        if let Some(output) = &args.output {
            self.files.response = output.to_string_lossy().into_owned();
        }
        if let Some(endpoint) = &args.endpoint {
            self.service.endpoint = endpoint.clone();
        }
        if let Some(debounce_ms) = args.debounce_ms {
            self.bridge.debounce_ms = debounce_ms;
        }
        if let Some(level) = args.verbosity().log_level() {
            self.logging.level = level.to_string();
        }

        self.validate()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.service.endpoint.as_str();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(BridgeError::ConfigError(format!(
                "endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }

        if self.files.request.trim().is_empty() || self.files.response.trim().is_empty() {
            return Err(BridgeError::ConfigError(
                "request and response paths must not be empty".to_string(),
            ));
        }

        if same_file(&self.request_path(), &self.response_path()) {
            return Err(BridgeError::ConfigError(
                "request and response must be different files".to_string(),
            ));
        }

        if let Some(marker) = self.marker_path() {
            if same_file(&marker, &self.request_path()) || same_file(&marker, &self.response_path())
            {
                return Err(BridgeError::ConfigError(
                    "completion_marker must differ from the mailbox files".to_string(),
                ));
            }
        }

        if self.service.idle_timeout_secs == 0 {
            return Err(BridgeError::ConfigError(
                "idle_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.service.connect_timeout_secs == 0 {
            return Err(BridgeError::ConfigError(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.service.request_timeout_secs == Some(0) {
            return Err(BridgeError::ConfigError(
                "request_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        if self.bridge.event_capacity == 0 {
            return Err(BridgeError::ConfigError(
                "event_capacity must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(BridgeError::ConfigError(format!(
                    "Invalid log level: {}",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BridgeError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn request_path(&self) -> PathBuf {
        Self::expand_path(&self.files.request)
    }

    pub fn response_path(&self) -> PathBuf {
        Self::expand_path(&self.files.response)
    }

    pub fn marker_path(&self) -> Option<PathBuf> {
        self.files
            .completion_marker
            .as_deref()
            .map(Self::expand_path)
    }

    /// Mailbox described by `[files]`
    pub fn mailbox(&self) -> Mailbox {
        Mailbox::new(self.request_path(), self.response_path())
            .with_durability(self.files.durability)
            .with_completion_marker(self.marker_path())
    }

    /// Transport settings described by `[service]`
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            endpoint: self.service.endpoint.clone(),
            connect_timeout: Duration::from_secs(self.service.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.service.idle_timeout_secs),
            request_timeout: self.service.request_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Event loop settings described by `[bridge]`
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            debounce: Duration::from_millis(self.bridge.debounce_ms),
            event_capacity: self.bridge.event_capacity,
        }
    }
}

/// Lexical comparison: `./a`, `a` and `$PWD/a` name the same file
fn same_file(a: &Path, b: &Path) -> bool {
    normalize(a) == normalize(b)
}

fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
