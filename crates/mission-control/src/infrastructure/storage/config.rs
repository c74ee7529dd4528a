//! TOML configuration for the mission control server.
//!
//! The file lives at `<platform config dir>/mission-control/config.toml`
//! unless `--config` points elsewhere:
//! `%APPDATA%\mission-control\config.toml` on Windows and
//! `~/.config/mission-control/config.toml` elsewhere.
//!
//! A missing file is not an error; every field has a default, so the server
//! runs out of the box and an older file keeps working when fields are added.
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! bind_address = "0.0.0.0"
//! ws_port = 8000
//! admin_token = "secret"
//! default_privilege = "player"
//! outbound_buffer = 64
//! send_timeout_ms = 250
//!
//! [render]
//! fps = 30
//!
//! [discovery]
//! enabled = true
//! port = 7331
//! device_timeout_secs = 5
//!
//! [modes]
//! enabled = ["draw", "pattern"]
//! default = "draw"
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mission_core::Privilege;

use crate::application::device_reconciler::DEFAULT_FPS;
use crate::infrastructure::network::discovery::DEFAULT_DISCOVERY_PORT;
use crate::modes::BUILTIN;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but cannot be used.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Whole file.  Missing sections and keys fall back to [`Default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_level: String,
    pub server: ServerConfig,
    pub render: RenderConfig,
    pub discovery: DiscoveryConfig,
    pub modes: ModesConfig,
}

/// WebSocket listener and per-connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub ws_port: u16,
    /// Clients presenting `?token=<admin_token>` get admin privilege.
    /// Without a (non-empty) token configured nobody is admin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
    /// Privilege of every other connection.
    pub default_privilege: Privilege,
    /// Outbound messages queued per connection before sends start failing.
    pub outbound_buffer: usize,
    /// Upper bound on a single socket write.
    pub send_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub port: u16,
    /// A controller silent for longer than this is considered gone.
    pub device_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModesConfig {
    /// Built-in modes to register, in order.
    pub enabled: Vec<String>,
    /// Mode active at startup; the first enabled mode when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            render: RenderConfig::default(),
            discovery: DiscoveryConfig::default(),
            modes: ModesConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            ws_port: 8000,
            admin_token: None,
            default_privilege: Privilege::default(),
            outbound_buffer: 64,
            send_timeout_ms: 250,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { fps: DEFAULT_FPS }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_DISCOVERY_PORT,
            device_timeout_secs: 5,
        }
    }
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            enabled: BUILTIN.iter().map(|m| m.to_string()).collect(),
            default: None,
        }
    }
}

impl ServerConfig {
    /// The socket address the WebSocket listener binds.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `bind_address` is not an IP address.
    pub fn ws_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind_address {:?}: {e}", self.bind_address)))?;
        Ok(SocketAddr::new(ip, self.ws_port))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl DiscoveryConfig {
    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.device_timeout_secs)
    }
}

impl AppConfig {
    /// Rejects values that parse but would break the server at runtime.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.ws_bind_addr()?;
        if self.server.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("server.outbound_buffer must be at least 1".into()));
        }
        if self.server.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid("server.send_timeout_ms must be at least 1".into()));
        }
        if self.render.fps == 0 {
            return Err(ConfigError::Invalid("render.fps must be at least 1".into()));
        }
        if self.modes.enabled.is_empty() {
            return Err(ConfigError::Invalid("modes.enabled must name at least one mode".into()));
        }
        Ok(())
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `path`, or from [`config_file_path`] when `None`.
/// A file that does not exist yields `AppConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// `<config dir>/mission-control`: `%APPDATA%` on Windows, otherwise
/// `$XDG_CONFIG_HOME` or `~/.config`.
fn platform_config_dir() -> Option<PathBuf> {
    let base = if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    };
    base.map(|b| b.join("mission-control"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
