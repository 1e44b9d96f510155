#![forbid(unsafe_code)]

//! Deployment configuration.
//!
//! Values come from defaults, then an optional TOML document, then
//! environment overrides. Each override is looked up as `CSYNC_<KEY>` first
//! and `csync_<key>` second, so `CSYNC_PRODUCTION_MODE=true` and
//! `csync_production_mode=true` both work.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unreadable file | Missing path, permissions | `ConfigError::Io` |
//! | Bad TOML | Syntax or type error | `ConfigError::Parse` |
//! | Bad override | `CSYNC_SEND_TIMINGS=maybe` | `ConfigError::InvalidValue` |
//! | Zero upload buffer | Misconfiguration | `ConfigError::InvalidValue` |

use core::fmt;
use core::str::FromStr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Buffer size used when streaming uploads to their sinks.
pub const DEFAULT_UPLOAD_BUFFER_SIZE: usize = 4 * 1024;

/// Configuration loading failure.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(String),
    InvalidValue {
        key: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config file {}: {source}", path.display())
            }
            Self::Parse(msg) => write!(f, "invalid config: {msg}"),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value {value:?} for config key {key}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// User-visible messages for session expiry and out-of-sync clients.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SystemMessages {
    pub session_expired_notification_enabled: bool,
    pub session_expired_url: Option<String>,
    pub session_expired_caption: Option<String>,
    pub session_expired_message: Option<String>,
    pub out_of_sync_caption: Option<String>,
    pub out_of_sync_message: Option<String>,
    pub out_of_sync_url: Option<String>,
}

impl SystemMessages {
    /// Session expiry should redirect silently once the timeout passes.
    #[must_use]
    pub fn wants_timed_redirect(&self) -> bool {
        self.session_expired_notification_enabled
            && self.session_expired_caption.is_none()
            && self.session_expired_message.is_none()
    }

    /// An out-of-sync client should see a notification instead of a repaint.
    #[must_use]
    pub fn has_out_of_sync_notice(&self) -> bool {
        self.out_of_sync_caption.is_some() || self.out_of_sync_message.is_some()
    }
}

/// Settings shared by every session of one deployment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub production_mode: bool,
    /// Require the session token as the first payload segment.
    pub xsrf_protection: bool,
    /// Seconds clients may cache connector resources.
    pub resource_cache_time: u32,
    /// Reject non-serializable state types instead of warning.
    pub strict_serialization: bool,
    pub session_timeout_secs: u32,
    pub upload_buffer_size: usize,
    /// Append `timings` to every response.
    pub send_timings: bool,
    pub default_theme: String,
    /// Falls back to the process locale when unset.
    pub default_locale: Option<String>,
    /// Version clients are expected to report.
    pub server_version: String,
    pub logout_url: Option<String>,
    pub system_messages: SystemMessages,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            production_mode: false,
            xsrf_protection: true,
            resource_cache_time: 3600,
            strict_serialization: false,
            session_timeout_secs: 1800,
            upload_buffer_size: DEFAULT_UPLOAD_BUFFER_SIZE,
            send_timings: false,
            default_theme: "base".to_owned(),
            default_locale: None,
            server_version: env!("CARGO_PKG_VERSION").to_owned(),
            logout_url: None,
            system_messages: SystemMessages::default(),
        }
    }
}

impl DeploymentConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed input, or
    /// [`ConfigError::InvalidValue`] if validation fails.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    #[cfg(feature = "config-file")]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] if a variable does not parse.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] if a value does not parse.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(&format!("CSYNC_{}", key.to_ascii_uppercase()))
                .or_else(|| lookup(&format!("csync_{key}")))
        };

        if let Some(v) = get("production_mode") {
            self.production_mode = parse_bool("production_mode", &v)?;
        }
        if let Some(v) = get("xsrf_protection") {
            self.xsrf_protection = parse_bool("xsrf_protection", &v)?;
        }
        if let Some(v) = get("resource_cache_time") {
            self.resource_cache_time = parse_number("resource_cache_time", &v)?;
        }
        if let Some(v) = get("strict_serialization") {
            self.strict_serialization = parse_bool("strict_serialization", &v)?;
        }
        if let Some(v) = get("session_timeout_secs") {
            self.session_timeout_secs = parse_number("session_timeout_secs", &v)?;
        }
        if let Some(v) = get("upload_buffer_size") {
            self.upload_buffer_size = parse_number("upload_buffer_size", &v)?;
        }
        if let Some(v) = get("send_timings") {
            self.send_timings = parse_bool("send_timings", &v)?;
        }
        if let Some(v) = get("default_theme") {
            self.default_theme = v;
        }
        if let Some(v) = get("default_locale") {
            self.default_locale = Some(v);
        }
        if let Some(v) = get("server_version") {
            self.server_version = v;
        }
        if let Some(v) = get("logout_url") {
            self.logout_url = Some(v);
        }

        self.validate()?;
        Ok(self)
    }

    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] for a zero upload buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "upload_buffer_size",
                value: "0".to_owned(),
            });
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_owned(),
        }),
    }
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_owned(),
    })
}
