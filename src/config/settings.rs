//! TOML-based configuration for twinlsp.
//!
//! Supports a config file (twinlsp.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [worker]
//! background_name = "twinlsp-background"
//! max_background_threads = 1
//! root_path = "${WORKSPACE_ROOT}"
//! handshake_warn_after_ms = 5000
//!
//! [log]
//! filter = "twinlsp=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::entry::BACKGROUND_THREAD_NAME;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TWINLSP_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to render settings: {0}")]
    RenderError(#[from] toml::ser::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Background worker configuration.
    pub worker: WorkerSettings,

    /// Logging configuration.
    pub log: LogSettings,
}

/// Background worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Context name that selects the background role.
    pub background_name: String,

    /// Number of background contexts. Only 1 is supported.
    pub max_background_threads: u32,

    /// Root path handed to the background (supports ${ENV_VAR} expansion).
    pub root_path: String,

    /// Warn when the startup handshake takes longer than this. 0 disables.
    pub handshake_warn_after_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            background_name: BACKGROUND_THREAD_NAME.to_string(),
            max_background_threads: 1,
            root_path: "/".to_string(),
            handshake_warn_after_ms: 5000,
        }
    }
}

impl WorkerSettings {
    /// Root path with environment variables expanded.
    pub fn resolved_root_path(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.root_path)
    }

    pub fn handshake_warn_after(&self) -> Option<Duration> {
        (self.handshake_warn_after_ms > 0).then(|| Duration::from_millis(self.handshake_warn_after_ms))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "twinlsp=info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TWINLSP_CONFIG`
    /// 2. `./twinlsp.toml`
    /// 3. `~/.config/twinlsp/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        // Check environment variable first
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        // Check local directory
        let local_config = PathBuf::from("twinlsp.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("twinlsp").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    /// Load from an explicit path when given, otherwise search.
    pub fn load_from(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.worker.max_background_threads != 1 {
            return Err(SettingsError::InvalidConfig(format!(
                "worker.max_background_threads must be 1, got {}",
                self.worker.max_background_threads
            )));
        }
        if self.worker.background_name.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "worker.background_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML, the way `check-config` prints it.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR (ends at non-alphanumeric/underscore)
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
