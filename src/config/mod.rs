//! Configuration module for twinlsp.
//!
//! Handles the settings file, environment variables and defaults.

mod settings;

pub use settings::{
    expand_env_vars, LogSettings, Settings, SettingsError, WorkerSettings, CONFIG_ENV_VAR,
};
