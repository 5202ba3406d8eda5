//! Configuration section types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::registrar::ParamValue;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// User to launch the session for
    #[serde(default)]
    pub user: Option<String>,

    /// Session command, e.g. `"startxfce4"`
    #[serde(default)]
    pub command: Option<String>,

    /// Launch as a greeter session
    #[serde(default)]
    pub greeter: bool,

    /// File receiving the session's stdout/stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Open the log file as the session user
    #[serde(default = "default_true")]
    pub log_file_as_user: bool,

    /// Locale exported as `LANG`
    #[serde(default)]
    pub locale: Option<String>,

    /// Search path for session commands (defaults to the daemon's `PATH`)
    #[serde(default)]
    pub search_path: Option<String>,

    /// Extra environment handed to the session
    #[serde(default)]
    pub environment: Vec<EnvVar>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user: None,
            command: None,
            greeter: false,
            log_file: None,
            log_file_as_user: true,
            locale: None,
            search_path: None,
            environment: Vec::new(),
        }
    }
}

/// Environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    pub value: String,
}

impl EnvVar {
    /// `NAME=VALUE` form
    pub fn to_entry(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Session tracking backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrarBackend {
    /// ConsoleKit on the system bus
    ConsoleKit,
    /// No session tracking
    None,
}

impl Default for RegistrarBackend {
    fn default() -> Self {
        Self::ConsoleKit
    }
}

/// Session tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrarConfig {
    /// Backend to register sessions with
    #[serde(default)]
    pub backend: RegistrarBackend,

    /// Abort the start when registration fails
    #[serde(default = "default_true")]
    pub required: bool,

    /// Extra registration parameters
    #[serde(default)]
    pub parameters: HashMap<String, ParamValue>,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            backend: RegistrarBackend::default(),
            required: true,
            parameters: HashMap::new(),
        }
    }
}

/// Paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of helper binaries prepended to the session's `PATH`
    #[serde(default = "default_utility_dir")]
    pub utility_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            utility_dir: default_utility_dir(),
        }
    }
}

fn default_utility_dir() -> Option<PathBuf> {
    Some(PathBuf::from("/usr/lib/lamco-session-broker"))
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Daemon log file (None = console only)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
