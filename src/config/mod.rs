//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod types;

pub use types::{EnvVar, LoggingConfig, PathsConfig, RegistrarBackend, RegistrarConfig, SessionConfig};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lamco-session-broker/config.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Session tracking configuration
    #[serde(default)]
    pub registrar: RegistrarConfig,
    /// Paths configuration
    #[serde(default)]
    pub paths: PathsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BrokerConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(command) = &self.session.command {
            if command.trim().is_empty() {
                anyhow::bail!("Session command is empty");
            }
        }

        if let Some(user) = &self.session.user {
            if user.is_empty() {
                anyhow::bail!("Session user is empty");
            }
        }

        for var in &self.session.environment {
            if var.name.is_empty() || var.name.contains('=') {
                anyhow::bail!("Invalid environment variable name: {:?}", var.name);
            }
        }

        if self.registrar.parameters.keys().any(String::is_empty) {
            anyhow::bail!("Registration parameter with empty key");
        }

        if cfg!(not(feature = "consolekit"))
            && self.registrar.backend == RegistrarBackend::ConsoleKit
        {
            anyhow::bail!("ConsoleKit backend requested but built without the consolekit feature");
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        if let Some(dir) = &self.paths.utility_dir {
            if !dir.is_absolute() {
                anyhow::bail!("Utility directory must be absolute: {}", dir.display());
            }
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        user: Option<String>,
        command: Option<String>,
        greeter: bool,
        log_file: Option<PathBuf>,
    ) -> Self {
        if user.is_some() {
            self.session.user = user;
        }
        if command.is_some() {
            self.session.command = command;
        }
        if greeter {
            self.session.greeter = true;
        }
        if log_file.is_some() {
            self.session.log_file = log_file;
        }

        self
    }

    /// Session environment as `NAME=VALUE` entries
    pub fn environment_entries(&self) -> Vec<String> {
        self.session
            .environment
            .iter()
            .map(EnvVar::to_entry)
            .collect()
    }
}
