//! Startup diagnostics
//!
//! Logs who the daemon runs as and what session tracking it can expect to
//! find, so a failed launch can be read from the log alone.

use std::path::Path;
use tracing::info;

use crate::config::{BrokerConfig, RegistrarBackend};
use crate::environment::SESSION_COOKIE_VAR;

/// Process and host information for diagnostics
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Real user ID
    pub uid: u32,

    /// Effective user ID
    pub euid: u32,

    /// System hostname
    pub hostname: String,

    /// Whether `XDG_SESSION_COOKIE` is set for this process
    pub has_ambient_cookie: bool,
}

impl SystemInfo {
    /// Gather process information
    pub fn gather() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            euid: nix::unistd::geteuid().as_raw(),
            hostname: hostname::get()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "Unknown".to_string()),
            has_ambient_cookie: std::env::var_os(SESSION_COOKIE_VAR).is_some(),
        }
    }

    /// Whether the daemon can switch identities and register sessions
    pub fn is_privileged(&self) -> bool {
        self.uid == 0
    }

    /// Log process information
    pub fn log(&self) {
        info!("=== Process ===");
        info!("  Hostname: {}", self.hostname);
        info!("  UID: {} (effective {})", self.uid, self.euid);
        if self.is_privileged() {
            info!("  Mode: privileged (identity switch, session registration)");
        } else {
            info!("  Mode: unprivileged (nested, ambient cookie only)");
        }
        info!("  Ambient session cookie: {}", self.has_ambient_cookie);
    }
}

/// Detect a running session tracker from its runtime files
pub fn detect_session_tracker() -> Option<&'static str> {
    let trackers = [
        ("/run/ConsoleKit", "ConsoleKit"),
        ("/var/run/ConsoleKit", "ConsoleKit"),
        ("/run/systemd/seats", "systemd-logind"),
    ];

    trackers
        .into_iter()
        .find(|(path, _)| Path::new(path).exists())
        .map(|(_, name)| name)
}

/// Log complete diagnostics on startup
pub fn log_startup_diagnostics(config: &BrokerConfig) {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║          Startup Diagnostics                               ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    SystemInfo::gather().log();

    info!("=== Session Tracking ===");
    match config.registrar.backend {
        RegistrarBackend::ConsoleKit => info!("  Backend: ConsoleKit"),
        RegistrarBackend::None => info!("  Backend: disabled"),
    }
    info!("  Required: {}", config.registrar.required);
    match detect_session_tracker() {
        Some(tracker) => info!("  Detected: {}", tracker),
        None => info!("  Detected: none"),
    }

    info!("=== Broker Configuration ===");
    info!("  Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(dir) = &config.paths.utility_dir {
        info!("  Utility directory: {}", dir.display());
    }
    #[cfg(debug_assertions)]
    info!("  Build: debug");
    #[cfg(not(debug_assertions))]
    info!("  Build: release");
}
