//! Utility Functions and Diagnostics
//!
//! Startup diagnostics and user-friendly error formatting.
//!
//! ## Diagnostics
//!
//! The [`diagnostics`] module logs the runtime context before a session
//! is launched: real and effective uid, hostname, whether an ambient
//! session cookie is present, and which session tracker is installed.
//!
//! ## Error Formatting
//!
//! The [`errors`] module turns a launch failure into a message with
//! troubleshooting steps:
//!
//! ```rust
//! use lamco_session_broker::utils::format_user_error;
//!
//! let error = anyhow::anyhow!("Can't launch session startxfce4, not found in path");
//! eprintln!("{}", format_user_error(&error));
//! ```
//!
//! Error categories with context-aware help:
//! - Command lookup → install the session or fix the search path
//! - ConsoleKit/D-Bus → tracker status, making registration optional
//! - Users and permissions → account lookup, running as root
//! - Config errors → file location, TOML syntax

pub mod diagnostics;
pub mod errors;

pub use diagnostics::{detect_session_tracker, log_startup_diagnostics, SystemInfo};
pub use errors::format_user_error;
