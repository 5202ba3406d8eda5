//! # lamco-session-broker
//!
//! Session broker for login managers: launches an already-authenticated
//! user's session as a child process, under the right identity, with a
//! derived environment, registered with the system session tracker.
//!
//! # Architecture
//!
//! ```text
//! lamco-session-broker
//!   ├─> Session (start/stop lifecycle, rollback)
//!   │     ├─> CommandResolver (command -> absolute binary)
//!   │     ├─> Authentication (identity, credential session, env list)
//!   │     ├─> SessionRegistrar (ConsoleKit cookie, lock/unlock)
//!   │     ├─> SessionKind (user / greeter setup and cleanup)
//!   │     └─> Process (fork, ChildPlan, exec, reap)
//!   │           └─> ChildPlan (stdin, log file, setsid, chdir,
//!   │                          initgroups -> setgid -> setuid, env)
//!   └─> BrokerDaemon (config, signals, event loop)
//! ```
//!
//! # Environment
//!
//! **Parent:** POSIX baseline → registration cookie → kind setup
//!
//! **Child:** credential environment → `LANG` → utility `PATH` prefix

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Authentication collaborator and identities
pub mod auth;

/// Session command resolution
pub mod command;

/// Broker configuration
pub mod config;

/// Daemon event loop
pub mod daemon;

/// Session environment derivation
pub mod environment;

/// Child-side privilege transition
pub mod privilege;

/// Child process collaborator
pub mod process;

/// Session tracking registration
pub mod registrar;

/// Session lifecycle state machine
pub mod session;

/// Utility functions
pub mod utils;

pub use session::{Session, SessionError, SessionState};
