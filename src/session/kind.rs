//! Session kinds
//!
//! A kind contributes the parts of a launch that differ between a user
//! session and a greeter: extra environment, and cleanup when the session
//! is asked to stop. New kinds implement [`SessionKind`] and are injected
//! into the [`Session`](super::Session).

use crate::auth::Identity;
use crate::environment::Environment;
use thiserror::Error;
use tracing::debug;

/// Variable announcing the session class to the session process
pub const SESSION_CLASS_VAR: &str = "XDG_SESSION_CLASS";

/// Kind hook failure
#[derive(Error, Debug)]
#[error("{kind} setup failed: {reason}")]
pub struct HookError {
    /// Kind that failed
    pub kind: String,
    /// What went wrong
    pub reason: String,
}

impl HookError {
    /// Create a hook error for `kind`
    pub fn new(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

/// Per-kind launch behavior
pub trait SessionKind {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Runs after registration, before the process is spawned
    ///
    /// A failure rolls the start back.
    fn setup(&mut self, env: &mut Environment, identity: &Identity) -> Result<(), HookError>;

    /// Runs when a running session is asked to stop
    fn cleanup(&mut self);
}

/// Regular user session
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainSession;

impl SessionKind for PlainSession {
    fn name(&self) -> &str {
        "user"
    }

    fn setup(&mut self, env: &mut Environment, _identity: &Identity) -> Result<(), HookError> {
        env.set(SESSION_CLASS_VAR, "user");
        Ok(())
    }

    fn cleanup(&mut self) {}
}

/// Greeter (login window) session
#[derive(Debug, Default, Clone, Copy)]
pub struct GreeterSession;

impl SessionKind for GreeterSession {
    fn name(&self) -> &str {
        "greeter"
    }

    fn setup(&mut self, env: &mut Environment, identity: &Identity) -> Result<(), HookError> {
        debug!("Preparing greeter session for {}", identity.name);
        env.set(SESSION_CLASS_VAR, "greeter");
        Ok(())
    }

    fn cleanup(&mut self) {
        debug!("Greeter session stopping");
    }
}
