//! Session error types

use super::kind::HookError;
use super::state::SessionState;
use crate::auth::AuthError;
use crate::command::ResolveError;
use crate::process::ProcessError;
use crate::registrar::RegistrarError;
use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Command could not be resolved on the search path
    #[error(transparent)]
    CommandNotFound(#[from] ResolveError),

    /// Operation not valid in the current state
    #[error("Session is {0}, expected created")]
    InvalidState(SessionState),

    /// Configuration changed after start
    #[error("Session already started")]
    AlreadyStarted,

    /// Credential session could not be opened
    #[error("Authentication failed: {0}")]
    Authentication(#[source] AuthError),

    /// Session tracking registration failed
    #[error("Session registration failed: {0}")]
    Registration(#[source] RegistrarError),

    /// Session kind setup hook failed
    #[error("Session setup failed: {0}")]
    Setup(#[source] HookError),

    /// Session process could not be launched
    #[error("Failed to spawn session: {0}")]
    Spawn(#[source] ProcessError),
}
