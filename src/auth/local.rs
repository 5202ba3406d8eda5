//! Account-database backed authentication handle

use super::{AuthError, Authentication, Identity, Result};
use tracing::info;

/// Credential session for an already-authenticated local account
///
/// There is no credential stack behind this handle: open/setup/close only
/// track state so misuse (double open, close without open) is caught.
#[derive(Debug)]
pub struct LocalAuthentication {
    identity: Identity,
    environment: Vec<String>,
    opened: bool,
}

impl LocalAuthentication {
    /// Create a handle for a resolved identity
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            environment: Vec::new(),
            opened: false,
        }
    }

    /// Look up `username` in the account database
    pub fn for_user(username: &str) -> Result<Self> {
        Ok(Self::new(Identity::from_username(username)?))
    }

    /// Environment entries handed to the session, `KEY=VALUE` each
    pub fn with_environment(mut self, environment: Vec<String>) -> Self {
        self.environment = environment;
        self
    }

    /// Whether the credential session is currently open
    pub fn is_open(&self) -> bool {
        self.opened
    }
}

impl Authentication for LocalAuthentication {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn env_list(&self) -> Vec<String> {
        self.environment.clone()
    }

    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Err(AuthError::OpenFailed(format!(
                "session for {} is already open",
                self.identity.name
            )));
        }

        info!("Opening credential session for {}", self.identity.name);
        self.opened = true;
        Ok(())
    }

    fn setup(&mut self) -> Result<()> {
        if !self.opened {
            return Err(AuthError::SetupFailed(format!(
                "session for {} was never opened",
                self.identity.name
            )));
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Err(AuthError::CloseFailed(format!(
                "session for {} is not open",
                self.identity.name
            )));
        }

        info!("Closing credential session for {}", self.identity.name);
        self.opened = false;
        Ok(())
    }
}
