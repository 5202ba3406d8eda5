//! Authentication collaborator
//!
//! The broker never talks to the user itself. By the time a session is
//! launched, something else (PAM conversation, autologin policy, greeter)
//! has already decided who the user is. What the session needs from that
//! decision is captured by the [`Authentication`] trait:
//!
//! - the resolved [`Identity`] (uid, gid, home, shell, locale)
//! - a credential session that is opened before the process is spawned,
//!   set up inside the session process, and closed at teardown
//! - the raw `KEY=VALUE` environment list the credential stack wants the
//!   session to see
//!
//! [`LocalAuthentication`] is the implementation used by the daemon binary.
//! It resolves the identity from the local account database and takes its
//! environment list from configuration.

mod local;

pub use local::LocalAuthentication;

use std::path::PathBuf;
use thiserror::Error;

/// Result type for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication collaborator errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// User is not present in the account database
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Account database lookup failed
    #[error("Failed to query user database: {0}")]
    Lookup(#[from] nix::Error),

    /// Credential session could not be opened
    #[error("Failed to open credential session: {0}")]
    OpenFailed(String),

    /// Credential session setup failed inside the session process
    #[error("Failed to set up credential session: {0}")]
    SetupFailed(String),

    /// Credential session could not be closed
    #[error("Failed to close credential session: {0}")]
    CloseFailed(String),
}

/// Authenticated user identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Username
    pub name: String,

    /// User ID (UID)
    pub uid: u32,

    /// Primary group ID (GID)
    pub gid: u32,

    /// Home directory
    pub home_directory: PathBuf,

    /// Login shell
    pub shell: PathBuf,

    /// Preferred locale (e.g. `de_DE.UTF-8`), if the user picked one
    pub locale: Option<String>,
}

impl Identity {
    /// Resolve an identity from the account database
    pub fn from_username(username: &str) -> Result<Self> {
        use nix::unistd::User;

        let user = User::from_name(username)?
            .ok_or_else(|| AuthError::UserNotFound(username.to_string()))?;

        Ok(Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home_directory: user.dir,
            shell: user.shell,
            locale: None,
        })
    }

    /// Attach a locale to this identity
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// Handle to an authenticated credential session
///
/// A session owns exactly one of these for its whole lifetime.
/// `open()` is called by the parent before the process is spawned,
/// `setup()` inside the forked child before exec, and `close()` once
/// during teardown or rollback.
#[cfg_attr(test, mockall::automock)]
pub trait Authentication {
    /// The authenticated user
    fn identity(&self) -> &Identity;

    /// Raw environment list, each entry expected to be `KEY=VALUE`
    fn env_list(&self) -> Vec<String>;

    /// Open the credential session
    fn open(&mut self) -> Result<()>;

    /// Establish credentials in the session process
    ///
    /// Runs in the forked child. Implementations must not log through
    /// `tracing`; another thread may hold the subscriber's locks.
    fn setup(&mut self) -> Result<()>;

    /// Close the credential session
    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_unknown_user() {
        let result = Identity::from_username("no-such-user-lamco-broker");
        assert!(matches!(result, Err(AuthError::UserNotFound(_))));
    }

    #[test]
    fn test_identity_from_root() {
        let identity = Identity::from_username("root").unwrap();
        assert_eq!(identity.uid, 0);
        assert_eq!(identity.name, "root");
        assert!(identity.locale.is_none());
    }

    #[test]
    fn test_with_locale() {
        let identity = Identity {
            name: "alice".to_string(),
            uid: 1000,
            gid: 1000,
            home_directory: PathBuf::from("/home/alice"),
            shell: PathBuf::from("/bin/bash"),
            locale: None,
        }
        .with_locale("fr_FR.UTF-8");

        assert_eq!(identity.locale.as_deref(), Some("fr_FR.UTF-8"));
    }
}
