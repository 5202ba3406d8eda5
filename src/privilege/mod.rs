//! Child-side session preparation
//!
//! Everything in this module runs in the forked child, between `fork()`
//! and `execve()`. The identity switch is strictly ordered:
//!
//! ```text
//! initgroups(name, gid)  ->  setgid(gid)  ->  setuid(uid)
//! ```
//!
//! Once the uid has changed the process can no longer change its groups,
//! so the group steps must come first. Every step is fatal: the child is
//! terminated rather than continuing with partial privileges.
//!
//! The syscalls go through [`ChildOps`], so the order can be observed
//! without actually forking or dropping privileges. Other threads may be
//! alive at fork time (the D-Bus connection runs its own), so nothing here
//! logs through `tracing`. Warnings go to [`ChildOps::report`] instead.

mod ops;

pub use ops::{write_stderr, SystemOps};

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::auth::{Authentication, Identity};
use crate::environment::{self, Environment};
use crate::process::ChildSetup;

/// Fatal child-side failures
#[derive(Error, Debug)]
pub enum ChildSetupError {
    /// Supplementary group initialization failed
    #[error("Failed to initialize supplementary groups for {user}: {source}")]
    GroupInit {
        /// Target user
        user: String,
        /// Underlying errno
        source: nix::Error,
    },

    /// Group ID change failed
    #[error("Failed to set group ID to {gid}: {source}")]
    SetGid {
        /// Target group
        gid: u32,
        /// Underlying errno
        source: nix::Error,
    },

    /// User ID change failed
    #[error("Failed to set user ID to {uid}: {source}")]
    SetUid {
        /// Target user
        uid: u32,
        /// Underlying errno
        source: nix::Error,
    },

    /// Could not enter the home directory
    #[error("Failed to change to home directory {}: {source}", .path.display())]
    WorkingDirectory {
        /// Home directory
        path: PathBuf,
        /// Underlying errno
        source: nix::Error,
    },
}

impl ChildSetupError {
    /// Whether this failure happened while dropping privileges
    pub fn is_privilege_drop(&self) -> bool {
        matches!(
            self,
            Self::GroupInit { .. } | Self::SetGid { .. } | Self::SetUid { .. }
        )
    }
}

/// Process-level operations performed in the session child
pub trait ChildOps {
    /// Point stdin at `/dev/null`
    fn redirect_stdin_to_null(&mut self) -> std::io::Result<()>;

    /// Point stdout and stderr at `path` (write-only, create, truncate, 0600)
    fn redirect_output(&mut self, path: &Path) -> std::io::Result<()>;

    /// Become a session leader, detaching from any controlling terminal
    fn new_session(&mut self) -> nix::Result<()>;

    /// Change working directory
    fn change_directory(&mut self, path: &Path) -> nix::Result<()>;

    /// Initialize supplementary groups for `user`
    fn init_groups(&mut self, user: &str, gid: u32) -> nix::Result<()>;

    /// Set the real and effective group ID
    fn set_gid(&mut self, gid: u32) -> nix::Result<()>;

    /// Set the real and effective user ID
    fn set_uid(&mut self, uid: u32) -> nix::Result<()>;

    /// Emit a non-fatal warning from the child
    fn report(&mut self, message: &str);
}

/// Switch the process identity to `identity`, groups first
pub fn drop_privileges(
    ops: &mut dyn ChildOps,
    identity: &Identity,
) -> Result<(), ChildSetupError> {
    ops.init_groups(&identity.name, identity.gid)
        .map_err(|source| ChildSetupError::GroupInit {
            user: identity.name.clone(),
            source,
        })?;

    ops.set_gid(identity.gid)
        .map_err(|source| ChildSetupError::SetGid {
            gid: identity.gid,
            source,
        })?;

    ops.set_uid(identity.uid)
        .map_err(|source| ChildSetupError::SetUid {
            uid: identity.uid,
            source,
        })?;

    Ok(())
}

/// Everything the session child needs between fork and exec
pub struct ChildPlan<'a> {
    /// Credential session owned by the parent's Session
    pub authentication: &'a mut dyn Authentication,

    /// Where to send stdout/stderr
    pub log_file: Option<&'a Path>,

    /// Open the log file after dropping privileges, so the user owns it
    pub log_file_as_user: bool,

    /// Whether the daemon runs as root and must switch identity
    pub privileged: bool,

    /// Directory prepended to `PATH`
    pub utility_dir: Option<&'a Path>,

    /// Syscall layer
    pub ops: &'a mut dyn ChildOps,
}

impl ChildPlan<'_> {
    fn setup_log_file(&mut self) {
        let Some(path) = self.log_file else {
            return;
        };

        if let Err(e) = self.ops.redirect_output(path) {
            self.ops
                .report(&format!("Failed to open log file {}: {}", path.display(), e));
        }
    }
}

impl ChildSetup for ChildPlan<'_> {
    fn prepare(&mut self, env: &mut Environment) -> Result<(), ChildSetupError> {
        if let Err(e) = self.ops.redirect_stdin_to_null() {
            self.ops
                .report(&format!("Failed to redirect stdin to /dev/null: {}", e));
        }

        if !self.log_file_as_user {
            self.setup_log_file();
        }

        if let Err(e) = self.ops.new_session() {
            self.ops
                .report(&format!("Failed to make process a new session: {}", e));
        }

        let identity = self.authentication.identity().clone();

        self.ops
            .change_directory(&identity.home_directory)
            .map_err(|source| ChildSetupError::WorkingDirectory {
                path: identity.home_directory.clone(),
                source,
            })?;

        if self.privileged {
            drop_privileges(&mut *self.ops, &identity)?;
        }

        if self.log_file_as_user {
            self.setup_log_file();
        }

        if let Err(e) = self.authentication.setup() {
            self.ops
                .report(&format!("Credential setup failed for {}: {}", identity.name, e));
        }

        let entries = self.authentication.env_list();
        for entry in environment::merge_authentication_env(env, entries.as_slice()) {
            self.ops
                .report(&format!("Can't parse credential environment variable {}", entry));
        }
        environment::apply_locale(env, &identity);
        if let Some(dir) = self.utility_dir {
            environment::insert_utility_path(env, dir);
        }

        Ok(())
    }
}
