//! Session lifecycle states

use std::fmt;

/// Session lifecycle state
///
/// ```text
/// Created -> Starting -> Running -> Stopping -> Stopped
///               |           |                     ^
///               |           +---------------------+   (child exited)
///               +---------------------------------+   (rollback)
/// ```
///
/// `Starting` falls back to `Created` when nothing has been acquired yet
/// (command not found, authentication refused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Configured but not started
    #[default]
    Created,

    /// Inside `start()`
    Starting,

    /// Session process running
    Running,

    /// Termination requested, waiting for the process to exit
    Stopping,

    /// Torn down
    Stopped,
}

impl SessionState {
    /// Whether a process may still be alive in this state
    pub fn has_process(&self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
