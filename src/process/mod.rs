//! Child-process collaborator
//!
//! A [`Process`] launches exactly one child at a time: it forks, lets a
//! [`ChildSetup`] prepare the child image, and execs the command with the
//! prepared environment. Exit is detected by polling [`Process::try_wait`]
//! from the event loop after SIGCHLD.

mod fork;

pub use fork::ForkProcess;

use crate::command::{ArgvError, ResolvedCommand};
use crate::environment::Environment;
use crate::privilege::ChildSetupError;
use nix::sys::signal::Signal;
use std::fmt;
use thiserror::Error;

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Process collaborator errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// A child is already running
    #[error("Process already running (PID: {0})")]
    AlreadyRunning(u32),

    /// Command could not be turned into an argument vector
    #[error("Invalid command line: {0}")]
    InvalidCommand(#[from] ArgvError),

    /// fork() failed
    #[error("Failed to fork: {0}")]
    Fork(nix::Error),

    /// kill() failed
    #[error("Failed to signal process: {0}")]
    Signal(nix::Error),

    /// waitpid() failed
    #[error("Failed to wait for process: {0}")]
    Wait(nix::Error),
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Normal exit with status code
    Exited(i32),

    /// Terminated by a signal
    Signaled(i32),
}

impl ProcessExit {
    /// Exit status 0
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Shell-style status code (128 + signal for signaled children)
    pub fn code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(signal) => 128 + signal,
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with status {}", code),
            Self::Signaled(signal) => match Signal::try_from(*signal) {
                Ok(signal) => write!(f, "killed by {}", signal),
                Err(_) => write!(f, "killed by signal {}", signal),
            },
        }
    }
}

/// Child-side preparation, run between fork and exec
pub trait ChildSetup {
    /// Prepare the child image and finish `env`
    ///
    /// An error terminates the child with a failure status.
    fn prepare(&mut self, env: &mut Environment) -> std::result::Result<(), ChildSetupError>;
}

/// Launches and tracks one child process
pub trait Process {
    /// Replace the inherited environment entirely with the session table
    fn set_clear_environment(&mut self, clear: bool);

    /// Fork, prepare the child with `child`, and exec `command`
    ///
    /// Returns the child's PID.
    fn spawn(
        &mut self,
        command: &ResolvedCommand,
        environment: &Environment,
        child: &mut dyn ChildSetup,
    ) -> Result<u32>;

    /// Send `signal` to the child
    fn signal(&mut self, signal: Signal) -> Result<()>;

    /// Whether a child has been spawned and not yet reaped
    fn is_running(&self) -> bool;

    /// PID of the running child
    fn pid(&self) -> Option<u32>;

    /// Reap the child if it has exited, without blocking
    fn try_wait(&mut self) -> Result<Option<ProcessExit>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert!(ProcessExit::Exited(0).success());
        assert!(!ProcessExit::Exited(1).success());
        assert!(!ProcessExit::Signaled(15).success());

        assert_eq!(ProcessExit::Exited(3).code(), 3);
        assert_eq!(ProcessExit::Signaled(15).code(), 143);
    }

    #[test]
    fn test_exit_display() {
        assert_eq!(ProcessExit::Exited(2).to_string(), "exited with status 2");
        assert_eq!(ProcessExit::Signaled(15).to_string(), "killed by SIGTERM");
    }
}
