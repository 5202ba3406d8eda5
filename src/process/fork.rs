//! fork/exec implementation of [`Process`]

use super::{ChildSetup, Process, ProcessError, ProcessExit, Result};
use crate::command::ResolvedCommand;
use crate::environment::Environment;
use crate::privilege;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execve, fork, ForkResult, Pid};
use tracing::{debug, info};

/// Runs the session as a forked child
#[derive(Debug, Default)]
pub struct ForkProcess {
    pid: Option<Pid>,
    clear_environment: bool,
}

impl ForkProcess {
    /// Create an idle process handle
    pub fn new() -> Self {
        Self::default()
    }

    fn exec_environment(&self, environment: &Environment) -> Environment {
        if self.clear_environment {
            return environment.clone();
        }

        let mut merged = Environment::new();
        for (name, value) in std::env::vars() {
            merged.set(name, value);
        }
        for (name, value) in environment.iter() {
            merged.set(name, value);
        }
        merged
    }
}

impl Process for ForkProcess {
    fn set_clear_environment(&mut self, clear: bool) {
        self.clear_environment = clear;
    }

    #[allow(unsafe_code)]
    fn spawn(
        &mut self,
        command: &ResolvedCommand,
        environment: &Environment,
        child: &mut dyn ChildSetup,
    ) -> Result<u32> {
        if let Some(pid) = self.pid {
            return Err(ProcessError::AlreadyRunning(pid.as_raw() as u32));
        }

        // Everything that can fail cleanly is done before forking.
        let argv = command.exec_argv()?;
        let command_line = command.command_line();
        let mut env = self.exec_environment(environment);

        // SAFETY: other threads may be alive (the D-Bus connection runs its
        // own executor), so the child never takes the tracing or stdio locks.
        // Diagnostics go straight to fd 2 and the child always ends in
        // execve or _exit.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                match child.prepare(&mut env) {
                    Ok(()) => {
                        let envp = env.to_exec_strings();
                        if let Err(e) = execve(&argv[0], &argv, &envp) {
                            privilege::write_stderr(&format!(
                                "Failed to exec {}: {}",
                                command_line, e
                            ));
                        }
                    }
                    Err(e) => privilege::write_stderr(&e.to_string()),
                }

                // SAFETY: _exit skips atexit handlers and stdio flushing that
                // belong to the parent.
                unsafe { libc::_exit(libc::EXIT_FAILURE) }
            }
            Ok(ForkResult::Parent { child }) => {
                info!("Spawned session process {} (PID: {})", command_line, child);
                self.pid = Some(child);
                Ok(child.as_raw() as u32)
            }
            Err(e) => Err(ProcessError::Fork(e)),
        }
    }

    fn signal(&mut self, signal: Signal) -> Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };

        debug!("Sending {} to PID {}", signal, pid);
        signal::kill(pid, signal).map_err(ProcessError::Signal)
    }

    fn is_running(&self) -> bool {
        self.pid.is_some()
    }

    fn pid(&self) -> Option<u32> {
        self.pid.map(|pid| pid.as_raw() as u32)
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        let Some(pid) = self.pid else {
            return Ok(None);
        };

        let exit = match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => ProcessExit::Exited(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => ProcessExit::Signaled(signal as i32),
            Ok(_) => return Ok(None),
            Err(e) => return Err(ProcessError::Wait(e)),
        };

        debug!("PID {} {}", pid, exit);
        self.pid = None;
        Ok(Some(exit))
    }
}
