//! Session lifecycle
//!
//! A [`Session`] launches one authenticated user (or greeter) session as a
//! child process and tears it down again. It is configured through setters,
//! started once, and driven to completion by the daemon's event loop.
//!
//! # Start sequence
//!
//! ```text
//! baseline env -> resolve command -> open auth -> register -> kind setup -> spawn
//!                       |                |            |             |          |
//!                    Created          Created      rollback     rollback   rollback
//! ```
//!
//! Failures before the credential session is opened leave the session in
//! `Created`. Any failure after that point closes the credential session,
//! releases the registration cookie, and leaves the session `Stopped`.
//!
//! # Teardown
//!
//! [`Session::stop`] only asks the process to terminate. The actual teardown
//! happens in [`Session::handle_exit`] once the process is gone, and runs at
//! most once.

mod error;
mod kind;
mod state;

pub use error::{Result, SessionError};
pub use kind::{GreeterSession, HookError, PlainSession, SessionKind, SESSION_CLASS_VAR};
pub use state::SessionState;

use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::Authentication;
use crate::command::CommandResolver;
use crate::environment::{self, Environment, SESSION_COOKIE_VAR};
use crate::privilege::{ChildOps, ChildPlan, SystemOps};
use crate::process::{self, Process, ProcessExit};
use crate::registrar::{Cookie, ParamValue, RegistrationParameters, SessionRegistrar};

/// One launched user or greeter session
pub struct Session {
    id: Uuid,
    state: SessionState,

    log_file: Option<PathBuf>,
    log_file_as_user: bool,
    authentication: Option<Box<dyn Authentication>>,
    command: Option<String>,
    registration_parameters: HashMap<String, ParamValue>,
    registration_cookie: Option<Cookie>,
    registration_required: bool,
    is_greeter: bool,

    kind: Box<dyn SessionKind>,
    environment: Environment,
    resolver: CommandResolver,
    registrar: SessionRegistrar,
    utility_dir: Option<PathBuf>,
    privileged: bool,

    process: Box<dyn Process>,
    child_ops: Box<dyn ChildOps>,
    exit: Option<ProcessExit>,
}

impl Session {
    /// Create an unconfigured session
    ///
    /// The session switches identity in the child exactly when `registrar`
    /// is privileged.
    pub fn new(
        kind: Box<dyn SessionKind>,
        mut process: Box<dyn Process>,
        registrar: SessionRegistrar,
    ) -> Self {
        process.set_clear_environment(true);

        let id = Uuid::new_v4();
        debug!(session = %id, kind = kind.name(), "Created session");

        Self {
            id,
            state: SessionState::Created,
            log_file: None,
            log_file_as_user: true,
            authentication: None,
            command: None,
            registration_parameters: HashMap::new(),
            registration_cookie: None,
            registration_required: true,
            is_greeter: false,
            kind,
            environment: Environment::new(),
            resolver: CommandResolver::from_env(),
            privileged: registrar.is_privileged(),
            registrar,
            utility_dir: None,
            process,
            child_ops: Box::new(SystemOps),
            exit: None,
        }
    }

    /// Look up session commands with `resolver`
    pub fn with_resolver(mut self, resolver: CommandResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Prepend `dir` to the session's `PATH`
    pub fn with_utility_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.utility_dir = dir;
        self
    }

    /// Whether a failed registration aborts the start
    pub fn with_registration_required(mut self, required: bool) -> Self {
        self.registration_required = required;
        self
    }

    /// Replace the syscall layer used in the child
    pub fn with_child_ops(mut self, ops: Box<dyn ChildOps>) -> Self {
        self.child_ops = ops;
        self
    }

    fn ensure_configurable(&self) -> Result<()> {
        if self.state == SessionState::Created {
            Ok(())
        } else {
            Err(SessionError::AlreadyStarted)
        }
    }

    /// Send session output to `path`
    ///
    /// With `as_user` the file is opened after the identity switch, so the
    /// user owns it; otherwise it is opened while still privileged.
    pub fn set_log_file(&mut self, path: Option<PathBuf>, as_user: bool) -> Result<()> {
        self.ensure_configurable()?;
        self.log_file = path;
        self.log_file_as_user = as_user;
        Ok(())
    }

    /// Hand the session its credential session
    pub fn set_authentication(&mut self, authentication: Box<dyn Authentication>) -> Result<()> {
        self.ensure_configurable()?;
        self.authentication = Some(authentication);
        Ok(())
    }

    /// Command to launch, e.g. `"gnome-session --session=ubuntu"`
    pub fn set_command(&mut self, command: impl Into<String>) -> Result<()> {
        self.ensure_configurable()?;
        self.command = Some(command.into());
        Ok(())
    }

    /// Add an extra registration parameter
    pub fn set_registration_parameter(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Result<()> {
        self.ensure_configurable()?;
        self.registration_parameters.insert(key.into(), value.into());
        Ok(())
    }

    /// Mark the session as a greeter
    pub fn set_is_greeter(&mut self, is_greeter: bool) -> Result<()> {
        self.ensure_configurable()?;
        self.is_greeter = is_greeter;
        Ok(())
    }

    /// Log correlation ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configured command
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Configured log file
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Whether this is a greeter session
    pub fn is_greeter(&self) -> bool {
        self.is_greeter
    }

    /// The credential session, if set
    pub fn authentication(&self) -> Option<&dyn Authentication> {
        self.authentication.as_deref()
    }

    /// Registration cookie while a tracked session is open
    pub fn cookie(&self) -> Option<&Cookie> {
        self.registration_cookie.as_ref()
    }

    /// Parent-side session environment
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// PID of the session process
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// How the session process ended, once torn down
    pub fn exit_status(&self) -> Option<ProcessExit> {
        self.exit
    }

    /// Start the session, logging the reason on failure
    pub fn start(&mut self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %self.id, "{}", e);
                false
            }
        }
    }

    /// Start the session
    ///
    /// # Panics
    ///
    /// If no authentication handle or command has been set.
    pub fn try_start(&mut self) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(SessionError::InvalidState(self.state));
        }

        let Some(authentication) = self.authentication.as_deref_mut() else {
            panic!("session {} started without an authentication handle", self.id);
        };
        let Some(command) = self.command.as_deref() else {
            panic!("session {} started without a command", self.id);
        };

        self.state = SessionState::Starting;
        let identity = authentication.identity().clone();

        environment::apply_posix_baseline(&mut self.environment, &identity);

        let resolved = match self.resolver.resolve(command) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.state = SessionState::Created;
                return Err(e.into());
            }
        };

        if let Err(e) = authentication.open() {
            self.state = SessionState::Created;
            return Err(SessionError::Authentication(e));
        }

        let parameters = RegistrationParameters::build(
            identity.uid,
            self.is_greeter,
            &self.registration_parameters,
        );
        match self.registrar.register(&parameters) {
            Ok(cookie) => self.registration_cookie = cookie,
            Err(e) if self.registration_required => {
                self.rollback();
                return Err(SessionError::Registration(e));
            }
            Err(e) => warn!(session = %self.id, "Continuing without session tracking: {}", e),
        }

        if let Some(cookie) = &self.registration_cookie {
            self.environment.set(SESSION_COOKIE_VAR, cookie.as_str());
        }

        if let Err(e) = self.kind.setup(&mut self.environment, &identity) {
            self.rollback();
            return Err(SessionError::Setup(e));
        }

        let Some(authentication) = self.authentication.as_deref_mut() else {
            unreachable!("authentication checked on entry");
        };
        let mut plan = ChildPlan {
            authentication,
            log_file: self.log_file.as_deref(),
            log_file_as_user: self.log_file_as_user,
            privileged: self.privileged,
            utility_dir: self.utility_dir.as_deref(),
            ops: self.child_ops.as_mut(),
        };

        match self.process.spawn(&resolved, &self.environment, &mut plan) {
            Ok(pid) => {
                self.state = SessionState::Running;
                info!(
                    session = %self.id,
                    pid,
                    uid = identity.uid,
                    "Started {} session for {}: {}",
                    self.kind.name(),
                    identity.name,
                    resolved.command_line()
                );
                Ok(())
            }
            Err(e) => {
                self.rollback();
                Err(SessionError::Spawn(e))
            }
        }
    }

    /// Ask the session process to terminate
    ///
    /// Returns `true` if there is no process to stop. Otherwise the process
    /// is signalled and `false` is returned; teardown follows the exit.
    pub fn stop(&mut self) -> bool {
        if !self.process.is_running() {
            return true;
        }

        self.kind.cleanup();
        if let Err(e) = self.process.signal(Signal::SIGTERM) {
            warn!(session = %self.id, "Failed to signal session: {}", e);
        }
        self.state = SessionState::Stopping;

        false
    }

    /// Tear down after the session process exited
    ///
    /// Returns whether teardown ran. Only the first report of an exit for
    /// a running or stopping session has any effect.
    pub fn handle_exit(&mut self, exit: ProcessExit) -> bool {
        if !self.state.has_process() {
            debug!(session = %self.id, "Ignoring exit report in state {}", self.state);
            return false;
        }

        info!(session = %self.id, "Session process {}", exit);

        self.exit = Some(exit);
        self.close_authentication();
        self.release_cookie();
        self.state = SessionState::Stopped;

        true
    }

    /// Reap the session process and tear down if it has exited
    pub fn poll(&mut self) -> process::Result<Option<ProcessExit>> {
        let Some(exit) = self.process.try_wait()? else {
            return Ok(None);
        };

        self.handle_exit(exit);
        Ok(Some(exit))
    }

    /// Lock the tracked session
    pub fn lock(&mut self) {
        let Some(cookie) = &self.registration_cookie else {
            return;
        };
        if !self.privileged {
            return;
        }

        if let Err(e) = self.registrar.lock(cookie) {
            warn!(session = %self.id, "Failed to lock session: {}", e);
        }
    }

    /// Unlock the tracked session
    pub fn unlock(&mut self) {
        let Some(cookie) = &self.registration_cookie else {
            return;
        };
        if !self.privileged {
            return;
        }

        if let Err(e) = self.registrar.unlock(cookie) {
            warn!(session = %self.id, "Failed to unlock session: {}", e);
        }
    }

    fn rollback(&mut self) {
        debug!(session = %self.id, "Rolling back session start");
        self.close_authentication();
        self.release_cookie();
        self.state = SessionState::Stopped;
    }

    fn close_authentication(&mut self) {
        if let Some(authentication) = self.authentication.as_mut() {
            if let Err(e) = authentication.close() {
                warn!(session = %self.id, "{}", e);
            }
        }
    }

    fn release_cookie(&mut self) {
        let Some(cookie) = self.registration_cookie.take() else {
            return;
        };

        self.environment.remove(SESSION_COOKIE_VAR);
        if let Err(e) = self.registrar.unregister(&cookie) {
            warn!(session = %self.id, "Failed to release session cookie: {}", e);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("kind", &self.kind.name())
            .field("command", &self.command)
            .field("is_greeter", &self.is_greeter)
            .field("pid", &self.process.pid())
            .finish_non_exhaustive()
    }
}
