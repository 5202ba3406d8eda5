//! Recording fakes for session lifecycle tests
//!
//! Every fake appends to a shared [`Log`], so a test can assert on the
//! order in which the session drives its collaborators.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};

use lamco_session_broker::auth::{AuthError, Authentication, Identity};
use lamco_session_broker::command::ResolvedCommand;
use lamco_session_broker::environment::Environment;
use lamco_session_broker::privilege::ChildOps;
use lamco_session_broker::process::{self, ChildSetup, Process, ProcessError, ProcessExit};
use lamco_session_broker::registrar::{
    self, Cookie, ParamValue, Registrar, RegistrarError, RegistrationParameters,
};
use nix::sys::signal::Signal;

/// Something a collaborator was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    AuthOpen,
    AuthSetup,
    AuthClose,
    Register(Vec<(String, ParamValue)>),
    Unregister(String),
    Lock(String),
    Unlock(String),
    Spawn(String),
    Signal(Signal),
    StdinNull,
    Output(PathBuf),
    NewSession,
    Chdir(PathBuf),
    InitGroups(String, u32),
    SetGid(u32),
    SetUid(u32),
    Report(String),
}

/// Shared event log
#[derive(Debug, Clone, Default)]
pub struct Log(Rc<RefCell<Vec<Event>>>);

impl Log {
    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.0.borrow().iter().filter(|e| *e == event).count()
    }

    pub fn contains(&self, event: &Event) -> bool {
        self.count(event) > 0
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.0.borrow().iter().position(|e| e == event)
    }

    pub fn registrations(&self) -> Vec<Vec<(String, ParamValue)>> {
        self.0
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Register(params) => Some(params.clone()),
                _ => None,
            })
            .collect()
    }
}

pub fn dave() -> Identity {
    Identity {
        name: "dave".to_string(),
        uid: 1003,
        gid: 1003,
        home_directory: PathBuf::from("/home/dave"),
        shell: PathBuf::from("/bin/zsh"),
        locale: Some("en_GB.UTF-8".to_string()),
    }
}

/// Credential session that records its calls
pub struct FakeAuth {
    pub identity: Identity,
    pub environment: Vec<String>,
    pub fail_open: bool,
    pub log: Log,
}

impl FakeAuth {
    pub fn new(log: &Log) -> Self {
        Self {
            identity: dave(),
            environment: vec![
                "XDG_SEAT=seat0".to_string(),
                "GARBAGE".to_string(),
                "MOTD=a=b".to_string(),
            ],
            fail_open: false,
            log: log.clone(),
        }
    }
}

impl Authentication for FakeAuth {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn env_list(&self) -> Vec<String> {
        self.environment.clone()
    }

    fn open(&mut self) -> Result<(), AuthError> {
        if self.fail_open {
            return Err(AuthError::OpenFailed("refused".to_string()));
        }
        self.log.push(Event::AuthOpen);
        Ok(())
    }

    fn setup(&mut self) -> Result<(), AuthError> {
        self.log.push(Event::AuthSetup);
        Ok(())
    }

    fn close(&mut self) -> Result<(), AuthError> {
        self.log.push(Event::AuthClose);
        Ok(())
    }
}

/// Tracking backend that hands out a fixed cookie
pub struct FakeRegistrar {
    pub cookie: String,
    pub fail_open: bool,
    pub log: Log,
}

impl FakeRegistrar {
    pub fn new(log: &Log) -> Self {
        Self {
            cookie: "ck-1".to_string(),
            fail_open: false,
            log: log.clone(),
        }
    }
}

impl Registrar for FakeRegistrar {
    fn open_session(&mut self, parameters: &RegistrationParameters) -> registrar::Result<Cookie> {
        self.log.push(Event::Register(
            parameters
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ));
        if self.fail_open {
            return Err(RegistrarError::Unavailable("no tracker".to_string()));
        }
        Cookie::new(self.cookie.as_str())
            .ok_or_else(|| RegistrarError::Rejected("empty cookie".to_string()))
    }

    fn close_session(&mut self, cookie: &Cookie) -> registrar::Result<()> {
        self.log.push(Event::Unregister(cookie.to_string()));
        Ok(())
    }

    fn lock_session(&mut self, cookie: &Cookie) -> registrar::Result<()> {
        self.log.push(Event::Lock(cookie.to_string()));
        Ok(())
    }

    fn unlock_session(&mut self, cookie: &Cookie) -> registrar::Result<()> {
        self.log.push(Event::Unlock(cookie.to_string()));
        Ok(())
    }
}

/// Process that runs the child preparation in-process instead of forking
pub struct FakeProcess {
    pub log: Log,
    pub fail_spawn: bool,
    pub pid: Option<u32>,
    pub child_env: Rc<RefCell<Option<Environment>>>,
}

impl FakeProcess {
    pub fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            fail_spawn: false,
            pid: None,
            child_env: Rc::default(),
        }
    }
}

impl Process for FakeProcess {
    fn set_clear_environment(&mut self, _clear: bool) {}

    fn spawn(
        &mut self,
        command: &ResolvedCommand,
        environment: &Environment,
        child: &mut dyn ChildSetup,
    ) -> process::Result<u32> {
        if self.fail_spawn {
            return Err(ProcessError::Fork(nix::Error::EAGAIN));
        }

        self.log.push(Event::Spawn(command.command_line()));

        let mut env = environment.clone();
        // A failed preparation would make the real child exit; the fake
        // still reports a PID so the parent side proceeds the same way.
        let _ = child.prepare(&mut env);
        *self.child_env.borrow_mut() = Some(env);

        self.pid = Some(31337);
        Ok(31337)
    }

    fn signal(&mut self, signal: Signal) -> process::Result<()> {
        self.log.push(Event::Signal(signal));
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.pid.is_some()
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_wait(&mut self) -> process::Result<Option<ProcessExit>> {
        Ok(None)
    }
}

/// Child syscalls that only record themselves
pub struct RecordingOps {
    pub log: Log,
}

impl ChildOps for RecordingOps {
    fn redirect_stdin_to_null(&mut self) -> std::io::Result<()> {
        self.log.push(Event::StdinNull);
        Ok(())
    }

    fn redirect_output(&mut self, path: &Path) -> std::io::Result<()> {
        self.log.push(Event::Output(path.to_path_buf()));
        Ok(())
    }

    fn new_session(&mut self) -> nix::Result<()> {
        self.log.push(Event::NewSession);
        Ok(())
    }

    fn change_directory(&mut self, path: &Path) -> nix::Result<()> {
        self.log.push(Event::Chdir(path.to_path_buf()));
        Ok(())
    }

    fn init_groups(&mut self, user: &str, gid: u32) -> nix::Result<()> {
        self.log.push(Event::InitGroups(user.to_string(), gid));
        Ok(())
    }

    fn set_gid(&mut self, gid: u32) -> nix::Result<()> {
        self.log.push(Event::SetGid(gid));
        Ok(())
    }

    fn set_uid(&mut self, uid: u32) -> nix::Result<()> {
        self.log.push(Event::SetUid(uid));
        Ok(())
    }

    fn report(&mut self, message: &str) {
        self.log.push(Event::Report(message.to_string()));
    }
}

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that touch the process environment
pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Sets a variable for the guard's lifetime, restoring the old value on drop
pub struct EnvVarGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvVarGuard {
    pub fn set(key: &'static str, value: impl Into<String>) -> Self {
        let prev = std::env::var(key).ok();
        std::env::set_var(key, value.into());
        Self { key, prev }
    }

    pub fn remove(key: &'static str) -> Self {
        let prev = std::env::var(key).ok();
        std::env::remove_var(key);
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match self.prev.take() {
            Some(prev) => std::env::set_var(self.key, prev),
            None => std::env::remove_var(self.key),
        }
    }
}
