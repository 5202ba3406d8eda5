//! Session broker daemon
//!
//! Builds one [`Session`] from configuration, starts it, and drives it to
//! completion from a single-threaded event loop:
//!
//! - `SIGCHLD` reaps the session process and tears the session down
//! - `SIGTERM` / `SIGINT` ask the session to stop

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::auth::{Identity, LocalAuthentication};
use crate::command::CommandResolver;
use crate::config::{BrokerConfig, RegistrarBackend, RegistrarConfig};
use crate::process::{ForkProcess, Process, ProcessExit};
use crate::registrar::{NullRegistrar, Registrar, SessionRegistrar};
use crate::session::{GreeterSession, PlainSession, Session, SessionKind};

/// Pick and connect the registration backend
///
/// An unprivileged daemon never talks to the backend, so none is connected.
pub fn build_registrar(config: &RegistrarConfig, privileged: bool) -> Result<SessionRegistrar> {
    if !privileged {
        info!("Not running as root, adopting the ambient session cookie");
        return Ok(SessionRegistrar::new(Box::new(NullRegistrar), false));
    }

    let backend: Box<dyn Registrar> = match config.backend {
        RegistrarBackend::None => Box::new(NullRegistrar),
        #[cfg(feature = "consolekit")]
        RegistrarBackend::ConsoleKit => match crate::registrar::ConsoleKitRegistrar::connect() {
            Ok(registrar) => Box::new(registrar),
            Err(e) if config.required => {
                return Err(e).context("Failed to connect to ConsoleKit");
            }
            Err(e) => {
                warn!("ConsoleKit unavailable, sessions will be untracked: {}", e);
                Box::new(NullRegistrar)
            }
        },
        #[cfg(not(feature = "consolekit"))]
        RegistrarBackend::ConsoleKit => {
            anyhow::bail!("ConsoleKit backend requested but built without the consolekit feature")
        }
    };

    Ok(SessionRegistrar::new(backend, true))
}

/// Build a configured, unstarted session
pub fn build_session(
    config: &BrokerConfig,
    process: Box<dyn Process>,
    registrar: SessionRegistrar,
) -> Result<Session> {
    let user = config
        .session
        .user
        .as_deref()
        .context("No session user configured (use --user)")?;
    let command = config
        .session
        .command
        .as_deref()
        .context("No session command configured (use --command)")?;

    let mut identity = Identity::from_username(user)
        .with_context(|| format!("Failed to look up session user {}", user))?;
    if let Some(locale) = &config.session.locale {
        identity = identity.with_locale(locale.as_str());
    }
    let authentication =
        LocalAuthentication::new(identity).with_environment(config.environment_entries());

    let kind: Box<dyn SessionKind> = if config.session.greeter {
        Box::new(GreeterSession)
    } else {
        Box::new(PlainSession)
    };

    let resolver = match &config.session.search_path {
        Some(path) => CommandResolver::new(path),
        None => CommandResolver::from_env(),
    };

    let required =
        config.registrar.required && config.registrar.backend != RegistrarBackend::None;

    let mut session = Session::new(kind, process, registrar)
        .with_resolver(resolver)
        .with_utility_dir(config.paths.utility_dir.clone())
        .with_registration_required(required);

    session.set_authentication(Box::new(authentication))?;
    session.set_command(command)?;
    session.set_is_greeter(config.session.greeter)?;
    session.set_log_file(
        config.session.log_file.clone(),
        config.session.log_file_as_user,
    )?;
    for (key, value) in &config.registrar.parameters {
        session.set_registration_parameter(key.as_str(), value.clone())?;
    }

    Ok(session)
}

/// Session broker daemon
pub struct BrokerDaemon {
    session: Session,
}

impl BrokerDaemon {
    /// Create the daemon and its session from configuration
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        info!("Initializing session broker");

        let privileged = nix::unistd::getuid().is_root();
        let registrar = build_registrar(&config.registrar, privileged)?;
        let session = build_session(config, Box::new(ForkProcess::new()), registrar)?;

        Ok(Self { session })
    }

    /// The managed session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Start the session and run until it has been torn down
    ///
    /// Must run on a current-thread runtime: the session is forked from
    /// this thread.
    pub async fn run(mut self) -> Result<ProcessExit> {
        // Install handlers before spawning so an early exit is not missed.
        let mut sigchld = signal(SignalKind::child()).context("Failed to watch SIGCHLD")?;
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to watch SIGTERM")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to watch SIGINT")?;

        self.session.try_start().context("Failed to start session")?;

        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║          Session Running                                   ║");
        info!("╚════════════════════════════════════════════════════════════╝");
        info!("  Session: {}", self.session.id());
        if let Some(pid) = self.session.pid() {
            info!("  PID: {}", pid);
        }
        if let Some(command) = self.session.command() {
            info!("  Command: {}", command);
        }

        loop {
            tokio::select! {
                _ = sigchld.recv() => {
                    if let Some(exit) = self.session.poll().context("Failed to reap session")? {
                        return Ok(exit);
                    }
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, stopping session");
                    if let Some(exit) = self.request_stop() {
                        return Ok(exit);
                    }
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, stopping session");
                    if let Some(exit) = self.request_stop() {
                        return Ok(exit);
                    }
                }
            }
        }
    }

    fn request_stop(&mut self) -> Option<ProcessExit> {
        if self.session.stop() {
            // Nothing left to wait for.
            return Some(self.session.exit_status().unwrap_or(ProcessExit::Exited(0)));
        }
        None
    }
}
