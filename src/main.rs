//! lamco-session-broker - Session Broker
//!
//! Entry point for the broker binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lamco_session_broker::config::{BrokerConfig, DEFAULT_CONFIG_PATH};
use lamco_session_broker::daemon::BrokerDaemon;
use lamco_session_broker::utils::{format_user_error, log_startup_diagnostics};

/// Command-line arguments for lamco-session-broker
#[derive(Parser, Debug)]
#[command(name = "lamco-session-broker")]
#[command(version, about = "Launch and supervise an authenticated user session", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "LAMCO_BROKER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// User to launch the session for
    #[arg(short, long)]
    pub user: Option<String>,

    /// Session command
    #[arg(long)]
    pub command: Option<String>,

    /// Launch as a greeter session
    #[arg(long)]
    pub greeter: bool,

    /// File receiving the session's output
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write daemon logs to file (in addition to stdout)
    #[arg(long)]
    pub daemon_log: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format_user_error(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = BrokerConfig::load_or_default(&args.config)?;
    let config = config.with_overrides(
        args.user.clone(),
        args.command.clone(),
        args.greeter,
        args.log_file.clone(),
    );
    config.validate().context("Invalid configuration")?;

    init_logging(&args, &config)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-session-broker v{}", env!("CARGO_PKG_VERSION"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    log_startup_diagnostics(&config);
    tracing::debug!("Config: {:?}", config);

    let daemon = BrokerDaemon::new(&config)?;

    // Sessions are forked from the runtime thread; keep tokio from adding workers.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build event loop")?;

    let exit = runtime.block_on(daemon.run())?;
    info!("Session {}", exit);

    Ok(ExitCode::from(exit.code().clamp(0, 255) as u8))
}

fn init_logging(args: &Args, config: &BrokerConfig) -> Result<()> {
    let log_level = match args.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_session_broker={level},zbus=info,warn",
            level = log_level
        ))
    });

    let log_file = args.daemon_log.as_ref().or(config.logging.file.as_ref());

    // If log file is specified, write to both stdout and file
    if let Some(log_file_path) = log_file {
        let (dir, name) = split_log_path(log_file_path)?;
        let file = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name.to_string_lossy())
            .build(dir)
            .with_context(|| format!("Failed to open daemon log {}", log_file_path.display()))?;

        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
        }
        info!("Logging to file: {}", log_file_path.display());
    } else {
        // Stdout only
        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().compact())
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
        }
    }

    Ok(())
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let name = path
        .file_name()
        .with_context(|| format!("Invalid daemon log path: {}", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    Ok((dir, name))
}
