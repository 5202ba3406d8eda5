//! Session command resolution
//!
//! A configured command such as `"gnome-session --session=ubuntu"` is split
//! at the first run of whitespace. The first token is looked up on the
//! search path; the remainder is carried along untouched.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::environment::DEFAULT_PATH;

/// Command resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Binary not found on the search path
    #[error("Can't launch session {0}, not found in path")]
    NotFound(String),

    /// Command string is empty
    #[error("Session command is empty")]
    Empty,
}

/// Errors turning a resolved command into an `execve` argument vector
#[derive(Error, Debug)]
pub enum ArgvError {
    /// Argument string has unbalanced quotes or a trailing escape
    #[error("Invalid session arguments: {0}")]
    Quoting(#[from] shell_words::ParseError),

    /// No binary to execute
    #[error("Empty command line")]
    Empty,

    /// Binary path or an argument contains a NUL byte
    #[error("Command line contains a NUL byte")]
    NulByte,
}

/// Command resolved to an absolute binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    /// Absolute path of the binary
    pub binary: PathBuf,

    /// Argument string, verbatim from the configured command
    pub arguments: Option<String>,
}

impl ResolvedCommand {
    /// Full command line: `"<binary> <arguments>"`
    pub fn command_line(&self) -> String {
        match &self.arguments {
            Some(arguments) => format!("{} {}", self.binary.display(), arguments),
            None => self.binary.display().to_string(),
        }
    }

    /// `execve` argument vector
    ///
    /// The binary path is used verbatim as `argv[0]`. Only the argument
    /// string is split with shell quoting rules, so `"--title 'My Session'"`
    /// yields two arguments.
    pub fn exec_argv(&self) -> Result<Vec<CString>, ArgvError> {
        let binary = self.binary.as_os_str().as_bytes();
        if binary.is_empty() {
            return Err(ArgvError::Empty);
        }

        let mut argv = vec![CString::new(binary).map_err(|_| ArgvError::NulByte)?];
        if let Some(arguments) = &self.arguments {
            for arg in shell_words::split(arguments)? {
                argv.push(CString::new(arg).map_err(|_| ArgvError::NulByte)?);
            }
        }
        Ok(argv)
    }
}

/// Looks up session binaries on a search path
#[derive(Debug, Clone)]
pub struct CommandResolver {
    search_path: OsString,
    cwd: PathBuf,
}

impl Default for CommandResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl CommandResolver {
    /// Resolve against an explicit search path
    pub fn new(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: search_path.into(),
            cwd: PathBuf::from("/"),
        }
    }

    /// Resolve against the daemon's `PATH`
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("PATH").unwrap_or_else(|| OsString::from(DEFAULT_PATH)))
    }

    /// The search path in use
    pub fn search_path(&self) -> &OsString {
        &self.search_path
    }

    /// Resolve `command` to an absolute binary plus verbatim arguments
    pub fn resolve(&self, command: &str) -> Result<ResolvedCommand, ResolveError> {
        let (binary, arguments) = split_command(command).ok_or(ResolveError::Empty)?;

        let binary = which::which_in(binary, Some(&self.search_path), &self.cwd)
            .map_err(|_| ResolveError::NotFound(command.to_string()))?;

        debug!("Resolved session binary {}", binary.display());

        Ok(ResolvedCommand {
            binary,
            arguments: arguments.map(str::to_string),
        })
    }
}

/// Split at the first whitespace run into binary token and remainder
///
/// Returns `None` when there is no binary token at all.
pub fn split_command(command: &str) -> Option<(&str, Option<&str>)> {
    let command = command.trim_start();
    if command.is_empty() {
        return None;
    }

    match command.split_once(char::is_whitespace) {
        Some((binary, rest)) => {
            let rest = rest.trim_start();
            Some((binary, (!rest.is_empty()).then_some(rest)))
        }
        None => Some((command, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn search_dir_with(binary: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(binary);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        dir
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("gnome-session"), Some(("gnome-session", None)));
        assert_eq!(
            split_command("gnome-session --flag"),
            Some(("gnome-session", Some("--flag")))
        );
        assert_eq!(
            split_command("startx   -- :1  vt7"),
            Some(("startx", Some("-- :1  vt7")))
        );
        assert_eq!(split_command("session\t--a"), Some(("session", Some("--a"))));
        assert_eq!(split_command("   "), None);
        assert_eq!(split_command(""), None);
    }

    #[test]
    fn test_resolve_on_search_path() {
        let dir = search_dir_with("fake-session");
        let resolver = CommandResolver::new(dir.path());

        let resolved = resolver.resolve("fake-session --flag value").unwrap();

        assert_eq!(resolved.binary, dir.path().join("fake-session"));
        assert_eq!(resolved.arguments.as_deref(), Some("--flag value"));
        assert_eq!(
            resolved.command_line(),
            format!("{} --flag value", dir.path().join("fake-session").display())
        );
    }

    #[test]
    fn test_resolve_without_arguments() {
        let dir = search_dir_with("fake-session");
        let resolver = CommandResolver::new(dir.path());

        let resolved = resolver.resolve("fake-session").unwrap();
        assert_eq!(
            resolved.command_line(),
            dir.path().join("fake-session").display().to_string()
        );
    }

    #[test]
    fn test_resolve_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CommandResolver::new(dir.path());

        assert_eq!(
            resolver.resolve("doesnotexist123 --flag"),
            Err(ResolveError::NotFound("doesnotexist123 --flag".to_string()))
        );
    }

    #[test]
    fn test_resolve_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes"), "plain file").unwrap();
        let resolver = CommandResolver::new(dir.path());

        assert!(matches!(
            resolver.resolve("notes"),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_absolute_path() {
        let dir = search_dir_with("fake-session");
        let resolver = CommandResolver::new("/nonexistent");
        let absolute = dir.path().join("fake-session");

        let resolved = resolver
            .resolve(&format!("{} --x", absolute.display()))
            .unwrap();
        assert_eq!(resolved.binary, absolute);
    }

    #[test]
    fn test_resolve_empty() {
        let resolver = CommandResolver::new(DEFAULT_PATH);
        assert_eq!(resolver.resolve("  "), Err(ResolveError::Empty));
    }

    #[test]
    fn test_exec_argv_quoting() {
        let resolved = ResolvedCommand {
            binary: PathBuf::from("/usr/bin/session"),
            arguments: Some("--title 'My Session'".to_string()),
        };
        assert_eq!(
            resolved.exec_argv().unwrap(),
            vec![
                CString::new("/usr/bin/session").unwrap(),
                CString::new("--title").unwrap(),
                CString::new("My Session").unwrap(),
            ]
        );
    }

    #[test]
    fn test_exec_argv_keeps_binary_path_with_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = dir.path().join("My Sessions");
        fs::create_dir(&sessions).unwrap();
        let path = sessions.join("xsession");
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        let resolved = CommandResolver::new(&sessions)
            .resolve("xsession --flag")
            .unwrap();
        let argv = resolved.exec_argv().unwrap();

        assert_eq!(resolved.binary, path);
        assert_eq!(
            argv,
            vec![
                CString::new(path.as_os_str().as_bytes()).unwrap(),
                CString::new("--flag").unwrap(),
            ]
        );
    }

    #[test]
    fn test_exec_argv_quoting_chars_in_binary_path() {
        let resolved = ResolvedCommand {
            binary: PathBuf::from("/opt/it's \"odd\"/session"),
            arguments: None,
        };
        assert_eq!(
            resolved.exec_argv().unwrap(),
            vec![CString::new("/opt/it's \"odd\"/session").unwrap()]
        );
    }

    #[test]
    fn test_exec_argv_rejects_bad_arguments() {
        let resolved = ResolvedCommand {
            binary: PathBuf::from("/bin/true"),
            arguments: Some("'open".to_string()),
        };
        assert!(matches!(resolved.exec_argv(), Err(ArgvError::Quoting(_))));

        let empty = ResolvedCommand {
            binary: PathBuf::new(),
            arguments: None,
        };
        assert!(matches!(empty.exec_argv(), Err(ArgvError::Empty)));
    }
}
