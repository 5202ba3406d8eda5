//! Session environment table and builder
//!
//! The session process never inherits the daemon's environment. Its
//! variables are assembled in a fixed order, later steps overriding
//! earlier ones for the same key:
//!
//! 1. start from an empty table
//! 2. POSIX baseline (`PATH`, `USER`, `LOGNAME`, `HOME`, `SHELL`)
//! 3. credential-stack variables (`KEY=VALUE`, split at the first `=`)
//! 4. `LANG` from the user's chosen locale
//! 5. the broker's utility directory prepended to `PATH`
//!
//! Steps 1-2 happen in the daemon when a session starts. Steps 3-5 happen
//! in the session process, after credentials have been established.

use crate::auth::Identity;
use std::ffi::CString;
use std::path::Path;
use tracing::{debug, warn};

/// Default search path for sessions
pub const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Variable carrying the session-tracking cookie
pub const SESSION_COOKIE_VAR: &str = "XDG_SESSION_COOKIE";

/// Ordered environment table
///
/// Setting an existing key replaces its value but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(String, String)>,
}

impl Environment {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.vars.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((name, value)),
        }
    }

    /// Get a variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Remove a variable, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.vars.iter().position(|(key, _)| key == name)?;
        Some(self.vars.remove(index).1)
    }

    /// Drop every variable
    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `KEY=VALUE` strings suitable for `execve`
    ///
    /// Entries containing an interior NUL cannot be passed to the kernel
    /// and are skipped.
    pub fn to_exec_strings(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(key, value)| CString::new(format!("{}={}", key, value)).ok())
            .collect()
    }
}

/// Reset `env` and apply the POSIX baseline for `identity`
pub fn apply_posix_baseline(env: &mut Environment, identity: &Identity) {
    env.clear();
    env.set("PATH", DEFAULT_PATH);
    env.set("USER", identity.name.as_str());
    env.set("LOGNAME", identity.name.as_str());
    env.set("HOME", identity.home_directory.to_string_lossy());
    env.set("SHELL", identity.shell.to_string_lossy());
}

/// Merge a raw `KEY=VALUE` list into `env`
///
/// Each entry is split at its first `=`. Entries without one, or with an
/// empty key, are skipped with a warning. Returns how many were skipped.
pub fn apply_authentication_env<S: AsRef<str>>(env: &mut Environment, entries: &[S]) -> usize {
    if entries.is_empty() {
        return 0;
    }

    debug!(
        "Credential stack returns environment '{}'",
        entries
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ")
    );

    let skipped = merge_authentication_env(env, entries);
    for entry in &skipped {
        warn!("Can't parse credential environment variable {}", entry);
    }
    skipped.len()
}

/// [`apply_authentication_env`] without logging
///
/// Returns the entries that were skipped. Used in the forked child, which
/// must not touch the tracing subscriber.
pub fn merge_authentication_env<'a, S: AsRef<str>>(
    env: &mut Environment,
    entries: &'a [S],
) -> Vec<&'a str> {
    let mut skipped = Vec::new();
    for entry in entries {
        let entry = entry.as_ref();
        match entry.split_once('=') {
            Some((name, value)) if !name.is_empty() => env.set(name, value),
            _ => skipped.push(entry),
        }
    }
    skipped
}

/// Set `LANG` from the identity's locale
///
/// This overrides whatever locale the credential stack exported.
pub fn apply_locale(env: &mut Environment, identity: &Identity) {
    if let Some(locale) = &identity.locale {
        env.set("LANG", locale.as_str());
    }
}

/// Prepend `utility_dir` to `PATH`, if `PATH` is set
pub fn insert_utility_path(env: &mut Environment, utility_dir: &Path) {
    if let Some(path) = env.get("PATH") {
        let path = format!("{}:{}", utility_dir.display(), path);
        env.set("PATH", path);
    }
}

/// Build a complete session environment in one pass
pub fn build<S: AsRef<str>>(
    identity: &Identity,
    auth_entries: &[S],
    utility_dir: Option<&Path>,
) -> Environment {
    let mut env = Environment::new();
    apply_posix_baseline(&mut env, identity);
    apply_authentication_env(&mut env, auth_entries);
    apply_locale(&mut env, identity);
    if let Some(dir) = utility_dir {
        insert_utility_path(&mut env, dir);
    }
    env
}
