//! Session registration with a session-tracking service
//!
//! A tracked session is opened with a set of `(key, variant)` parameters
//! and identified afterwards by an opaque cookie. The cookie is exported to
//! the session as `XDG_SESSION_COOKIE` and used to close, lock and unlock
//! the session.
//!
//! Only a privileged daemon may register sessions. An unprivileged daemon
//! (for example one running nested inside an existing desktop session)
//! adopts the cookie of the session it is running in instead.
//!
//! # Parameters
//!
//! | Key            | Value                 | When                |
//! |----------------|-----------------------|---------------------|
//! | `unix-user`    | `Int32(uid)`          | always              |
//! | `session-type` | `String("LoginWindow")` | greeter sessions  |
//! | caller keys    | as configured         | merged last         |
//!
//! A caller key that matches a fixed key replaces the fixed value.

#[cfg(feature = "consolekit")]
pub mod consolekit;

#[cfg(feature = "consolekit")]
pub use consolekit::ConsoleKitRegistrar;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::environment::SESSION_COOKIE_VAR;

/// Parameter key for the numeric user ID
pub const PARAM_UNIX_USER: &str = "unix-user";

/// Parameter key for the session type
pub const PARAM_SESSION_TYPE: &str = "session-type";

/// Session type marking a login window (greeter)
pub const SESSION_TYPE_LOGIN_WINDOW: &str = "LoginWindow";

/// Result type for registrar operations
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Registrar errors
#[derive(Error, Debug)]
pub enum RegistrarError {
    /// Operation requires a privileged daemon
    #[error("Session tracking operations require root")]
    NotPermitted,

    /// No tracking service configured or reachable
    #[error("Session tracking service unavailable: {0}")]
    Unavailable(String),

    /// The service refused the request
    #[error("Session tracking service rejected request: {0}")]
    Rejected(String),

    /// D-Bus transport error
    #[cfg(feature = "consolekit")]
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),
}

/// Opaque session-tracking cookie
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cookie(String);

impl Cookie {
    /// Wrap a cookie string; empty strings are not cookies
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        (!value.is_empty()).then_some(Self(value))
    }

    /// Read the ambient cookie from `XDG_SESSION_COOKIE`
    pub fn from_env() -> Option<Self> {
        std::env::var(SESSION_COOKIE_VAR).ok().and_then(Self::new)
    }

    /// Cookie string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registration parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean
    Bool(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// String
    String(String),
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Ordered registration parameters with unique keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationParameters {
    entries: Vec<(String, ParamValue)>,
}

impl RegistrationParameters {
    /// Build the parameter set for a session
    ///
    /// Caller-supplied `extra` parameters are merged last, sorted by key.
    /// On a key collision the caller's value wins.
    pub fn build(uid: u32, is_greeter: bool, extra: &HashMap<String, ParamValue>) -> Self {
        let mut parameters = Self::default();
        // uid_t values above i32::MAX wrap, as they do on the wire.
        parameters.insert(PARAM_UNIX_USER, ParamValue::Int32(uid as i32));
        if is_greeter {
            parameters.insert(PARAM_SESSION_TYPE, SESSION_TYPE_LOGIN_WINDOW);
        }

        let mut keys: Vec<_> = extra.keys().collect();
        keys.sort();
        for key in keys {
            if parameters.get(key).is_some() {
                warn!("Registration parameter {} overrides built-in value", key);
            }
            parameters.insert(key.as_str(), extra[key].clone());
        }

        parameters
    }

    /// Insert or replace a parameter
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Session-tracking service backend
#[cfg_attr(test, mockall::automock)]
pub trait Registrar {
    /// Open a tracked session
    fn open_session(&mut self, parameters: &RegistrationParameters) -> Result<Cookie>;

    /// Close a tracked session
    fn close_session(&mut self, cookie: &Cookie) -> Result<()>;

    /// Lock a tracked session
    fn lock_session(&mut self, cookie: &Cookie) -> Result<()>;

    /// Unlock a tracked session
    fn unlock_session(&mut self, cookie: &Cookie) -> Result<()>;
}

/// Backend used when session tracking is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRegistrar;

impl Registrar for NullRegistrar {
    fn open_session(&mut self, _parameters: &RegistrationParameters) -> Result<Cookie> {
        Err(RegistrarError::Unavailable(
            "session tracking is disabled".to_string(),
        ))
    }

    fn close_session(&mut self, _cookie: &Cookie) -> Result<()> {
        Ok(())
    }

    fn lock_session(&mut self, _cookie: &Cookie) -> Result<()> {
        Err(RegistrarError::Unavailable(
            "session tracking is disabled".to_string(),
        ))
    }

    fn unlock_session(&mut self, _cookie: &Cookie) -> Result<()> {
        Err(RegistrarError::Unavailable(
            "session tracking is disabled".to_string(),
        ))
    }
}

/// Where an unprivileged daemon gets its cookie from
#[derive(Debug, Clone, PartialEq, Eq)]
enum AmbientCookie {
    /// `XDG_SESSION_COOKIE` at registration time
    Environment,
    /// Fixed value
    Fixed(Option<Cookie>),
}

/// Privilege-aware front end to a [`Registrar`]
pub struct SessionRegistrar {
    backend: Box<dyn Registrar>,
    privileged: bool,
    ambient: AmbientCookie,
}

impl SessionRegistrar {
    /// Wrap `backend`; `privileged` decides whether it is ever called
    pub fn new(backend: Box<dyn Registrar>, privileged: bool) -> Self {
        Self {
            backend,
            privileged,
            ambient: AmbientCookie::Environment,
        }
    }

    /// Adapter that never registers and adopts no cookie
    pub fn disabled() -> Self {
        Self::new(Box::new(NullRegistrar), false).with_ambient_cookie(None)
    }

    /// Use a fixed ambient cookie instead of reading the environment
    pub fn with_ambient_cookie(mut self, cookie: Option<Cookie>) -> Self {
        self.ambient = AmbientCookie::Fixed(cookie);
        self
    }

    /// Whether the backend is used
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Obtain a cookie for a new session
    ///
    /// Privileged: opens a tracked session with `parameters`.
    /// Unprivileged: adopts the ambient cookie, if any.
    pub fn register(&mut self, parameters: &RegistrationParameters) -> Result<Option<Cookie>> {
        if !self.privileged {
            let cookie = match &self.ambient {
                AmbientCookie::Environment => Cookie::from_env(),
                AmbientCookie::Fixed(cookie) => cookie.clone(),
            };
            if cookie.is_some() {
                debug!("Adopting ambient session cookie");
            }
            return Ok(cookie);
        }

        let cookie = self.backend.open_session(parameters)?;
        info!("Opened tracked session");
        Ok(Some(cookie))
    }

    /// Release a cookie obtained from [`register`](Self::register)
    pub fn unregister(&mut self, cookie: &Cookie) -> Result<()> {
        if !self.privileged {
            return Ok(());
        }

        self.backend.close_session(cookie)?;
        info!("Closed tracked session");
        Ok(())
    }

    /// Lock the tracked session
    pub fn lock(&mut self, cookie: &Cookie) -> Result<()> {
        if !self.privileged {
            return Err(RegistrarError::NotPermitted);
        }
        self.backend.lock_session(cookie)
    }

    /// Unlock the tracked session
    pub fn unlock(&mut self, cookie: &Cookie) -> Result<()> {
        if !self.privileged {
            return Err(RegistrarError::NotPermitted);
        }
        self.backend.unlock_session(cookie)
    }
}

impl fmt::Debug for SessionRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistrar")
            .field("privileged", &self.privileged)
            .field("ambient", &self.ambient)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn cookie(value: &str) -> Cookie {
        Cookie::new(value).unwrap()
    }

    #[test]
    fn test_cookie_rejects_empty() {
        assert!(Cookie::new("").is_none());
        assert_eq!(cookie("abc").as_str(), "abc");
        assert_eq!(cookie("abc").to_string(), "abc");
    }

    #[test]
    fn test_user_session_parameters() {
        let parameters = RegistrationParameters::build(1000, false, &HashMap::new());

        assert_eq!(parameters.len(), 1);
        assert_eq!(
            parameters.get(PARAM_UNIX_USER),
            Some(&ParamValue::Int32(1000))
        );
        assert!(parameters.get(PARAM_SESSION_TYPE).is_none());
    }

    #[test]
    fn test_greeter_parameters_include_login_window() {
        let parameters = RegistrationParameters::build(102, true, &HashMap::new());

        assert_eq!(parameters.get(PARAM_UNIX_USER), Some(&ParamValue::Int32(102)));
        assert_eq!(
            parameters.get(PARAM_SESSION_TYPE),
            Some(&ParamValue::String("LoginWindow".to_string()))
        );
    }

    #[test]
    fn test_extra_parameters_sorted_after_fixed() {
        let mut extra = HashMap::new();
        extra.insert("x11-display".to_string(), ParamValue::from(":0"));
        extra.insert("is-local".to_string(), ParamValue::from(true));

        let parameters = RegistrationParameters::build(1000, false, &extra);
        let keys: Vec<_> = parameters.iter().map(|(k, _)| k).collect();

        assert_eq!(keys, vec!["unix-user", "is-local", "x11-display"]);
    }

    #[test]
    fn test_collision_last_write_wins() {
        let mut extra = HashMap::new();
        extra.insert(PARAM_UNIX_USER.to_string(), ParamValue::Int32(0));
        extra.insert(PARAM_SESSION_TYPE.to_string(), ParamValue::from("Custom"));

        let parameters = RegistrationParameters::build(1000, true, &extra);

        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters.get(PARAM_UNIX_USER), Some(&ParamValue::Int32(0)));
        assert_eq!(
            parameters.get(PARAM_SESSION_TYPE),
            Some(&ParamValue::String("Custom".to_string()))
        );
        // Replaced keys keep their original position.
        let keys: Vec<_> = parameters.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["unix-user", "session-type"]);
    }

    #[test]
    fn test_privileged_register_calls_backend() {
        let mut backend = MockRegistrar::new();
        backend
            .expect_open_session()
            .times(1)
            .returning(|_| Ok(Cookie::new("ck-1").unwrap()));
        backend
            .expect_close_session()
            .with(eq(cookie("ck-1")))
            .times(1)
            .returning(|_| Ok(()));

        let mut registrar = SessionRegistrar::new(Box::new(backend), true);
        let parameters = RegistrationParameters::build(1000, false, &HashMap::new());

        let obtained = registrar.register(&parameters).unwrap();
        assert_eq!(obtained, Some(cookie("ck-1")));
        registrar.unregister(&cookie("ck-1")).unwrap();
    }

    #[test]
    fn test_unprivileged_register_adopts_ambient_cookie() {
        let mut backend = MockRegistrar::new();
        backend.expect_open_session().never();
        backend.expect_close_session().never();

        let mut registrar = SessionRegistrar::new(Box::new(backend), false)
            .with_ambient_cookie(Cookie::new("abc"));
        let parameters = RegistrationParameters::build(1000, false, &HashMap::new());

        assert_eq!(registrar.register(&parameters).unwrap(), Some(cookie("abc")));
        assert!(registrar.unregister(&cookie("abc")).is_ok());
    }

    #[test]
    fn test_unprivileged_lock_not_permitted() {
        let mut backend = MockRegistrar::new();
        backend.expect_lock_session().never();
        backend.expect_unlock_session().never();

        let mut registrar = SessionRegistrar::new(Box::new(backend), false);

        assert!(matches!(
            registrar.lock(&cookie("abc")),
            Err(RegistrarError::NotPermitted)
        ));
        assert!(matches!(
            registrar.unlock(&cookie("abc")),
            Err(RegistrarError::NotPermitted)
        ));
    }

    #[test]
    fn test_disabled_registrar() {
        let mut registrar = SessionRegistrar::disabled();
        let parameters = RegistrationParameters::build(1000, false, &HashMap::new());

        assert!(!registrar.is_privileged());
        assert_eq!(registrar.register(&parameters).unwrap(), None);
    }

    #[test]
    fn test_null_registrar_refuses_open() {
        let mut backend = NullRegistrar;
        let parameters = RegistrationParameters::build(1000, false, &HashMap::new());
        assert!(matches!(
            backend.open_session(&parameters),
            Err(RegistrarError::Unavailable(_))
        ));
        assert!(backend.close_session(&cookie("x")).is_ok());
    }

    #[test]
    fn test_param_value_from_toml() {
        #[derive(Deserialize)]
        struct Table {
            parameters: HashMap<String, ParamValue>,
        }

        let table: Table = toml::from_str(
            r#"
            [parameters]
            x11-display = ":0"
            is-local = true
            vtnr = 7
            "#,
        )
        .unwrap();

        assert_eq!(table.parameters["x11-display"], ParamValue::from(":0"));
        assert_eq!(table.parameters["is-local"], ParamValue::Bool(true));
        assert_eq!(table.parameters["vtnr"], ParamValue::Int32(7));
    }
}
