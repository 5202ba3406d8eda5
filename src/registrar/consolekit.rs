//! ConsoleKit D-Bus backend
//!
//! Talks to `org.freedesktop.ConsoleKit` on the system bus. Sessions are
//! opened with `OpenSessionWithParameters` and addressed afterwards by
//! cookie; lock/unlock go through the session object that
//! `GetSessionForCookie` returns.

use super::{Cookie, ParamValue, Registrar, RegistrarError, RegistrationParameters, Result};
use tracing::{debug, info};
use zbus::blocking::Connection;
use zbus::proxy;
use zbus::zvariant::{OwnedObjectPath, Value};

/// ConsoleKit Manager interface
#[proxy(
    interface = "org.freedesktop.ConsoleKit.Manager",
    default_service = "org.freedesktop.ConsoleKit",
    default_path = "/org/freedesktop/ConsoleKit/Manager"
)]
trait ConsoleKitManager {
    /// Open a session described by `parameters`, returning its cookie
    #[zbus(name = "OpenSessionWithParameters")]
    fn open_session_with_parameters(&self, parameters: &[(&str, Value<'_>)]) -> zbus::Result<String>;

    /// Close the session identified by `cookie`
    #[zbus(name = "CloseSession")]
    fn close_session(&self, cookie: &str) -> zbus::Result<bool>;

    /// Look up the session object for `cookie`
    #[zbus(name = "GetSessionForCookie")]
    fn get_session_for_cookie(&self, cookie: &str) -> zbus::Result<OwnedObjectPath>;
}

/// ConsoleKit Session interface
#[proxy(
    interface = "org.freedesktop.ConsoleKit.Session",
    default_service = "org.freedesktop.ConsoleKit"
)]
trait ConsoleKitSession {
    #[zbus(name = "Lock")]
    fn lock(&self) -> zbus::Result<()>;

    #[zbus(name = "Unlock")]
    fn unlock(&self) -> zbus::Result<()>;
}

fn to_value(value: &ParamValue) -> Value<'_> {
    match value {
        ParamValue::Bool(b) => Value::from(*b),
        ParamValue::Int32(i) => Value::from(*i),
        ParamValue::String(s) => Value::from(s.as_str()),
    }
}

/// ConsoleKit client
pub struct ConsoleKitRegistrar {
    connection: Connection,
    manager: ConsoleKitManagerProxyBlocking<'static>,
}

impl ConsoleKitRegistrar {
    /// Connect to ConsoleKit on the system bus
    pub fn connect() -> Result<Self> {
        info!("Connecting to ConsoleKit via D-Bus");

        let connection = Connection::system()?;
        let manager = ConsoleKitManagerProxyBlocking::new(&connection)?;

        debug!("Connected to ConsoleKit");

        Ok(Self {
            connection,
            manager,
        })
    }

    fn session_proxy(&self, cookie: &Cookie) -> Result<ConsoleKitSessionProxyBlocking<'_>> {
        let path = self.manager.get_session_for_cookie(cookie.as_str())?;
        debug!("Cookie maps to ConsoleKit session {}", path.as_str());

        Ok(ConsoleKitSessionProxyBlocking::builder(&self.connection)
            .path(path)?
            .build()?)
    }
}

impl Registrar for ConsoleKitRegistrar {
    fn open_session(&mut self, parameters: &RegistrationParameters) -> Result<Cookie> {
        let wire: Vec<(&str, Value<'_>)> = parameters
            .iter()
            .map(|(key, value)| (key, to_value(value)))
            .collect();

        debug!("OpenSessionWithParameters with {} parameters", wire.len());

        let cookie = self.manager.open_session_with_parameters(&wire)?;
        Cookie::new(cookie)
            .ok_or_else(|| RegistrarError::Rejected("ConsoleKit returned an empty cookie".to_string()))
    }

    fn close_session(&mut self, cookie: &Cookie) -> Result<()> {
        if self.manager.close_session(cookie.as_str())? {
            Ok(())
        } else {
            Err(RegistrarError::Rejected(
                "ConsoleKit refused to close the session".to_string(),
            ))
        }
    }

    fn lock_session(&mut self, cookie: &Cookie) -> Result<()> {
        self.session_proxy(cookie)?.lock()?;
        info!("Locked ConsoleKit session");
        Ok(())
    }

    fn unlock_session(&mut self, cookie: &Cookie) -> Result<()> {
        self.session_proxy(cookie)?.unlock()?;
        info!("Unlocked ConsoleKit session");
        Ok(())
    }
}
