// rpcd session object
//
// Login/logout against the `session` ubus object and ACL probing. A
// successful login stores the returned `ubus_rpc_session` on the client;
// every later call carries it.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::Error;
use crate::status::UbusStatus;
use crate::ubus::client::{NULL_SESSION, UbusClient};
use crate::ubus::models::SessionInfo;
use crate::ubus::procedure::{Procedure, Shape};

static SESSION_ACCESS: Procedure = Procedure::new("session", "access")
    .params(&["scope", "object", "function"])
    .expect("access", Shape::Boolean);

impl UbusClient {
    /// Authenticate with the router using username/password.
    ///
    /// Calls `session.login` under the null session and stores the returned
    /// session id for subsequent calls.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<SessionInfo, Error> {
        self.set_session_id(NULL_SESSION);
        debug!(username, "logging in");

        let args = json!({
            "username": username,
            "password": password.expose_secret(),
        });

        let (status, data) = self.call_status("session", "login", args).await?;
        match status {
            UbusStatus::Ok => {}
            UbusStatus::PermissionDenied => {
                return Err(Error::Authentication {
                    message: format!("login rejected for user '{username}'"),
                });
            }
            other => {
                return Err(Error::Authentication {
                    message: format!("login failed: {other}"),
                });
            }
        }

        let info: SessionInfo = serde_json::from_value(data.unwrap_or(Value::Null)).map_err(|e| {
            Error::Deserialization {
                message: format!("invalid login reply: {e}"),
                body: String::new(),
            }
        })?;

        self.set_session_id(info.ubus_rpc_session.clone());
        debug!(timeout = info.timeout, "login successful");
        Ok(info)
    }

    /// Destroy the current session and fall back to the null session.
    pub async fn logout(&self) -> Result<(), Error> {
        debug!("logging out");
        let result = self.call("session", "destroy", json!({})).await;
        self.set_session_id(NULL_SESSION);
        result.map(|_| ())
    }

    /// Check whether the current session may use `function` on `object`
    /// within `scope` (e.g. `("uci", "firewall", "write")`).
    pub async fn access(&self, scope: &str, object: &str, function: &str) -> Result<bool, Error> {
        let reply = self
            .invoke(
                &SESSION_ACCESS,
                vec![json!(scope), json!(object), json!(function)],
            )
            .await?;
        Ok(reply.as_bool().unwrap_or(false))
    }
}
