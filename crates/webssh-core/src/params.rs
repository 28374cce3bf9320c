//! Connect payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::validate_connection_params;

/// Raw connect payload as received from the client.
///
/// Every field is untrusted. Use [`ConnectRequest::into_params`] to obtain
/// a [`ConnectParams`] that is safe to hand to a connector.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default)]
    pub host: String,
    /// Number or numeric string.
    #[serde(default)]
    pub port: Option<Value>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub auth_type: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("auth_type", &self.auth_type)
            .finish_non_exhaustive()
    }
}

impl ConnectRequest {
    /// Password-authenticated request.
    #[must_use]
    pub fn password(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port: Some(Value::from(port)),
            username: username.to_string(),
            auth_type: "password".to_string(),
            password: Some(password.to_string()),
            ..Self::default()
        }
    }

    /// Port as an integer, `None` when it is missing or not a whole number.
    #[must_use]
    pub fn port_number(&self) -> Option<i64> {
        match &self.port {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Validate and convert into typed parameters.
    ///
    /// # Errors
    /// Returns every violation found when the request is invalid.
    pub fn into_params(self) -> Result<ConnectParams, Vec<String>> {
        let violations = validate_connection_params(&self);
        if !violations.is_empty() {
            return Err(violations);
        }

        let port = self
            .port_number()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| vec!["Port must be a number between 1 and 65535".to_string()])?;

        let auth = match self.auth_type.as_str() {
            "password" => AuthMethod::Password {
                password: self.password.unwrap_or_default(),
            },
            "privateKey" => AuthMethod::PrivateKey {
                key: self.private_key.unwrap_or_default(),
                passphrase: self.passphrase.filter(|p| !p.is_empty()),
            },
            other => return Err(vec![format!("Unsupported auth type: {other}")]),
        };

        Ok(ConnectParams {
            host: self.host,
            port,
            username: self.username,
            auth,
        })
    }
}

/// How the session authenticates against the remote host.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password { password: String },
    /// OpenSSH or PEM encoded key text.
    PrivateKey {
        key: String,
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    /// Wire name of the method.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Password { .. } => "password",
            Self::PrivateKey { .. } => "privateKey",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthMethod({})", self.kind())
    }
}

/// Validated connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
}
