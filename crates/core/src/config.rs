use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Channel security policy for the session.
///
/// `Enforced` leaves channel security to the transport (TLS is its concern);
/// `Disabled` is an explicit, logged opt-in to running sensitive operations
/// (account management) over an insecure channel. The opt-out is never
/// silent: the session logs it once per lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    Enforced,
    Disabled,
}

/// How gated operations behave when invoked in the wrong session state.
///
/// `Lenient` returns the operation's neutral value (empty list, `false`,
/// `None`) and logs a warning; `Strict` returns a typed error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatePolicy {
    #[default]
    Lenient,
    Strict,
}

/// Login credentials. Held only for the authentication attempt; this layer
/// never persists them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Static configuration for a session and its transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Server domain (e.g. "example.com"). Also the target of service
    /// discovery queries.
    pub server: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Ambient credentials, used by `login()` when no explicit credentials
    /// are supplied. `None` means the session starts connected but never
    /// authenticates on its own.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub security: SecurityMode,

    #[serde(default)]
    pub gate_policy: GatePolicy,

    /// Upper bound on waiting for a structured server response.
    #[serde(default = "default_response_timeout_seconds")]
    pub response_timeout_seconds: u64,
}

impl SessionConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: default_port(),
            credentials: None,
            security: SecurityMode::default(),
            gate_policy: GatePolicy::default(),
            response_timeout_seconds: default_response_timeout_seconds(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_security(mut self, security: SecurityMode) -> Self {
        self.security = security;
        self
    }

    pub fn with_gate_policy(mut self, gate_policy: GatePolicy) -> Self {
        self.gate_policy = gate_policy;
        self
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_seconds)
    }
}

fn default_port() -> u16 {
    5222
}

fn default_response_timeout_seconds() -> u64 {
    30
}
