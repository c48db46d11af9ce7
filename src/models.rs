use serde::{Deserialize, Serialize};

pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Credentials and endpoint for one remote session.
///
/// Secrets are accepted on input but never serialized back out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub host: String,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub passphrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_fingerprint_auth: Option<bool>,
}

/// Identity of a session for dedup and reuse purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub host: String,
    pub username: String,
    pub port: u16,
}

impl SessionDescriptor {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: None,
            port: DEFAULT_SSH_PORT,
            private_key: None,
            passphrase: None,
            requires_fingerprint_auth: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            host: self.host.clone(),
            username: self.username.clone(),
            port: self.port,
        }
    }

    pub fn matches(&self, host: &str, username: &str, port: u16) -> bool {
        self.host == host && self.username == username && self.port == port
    }

    /// `user@host`, as passed to ssh.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

impl std::fmt::Display for SessionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}
