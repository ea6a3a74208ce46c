// ABOUTME: Client configuration for connecting to a remote host.
// ABOUTME: Builder-style struct holding host, credentials, and the connect timeout.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`Client`](crate::Client).
///
/// Password and key path are optional and not mutually exclusive: when both
/// are set, password authentication is offered first, then the key.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// Optional plaintext password.
    pub password: Option<String>,
    /// Optional path to a private key file. `~`-prefixed paths are expanded
    /// against the invoking user's home directory. Defaults to
    /// `~/.ssh/id_rsa`; an unreadable or unparseable key is skipped, not
    /// fatal.
    pub key_path: Option<PathBuf>,
    /// Timeout for establishing the transport connection (default: 10 s).
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            password: None,
            key_path: Some(PathBuf::from("~/.ssh/id_rsa")),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Drop the default key path, leaving whatever password is configured as
    /// the only credential.
    pub fn without_key(mut self) -> Self {
        self.key_path = None;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The dial target in `host:port` form.
    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
