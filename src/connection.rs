// ABOUTME: Transport connection management using russh.
// ABOUTME: Lazily dials, caches, and invalidates a single authenticated handle.

use crate::auth::{self, AuthMethod};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use russh::client::{self, Config, Handle};
use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh::{Channel, Disconnect};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Client handler that accepts any host key. Host-key verification is out of
/// scope for this client; the caller is expected to trust the target.
pub(crate) struct AcceptingHandler;

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// An established, authenticated transport connection. Cloning shares the
/// underlying handle.
#[derive(Clone)]
pub(crate) struct Connection {
    handle: Arc<Handle<AcceptingHandler>>,
}

impl Connection {
    /// Open a session channel. Failures surface as [`Error::Session`];
    /// callers are responsible for invalidating the cached connection when
    /// that happens.
    pub(crate) async fn open_session(&self) -> Result<Channel<client::Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Session(e.to_string()))
    }

    async fn close(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
    }
}

/// Owns the single reusable connection for a client. `ensure` hands out the
/// cached handle or dials a fresh one; `invalidate` tears the cache down so
/// the next call re-dials.
pub(crate) struct ConnectionManager {
    config: ClientConfig,
    cached: Mutex<Option<Connection>>,
}

impl ConnectionManager {
    pub(crate) fn new(config: ClientConfig) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
        }
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Return the cached connection, dialing one first if none is live.
    /// Dial errors propagate verbatim and leave the cache empty; there are
    /// no automatic retries. The cache lock is held across the dial so two
    /// concurrent callers cannot race a second dial.
    pub(crate) async fn ensure(&self) -> Result<Connection> {
        let mut cached = self.cached.lock().await;
        if let Some(connection) = cached.as_ref() {
            return Ok(connection.clone());
        }

        let connection = self.dial().await?;
        *cached = Some(connection.clone());
        Ok(connection)
    }

    /// Close the cached handle if present and clear the cache. Called by any
    /// consumer whose session-open attempt failed, so the next `ensure`
    /// re-dials instead of reusing a dead handle.
    pub(crate) async fn invalidate(&self) {
        if let Some(connection) = self.cached.lock().await.take() {
            tracing::debug!(host = %self.config.host, "invalidating cached connection");
            connection.close().await;
        }
    }

    async fn dial(&self) -> Result<Connection> {
        let methods = auth::resolve_methods(&self.config);
        let russh_config = Arc::new(Config::default());
        let address = self.config.address();

        tracing::debug!(address = %address, "dialing");
        let mut handle = tokio::time::timeout(
            self.config.connect_timeout,
            client::connect(
                russh_config,
                (self.config.host.as_str(), self.config.port),
                AcceptingHandler,
            ),
        )
        .await
        .map_err(|_| Error::Connection(format!("connect to {address} timed out")))?
        .map_err(|e| Error::Connection(e.to_string()))?;

        self.authenticate(&mut handle, methods).await?;

        Ok(Connection {
            handle: Arc::new(handle),
        })
    }

    /// Try each resolved method in order until the server accepts one.
    async fn authenticate(
        &self,
        handle: &mut Handle<AcceptingHandler>,
        methods: Vec<AuthMethod>,
    ) -> Result<()> {
        let user = self.config.user.as_str();
        for method in methods {
            let accepted = match method {
                AuthMethod::Password(password) => handle
                    .authenticate_password(user, password.as_str())
                    .await
                    .map_err(Error::Protocol)?
                    .success(),
                AuthMethod::Key(key) => {
                    let hash_alg = handle
                        .best_supported_rsa_hash()
                        .await
                        .map_err(Error::Protocol)?
                        .flatten();
                    handle
                        .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                        .await
                        .map_err(Error::Protocol)?
                        .success()
                }
            };
            if accepted {
                return Ok(());
            }
        }
        Err(Error::AuthenticationFailed)
    }
}
