// ABOUTME: Public client type tying config, connection management, and operations together.
// ABOUTME: Operations themselves live in exec.rs, scp.rs, and sftp.rs.

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use std::sync::Arc;

/// A client for one remote host.
///
/// The transport connection is established lazily on the first operation and
/// reused by subsequent ones until a session-open failure invalidates it,
/// at which point the next operation dials again. Calls from concurrent
/// tasks on one client serialize on the shared connection; use separate
/// clients (separate connections) for isolation.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use stelno::{Client, ClientConfig};
///
/// #[tokio::main]
/// async fn main() -> stelno::Result<()> {
///     let client = Client::new(
///         ClientConfig::new("10.10.10.2", "deploy").password("hunter2"),
///     );
///
///     let result = client.execute("echo hello", Duration::from_secs(5)).await;
///     assert!(result.success());
///     assert_eq!(result.stdout, "hello\n");
///
///     client.copy_scp("notes.txt", "/var/tmp/notes.txt").await?;
///     client.copy_sftp("notes.txt", "/var/tmp/notes-sftp.txt").await?;
///     Ok(())
/// }
/// ```
pub struct Client {
    connections: Arc<ConnectionManager>,
}

impl Client {
    /// Build a client. No connection is made until the first operation.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            connections: Arc::new(ConnectionManager::new(config)),
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        self.connections.config()
    }

    /// Close the cached connection if one is live. The next operation
    /// dials again, so this is a reset rather than a terminal state.
    pub async fn disconnect(&self) {
        self.connections.invalidate().await;
    }

    pub(crate) fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", self.config())
            .finish()
    }
}
