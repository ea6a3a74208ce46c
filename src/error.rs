// ABOUTME: Error types for the stelno client.
// ABOUTME: Covers credential, connection, session, run, timeout, and transfer failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The configured private key could not be loaded. Never fatal on its
    /// own: the credential resolver skips the key method and lets password
    /// authentication (if any) proceed.
    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: no method accepted by the server")]
    AuthenticationFailed,

    /// Opening a session channel on an established connection failed.
    /// The cached connection is invalidated when this occurs.
    #[error("failed to open session: {0}")]
    Session(String),

    #[error("remote command exited with status {0}")]
    ExitStatus(u32),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote scp sink exited with status {0}")]
    ScpSink(u32),

    #[error("SFTP subsystem error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
