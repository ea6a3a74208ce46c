// ABOUTME: File upload over the SFTP subsystem.
// ABOUTME: Streams a local file into a created/truncated remote file.

use crate::client::Client;
use crate::error::{Error, Result};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use std::path::Path;
use tokio::io::AsyncWriteExt;

impl Client {
    /// Stream one local file to `remote_path` via the SFTP subsystem.
    ///
    /// A session channel is opened on the cached connection first; failure
    /// there invalidates the connection, as with the other operations. The
    /// remote file is created (or truncated) and written from the local file
    /// in a streaming copy. A partial remote file left behind by a failed
    /// copy is not cleaned up. Transfers carry no timeout.
    pub async fn copy_sftp(&self, local_path: impl AsRef<Path>, remote_path: &str) -> Result<()> {
        let manager = self.connections();
        let connection = manager.ensure().await?;
        let channel = match connection.open_session().await {
            Ok(channel) => channel,
            Err(e) => {
                manager.invalidate().await;
                return Err(e);
            }
        };

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(Error::Protocol)?;
        let sftp = SftpSession::new(channel.into_stream()).await?;

        let outcome = upload(&sftp, local_path.as_ref(), remote_path).await;

        // The subsystem client is torn down on every exit path.
        let _ = sftp.close().await;
        outcome
    }
}

async fn upload(sftp: &SftpSession, local_path: &Path, remote_path: &str) -> Result<()> {
    let mut local_file = tokio::fs::File::open(local_path).await?;

    let mut remote_file = sftp
        .open_with_flags(
            remote_path,
            OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
        )
        .await?;

    tokio::io::copy(&mut local_file, &mut remote_file).await?;
    remote_file.flush().await?;
    remote_file.shutdown().await?;

    Ok(())
}
