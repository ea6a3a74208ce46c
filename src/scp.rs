// ABOUTME: File upload over the SCP sink protocol.
// ABOUTME: Frames the control line, streams the payload, and waits for the remote sink.

use crate::client::Client;
use crate::error::{Error, Result};
use russh::{Channel, ChannelMsg, client};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Format the SCP control line announcing one file to the sink: mode 0644,
/// exact payload size, base filename. Kept free of transport concerns so the
/// framing can be tested against a buffer.
pub(crate) fn sink_header(size: u64, file_name: &str) -> String {
    format!("C0644 {size} {file_name}\n")
}

/// Base filename the sink should create, derived from the remote path.
pub(crate) fn remote_file_name(remote_path: &str) -> String {
    Path::new(remote_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| remote_path.to_string())
}

impl Client {
    /// Push one local file to `remote_path` via the remote `scp` sink.
    ///
    /// The sink is started with `scp -tr` (receive mode, tolerant of
    /// directory-style targets); the control line, payload, and trailing NUL
    /// acknowledgment are streamed as the session's stdin. The call returns
    /// only after the sink process exits, and there is no timeout on the
    /// transfer.
    pub async fn copy_scp(&self, local_path: impl AsRef<Path>, remote_path: &str) -> Result<()> {
        let manager = self.connections();
        let connection = manager.ensure().await?;
        let mut channel = match connection.open_session().await {
            Ok(channel) => channel,
            Err(e) => {
                manager.invalidate().await;
                return Err(e);
            }
        };

        // Local failures return before any protocol bytes are written.
        let file = tokio::fs::File::open(local_path.as_ref()).await?;
        let size = file.metadata().await?.len();
        let file_name = remote_file_name(remote_path);

        channel
            .exec(true, format!("scp -tr {remote_path}"))
            .await
            .map_err(Error::Protocol)?;

        // Header, then exactly `size` payload bytes, then the NUL that tells
        // the sink the file is complete. The sink will not exit successfully
        // until it has consumed the NUL, so waiting for its exit status below
        // is what synchronizes the call with the transfer.
        let header = sink_header(size, &file_name);
        let stdin = header.as_bytes().chain(file.take(size)).chain(&b"\x00"[..]);
        channel.data(stdin).await.map_err(Error::Protocol)?;
        channel.eof().await.map_err(Error::Protocol)?;

        let status = wait_sink_exit(&mut channel).await;
        let _ = channel.close().await;

        match status? {
            0 => Ok(()),
            status => Err(Error::ScpSink(status)),
        }
    }
}

/// Drain the channel until the sink reports its exit status. The sink's ack
/// bytes arrive as data messages and are not checked, matching the blind
/// writer the protocol tolerates.
async fn wait_sink_exit(channel: &mut Channel<client::Msg>) -> Result<u32> {
    let mut exit_status = None;
    loop {
        match channel.wait().await {
            Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                exit_status = Some(status);
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => {
                if exit_status.is_some() {
                    break;
                }
            }
            Some(_) => {}
            None => break,
        }
    }
    exit_status.ok_or(Error::ChannelClosed)
}
