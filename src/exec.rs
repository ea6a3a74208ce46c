// ABOUTME: Remote command execution with deadline enforcement.
// ABOUTME: Races a spawned connect+run task against the caller's timeout.

use crate::client::Client;
use crate::connection::ConnectionManager;
use crate::error::Error;
use russh::{Channel, ChannelMsg, client};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Diagnostic placed in stderr when the connection cannot be established.
pub(crate) const CONNECTION_DIAGNOSTIC: &str = "Could not establish ssh connection";
/// Diagnostic placed in stderr when opening a session fails.
pub(crate) const SESSION_DIAGNOSTIC: &str = "Could not establish ssh session";
/// Diagnostic placed in stderr when the deadline fires first.
pub(crate) const TIMEOUT_DIAGNOSTIC: &str =
    "Timeout exceeded while running command on the remote host";

/// Outcome of one [`Client::execute`] call. Always produced, even on
/// failure: when the failure happened before the remote process wrote its
/// own stderr (connection, session, timeout), `stderr` carries a fixed
/// diagnostic so callers can always render some explanatory text.
#[derive(Debug)]
pub struct CommandResult {
    /// The command that was requested.
    pub command: String,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error, or a fixed diagnostic for pre-run failures.
    pub stderr: String,
    /// `None` only on a fully successful (zero-exit) run.
    pub error: Option<Error>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(command: &str, stderr: &str, error: Error) -> Self {
        Self {
            command: command.to_string(),
            stdout: String::new(),
            stderr: stderr.to_string(),
            error: Some(error),
        }
    }
}

impl Client {
    /// Run `command` on the remote host, capturing stdout and stderr.
    ///
    /// The connect+run sequence is spawned as a background task and raced
    /// against `timeout`. When the deadline fires first the task is signaled
    /// to cancel and the returned result carries [`Error::Timeout`] with a
    /// fixed diagnostic in `stderr`; the task abandons its work at its next
    /// checkpoint. A zero timeout fires the deadline immediately and is a
    /// caller error.
    pub async fn execute(&self, command: &str, timeout: Duration) -> CommandResult {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let manager = Arc::clone(self.connections());
        let task_command = command.to_string();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            run_task(manager, task_command, task_cancel, tx).await;
        });

        tokio::select! {
            published = rx.recv() => match published {
                Some(result) => result,
                // The task exited without publishing; only reachable if it
                // panicked, since cancellation cannot win this select.
                None => CommandResult::failed(command, "", Error::ChannelClosed),
            },
            _ = tokio::time::sleep(timeout) => {
                cancel.cancel();
                CommandResult::failed(command, TIMEOUT_DIAGNOSTIC, Error::Timeout(timeout))
            }
        }
    }
}

/// The background unit of work for one execute call. Publishes exactly one
/// result, or nothing when cancellation is observed at a checkpoint. The
/// completion channel is buffered so a publish nobody receives never blocks
/// the task.
async fn run_task(
    manager: Arc<ConnectionManager>,
    command: String,
    cancel: CancellationToken,
    tx: mpsc::Sender<CommandResult>,
) {
    let connection = match manager.ensure().await {
        Ok(connection) => connection,
        Err(e) => {
            let _ = tx
                .send(CommandResult::failed(&command, CONNECTION_DIAGNOSTIC, e))
                .await;
            return;
        }
    };

    if cancel.is_cancelled() {
        return;
    }

    let mut channel = match connection.open_session().await {
        Ok(channel) => channel,
        Err(e) => {
            manager.invalidate().await;
            let _ = tx
                .send(CommandResult::failed(&command, SESSION_DIAGNOSTIC, e))
                .await;
            return;
        }
    };

    if cancel.is_cancelled() {
        let _ = channel.close().await;
        return;
    }

    let result = run_command(&mut channel, &command).await;
    let _ = channel.close().await;
    let _ = tx.send(result).await;
}

/// Exec the command on an open session channel and drain its message loop
/// into stdout/stderr buffers until the exit status arrives.
async fn run_command(channel: &mut Channel<client::Msg>, command: &str) -> CommandResult {
    let mut result = CommandResult {
        command: command.to_string(),
        stdout: String::new(),
        stderr: String::new(),
        error: None,
    };

    if let Err(e) = channel.exec(true, command).await {
        result.error = Some(Error::Protocol(e));
        return result;
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;
    let mut got_eof = false;

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                stdout.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                exit_status = Some(status);
                if got_eof {
                    break;
                }
            }
            Some(ChannelMsg::Eof) => {
                got_eof = true;
                if exit_status.is_some() {
                    break;
                }
            }
            Some(ChannelMsg::Close) => break,
            Some(_) => {}
            None => break,
        }
    }

    result.stdout = String::from_utf8_lossy(&stdout).to_string();
    result.stderr = String::from_utf8_lossy(&stderr).to_string();
    result.error = match exit_status {
        // A channel that closed without reporting a status indicates
        // abnormal termination (connection dropped mid-run).
        None => Some(Error::ChannelClosed),
        Some(0) => None,
        Some(status) => Some(Error::ExitStatus(status)),
    };

    result
}
