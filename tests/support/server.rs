// ABOUTME: In-process SSH server for integration tests, built on russh's server side.
// ABOUTME: Scripts exec responses, captures SCP sink streams, and counts connections.

use russh::server::{Auth, Handle, Msg, Server, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_sftp::protocol::{
    FileAttributes, Handle as FileHandle, OpenFlags, Status, StatusCode, Version,
};
use std::collections::HashMap;
use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stelno::ClientConfig;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const TEST_USER: &str = "testuser";
pub const TEST_PASSWORD: &str = "secret";

/// Observable server-side state shared with the test body.
#[derive(Default)]
pub struct ServerState {
    /// Number of transport connections accepted so far.
    connections: AtomicUsize,
    /// When set, the next session-channel open is rejected (and the flag
    /// clears), forcing clients into their invalidation path.
    reject_next_session: AtomicBool,
    /// When set, sftp subsystem requests are refused.
    refuse_sftp: AtomicBool,
    /// Byte streams received by completed SCP sink runs.
    scp_captures: Mutex<Vec<Vec<u8>>>,
}

/// A test SSH server listening on an ephemeral localhost port.
///
/// Scripted exec behavior:
/// - `echo <text>` writes `<text>\n` to stdout and exits 0
/// - `echo-stderr <text>` writes `<text>\n` to stderr and exits 0
/// - `exit <n>` exits with status `n`
/// - `sleep <n>` never reports an exit status (for timeout tests)
/// - `scp -tr <path>` acts as an SCP sink, capturing everything written to it
///
/// The `sftp` subsystem is served by a minimal handler that opens the literal
/// requested path, so tests point remote paths into a tempdir. Call
/// [`TestSshServer::refuse_sftp`] to exercise subsystem-refusal handling.
pub struct TestSshServer {
    pub addr: SocketAddr,
    state: Arc<ServerState>,
}

impl TestSshServer {
    pub async fn spawn() -> Self {
        let key = russh::keys::PrivateKey::random(
            &mut russh::keys::ssh_key::rand_core::OsRng,
            russh::keys::Algorithm::Ed25519,
        )
        .expect("host key generation should succeed");

        let config = Arc::new(russh::server::Config {
            keys: vec![key],
            auth_rejection_time: Duration::from_millis(0),
            auth_rejection_time_initial: Some(Duration::from_millis(0)),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");

        let state = Arc::new(ServerState::default());
        let mut runner = TestServerRunner {
            state: Arc::clone(&state),
        };
        tokio::spawn(async move {
            let _ = runner.run_on_socket(config, &listener).await;
        });

        Self { addr, state }
    }

    /// Client config pointed at this server, password-only.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", TEST_USER)
            .port(self.addr.port())
            .password(TEST_PASSWORD)
            .without_key()
    }

    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn reject_next_session(&self) {
        self.state.reject_next_session.store(true, Ordering::SeqCst);
    }

    pub fn refuse_sftp(&self) {
        self.state.refuse_sftp.store(true, Ordering::SeqCst);
    }

    pub fn scp_captures(&self) -> Vec<Vec<u8>> {
        self.state.scp_captures.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct TestServerRunner {
    state: Arc<ServerState>,
}

impl Server for TestServerRunner {
    type Handler = TestHandler;

    fn new_client(&mut self, _peer_addr: Option<SocketAddr>) -> TestHandler {
        self.state.connections.fetch_add(1, Ordering::SeqCst);
        TestHandler {
            state: Arc::clone(&self.state),
            channels: HashMap::new(),
            scp_streams: HashMap::new(),
        }
    }
}

struct TestHandler {
    state: Arc<ServerState>,
    /// Raw channels from accepted session opens, held until an exec request
    /// releases them or a subsystem request takes one over as its carrier.
    channels: HashMap<ChannelId, Channel<Msg>>,
    /// Channels currently running an SCP sink, with bytes received so far.
    scp_streams: HashMap<ChannelId, Vec<u8>>,
}

/// Send a scripted exec response: optional stdout/stderr line, then the
/// exit-status/eof/close sequence the client's message loop expects.
async fn respond(
    handle: Handle,
    channel: ChannelId,
    stdout: Option<String>,
    stderr: Option<String>,
    exit_status: u32,
) {
    if let Some(line) = stdout {
        let _ = handle
            .data(channel, CryptoVec::from_slice(line.as_bytes()))
            .await;
    }
    if let Some(line) = stderr {
        let _ = handle
            .extended_data(channel, 1, CryptoVec::from_slice(line.as_bytes()))
            .await;
    }
    let _ = handle.exit_status_request(channel, exit_status).await;
    let _ = handle.eof(channel).await;
    let _ = handle.close(channel).await;
}

impl russh::server::Handler for TestHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == TEST_USER && password == TEST_PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.state.reject_next_session.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).to_string();
        // Exec channels are driven through the session handle; release the
        // raw channel so incoming data reaches the handler methods.
        self.channels.remove(&channel);
        let _ = session.channel_success(channel);
        let handle = session.handle();

        if command.starts_with("scp -tr ") {
            self.scp_streams.insert(channel, Vec::new());
            // Sink-ready acknowledgment; the client does not check it.
            tokio::spawn(async move {
                let _ = handle.data(channel, CryptoVec::from_slice(b"\x00")).await;
            });
            return Ok(());
        }

        if command.starts_with("sleep ") {
            // Never report an exit status: the client's deadline must fire.
            return Ok(());
        }

        let (stdout, stderr, exit_status) =
            if let Some(text) = command.strip_prefix("echo-stderr ") {
                (None, Some(format!("{text}\n")), 0)
            } else if let Some(text) = command.strip_prefix("echo ") {
                (Some(format!("{text}\n")), None, 0)
            } else if let Some(code) = command.strip_prefix("exit ") {
                (None, None, code.trim().parse().unwrap_or(1))
            } else {
                (None, None, 127)
            };

        tokio::spawn(respond(handle, channel, stdout, stderr, exit_status));
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(buffer) = self.scp_streams.get_mut(&channel) {
            buffer.extend_from_slice(data);
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(buffer) = self.scp_streams.remove(&channel) {
            self.state.scp_captures.lock().unwrap().push(buffer);
            let handle = session.handle();
            tokio::spawn(async move {
                let _ = handle.data(channel, CryptoVec::from_slice(b"\x00")).await;
                let _ = handle.exit_status_request(channel, 0).await;
                let _ = handle.eof(channel).await;
                let _ = handle.close(channel).await;
            });
        }
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name == "sftp"
            && !self.state.refuse_sftp.load(Ordering::SeqCst)
            && let Some(carrier) = self.channels.remove(&channel)
        {
            let _ = session.channel_success(channel);
            tokio::spawn(russh_sftp::server::run(
                carrier.into_stream(),
                TestSftpHandler::default(),
            ));
        } else {
            let _ = session.channel_failure(channel);
        }
        Ok(())
    }
}

/// Minimal SFTP handler: opens the literal requested path, tracks open files
/// by handle, and supports exactly the open/write/close flow an upload uses.
#[derive(Default)]
struct TestSftpHandler {
    open_files: HashMap<String, tokio::fs::File>,
    next_handle: u64,
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: String::new(),
        language_tag: "en".to_string(),
    }
}

impl russh_sftp::server::Handler for TestSftpHandler {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        _version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<FileHandle, Self::Error> {
        let mut opts = OpenOptions::new();
        opts.read(pflags.contains(OpenFlags::READ))
            .write(pflags.contains(OpenFlags::WRITE))
            .create(pflags.contains(OpenFlags::CREATE))
            .truncate(pflags.contains(OpenFlags::TRUNCATE))
            .append(pflags.contains(OpenFlags::APPEND));
        let file = opts
            .open(&filename)
            .await
            .map_err(|_| StatusCode::Failure)?;

        let handle = format!("file-{}", self.next_handle);
        self.next_handle += 1;
        self.open_files.insert(handle.clone(), file);
        Ok(FileHandle { id, handle })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let file = self
            .open_files
            .get_mut(&handle)
            .ok_or(StatusCode::Failure)?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|_| StatusCode::Failure)?;
        file.write_all(&data)
            .await
            .map_err(|_| StatusCode::Failure)?;
        Ok(ok_status(id))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        if let Some(mut file) = self.open_files.remove(&handle) {
            let _ = file.flush().await;
        }
        Ok(ok_status(id))
    }
}
