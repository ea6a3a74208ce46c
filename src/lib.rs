// ABOUTME: Library root for stelno - an SSH remote-execution and file-transfer client.
// ABOUTME: Exposes Client, ClientConfig, CommandResult, and the error types.

//! Run shell commands on a remote host and push files to it over SSH,
//! powered by [russh](https://github.com/Eugeny/russh).
//!
//! The entry point is [`Client`]: configure host and credentials once, then
//! call [`Client::execute`], [`Client::copy_scp`], or [`Client::copy_sftp`].
//! The transport connection is dialed lazily and reused across calls;
//! command execution is raced against a caller-supplied deadline.

mod auth;
mod client;
mod config;
mod connection;
mod error;
mod exec;
mod scp;
mod sftp;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use exec::CommandResult;
