// ABOUTME: Credential resolution for SSH authentication.
// ABOUTME: Builds the ordered auth-method list from a ClientConfig and expands ~ paths.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use russh::keys::{load_secret_key, ssh_key};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One authentication method to offer the server, in configured order.
pub(crate) enum AuthMethod {
    Password(String),
    Key(Arc<ssh_key::PrivateKey>),
}

/// Build the ordered method list: password first when configured, then the
/// private key when it loads. A key that cannot be loaded is skipped rather
/// than failing the call, so a bad key path never blocks a client that also
/// supplies a password. The list may come out empty; the dial then fails
/// authentication.
pub(crate) fn resolve_methods(config: &ClientConfig) -> Vec<AuthMethod> {
    let mut methods = Vec::new();

    if let Some(password) = &config.password
        && !password.is_empty()
    {
        methods.push(AuthMethod::Password(password.clone()));
    }

    if let Some(key_path) = &config.key_path {
        match load_key(key_path) {
            Ok(key) => methods.push(AuthMethod::Key(Arc::new(key))),
            Err(e) => tracing::debug!("skipping key authentication: {}", e),
        }
    }

    methods
}

fn load_key(path: &Path) -> Result<ssh_key::PrivateKey> {
    let expanded = expand_home(path)?;
    load_secret_key(&expanded, None).map_err(|e| Error::KeyLoadFailed {
        path: expanded,
        reason: e.to_string(),
    })
}

/// Expand a leading `~` against `$HOME`. Paths without the prefix pass
/// through untouched.
pub(crate) fn expand_home(path: &Path) -> Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = std::env::var("HOME").map_err(|_| Error::KeyLoadFailed {
        path: path.to_path_buf(),
        reason: "HOME is not set, cannot expand ~".to_string(),
    })?;
    Ok(PathBuf::from(home).join(rest))
}
