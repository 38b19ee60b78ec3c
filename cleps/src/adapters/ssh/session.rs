// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result, anyhow};
use russh::client::Config;
use russh::keys::known_hosts::{learn_known_hosts, learn_known_hosts_path};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use super::error::SessionClosed;

mod auth;
mod exec;
mod sftp;

#[cfg(test)]
mod tests;

type ClientHandle = russh::client::Handle<ClientHandler>;

/// russh client handler checking the server key against known_hosts.
#[derive(Clone, Debug)]
struct ClientHandler {
    host: String,
    addr: SocketAddr,
    known_hosts_path: Option<PathBuf>,
}

impl russh::client::Handler for ClientHandler {
    type Error = anyhow::Error;
    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        verify_server_key(
            &self.host,
            self.addr,
            server_public_key,
            self.known_hosts_path.as_deref(),
        )
    }
}

/// Parameters for establishing the SSH connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshParams {
    /// Hostname as configured, used for known_hosts lookup.
    pub host: String,
    pub addr: SocketAddr,
    pub username: String,
    pub identity_path: Option<PathBuf>,
    /// Overrides `~/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
    pub keepalive_secs: u64,
}

/// Secret material used during authentication; never logged.
#[derive(Clone, Default)]
pub struct Credential {
    pub password: Option<String>,
    pub key_passphrase: Option<String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_passphrase", &self.key_passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

fn check_known_hosts_for(
    host: &str,
    port: u16,
    key: &russh::keys::ssh_key::PublicKey,
    known_hosts_path: Option<&Path>,
) -> std::result::Result<bool, russh::keys::Error> {
    match known_hosts_path {
        Some(path) => russh::keys::check_known_hosts_path(host, port, key, path),
        None => russh::keys::check_known_hosts(host, port, key),
    }
}

fn learn_known_hosts_for(
    host: &str,
    port: u16,
    key: &russh::keys::ssh_key::PublicKey,
    known_hosts_path: Option<&Path>,
) -> std::result::Result<(), russh::keys::Error> {
    match known_hosts_path {
        Some(path) => learn_known_hosts_path(host, port, key, path),
        None => learn_known_hosts(host, port, key),
    }
}

/// Accepts keys already in known_hosts (by name, then by IP), learns unknown
/// hosts, and rejects a key that changed.
fn verify_server_key(
    host: &str,
    addr: SocketAddr,
    key: &russh::keys::ssh_key::PublicKey,
    known_hosts_path: Option<&Path>,
) -> std::result::Result<bool, anyhow::Error> {
    let port = addr.port();
    let ip_host = addr.ip().to_string();
    let mut candidates = vec![host.to_string()];
    if ip_host != host {
        candidates.push(ip_host);
    }
    for candidate in &candidates {
        match check_known_hosts_for(candidate, port, key, known_hosts_path) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(err) => {
                log::warn!("server key validation failed for {candidate}:{port}: {err}");
                return Err(anyhow!(
                    "server key validation failed for {candidate}:{port}: {err}"
                ));
            }
        }
    }

    log::info!(
        "server key for {host}:{port} is not in known_hosts (tried {}); learning",
        candidates.join(", ")
    );
    learn_known_hosts_for(host, port, key, known_hosts_path).map_err(|err| {
        log::warn!("failed to learn server key for {host}:{port}: {err}");
        anyhow!("failed to learn server key for {host}:{port}: {err}")
    })?;
    Ok(true)
}

/// Owns the one SSH connection of a run. Channels are opened one at a time
/// under the handle lock, so remote operations are strictly sequential.
pub struct SessionManager {
    params: SshParams,
    handle: Mutex<Option<ClientHandle>>,
}

impl SessionManager {
    /// Opens and authenticates the transport. There is no later reconnect:
    /// once this connection drops, every operation fails.
    pub async fn connect(params: SshParams, credential: Credential) -> Result<Self> {
        let config = Arc::new(client_config(params.keepalive_secs));
        log::info!(
            "connecting to {}@{} ({})",
            params.username,
            params.host,
            params.addr
        );
        let handler = ClientHandler {
            host: params.host.clone(),
            addr: params.addr,
            known_hosts_path: params.known_hosts_path.clone(),
        };
        let mut handle = russh::client::connect(config, params.addr, handler)
            .await
            .context("SSH connect failed")?;
        log::info!(
            "established connection with {}@{}, proceeding with auth",
            params.username,
            params.addr
        );
        auth::authenticate(&mut handle, &params, &credential).await?;
        log::info!("authenticated as {}", params.username);

        Ok(Self {
            params,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn params(&self) -> &SshParams {
        &self.params
    }

    /// Locks the handle for one operation, failing when the transport is gone.
    async fn live_handle(&self) -> Result<MappedMutexGuard<'_, ClientHandle>> {
        let guard = self.handle.lock().await;
        if guard.as_ref().is_none_or(|handle| handle.is_closed()) {
            return Err(SessionClosed.into());
        }
        MutexGuard::try_map(guard, |slot| slot.as_mut())
            .map_err(|_| anyhow::Error::from(SessionClosed))
    }

    pub async fn shutdown(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await;
        }
    }
}

fn client_config(keepalive_secs: u64) -> Config {
    Config {
        inactivity_timeout: None,
        keepalive_interval: (keepalive_secs > 0).then(|| Duration::from_secs(keepalive_secs)),
        channel_buffer_size: 64,
        window_size: 1024 * 1024,
        ..Default::default()
    }
}

#[cfg(test)]
impl SessionManager {
    /// A manager whose transport is already gone.
    pub(crate) fn disconnected(params: SshParams) -> Self {
        Self {
            params,
            handle: Mutex::new(None),
        }
    }

    pub(crate) async fn is_connected(&self) -> bool {
        let guard = self.handle.lock().await;
        guard.as_ref().is_some_and(|handle| !handle.is_closed())
    }
}
