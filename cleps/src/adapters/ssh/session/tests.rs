// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use super::{SessionManager, SshParams, client_config, verify_server_key};
use crate::adapters::ssh::SessionClosed;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::tempdir;

const KEY_B64: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIJdD7y3aLq454yWBdwLWbieU1ebz9/cu7/QEXn9OIeZJ";

fn params() -> SshParams {
    SshParams {
        host: "cleps.inria.fr".to_string(),
        addr: "127.0.0.1:22".parse::<SocketAddr>().unwrap(),
        username: "alice".to_string(),
        identity_path: None,
        known_hosts_path: None,
        keepalive_secs: 60,
    }
}

#[tokio::test]
async fn closed_session_fails_every_operation() {
    let manager = SessionManager::disconnected(params());
    assert!(!manager.is_connected().await);

    let err = manager.exec_capture("hostname").await.unwrap_err();
    assert!(err.is::<SessionClosed>());
    let err = manager.list_dir("outputs").await.unwrap_err();
    assert!(err.is::<SessionClosed>());
    manager.shutdown().await;
}

#[test]
fn client_config_disables_keepalive_at_zero() {
    assert_eq!(
        client_config(30).keepalive_interval,
        Some(Duration::from_secs(30))
    );
    assert_eq!(client_config(0).keepalive_interval, None);
}

#[test]
fn verify_server_key_accepts_known_host() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("known_hosts");
    fs::write(&path, format!("cleps.inria.fr ssh-ed25519 {KEY_B64}\n")).unwrap();
    let key = russh::keys::parse_public_key_base64(KEY_B64).unwrap();
    let addr = "192.0.2.7:22".parse::<SocketAddr>().unwrap();

    assert!(verify_server_key("cleps.inria.fr", addr, &key, Some(&path)).unwrap());
}

#[test]
fn verify_server_key_accepts_ip_fallback() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("known_hosts");
    fs::write(&path, format!("192.0.2.7 ssh-ed25519 {KEY_B64}\n")).unwrap();
    let key = russh::keys::parse_public_key_base64(KEY_B64).unwrap();
    let addr = "192.0.2.7:22".parse::<SocketAddr>().unwrap();

    assert!(verify_server_key("cleps.inria.fr", addr, &key, Some(&path)).unwrap());
}

#[test]
fn verify_server_key_learns_unknown_host() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("known_hosts");
    let key = russh::keys::parse_public_key_base64(KEY_B64).unwrap();
    let addr = "192.0.2.7:22".parse::<SocketAddr>().unwrap();

    assert!(verify_server_key("login.cluster.example", addr, &key, Some(&path)).unwrap());
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("login.cluster.example"));
    assert!(contents.contains(KEY_B64));
}

#[test]
fn verify_server_key_rejects_changed_key() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("known_hosts");
    let changed_key_b64 = "AAAAC3NzaC1lZDI1NTE5AAAAILIG2T/B0l0gaqj3puu510tu9N1OkQ4znY3LYuEm5zCF";
    fs::write(&path, format!("cleps.inria.fr ssh-ed25519 {KEY_B64}\n")).unwrap();
    let changed_key = russh::keys::parse_public_key_base64(changed_key_b64).unwrap();
    let addr = "192.0.2.7:22".parse::<SocketAddr>().unwrap();

    assert!(verify_server_key("cleps.inria.fr", addr, &changed_key, Some(&path)).is_err());
}

#[test]
fn credential_debug_redacts_secrets() {
    let credential = super::Credential {
        password: Some("hunter2".to_string()),
        key_passphrase: None,
    };
    let rendered = format!("{credential:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("***"));
}
