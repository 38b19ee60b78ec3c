// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use russh::client::{AuthResult, KeyboardInteractiveAuthResponse};
use russh::keys::PrivateKeyWithHashAlg;
use std::sync::Arc;

use crate::adapters::ssh::AuthenticationFailure;

use super::{ClientHandle, Credential, SshParams};

#[derive(Debug)]
enum AuthDecision {
    Success,
    KeyboardInteractive,
    Failure,
}

fn auth_decision(result: AuthResult) -> AuthDecision {
    match result {
        AuthResult::Success => AuthDecision::Success,
        AuthResult::Failure {
            remaining_methods,
            partial_success,
        } if partial_success
            && remaining_methods.contains(&russh::MethodKind::KeyboardInteractive) =>
        {
            AuthDecision::KeyboardInteractive
        }
        AuthResult::Failure { .. } => AuthDecision::Failure,
    }
}

/// Tries the identity file, then the password, then keyboard-interactive
/// answered with the password. A partial success on any method goes
/// straight to keyboard-interactive.
pub(super) async fn authenticate(
    handle: &mut ClientHandle,
    params: &SshParams,
    credential: &Credential,
) -> Result<()> {
    if let Some(path) = &params.identity_path {
        let key = russh::keys::load_secret_key(path, credential.key_passphrase.as_deref())
            .with_context(|| format!("failed to load secret key at {}", path.display()))?;
        // Prefer SHA-256 for RSA if applicable (ignored for non-RSA keys)
        let pk = PrivateKeyWithHashAlg::new(
            Arc::new(key),
            handle.best_supported_rsa_hash().await?.flatten(),
        );
        let result = handle
            .authenticate_publickey(params.username.clone(), pk)
            .await?;
        match auth_decision(result) {
            AuthDecision::Success => return Ok(()),
            AuthDecision::KeyboardInteractive => {
                return keyboard_interactive(handle, params, credential).await;
            }
            AuthDecision::Failure => {
                log::debug!("public key rejected for {}", params.username);
            }
        }
    }

    if let Some(password) = &credential.password {
        let result = handle
            .authenticate_password(params.username.clone(), password.clone())
            .await?;
        match auth_decision(result) {
            AuthDecision::Success => return Ok(()),
            AuthDecision::KeyboardInteractive => {
                return keyboard_interactive(handle, params, credential).await;
            }
            AuthDecision::Failure => {
                log::debug!("password rejected for {}", params.username);
            }
        }
    }

    keyboard_interactive(handle, params, credential).await
}

/// Answers every keyboard-interactive prompt with the password. Without a
/// password only prompt-less rounds can succeed.
async fn keyboard_interactive(
    handle: &mut ClientHandle,
    params: &SshParams,
    credential: &Credential,
) -> Result<()> {
    let mut ki = handle
        .authenticate_keyboard_interactive_start(params.username.clone(), None)
        .await
        .context("KI start failed")?;

    loop {
        match ki {
            KeyboardInteractiveAuthResponse::Success => return Ok(()),
            KeyboardInteractiveAuthResponse::Failure {
                remaining_methods,
                partial_success,
            } => {
                log::debug!(
                    "authentication failed (partial_success={}, remaining={:?})",
                    partial_success,
                    remaining_methods
                );
                return Err(AuthenticationFailure.into());
            }
            KeyboardInteractiveAuthResponse::InfoRequest { name, prompts, .. } => {
                log::debug!("keyboard-interactive round '{name}' with {} prompt(s)", prompts.len());
                let answers = answer_prompts(prompts.len(), credential)?;
                ki = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await
                    .context("KI respond failed")?;
            }
        }
    }
}

fn answer_prompts(count: usize, credential: &Credential) -> Result<Vec<String>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    match &credential.password {
        Some(password) => Ok(vec![password.clone(); count]),
        None => Err(AuthenticationFailure.into()),
    }
}
