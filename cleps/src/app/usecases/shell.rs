// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use tracing::Instrument;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ExecCapture, RemoteExecPort};
use crate::app::types::FailurePolicy;

/// Command execution with the failure policy applied and every command
/// logged verbatim.
#[derive(Clone)]
pub struct RemoteShell {
    exec: Arc<dyn RemoteExecPort>,
    policy: FailurePolicy,
    span: tracing::Span,
}

impl RemoteShell {
    pub fn new(exec: Arc<dyn RemoteExecPort>, policy: FailurePolicy, span: tracing::Span) -> Self {
        Self { exec, policy, span }
    }

    /// Runs `command` and returns its stdout, or a `remote_error` when the
    /// policy judges it failed.
    pub async fn run(&self, command: &str) -> AppResult<String> {
        async {
            tracing::info!("remote command: {command}");
            let capture = self.exec.exec_capture(command).await?;
            judge(self.policy, command, &capture)?;
            let stdout = capture.stdout_lossy();
            if !stdout.trim().is_empty() {
                tracing::debug!("stdout: {}", stdout.trim_end());
            }
            Ok(stdout)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Evaluates a shell condition (`test -d ...`) remotely and reports whether
    /// it held. The answer is read from stdout, so it does not depend on the
    /// transport reporting an exit status. Only transport errors surface as
    /// `Err`.
    pub async fn check(&self, condition: &str) -> AppResult<bool> {
        async {
            let command = check_command(condition);
            tracing::info!("remote check: {command}");
            let capture = self.exec.exec_capture(&command).await?;
            let held = capture.stdout_lossy().trim() == CHECK_HELD_MARKER;
            tracing::debug!("check held={held}");
            Ok(held)
        }
        .instrument(self.span.clone())
        .await
    }
}

const CHECK_HELD_MARKER: &str = "held";

fn check_command(condition: &str) -> String {
    format!("{condition} && echo {CHECK_HELD_MARKER}")
}

/// Applies `policy` to one captured command.
pub fn judge(policy: FailurePolicy, command: &str, capture: &ExecCapture) -> AppResult<()> {
    let stderr = capture.stderr_lossy();
    let stderr = stderr.trim();
    let failed = match (policy, capture.exit_code) {
        (FailurePolicy::ExitStatus, Some(code)) => code != 0,
        (FailurePolicy::ExitStatus, None) | (FailurePolicy::StderrHeuristic, _) => {
            !stderr.is_empty()
        }
    };
    if !failed {
        if !stderr.is_empty() {
            tracing::warn!("stderr from successful command `{command}`: {stderr}");
        }
        return Ok(());
    }

    let detail = if stderr.is_empty() {
        capture.stdout_lossy().trim().to_string()
    } else {
        stderr.to_string()
    };
    let message = match capture.exit_code {
        Some(code) => format!("remote command failed with exit status {code}: {detail}"),
        None => format!("remote command failed: {detail}"),
    };
    tracing::error!("{message}");
    Err(
        AppError::with_message(AppErrorKind::Command, codes::REMOTE_ERROR, message)
            .with_context(command.to_string()),
    )
}
