// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ExecCapture, FileTransferPort, RemoteExecPort};

mod error;
mod session;
mod upload_plan;

pub use error::{AuthenticationFailure, SessionClosed};
pub use session::{Credential, SessionManager, SshParams};

/// Remote execution and file transfer over one shared session.
#[derive(Clone)]
pub struct SshAdapter {
    session: Arc<SessionManager>,
}

impl SshAdapter {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

/// Opens and authenticates the session, mapped into the application error space.
pub async fn connect(params: SshParams, credential: Credential) -> AppResult<SessionManager> {
    SessionManager::connect(params, credential)
        .await
        .map_err(map_connect_error)
}

fn is_session_closed(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<SessionClosed>())
}

fn ssh_error_code(err: &anyhow::Error) -> &'static str {
    if err
        .chain()
        .any(|cause| cause.is::<AuthenticationFailure>())
    {
        codes::AUTHENTICATION_FAILURE
    } else {
        codes::CONNECTION_FAILURE
    }
}

fn map_connect_error(err: anyhow::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Authentication,
        ssh_error_code(&err),
        format!("ssh connect failed: {err:#}"),
    )
}

fn map_exec_error(err: anyhow::Error) -> AppError {
    if is_session_closed(&err) {
        return AppError::with_message(
            AppErrorKind::Authentication,
            codes::CONNECTION_FAILURE,
            format!("ssh exec failed: {err:#}"),
        );
    }
    AppError::with_message(
        AppErrorKind::Internal,
        codes::REMOTE_ERROR,
        format!("ssh exec failed: {err:#}"),
    )
}

fn map_transfer_error(op: &str, err: anyhow::Error) -> AppError {
    if is_session_closed(&err) {
        return AppError::with_message(
            AppErrorKind::Authentication,
            codes::CONNECTION_FAILURE,
            format!("sftp {op} failed: {err:#}"),
        );
    }
    if is_sftp_missing_path(&err) {
        return AppError::with_message(
            AppErrorKind::NotFound,
            codes::NOT_FOUND,
            format!("sftp {op} failed: {err:#}"),
        );
    }
    AppError::with_message(
        AppErrorKind::Internal,
        codes::REMOTE_ERROR,
        format!("sftp {op} failed: {err:#}"),
    )
}

fn is_sftp_missing_path(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let Some(sftp_error) = cause.downcast_ref::<russh_sftp::client::error::Error>() else {
            return false;
        };
        matches!(
            sftp_error,
            russh_sftp::client::error::Error::Status(status)
                if status.status_code == russh_sftp::protocol::StatusCode::NoSuchFile
        )
    })
}

#[async_trait]
impl RemoteExecPort for SshAdapter {
    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self, command),
        fields(op = "exec_capture", host = %self.session.params().host)
    )]
    async fn exec_capture(&self, command: &str) -> AppResult<ExecCapture> {
        self.session
            .exec_capture(command)
            .await
            .map_err(map_exec_error)
    }
}

#[async_trait]
impl FileTransferPort for SshAdapter {
    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self, local_path),
        fields(op = "push_file", local = %local_path.display())
    )]
    async fn push_file(&self, local_path: &Path, remote_path: &str) -> AppResult<()> {
        self.session
            .push_file(local_path, remote_path)
            .await
            .map_err(|err| map_transfer_error("push_file", err))
    }

    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self, contents),
        fields(op = "push_bytes", len = contents.len())
    )]
    async fn push_bytes(&self, contents: &[u8], remote_path: &str) -> AppResult<()> {
        self.session
            .push_bytes(contents, remote_path)
            .await
            .map_err(|err| map_transfer_error("push_bytes", err))
    }

    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self, local_dir),
        fields(op = "push_dir", local = %local_dir.display())
    )]
    async fn push_dir(&self, local_dir: &Path, remote_dir: &str) -> AppResult<u64> {
        self.session
            .push_dir(local_dir, remote_dir)
            .await
            .map_err(|err| map_transfer_error("push_dir", err))
    }

    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self, local_path),
        fields(op = "pull_file", local = %local_path.display())
    )]
    async fn pull_file(&self, remote_path: &str, local_path: &Path) -> AppResult<()> {
        self.session
            .pull_file(remote_path, local_path)
            .await
            .map_err(|err| map_transfer_error("pull_file", err))
    }

    #[tracing::instrument(name = "ssh", level = "debug", skip(self), fields(op = "list_dir"))]
    async fn list_dir(&self, remote_dir: &str) -> AppResult<Vec<String>> {
        self.session
            .list_dir(remote_dir)
            .await
            .map_err(|err| map_transfer_error("list_dir", err))
    }
}
