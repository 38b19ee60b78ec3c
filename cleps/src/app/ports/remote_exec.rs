// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecCapture {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the remote side closed the channel without an exit status.
    pub exit_code: Option<i32>,
}

impl ExecCapture {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[async_trait]
/// Remote command execution over the single live session.
/// Transport failures are errors; a command's own failure is reported in the capture.
pub trait RemoteExecPort: Send + Sync {
    async fn exec_capture(&self, command: &str) -> AppResult<ExecCapture>;
}
