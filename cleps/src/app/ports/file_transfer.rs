// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[async_trait]
/// Bulk file transfer between this machine and the remote host.
/// Remote paths may start with `~/`; adapters resolve them against the remote home.
pub trait FileTransferPort: Send + Sync {
    async fn push_file(&self, local_path: &Path, remote_path: &str) -> AppResult<()>;

    async fn push_bytes(&self, contents: &[u8], remote_path: &str) -> AppResult<()>;

    /// Recursively copies a local directory; `remote_dir` receives its contents.
    async fn push_dir(&self, local_dir: &Path, remote_dir: &str) -> AppResult<u64>;

    async fn pull_file(&self, remote_path: &str, local_path: &Path) -> AppResult<()>;

    /// Entry names (not paths) directly under `remote_dir`.
    async fn list_dir(&self, remote_dir: &str) -> AppResult<Vec<String>>;
}
