// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::{AppResult, local_error};
use crate::app::ports::LocalFilesystemPort;

#[derive(Clone, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocalFilesystemPort for LocalFilesystem {
    #[tracing::instrument(name = "fs", level = "debug", skip(self, path), fields(op = "is_dir", path = %path.display()))]
    async fn is_dir(&self, path: &Path) -> AppResult<bool> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(local_error(format!("failed to inspect {}: {err}", path.display()))),
        }
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, path), fields(op = "is_file", path = %path.display()))]
    async fn is_file(&self, path: &Path) -> AppResult<bool> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(local_error(format!("failed to inspect {}: {err}", path.display()))),
        }
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, path), fields(op = "create_dir_all", path = %path.display()))]
    async fn create_dir_all(&self, path: &Path) -> AppResult<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|err| local_error(format!("failed to create {}: {err}", path.display())))
    }
}
