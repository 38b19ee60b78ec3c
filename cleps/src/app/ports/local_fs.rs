// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[async_trait]
/// Local filesystem boundary for the core.
pub trait LocalFilesystemPort: Send + Sync {
    async fn is_dir(&self, path: &Path) -> AppResult<bool>;
    async fn is_file(&self, path: &Path) -> AppResult<bool>;
    async fn create_dir_all(&self, path: &Path) -> AppResult<()>;
}
