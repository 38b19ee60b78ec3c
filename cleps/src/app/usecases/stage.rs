// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;
use std::sync::Arc;

use tracing::Instrument;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{FileTransferPort, LocalFilesystemPort};
use crate::app::services::workload;
use crate::app::types::{WorkloadOrigin, WorkloadRef};
use crate::app::usecases::shell::RemoteShell;

/// Puts a workload's source tree at its remote destination. Staging the same
/// reference twice leaves the remote side as it was after the first run.
#[derive(Clone)]
pub struct Stager {
    shell: RemoteShell,
    transfer: Arc<dyn FileTransferPort>,
    local_fs: Arc<dyn LocalFilesystemPort>,
    span: tracing::Span,
}

impl Stager {
    pub fn new(
        shell: RemoteShell,
        transfer: Arc<dyn FileTransferPort>,
        local_fs: Arc<dyn LocalFilesystemPort>,
        span: tracing::Span,
    ) -> Self {
        Self {
            shell,
            transfer,
            local_fs,
            span,
        }
    }

    pub async fn stage(&self, reference: &WorkloadRef) -> AppResult<String> {
        async {
            self.shell
                .run(&workload::mkdir_command(&reference.working_dir))
                .await?;

            match &reference.origin {
                WorkloadOrigin::Remote { url } => {
                    self.clone_remote(url, &reference.destination).await?
                }
                WorkloadOrigin::Local { path } => {
                    self.push_local(path, &reference.destination).await?
                }
            }

            if let Some(revision) = reference.revision.as_deref() {
                self.shell
                    .run(&workload::checkout_command(&reference.destination, revision))
                    .await?;
                tracing::info!("checked out {revision} in {}", reference.destination);
            }
            Ok(reference.destination.clone())
        }
        .instrument(self.span.clone())
        .await
    }

    async fn clone_remote(&self, url: &str, destination: &str) -> AppResult<()> {
        if self.shell.check(&format!("test -d {destination}")).await? {
            tracing::info!("{destination} already exists, skipping clone of {url}");
            return Ok(());
        }
        match self
            .shell
            .run(&workload::clone_command(url, destination))
            .await
        {
            Ok(_) => {
                tracing::info!("cloned {url} into {destination}");
                Ok(())
            }
            Err(err)
                if err.kind() == AppErrorKind::Command
                    && workload::is_clone_destination_conflict(err.message()) =>
            {
                tracing::warn!("clone destination {destination} already exists: {err}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn push_local(&self, path: &Path, destination: &str) -> AppResult<()> {
        if !self.local_fs.is_dir(path).await? {
            return Err(AppError::with_message(
                AppErrorKind::NotFound,
                codes::NOT_FOUND,
                format!(
                    "the path `{}` does not exist on your local machine",
                    path.display()
                ),
            ));
        }
        tracing::info!("copying local workload {} to {destination}", path.display());
        let files = self.transfer.push_dir(path, destination).await?;
        tracing::info!("pushed {files} files to {destination}");
        Ok(())
    }
}
