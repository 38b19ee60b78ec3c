// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use tracing::Instrument;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes, invalid_argument};
use crate::app::ports::{FileTransferPort, LocalFilesystemPort};
use crate::app::services::{conda, remote_path};
use crate::app::types::EnvironmentSpec;
use crate::app::usecases::shell::RemoteShell;

/// Makes sure a named conda environment exists on the remote host and that
/// the workload's dependencies are installed into it.
#[derive(Clone)]
pub struct Provisioner {
    shell: RemoteShell,
    transfer: Arc<dyn FileTransferPort>,
    local_fs: Arc<dyn LocalFilesystemPort>,
    span: tracing::Span,
}

impl Provisioner {
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

    pub async fn provision(&self, spec: &EnvironmentSpec, workload_path: &str) -> AppResult<String> {
        async {
            let name = spec.name.trim();
            if name.is_empty() {
                return Err(invalid_argument("environment name must not be empty"));
            }

            let listing = self.shell.run(conda::LIST_ENVS_CMD).await?;
            if conda::env_listed(&listing, name) {
                tracing::info!("conda environment {name} already exists, skipping creation");
            } else if let Some(spec_file) = spec.spec_file.as_deref() {
                self.create(name, spec_file, workload_path).await?;
            } else {
                tracing::info!("conda environment {name} not listed and no spec file given");
            }

            if let Some(install) = spec
                .install_command
                .as_deref()
                .filter(|cmd| !cmd.trim().is_empty())
            {
                let command = conda::install_command(workload_path, name, install);
                if let Err(err) = self.shell.run(&command).await {
                    tracing::warn!("dependency installation in {name} failed: {err}");
                }
            }
            Ok(name.to_string())
        }
        .instrument(self.span.clone())
        .await
    }

    async fn create(
        &self,
        name: &str,
        spec_file: &std::path::Path,
        workload_path: &str,
    ) -> AppResult<()> {
        if !self.local_fs.is_file(spec_file).await? {
            return Err(AppError::with_message(
                AppErrorKind::NotFound,
                codes::NOT_FOUND,
                format!("environment file {} does not exist", spec_file.display()),
            ));
        }
        let file_name = spec_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                invalid_argument(format!(
                    "environment file {} has no file name",
                    spec_file.display()
                ))
            })?;
        let remote_file = remote_path::join(workload_path, &file_name);
        tracing::info!(
            "copying environment file {} to {remote_file}",
            spec_file.display()
        );
        self.transfer.push_file(spec_file, &remote_file).await?;
        tracing::info!("creating conda environment {name} from {remote_file}");
        self.shell
            .run(&conda::create_env_command(name, &remote_file))
            .await?;
        Ok(())
    }
}
