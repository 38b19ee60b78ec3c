// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use tracing::Instrument;

use crate::app::errors::AppResult;
use crate::app::ports::FileTransferPort;
use crate::app::services::scheduler::SchedulerDialect;
use crate::app::services::{remote_path, workload};
use crate::app::types::{JobHandle, JobSpec};
use crate::app::usecases::shell::RemoteShell;

#[derive(Clone)]
pub struct Submitter {
    shell: RemoteShell,
    transfer: Arc<dyn FileTransferPort>,
    dialect: Arc<dyn SchedulerDialect>,
    span: tracing::Span,
}

impl Submitter {
    pub fn new(
        shell: RemoteShell,
        transfer: Arc<dyn FileTransferPort>,
        dialect: Arc<dyn SchedulerDialect>,
        span: tracing::Span,
    ) -> Self {
        Self {
            shell,
            transfer,
            dialect,
            span,
        }
    }

    /// Renders the batch script, uploads it next to the workload and submits it.
    pub async fn submit(&self, spec: &JobSpec) -> AppResult<JobHandle> {
        async {
            spec.validate()?;

            let output_template = match spec.resources.output.as_deref() {
                Some(template) if !template.trim().is_empty() => template.to_string(),
                _ => {
                    let output_dir = spec.resolved_output_dir();
                    self.shell.run(&workload::mkdir_command(&output_dir)).await?;
                    self.dialect
                        .default_output_template(&output_dir, spec.is_array())
                }
            };

            let script = self.dialect.render_script(spec, &output_template);
            let script_path =
                remote_path::join(&spec.working_dir, self.dialect.script_file_name());
            tracing::debug!("batch script for {script_path}:\n{script}");
            self.transfer
                .push_bytes(script.as_bytes(), &script_path)
                .await?;

            let command = self.dialect.submit_command(&spec.submission, &script_path);
            let acknowledgement = self.shell.run(&command).await?;
            let handle = self.dialect.parse_submission(&acknowledgement)?;
            tracing::info!("submitted {} job {handle}", self.dialect.name());
            Ok(handle)
        }
        .instrument(self.span.clone())
        .await
    }
}
