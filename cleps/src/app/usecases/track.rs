// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::Instrument;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{FileTransferPort, LocalFilesystemPort};
use crate::app::services::remote_path;
use crate::app::services::scheduler::SchedulerDialect;
use crate::app::types::{JobHandle, JobOutcome, JobStatus, WaitOptions};
use crate::app::usecases::shell::RemoteShell;

/// Status introspection, waiting and output retrieval for submitted jobs.
#[derive(Clone)]
pub struct Tracker {
    shell: RemoteShell,
    transfer: Arc<dyn FileTransferPort>,
    local_fs: Arc<dyn LocalFilesystemPort>,
    dialect: Arc<dyn SchedulerDialect>,
    span: tracing::Span,
}

impl Tracker {
    pub fn new(
        shell: RemoteShell,
        transfer: Arc<dyn FileTransferPort>,
        local_fs: Arc<dyn LocalFilesystemPort>,
        dialect: Arc<dyn SchedulerDialect>,
        span: tracing::Span,
    ) -> Self {
        Self {
            shell,
            transfer,
            local_fs,
            dialect,
            span,
        }
    }

    pub async fn status(&self, handle: &JobHandle) -> AppResult<JobStatus> {
        async {
            let raw = self.shell.run(&self.dialect.status_command(handle)).await?;
            let states = self.dialect.parse_states(&raw);
            Ok(JobStatus {
                job_id: handle.to_string(),
                states,
                raw,
            })
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn resolve_outputs(&self, handle: &JobHandle) -> AppResult<JobOutcome> {
        async {
            let raw = self.shell.run(&self.dialect.status_command(handle)).await?;
            let outcome = self.dialect.parse_outputs(handle, &raw)?;
            tracing::info!(
                "job {handle} resolved to {} output file(s)",
                outcome.tasks.len()
            );
            Ok(outcome)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Polls until the scheduler reports the job as no longer running and
    /// returns that final status. No poll is issued after a non-running state.
    pub async fn wait(
        &self,
        handle: &JobHandle,
        options: WaitOptions,
        mut cancel: watch::Receiver<bool>,
    ) -> AppResult<JobStatus> {
        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        let mut polls: u64 = 0;
        loop {
            if *cancel.borrow() {
                return Err(cancelled(handle));
            }
            let status = self.status(handle).await?;
            polls += 1;
            tracing::info!(parent: &self.span, "job {handle} poll {polls}: {}", status.summary());
            if !status.is_running() {
                return Ok(status);
            }

            let mut wake = Instant::now() + options.poll_interval;
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(timed_out(handle, options));
                }
                wake = wake.min(deadline);
            }
            tokio::select! {
                _ = sleep_until(wake) => {}
                _ = wait_cancelled(&mut cancel) => return Err(cancelled(handle)),
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(timed_out(handle, options));
            }
        }
    }

    /// Pulls every resolved output into `local_dir`, returning the local paths.
    pub async fn fetch(&self, outcome: &JobOutcome, local_dir: &Path) -> AppResult<Vec<PathBuf>> {
        async {
            self.local_fs.create_dir_all(local_dir).await?;
            tracing::info!(
                "fetching {} output file(s) of job {}",
                outcome.tasks.len(),
                outcome.job_id
            );
            let mut fetched = Vec::with_capacity(outcome.tasks.len());
            for task in &outcome.tasks {
                let name = remote_path::file_name(&task.stdout_path)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}_{}.log", outcome.job_id, task.task_id));
                let local_path = local_dir.join(name);
                self.transfer
                    .pull_file(&task.stdout_path, &local_path)
                    .await?;
                tracing::info!("fetched {} -> {}", task.stdout_path, local_path.display());
                fetched.push(local_path);
            }
            Ok(fetched)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Pulls every entry of `remote_dir` whose name mentions `job_id`.
    pub async fn fetch_matching(
        &self,
        job_id: &str,
        remote_dir: &str,
        local_dir: &Path,
    ) -> AppResult<Vec<PathBuf>> {
        async {
            let mut names: Vec<String> = self
                .transfer
                .list_dir(remote_dir)
                .await?
                .into_iter()
                .filter(|name| name.contains(job_id))
                .collect();
            names.sort();
            tracing::info!("fetching {} file(s) from {remote_dir}", names.len());
            self.local_fs.create_dir_all(local_dir).await?;
            let mut fetched = Vec::with_capacity(names.len());
            for name in names {
                let remote = remote_path::join(remote_dir, &name);
                let local_path = local_dir.join(&name);
                self.transfer.pull_file(&remote, &local_path).await?;
                tracing::info!("fetched {remote} -> {}", local_path.display());
                fetched.push(local_path);
            }
            Ok(fetched)
        }
        .instrument(self.span.clone())
        .await
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|flag| *flag).await.is_err();
    if closed {
        // Sender gone: nobody can cancel any more.
        std::future::pending::<()>().await;
    }
}

fn cancelled(handle: &JobHandle) -> AppError {
    AppError::with_message(
        AppErrorKind::Cancelled,
        codes::CANCELED,
        format!("wait for job {handle} canceled"),
    )
}

fn timed_out(handle: &JobHandle, options: WaitOptions) -> AppError {
    let limit = options.timeout.unwrap_or_default();
    AppError::with_message(
        AppErrorKind::Timeout,
        codes::TIMEOUT,
        format!("job {handle} still running after {}s", limit.as_secs()),
    )
}
