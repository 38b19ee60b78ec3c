// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

use crate::app::errors::AppResult;
use crate::app::ports::{FileTransferPort, LocalFilesystemPort, RemoteExecPort};
use crate::app::services::scheduler::SchedulerDialect;
use crate::app::types::{
    EnvironmentSpec, FailurePolicy, JobHandle, JobOutcome, JobSpec, JobStatus, WaitOptions,
    WorkloadRef,
};

pub mod provision;
pub mod shell;
pub mod stage;
pub mod submit;
pub mod track;

#[cfg(test)]
pub(crate) mod fakes;

pub use provision::Provisioner;
pub use shell::RemoteShell;
pub use stage::Stager;
pub use submit::Submitter;
pub use track::Tracker;

/// Everything `Controller::run` needs for one stage-to-fetch pass.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub workload: WorkloadRef,
    pub environment: EnvironmentSpec,
    pub job: JobSpec,
    /// When set, the job is waited for and its outputs fetched.
    pub wait: Option<WaitOptions>,
    pub fetch_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub workload_path: String,
    pub environment: String,
    pub job: JobHandle,
    pub final_status: Option<JobStatus>,
    pub outcome: Option<JobOutcome>,
    pub fetched: Vec<PathBuf>,
}

/// Composes staging, provisioning, submission and tracking over one session.
#[derive(Clone)]
pub struct Controller {
    stager: Stager,
    provisioner: Provisioner,
    submitter: Submitter,
    tracker: Tracker,
}

impl Controller {
    pub fn new(
        exec: Arc<dyn RemoteExecPort>,
        transfer: Arc<dyn FileTransferPort>,
        local_fs: Arc<dyn LocalFilesystemPort>,
        dialect: Arc<dyn SchedulerDialect>,
        policy: FailurePolicy,
    ) -> Self {
        let shell = |name: &'static str| {
            RemoteShell::new(
                exec.clone(),
                policy,
                tracing::info_span!("shell", component = name),
            )
        };
        Self {
            stager: Stager::new(
                shell("stage"),
                transfer.clone(),
                local_fs.clone(),
                tracing::info_span!("stage"),
            ),
            provisioner: Provisioner::new(
                shell("provision"),
                transfer.clone(),
                local_fs.clone(),
                tracing::info_span!("provision"),
            ),
            submitter: Submitter::new(
                shell("submit"),
                transfer.clone(),
                dialect.clone(),
                tracing::info_span!("submit", scheduler = dialect.name()),
            ),
            tracker: Tracker::new(
                shell("track"),
                transfer,
                local_fs,
                dialect.clone(),
                tracing::info_span!("track", scheduler = dialect.name()),
            ),
        }
    }

    pub async fn stage(&self, reference: &WorkloadRef) -> AppResult<String> {
        self.stager.stage(reference).await
    }

    pub async fn provision(&self, spec: &EnvironmentSpec, workload_path: &str) -> AppResult<String> {
        self.provisioner.provision(spec, workload_path).await
    }

    pub async fn submit(&self, spec: &JobSpec) -> AppResult<JobHandle> {
        self.submitter.submit(spec).await
    }

    pub async fn status(&self, handle: &JobHandle) -> AppResult<JobStatus> {
        self.tracker.status(handle).await
    }

    pub async fn wait(
        &self,
        handle: &JobHandle,
        options: WaitOptions,
        cancel: watch::Receiver<bool>,
    ) -> AppResult<JobStatus> {
        self.tracker.wait(handle, options, cancel).await
    }

    pub async fn resolve_outputs(&self, handle: &JobHandle) -> AppResult<JobOutcome> {
        self.tracker.resolve_outputs(handle).await
    }

    pub async fn fetch(&self, outcome: &JobOutcome, local_dir: &Path) -> AppResult<Vec<PathBuf>> {
        self.tracker.fetch(outcome, local_dir).await
    }

    pub async fn fetch_matching(
        &self,
        job_id: &str,
        remote_dir: &str,
        local_dir: &Path,
    ) -> AppResult<Vec<PathBuf>> {
        self.tracker
            .fetch_matching(job_id, remote_dir, local_dir)
            .await
    }

    /// stage -> provision -> submit, then wait -> resolve -> fetch when asked to.
    /// A failed step aborts the run; steps already done are left in place.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: watch::Receiver<bool>,
    ) -> AppResult<RunReport> {
        let workload_path = self.stage(&request.workload).await?;
        let environment = self
            .provision(&request.environment, &workload_path)
            .await?;
        let job = self.submit(&request.job).await?;

        let mut report = RunReport {
            workload_path,
            environment,
            job,
            final_status: None,
            outcome: None,
            fetched: Vec::new(),
        };
        let Some(options) = request.wait else {
            tracing::info!("job {} submitted, not waiting", report.job);
            return Ok(report);
        };

        let status = self.wait(&report.job, options, cancel).await?;
        tracing::info!("job {} finished: {}", report.job, status.summary());
        report.final_status = Some(status);

        let outcome = self.resolve_outputs(&report.job).await?;
        report.fetched = self.fetch(&outcome, &request.fetch_dir).await?;
        report.outcome = Some(outcome);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::errors::{AppErrorKind, codes};
    use crate::app::services::slurm::Slurm;
    use crate::app::types::{SlurmResources, SubmitOptions, WorkloadOrigin};
    use crate::app::usecases::fakes::{
        FakeLocalFs, RecordingTransfer, SequencedRemoteExec, Transfer, capture, ok,
    };
    use std::time::Duration;

    fn controller(exec: Arc<SequencedRemoteExec>, transfer: Arc<RecordingTransfer>) -> Controller {
        Controller::new(
            exec,
            transfer,
            Arc::new(FakeLocalFs::default()),
            Arc::new(Slurm::new().unwrap()),
            FailurePolicy::ExitStatus,
        )
    }

    fn request(wait: bool) -> RunRequest {
        let workload = WorkloadRef::new(
            WorkloadOrigin::parse("https://host/org/repo.git"),
            "~/work",
            None,
            None,
        );
        let job = JobSpec {
            run_command: "python run.py".to_string(),
            working_dir: workload.destination.clone(),
            environment: "cleps-env".to_string(),
            output_dir: None,
            resources: SlurmResources {
                job_name: Some("repo".to_string()),
                ..SlurmResources::default()
            },
            submission: SubmitOptions {
                array: Some("1-2".parse().unwrap()),
                ..SubmitOptions::default()
            },
        };
        RunRequest {
            workload,
            environment: EnvironmentSpec {
                name: "cleps-env".to_string(),
                spec_file: None,
                install_command: None,
            },
            job,
            wait: wait.then_some(WaitOptions {
                poll_interval: Duration::from_secs(5),
                timeout: None,
            }),
            fetch_dir: PathBuf::from("results"),
        }
    }

    fn setup_commands() -> Vec<(String, AppResult<crate::app::ports::ExecCapture>)> {
        vec![
            ("mkdir -p ~/work".to_string(), ok("")),
            ("test -d ~/work/repo && echo held".to_string(), Ok(capture(Some(1), "", ""))),
            (
                "git clone https://host/org/repo.git ~/work/repo".to_string(),
                Ok(capture(Some(0), "", "Cloning into 'repo'...")),
            ),
            ("conda env list".to_string(), ok("cleps-env  /opt/conda/envs/cleps-env\n")),
            ("mkdir -p ~/work/repo/outputs".to_string(), ok("")),
            (
                "sbatch --array=1-2 ~/work/repo/slurm_job.sbatch".to_string(),
                ok("Submitted batch job 300\n"),
            ),
        ]
    }

    #[tokio::test]
    async fn run_without_wait_stops_after_submission() {
        let exec = Arc::new(SequencedRemoteExec::new(setup_commands()));
        let transfer = Arc::new(RecordingTransfer::default());
        let report = controller(exec.clone(), transfer.clone())
            .run(&request(false), watch::channel(false).1)
            .await
            .unwrap();
        assert_eq!(report.workload_path, "~/work/repo");
        assert_eq!(report.job.as_str(), "300");
        assert!(report.final_status.is_none());
        assert!(report.fetched.is_empty());
        exec.assert_drained();
    }

    #[tokio::test(start_paused = true)]
    async fn run_with_wait_fetches_every_task_output() {
        let mut commands = setup_commands();
        commands.push((
            "scontrol show job 300".to_string(),
            ok("JobId=301 ArrayJobId=300 ArrayTaskId=1 JobState=RUNNING StdOut=/h/out/300_1.log\n"),
        ));
        let finished = "JobId=301 ArrayJobId=300 ArrayTaskId=1 JobState=COMPLETED StdOut=/h/out/300_1.log\n\nJobId=302 ArrayJobId=300 ArrayTaskId=2 JobState=COMPLETED StdOut=/h/out/300_2.log\n";
        commands.push(("scontrol show job 300".to_string(), ok(finished)));
        commands.push(("scontrol show job 300".to_string(), ok(finished)));
        let exec = Arc::new(SequencedRemoteExec::new(commands));
        let transfer = Arc::new(RecordingTransfer::default());

        let report = controller(exec.clone(), transfer.clone())
            .run(&request(true), watch::channel(false).1)
            .await
            .unwrap();

        assert_eq!(report.outcome.as_ref().map(|o| o.tasks.len()), Some(2));
        assert_eq!(
            report.fetched,
            vec![
                PathBuf::from("results/300_1.log"),
                PathBuf::from("results/300_2.log")
            ]
        );
        let pulls = transfer
            .recorded()
            .into_iter()
            .filter(|t| matches!(t, Transfer::PullFile { .. }))
            .count();
        assert_eq!(pulls, 2);
        exec.assert_drained();
    }

    #[tokio::test]
    async fn failed_stage_aborts_before_submission() {
        let exec = Arc::new(SequencedRemoteExec::new(vec![(
            "mkdir -p ~/work".to_string(),
            Ok(capture(Some(1), "", "mkdir: cannot create directory: Permission denied")),
        )]));
        let transfer = Arc::new(RecordingTransfer::default());
        let err = controller(exec.clone(), transfer.clone())
            .run(&request(false), watch::channel(false).1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Command);
        assert_eq!(err.code(), codes::REMOTE_ERROR);
        assert!(transfer.recorded().is_empty());
        exec.assert_drained();
    }
}
