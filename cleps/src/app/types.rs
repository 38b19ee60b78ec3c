// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::app::errors::{AppResult, invalid_argument};
use crate::app::services::{remote_path, workload};

/// Where a workload's source tree comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadOrigin {
    /// A repository URL the remote host can clone itself.
    Remote { url: String },
    /// A directory on this machine that has to be pushed.
    Local { path: PathBuf },
}

impl WorkloadOrigin {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if workload::is_remote_origin(raw) {
            WorkloadOrigin::Remote {
                url: raw.to_string(),
            }
        } else {
            WorkloadOrigin::Local {
                path: PathBuf::from(raw),
            }
        }
    }

    /// Directory name the workload gets under the working directory.
    pub fn name(&self) -> String {
        match self {
            WorkloadOrigin::Remote { url } => workload::repo_name_from_url(url),
            WorkloadOrigin::Local { path } => workload::local_dir_name(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRef {
    pub origin: WorkloadOrigin,
    /// Remote working directory, created before staging.
    pub working_dir: String,
    pub destination: String,
    pub revision: Option<String>,
}

impl WorkloadRef {
    /// Builds a reference whose destination is derived from the origin unless
    /// one is given explicitly.
    pub fn new(
        origin: WorkloadOrigin,
        working_dir: impl Into<String>,
        destination: Option<String>,
        revision: Option<String>,
    ) -> Self {
        let working_dir = working_dir.into();
        let destination = destination
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| workload::default_destination(&working_dir, &origin));
        Self {
            origin,
            working_dir,
            destination,
            revision: revision.filter(|value| !value.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    pub name: String,
    /// Local conda environment file (YAML) used to create the environment.
    pub spec_file: Option<PathBuf>,
    pub install_command: Option<String>,
}

/// `#SBATCH` directives, rendered in field order with `extra` appended last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlurmResources {
    pub job_name: Option<String>,
    pub time: Option<String>,
    pub partition: Option<String>,
    pub nodes: Option<u32>,
    pub ntasks_per_node: Option<u32>,
    pub cpus_per_task: Option<u32>,
    pub memory: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub extra: Vec<(String, String)>,
}

/// Command-line flags passed to `sbatch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    pub account: Option<String>,
    pub qos: Option<String>,
    pub dependency: Option<String>,
    pub mail_user: Option<String>,
    pub mail_type: Option<String>,
    pub array: Option<ArrayIndices>,
    pub wait: bool,
    pub extra: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub run_command: String,
    pub working_dir: String,
    pub environment: String,
    /// Directory receiving job logs when `resources.output` is unset.
    /// Defaults to `<working_dir>/outputs`.
    pub output_dir: Option<String>,
    pub resources: SlurmResources,
    pub submission: SubmitOptions,
}

impl JobSpec {
    pub fn is_array(&self) -> bool {
        self.submission
            .array
            .as_ref()
            .is_some_and(|indices| !indices.is_empty())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.run_command.trim().is_empty() {
            return Err(invalid_argument("run command must not be empty"));
        }
        if self.environment.trim().is_empty() {
            return Err(invalid_argument("environment name must not be empty"));
        }
        if !self.is_array() {
            return Ok(());
        }
        match self.resources.output.as_deref() {
            Some(template) if !template.contains("%a") => Err(invalid_argument(format!(
                "output template '{template}' must contain %a for array jobs"
            ))),
            _ => Ok(()),
        }
    }

    pub fn resolved_output_dir(&self) -> String {
        match self.output_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => dir.to_string(),
            _ => remote_path::join(&self.working_dir, "outputs"),
        }
    }
}

/// Task indices of an array job, kept as sorted, disjoint inclusive runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayIndices(Vec<(u32, u32)>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseArrayError {
    Empty,
    NotANumber(String),
    ReversedRange { start: u32, end: u32 },
}

impl fmt::Display for ParseArrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseArrayError::Empty => write!(f, "array specification is empty"),
            ParseArrayError::NotANumber(value) => {
                write!(f, "array index '{value}' is not a non-negative integer")
            }
            ParseArrayError::ReversedRange { start, end } => {
                write!(f, "array range {start}-{end} ends before it starts")
            }
        }
    }
}

impl std::error::Error for ParseArrayError {}

impl ArrayIndices {
    pub fn new(indices: Vec<u32>) -> Self {
        Self::from_runs(indices.into_iter().map(|index| (index, index)).collect())
    }

    /// Sorts the runs and merges the ones that overlap or touch.
    fn from_runs(mut runs: Vec<(u32, u32)>) -> Self {
        runs.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(runs.len());
        for (start, end) in runs {
            match merged.last_mut() {
                Some((_, last_end)) if touches(*last_end, start) => {
                    *last_end = (*last_end).max(end);
                }
                _ => merged.push((start, end)),
            }
        }
        Self(merged)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Slurm `--array` value with contiguous runs collapsed, e.g. `1-3,7`.
    pub fn to_slurm(&self) -> String {
        self.0
            .iter()
            .map(|&(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{start}-{end}")
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// True when a run ending at `end` can absorb one starting at `start`.
fn touches(end: u32, start: u32) -> bool {
    end.checked_add(1).is_none_or(|next| start <= next)
}

impl FromStr for ArrayIndices {
    type Err = ParseArrayError;

    /// Accepts an inclusive range `a-b` or a list `a,b,c`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseArrayError::Empty);
        }
        let parse = |value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| ParseArrayError::NotANumber(value.trim().to_string()))
        };
        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (parse(start)?, parse(end)?);
            if end < start {
                return Err(ParseArrayError::ReversedRange { start, end });
            }
            return Ok(ArrayIndices::from_runs(vec![(start, end)]));
        }
        let indices = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(parse)
            .collect::<Result<Vec<_>, _>>()?;
        if indices.is_empty() {
            return Err(ParseArrayError::Empty);
        }
        Ok(ArrayIndices::new(indices))
    }
}

/// Opaque scheduler-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    /// Array task index, or the whole-job id for non-array jobs.
    pub task_id: String,
    pub stdout_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: String,
    pub tasks: Vec<TaskOutput>,
}

/// One scheduler state keyword with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobState {
    pub keyword: String,
    running: bool,
}

impl JobState {
    pub fn new(keyword: impl Into<String>, running: bool) -> Self {
        Self {
            keyword: keyword.into(),
            running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub job_id: String,
    /// One entry per job record (array tasks report one each).
    pub states: Vec<JobState>,
    pub raw: String,
}

impl JobStatus {
    /// A job is running while any of its records is.
    pub fn is_running(&self) -> bool {
        self.states.iter().any(JobState::is_running)
    }

    /// Single keyword summarising the job, for logs and reports.
    pub fn summary(&self) -> String {
        if self.states.is_empty() {
            return "UNKNOWN".to_string();
        }
        let mut unique: Vec<&str> = Vec::new();
        for state in &self.states {
            if !unique.contains(&state.keyword.as_str()) {
                unique.push(&state.keyword);
            }
        }
        unique.join(",")
    }
}

/// How a captured remote command is judged failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Use the exit status when the transport reports one; otherwise fall
    /// back to the stderr heuristic.
    #[default]
    ExitStatus,
    /// Any output on stderr is a failure, whatever the exit status.
    #[serde(rename = "stderr")]
    StderrHeuristic,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::ExitStatus => "exit-status",
            FailurePolicy::StderrHeuristic => "stderr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    /// `None` waits for as long as the scheduler reports the job running.
    pub timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_indices_parse_range_inclusive() {
        let indices: ArrayIndices = "2-5".parse().unwrap();
        assert_eq!(indices, ArrayIndices::new(vec![5, 4, 3, 2]));
        assert_eq!(indices.to_slurm(), "2-5");
    }

    #[test]
    fn array_indices_parse_list_and_collapse_runs() {
        let indices: ArrayIndices = "7, 1,2,3".parse().unwrap();
        assert_eq!(indices, ArrayIndices::new(vec![1, 2, 3, 7]));
        assert_eq!(indices.to_slurm(), "1-3,7");
    }

    #[test]
    fn array_indices_handle_the_largest_index() {
        let last: ArrayIndices = "4294967295".parse().unwrap();
        assert_eq!(last.to_slurm(), "4294967295");

        let ends: ArrayIndices = "4294967295,0".parse().unwrap();
        assert_eq!(ends.to_slurm(), "0,4294967295");

        let tail: ArrayIndices = "4294967294,4294967295".parse().unwrap();
        assert_eq!(tail.to_slurm(), "4294967294-4294967295");
    }

    #[test]
    fn array_indices_wide_range_stays_a_single_run() {
        let wide: ArrayIndices = "0-4000000000".parse().unwrap();
        assert_eq!(wide.to_slurm(), "0-4000000000");
        assert_eq!(wide, ArrayIndices::from_runs(vec![(0, 4_000_000_000)]));
    }

    #[test]
    fn array_indices_reject_bad_input() {
        assert_eq!("".parse::<ArrayIndices>(), Err(ParseArrayError::Empty));
        assert_eq!(
            "0.5,1".parse::<ArrayIndices>(),
            Err(ParseArrayError::NotANumber("0.5".to_string()))
        );
        assert_eq!(
            "5-2".parse::<ArrayIndices>(),
            Err(ParseArrayError::ReversedRange { start: 5, end: 2 })
        );
    }

    #[test]
    fn workload_ref_derives_destination_from_origin() {
        let origin = WorkloadOrigin::parse("https://github.com/TeamGraphix/graphix.git");
        let reference = WorkloadRef::new(origin, "~/work", None, Some(String::new()));
        assert_eq!(reference.destination, "~/work/graphix");
        assert!(reference.revision.is_none());

        let origin = WorkloadOrigin::parse("./projects/simulator/");
        let reference = WorkloadRef::new(origin, ".", None, None);
        assert_eq!(reference.destination, "simulator");
    }

    #[test]
    fn workload_ref_keeps_explicit_destination() {
        let origin = WorkloadOrigin::parse("git@github.com:example/repo.git");
        let reference =
            WorkloadRef::new(origin, ".", Some("~/repo".to_string()), Some("dev".into()));
        assert_eq!(reference.destination, "~/repo");
        assert_eq!(reference.revision.as_deref(), Some("dev"));
    }

    #[test]
    fn job_status_summary_deduplicates_states() {
        let status = JobStatus {
            job_id: "1".to_string(),
            states: vec![
                JobState::new("COMPLETED", false),
                JobState::new("FAILED", false),
                JobState::new("COMPLETED", false),
            ],
            raw: String::new(),
        };
        assert_eq!(status.summary(), "COMPLETED,FAILED");
        assert!(!status.is_running());
    }

    fn job_spec() -> JobSpec {
        JobSpec {
            run_command: "python main.py".to_string(),
            working_dir: "~/work".to_string(),
            environment: "cleps-env".to_string(),
            output_dir: None,
            resources: SlurmResources::default(),
            submission: SubmitOptions::default(),
        }
    }

    #[test]
    fn job_spec_rejects_array_template_without_task_index() {
        let mut spec = job_spec();
        spec.submission.array = Some("1-4".parse().unwrap());
        spec.resources.output = Some("logs/%j.log".to_string());
        let err = spec.validate().unwrap_err();
        assert_eq!(err.code(), crate::app::errors::codes::INVALID_ARGUMENT);

        spec.resources.output = Some("logs/%A_%a.log".to_string());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn job_spec_rejects_blank_run_command() {
        let mut spec = job_spec();
        spec.run_command = "  ".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn output_dir_defaults_under_working_dir() {
        let mut spec = job_spec();
        assert_eq!(spec.resolved_output_dir(), "~/work/outputs");
        spec.output_dir = Some("/scratch/out".to_string());
        assert_eq!(spec.resolved_output_dir(), "/scratch/out");
    }
}
