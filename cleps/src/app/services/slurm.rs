// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use regex::Regex;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes, parse_error};
use crate::app::services::remote_path;
use crate::app::services::scheduler::SchedulerDialect;
use crate::app::types::{
    JobHandle, JobOutcome, JobSpec, JobState, SlurmResources, SubmitOptions, TaskOutput,
};

pub const SCRIPT_FILE_NAME: &str = "slurm_job.sbatch";
pub const SINGLE_OUTPUT_FILE: &str = "%j.log";
pub const ARRAY_OUTPUT_FILE: &str = "%A_%a.log";
pub const ARRAY_TASK_VAR: &str = "${SLURM_ARRAY_TASK_ID}";

const ARRAY_TASK_PATTERN: &str = r"(?s)ArrayTaskId=(\d+).*?StdOut=(\S+)";
const JOB_PATTERN: &str = r"(?s)JobId=(\d+).*?StdOut=(\S+)";
const STATE_PATTERN: &str = r"JobState=(\S+)";

pub struct Slurm {
    array_task: Regex,
    job: Regex,
    state: Regex,
}

impl Slurm {
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            array_task: compile(ARRAY_TASK_PATTERN)?,
            job: compile(JOB_PATTERN)?,
            state: compile(STATE_PATTERN)?,
        })
    }
}

fn compile(pattern: &str) -> AppResult<Regex> {
    Regex::new(pattern).map_err(|err| {
        AppError::with_message(
            AppErrorKind::Internal,
            codes::INTERNAL_ERROR,
            format!("invalid scheduler pattern {pattern}: {err}"),
        )
    })
}

/// `#SBATCH` lines in fixed order; unset or empty values are left out.
pub fn render_directives(resources: &SlurmResources, output_template: &str) -> Vec<String> {
    let numeric = |value: Option<u32>| value.map(|v| v.to_string());
    let fields: [(&str, Option<String>); 9] = [
        ("job-name", resources.job_name.clone()),
        ("time", resources.time.clone()),
        ("partition", resources.partition.clone()),
        ("nodes", numeric(resources.nodes)),
        ("ntasks-per-node", numeric(resources.ntasks_per_node)),
        ("cpus-per-task", numeric(resources.cpus_per_task)),
        ("mem", resources.memory.clone()),
        ("output", Some(output_template.to_string())),
        ("error", resources.error.clone()),
    ];
    fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .chain(resources.extra.iter().cloned())
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| format!("#SBATCH --{key}={value}"))
        .collect()
}

pub fn render_flags(options: &SubmitOptions) -> Vec<String> {
    let mut flags = Vec::new();
    if let Some(array) = options.array.as_ref().filter(|a| !a.is_empty()) {
        flags.push(format!("--array={}", array.to_slurm()));
    }
    let valued = [
        ("account", &options.account),
        ("qos", &options.qos),
        ("dependency", &options.dependency),
        ("mail-user", &options.mail_user),
        ("mail-type", &options.mail_type),
    ];
    for (key, value) in valued {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            flags.push(format!("--{key}={value}"));
        }
    }
    if options.wait {
        flags.push("--wait".to_string());
    }
    for (key, value) in &options.extra {
        flags.push(format!("--{key}={value}"));
    }
    flags
}

/// `RUNNING`, `CANCELLED+`, `CANCELLED by 42` and friends reduce to the bare keyword.
pub fn normalize_state(state: &str) -> String {
    state
        .split(['+', ':', '('])
        .next()
        .unwrap_or(state)
        .trim()
        .to_ascii_uppercase()
}

pub fn is_active_state(state: &str) -> bool {
    matches!(
        state,
        "PENDING"
            | "RUNNING"
            | "CONFIGURING"
            | "COMPLETING"
            | "SUSPENDED"
            | "RESIZING"
            | "REQUEUED"
            | "STAGE_OUT"
            | "STAGE_IN"
            | "SIGNALING"
    )
}

impl SchedulerDialect for Slurm {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn script_file_name(&self) -> &'static str {
        SCRIPT_FILE_NAME
    }

    fn default_output_template(&self, output_dir: &str, array: bool) -> String {
        let file = if array {
            ARRAY_OUTPUT_FILE
        } else {
            SINGLE_OUTPUT_FILE
        };
        remote_path::join(output_dir, file)
    }

    fn render_script(&self, spec: &JobSpec, output_template: &str) -> String {
        let directives = render_directives(&spec.resources, output_template).join("\n");
        let run_line = if spec.is_array() {
            format!("{} {ARRAY_TASK_VAR}", spec.run_command)
        } else {
            spec.run_command.clone()
        };
        format!(
            "#!/bin/bash\n\n{directives}\n\nsource ~/.bashrc\nconda activate {env}\n\n{run_line}\n",
            env = spec.environment,
        )
    }

    fn submit_command(&self, options: &SubmitOptions, script_path: &str) -> String {
        let mut parts = vec!["sbatch".to_string()];
        parts.extend(render_flags(options));
        parts.push(script_path.to_string());
        parts.join(" ")
    }

    fn parse_submission(&self, acknowledgement: &str) -> AppResult<JobHandle> {
        // "Submitted batch job 4821"
        acknowledgement
            .split_whitespace()
            .last()
            .map(JobHandle::new)
            .ok_or_else(|| parse_error("sbatch printed no job id"))
    }

    fn status_command(&self, handle: &JobHandle) -> String {
        format!("scontrol show job {handle}")
    }

    fn parse_states(&self, status_text: &str) -> Vec<JobState> {
        self.state
            .captures_iter(status_text)
            .map(|caps| {
                let keyword = normalize_state(&caps[1]);
                let running = is_active_state(&keyword);
                JobState::new(keyword, running)
            })
            .collect()
    }

    fn parse_outputs(&self, handle: &JobHandle, status_text: &str) -> AppResult<JobOutcome> {
        let collect = |pattern: &Regex| -> Vec<TaskOutput> {
            pattern
                .captures_iter(status_text)
                .map(|caps| TaskOutput {
                    task_id: caps[1].to_string(),
                    stdout_path: caps[2].to_string(),
                })
                .collect()
        };
        let mut tasks = collect(&self.array_task);
        if tasks.is_empty() {
            tasks = collect(&self.job);
        }
        if tasks.is_empty() {
            return Err(AppError::with_message(
                AppErrorKind::Resolution,
                codes::RESOLUTION_ERROR,
                format!("no output paths found for job {handle}"),
            )
            .with_context(status_text.trim().to_string()));
        }
        Ok(JobOutcome {
            job_id: handle.to_string(),
            tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::types::ArrayIndices;

    fn slurm() -> Slurm {
        Slurm::new().unwrap()
    }

    fn spec() -> JobSpec {
        JobSpec {
            run_command: "python main.py".to_string(),
            working_dir: "~/work".to_string(),
            environment: "cleps-env".to_string(),
            output_dir: None,
            resources: SlurmResources::default(),
            submission: SubmitOptions::default(),
        }
    }

    const ARRAY_STATUS: &str = "JobId=101 ArrayJobId=100 ArrayTaskId=1 JobName=sim\n   JobState=COMPLETED Reason=None\n   StdOut=/home/alice/outputs/100_1.log\n\nJobId=102 ArrayJobId=100 ArrayTaskId=2 JobName=sim\n   JobState=RUNNING Reason=None\n   StdOut=/home/alice/outputs/100_2.log\n";

    #[test]
    fn directives_skip_unset_fields_and_keep_order() {
        let resources = SlurmResources {
            job_name: Some("x".to_string()),
            time: None,
            partition: Some(String::new()),
            ..SlurmResources::default()
        };
        let lines = render_directives(&resources, "out/%j.log");
        assert_eq!(lines, vec!["#SBATCH --job-name=x", "#SBATCH --output=out/%j.log"]);
        assert!(!lines.iter().any(|line| line.contains("--time")));
    }

    #[test]
    fn directives_append_extensions_last() {
        let resources = SlurmResources {
            job_name: Some("sim".to_string()),
            cpus_per_task: Some(4),
            memory: Some("8G".to_string()),
            error: Some("err.log".to_string()),
            extra: vec![("gres".to_string(), "gpu:1".to_string())],
            ..SlurmResources::default()
        };
        let lines = render_directives(&resources, "o.log");
        assert_eq!(
            lines,
            vec![
                "#SBATCH --job-name=sim",
                "#SBATCH --cpus-per-task=4",
                "#SBATCH --mem=8G",
                "#SBATCH --output=o.log",
                "#SBATCH --error=err.log",
                "#SBATCH --gres=gpu:1",
            ]
        );
    }

    #[test]
    fn script_layout_for_single_job() {
        let mut spec = spec();
        spec.resources.job_name = Some("sim".to_string());
        let script = slurm().render_script(&spec, "~/work/outputs/%j.log");
        assert_eq!(
            script,
            "#!/bin/bash\n\n#SBATCH --job-name=sim\n#SBATCH --output=~/work/outputs/%j.log\n\nsource ~/.bashrc\nconda activate cleps-env\n\npython main.py\n"
        );
    }

    #[test]
    fn script_passes_task_id_for_array_jobs() {
        let mut spec = spec();
        spec.submission.array = Some(ArrayIndices::new(vec![1, 2]));
        let script = slurm().render_script(&spec, "o/%A_%a.log");
        assert!(script.ends_with("python main.py ${SLURM_ARRAY_TASK_ID}\n"));
    }

    #[test]
    fn default_templates_follow_job_kind() {
        let slurm = slurm();
        assert_eq!(slurm.default_output_template("~/work/outputs", false), "~/work/outputs/%j.log");
        assert_eq!(slurm.default_output_template("outputs", true), "outputs/%A_%a.log");
    }

    #[test]
    fn submit_command_orders_flags() {
        let options = SubmitOptions {
            account: Some("proj".to_string()),
            qos: Some("high".to_string()),
            mail_type: Some(String::new()),
            array: Some("1-3,7".parse().unwrap()),
            wait: true,
            extra: vec![("exclusive".to_string(), "user".to_string())],
            ..SubmitOptions::default()
        };
        assert_eq!(
            slurm().submit_command(&options, "~/work/slurm_job.sbatch"),
            "sbatch --array=1-3,7 --account=proj --qos=high --wait --exclusive=user ~/work/slurm_job.sbatch"
        );
        assert_eq!(
            slurm().submit_command(&SubmitOptions::default(), "job.sbatch"),
            "sbatch job.sbatch"
        );
    }

    #[test]
    fn submission_id_is_last_token() {
        let handle = slurm().parse_submission("Submitted batch job 4821\n").unwrap();
        assert_eq!(handle.as_str(), "4821");
        let err = slurm().parse_submission("  \n").unwrap_err();
        assert_eq!(err.code(), codes::PARSE_ERROR);
    }

    #[test]
    fn outputs_one_per_array_task() {
        let outcome = slurm()
            .parse_outputs(&JobHandle::new("100"), ARRAY_STATUS)
            .unwrap();
        assert_eq!(outcome.job_id, "100");
        assert_eq!(
            outcome.tasks,
            vec![
                TaskOutput {
                    task_id: "1".to_string(),
                    stdout_path: "/home/alice/outputs/100_1.log".to_string(),
                },
                TaskOutput {
                    task_id: "2".to_string(),
                    stdout_path: "/home/alice/outputs/100_2.log".to_string(),
                },
            ]
        );
    }

    #[test]
    fn outputs_fall_back_to_job_id() {
        let text = "JobId=4821 JobName=sim\n   JobState=COMPLETED\n   StdErr=/home/alice/err.log\n   StdOut=/home/alice/outputs/4821.log\n";
        let outcome = slurm().parse_outputs(&JobHandle::new("4821"), text).unwrap();
        assert_eq!(outcome.tasks.len(), 1);
        assert_eq!(outcome.tasks[0].task_id, "4821");
        assert_eq!(outcome.tasks[0].stdout_path, "/home/alice/outputs/4821.log");
    }

    #[test]
    fn outputs_without_paths_fail_resolution() {
        let err = slurm()
            .parse_outputs(
                &JobHandle::new("7"),
                "slurm_load_jobs error: Invalid job id specified",
            )
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Resolution);
        assert_eq!(err.code(), codes::RESOLUTION_ERROR);
    }

    #[test]
    fn states_are_classified() {
        let states = slurm().parse_states(ARRAY_STATUS);
        assert_eq!(
            states,
            vec![
                JobState::new("COMPLETED", false),
                JobState::new("RUNNING", true),
            ]
        );
        let pending = slurm().parse_states("JobState=PENDING Reason=Priority");
        assert!(pending[0].is_running());
        let cancelled = slurm().parse_states("JobState=CANCELLED+ Reason=None");
        assert_eq!(cancelled[0].keyword, "CANCELLED");
        assert!(!cancelled[0].is_running());
    }
}
