// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::AppResult;
use crate::app::types::{JobHandle, JobOutcome, JobSpec, JobState, SubmitOptions};

/// Scheduler grammar: script layout, submission flags and the shape of the
/// text the scheduler prints back.
pub trait SchedulerDialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// File name the rendered script is uploaded as, under the working directory.
    fn script_file_name(&self) -> &'static str;

    /// Output template used when the job spec does not set one.
    fn default_output_template(&self, output_dir: &str, array: bool) -> String;

    fn render_script(&self, spec: &JobSpec, output_template: &str) -> String;

    fn submit_command(&self, options: &SubmitOptions, script_path: &str) -> String;

    fn parse_submission(&self, acknowledgement: &str) -> AppResult<JobHandle>;

    fn status_command(&self, handle: &JobHandle) -> String;

    fn parse_states(&self, status_text: &str) -> Vec<JobState>;

    fn parse_outputs(&self, handle: &JobHandle, status_text: &str) -> AppResult<JobOutcome>;
}
