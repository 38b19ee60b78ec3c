// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};

use crate::app::errors::{AppResult, invalid_argument};
use crate::app::types::{
    ArrayIndices, EnvironmentSpec, JobSpec, SlurmResources, SubmitOptions, WaitOptions,
    WorkloadOrigin, WorkloadRef,
};
use crate::app::usecases::RunRequest;

#[derive(Parser, Debug)]
#[command(
    name = "cleps",
    version,
    about,
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < CLEPS_CONFIG_PATH < --config.\n\
The SSH password, when needed, is read from CLEPS_PASSWORD."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, cleps uses CLEPS_CONFIG_PATH if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging and include logs from dependencies. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
    #[arg(long, global = true, help = "Cluster login host. Overrides `host` from the config file.")]
    pub host: Option<String>,
    #[arg(long, global = true, help = "SSH port. Overrides `port` from the config file.")]
    pub port: Option<u16>,
    #[arg(long, global = true, help = "Your cluster username. Overrides `username` from the config file.")]
    pub username: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Private key used to authenticate. Overrides `identity_path` from the config file."
    )]
    pub identity: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Stage a workload, provision its environment and submit it.
    Run(RunArgs),
    /// Print the scheduler state of a job.
    Status(JobArgs),
    /// Poll a job until it leaves the running states.
    Wait(WaitArgs),
    /// Print the output file of every task of a job.
    Outputs(JobArgs),
    /// Download the output files of a job.
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long, help = "Repository address (e.g. git@github.com:user/repo.git) or a local directory")]
    pub repo: String,
    #[arg(long, help = "Branch, tag or commit to check out after staging")]
    pub branch: Option<String>,
    #[arg(long, help = "Remote working directory the workload is staged under. Overrides `working_dir` from the config file.")]
    pub wd: Option<String>,
    #[arg(long, help = "Remote destination of the workload (default: <wd>/<repo name>)")]
    pub dest: Option<String>,
    #[arg(long, help = "Command that runs your script inside the environment")]
    pub script: String,
    #[arg(long, value_name = "PATH", help = "Conda environment file (.yml) used to create the environment")]
    pub env: Option<PathBuf>,
    #[arg(long, help = "Name of the conda environment on the cluster. Overrides `env_name` from the config file.")]
    pub name: Option<String>,
    #[arg(long, help = "Command run inside a freshly created environment to install packages")]
    pub setup: Option<String>,
    #[arg(long, value_name = "N", help = "CPUs per task")]
    pub cpt: Option<u32>,
    #[arg(long, help = "Wait for the job to finish, then fetch its outputs")]
    pub wait: bool,
    #[arg(long, value_name = "SECS", requires = "wait", help = "Give up waiting after this many seconds")]
    pub timeout: Option<u64>,
    #[arg(long, help = "Array task indices, either a range a-b or a list a,b,c")]
    pub array: Option<ArrayIndices>,
    #[arg(long, help = "Remote directory receiving job logs (default: <dest>/outputs)")]
    pub output_dir: Option<String>,
    #[arg(long)]
    pub partition: Option<String>,
    #[arg(long, help = "Time limit, e.g. 01:00:00")]
    pub time: Option<String>,
    #[arg(long, help = "Memory per node, e.g. 8G")]
    pub mem: Option<String>,
    #[arg(long)]
    pub account: Option<String>,
    #[arg(long)]
    pub qos: Option<String>,
    #[arg(long, value_name = "PATH", help = "Local directory for fetched outputs (default: <repo name>/outputs for a git origin, the workload directory itself for a local one)")]
    pub fetch_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    /// Scheduler job id.
    pub job: String,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Scheduler job id.
    pub job: String,
    #[arg(long, value_name = "SECS", help = "Give up waiting after this many seconds")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Scheduler job id.
    pub job: String,
    #[arg(long, value_name = "PATH", default_value = "outputs", help = "Local destination directory")]
    pub dest: PathBuf,
    #[arg(
        long,
        help = "Download every file of this remote directory whose name contains the job id, instead of asking the scheduler"
    )]
    pub remote_dir: Option<String>,
}

/// Values from the loaded configuration that `run` falls back to.
#[derive(Debug, Clone)]
pub struct RunDefaults {
    pub working_dir: String,
    pub env_name: String,
    pub wait: WaitOptions,
}

impl RunArgs {
    pub fn into_request(self, defaults: RunDefaults) -> AppResult<RunRequest> {
        if self.repo.trim().is_empty() {
            return Err(invalid_argument("--repo must not be empty"));
        }
        let origin = WorkloadOrigin::parse(&self.repo);
        let name = origin.name();
        let fetch_dir = self.fetch_dir.unwrap_or_else(|| match &origin {
            WorkloadOrigin::Remote { .. } => PathBuf::from(&name).join("outputs"),
            WorkloadOrigin::Local { path } => path.clone(),
        });
        let working_dir = self.wd.unwrap_or(defaults.working_dir);
        let workload = WorkloadRef::new(origin, working_dir, self.dest, self.branch);
        let env_name = self.name.unwrap_or(defaults.env_name);

        let job = JobSpec {
            run_command: self.script,
            working_dir: workload.destination.clone(),
            environment: env_name.clone(),
            output_dir: self.output_dir,
            resources: SlurmResources {
                job_name: Some(name),
                time: self.time,
                partition: self.partition,
                cpus_per_task: self.cpt,
                memory: self.mem,
                ..SlurmResources::default()
            },
            submission: SubmitOptions {
                account: self.account,
                qos: self.qos,
                array: self.array,
                ..SubmitOptions::default()
            },
        };
        job.validate()?;

        let wait = self.wait.then(|| WaitOptions {
            timeout: self
                .timeout
                .map(std::time::Duration::from_secs)
                .or(defaults.wait.timeout),
            ..defaults.wait
        });

        Ok(RunRequest {
            workload,
            environment: EnvironmentSpec {
                name: env_name,
                spec_file: self.env,
                install_command: self.setup,
            },
            job,
            wait,
            fetch_dir,
        })
    }
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

pub fn cli_command() -> clap::Command {
    Opts::command()
}

pub fn parse_opts() -> ParsedOpts {
    let matches = cli_command().get_matches();
    let verbose_override = matches.get_flag("verbose").then_some(true);
    let opts = Opts::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    ParsedOpts {
        opts,
        verbose_override,
    }
}
