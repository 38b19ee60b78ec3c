// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use adapters::cli::{Cmd, RunDefaults};
use adapters::ssh::{Credential, SshParams};
use app::errors::AppError;
use app::services::slurm::Slurm;
use app::types::{JobHandle, JobOutcome};
use app::usecases::Controller;

mod adapters;
mod app;
mod config;
mod logging;

const PASSWORD_ENV_VAR: &str = "CLEPS_PASSWORD";
const KEY_PASSPHRASE_ENV_VAR: &str = "CLEPS_KEY_PASSPHRASE";

fn report(err: AppError) -> anyhow::Error {
    anyhow::anyhow!("[{}] {err}", err.code())
}

fn credential_from_env() -> Credential {
    let read = |key: &str| std::env::var(key).ok().filter(|value| !value.is_empty());
    Credential {
        password: read(PASSWORD_ENV_VAR),
        key_passphrase: read(KEY_PASSPHRASE_ENV_VAR),
    }
}

fn print_outcome(outcome: &JobOutcome) {
    for task in &outcome.tasks {
        println!("{}\t{}", task.task_id, task.stdout_path);
    }
}

/// Flips the cancel flag on the first Ctrl-C.
fn spawn_cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn dispatch(
    controller: &Controller,
    cmd: Cmd,
    config: &config::Config,
    cancel: watch::Receiver<bool>,
) -> Result<(), AppError> {
    match cmd {
        Cmd::Run(args) => {
            let request = args.into_request(RunDefaults {
                working_dir: config.working_dir.clone(),
                env_name: config.env_name.clone(),
                wait: config.wait_options(None),
            })?;
            let run = controller.run(&request, cancel).await?;
            println!("{}", run.job);
            if let Some(status) = &run.final_status {
                tracing::info!("final state of job {}: {}", run.job, status.summary());
            }
            for path in &run.fetched {
                println!("{}", path.display());
            }
        }
        Cmd::Status(args) => {
            let status = controller.status(&JobHandle::new(args.job)).await?;
            println!("{}\t{}", status.job_id, status.summary());
        }
        Cmd::Wait(args) => {
            let handle = JobHandle::new(args.job);
            let status = controller
                .wait(&handle, config.wait_options(args.timeout), cancel)
                .await?;
            println!("{}\t{}", status.job_id, status.summary());
        }
        Cmd::Outputs(args) => {
            let outcome = controller
                .resolve_outputs(&JobHandle::new(args.job))
                .await?;
            print_outcome(&outcome);
        }
        Cmd::Fetch(args) => {
            let fetched = match args.remote_dir {
                Some(remote_dir) => {
                    controller
                        .fetch_matching(&args.job, &remote_dir, &args.dest)
                        .await?
                }
                None => {
                    let outcome = controller
                        .resolve_outputs(&JobHandle::new(args.job))
                        .await?;
                    controller.fetch(&outcome, &args.dest).await?
                }
            };
            for path in &fetched {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = adapters::cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report: config_report } = config::load_with_report(
        opts.config,
        config::Overrides {
            host: opts.host,
            port: opts.port,
            username: opts.username,
            identity_path: opts.identity,
            verbose: parsed.verbose_override,
        },
    )?;
    logging::init(config.verbose);
    config_report.log();

    let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to resolve {}:{}", config.host, config.port))?
        .next()
        .with_context(|| format!("{} did not resolve to any address", config.host))?;
    let params = SshParams {
        host: config.host.clone(),
        addr,
        username: config.username.clone(),
        identity_path: config.identity_path.clone(),
        known_hosts_path: config.known_hosts_path.clone(),
        keepalive_secs: config.keepalive_secs,
    };
    let session = Arc::new(
        adapters::ssh::connect(params, credential_from_env())
            .await
            .map_err(report)?,
    );
    let ssh = Arc::new(adapters::ssh::SshAdapter::new(session.clone()));
    let controller = Controller::new(
        ssh.clone(),
        ssh,
        Arc::new(adapters::fs::LocalFilesystem::new()),
        Arc::new(Slurm::new().map_err(report)?),
        config.failure_policy,
    );

    let result = dispatch(&controller, opts.cmd, &config, spawn_cancel_on_ctrl_c()).await;
    session.shutdown().await;
    result.map_err(report)
}
