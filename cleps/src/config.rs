// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::app::types::{FailurePolicy, WaitOptions};

const APP_DIR_NAME: &str = "cleps";
const CONFIG_FILE_NAME: &str = "cleps.toml";
const CONFIG_ENV_VAR: &str = "CLEPS_CONFIG_PATH";
const USER_ENV_VAR: &str = "USER";
const DEFAULT_HOST: &str = "cleps.inria.fr";
const DEFAULT_PORT: u16 = 22;
const DEFAULT_WORKING_DIR: &str = ".";
const DEFAULT_ENV_NAME: &str = "cleps-env";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_KEEPALIVE_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    identity_path: Option<String>,
    known_hosts_path: Option<String>,
    working_dir: Option<String>,
    env_name: Option<String>,
    poll_interval_secs: Option<u64>,
    wait_timeout_secs: Option<u64>,
    keepalive_secs: Option<u64>,
    failure_policy: Option<FailurePolicy>,
    verbose: Option<bool>,
}

#[derive(Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub identity_path: Option<PathBuf>,
    pub known_hosts_path: Option<PathBuf>,
    /// Remote working directory; never expanded locally.
    pub working_dir: String,
    pub env_name: String,
    pub poll_interval_secs: u64,
    pub wait_timeout_secs: Option<u64>,
    pub keepalive_secs: u64,
    pub failure_policy: FailurePolicy,
    pub verbose: bool,
}

impl Config {
    pub fn wait_options(&self, timeout_override: Option<u64>) -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: timeout_override
                .or(self.wait_timeout_secs)
                .map(Duration::from_secs),
        }
    }
}

/// Where a setting came from; reported at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Flag,
    Env,
    File,
    Default,
}

impl ConfigSource {
    pub fn label(self) -> &'static str {
        match self {
            ConfigSource::Flag => "flag",
            ConfigSource::Env => "env",
            ConfigSource::File => "file",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> Sourced<T> {
    fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Resolution trail for the settings that matter when a connection or a
/// submission behaves unexpectedly.
#[derive(Debug)]
pub struct ConfigReport {
    pub file: Option<ConfigLocation>,
    pub file_found: bool,
    pub host: Sourced<String>,
    pub port: Sourced<u16>,
    pub username: Sourced<String>,
    pub working_dir: Sourced<String>,
    pub poll_interval_secs: Sourced<u64>,
    pub failure_policy: Sourced<FailurePolicy>,
    pub verbose: Sourced<bool>,
}

impl ConfigReport {
    pub fn log(&self) {
        match &self.file {
            Some(location) => tracing::info!(
                path = %location.path.display(),
                source = location.source.label(),
                found = self.file_found,
                "config file"
            ),
            None => tracing::info!("no config file location"),
        }
        let setting = |key: &str, value: &dyn std::fmt::Display, source: ConfigSource| {
            tracing::info!("setting {key} = {value} ({})", source.label());
        };
        setting("host", &self.host.value, self.host.source);
        setting("port", &self.port.value, self.port.source);
        setting("username", &self.username.value, self.username.source);
        setting("working_dir", &self.working_dir.value, self.working_dir.source);
        setting(
            "poll_interval_secs",
            &self.poll_interval_secs.value,
            self.poll_interval_secs.source,
        );
        setting(
            "failure_policy",
            &self.failure_policy.value.as_str(),
            self.failure_policy.source,
        );
        setting("verbose", &self.verbose.value, self.verbose.source);
    }
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

/// Command-line values; `None` leaves the file or default in charge.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub identity_path: Option<PathBuf>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub source: ConfigSource,
}

impl ConfigLocation {
    /// An explicitly named file has to exist; the default location may not.
    fn required(&self) -> bool {
        self.source != ConfigSource::Default
    }
}

fn layered<T>(flag: Option<T>, file: Option<T>, default: impl FnOnce() -> T) -> Sourced<T> {
    if let Some(value) = flag {
        return Sourced::new(value, ConfigSource::Flag);
    }
    match file {
        Some(value) => Sourced::new(value, ConfigSource::File),
        None => Sourced::new(default(), ConfigSource::Default),
    }
}

#[cfg(test)]
pub fn load(config_path: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    load_with_report(config_path, overrides).map(|loaded| loaded.config)
}

pub fn load_with_report(config_path: Option<PathBuf>, overrides: Overrides) -> Result<LoadResult> {
    let location = locate_config(config_path)?;
    let (file, file_found) = match &location {
        Some(location) => read_file_config(location)?,
        None => (FileConfig::default(), false),
    };
    let base_dir = location
        .as_ref()
        .and_then(|location| location.path.parent())
        .map(Path::to_path_buf);

    let host = layered(overrides.host, file.host, || DEFAULT_HOST.to_string());
    if host.value.trim().is_empty() {
        anyhow::bail!("host must not be empty");
    }
    let port = layered(overrides.port, file.port, || DEFAULT_PORT);
    if port.value == 0 {
        anyhow::bail!("port 0 is not a valid ssh port");
    }
    let username = match (overrides.username, file.username) {
        (None, None) => Sourced::new(
            username_from_env().context(
                "no username configured; pass --username or set `username` in the config file",
            )?,
            ConfigSource::Env,
        ),
        (flag, from_file) => layered(flag, from_file, String::new),
    };
    let working_dir = layered(None, file.working_dir, || DEFAULT_WORKING_DIR.to_string());
    let poll_interval_secs = layered(None, file.poll_interval_secs, || {
        DEFAULT_POLL_INTERVAL_SECS
    });
    if poll_interval_secs.value == 0 {
        anyhow::bail!("poll_interval_secs must be at least 1");
    }
    let failure_policy = layered(None, file.failure_policy, FailurePolicy::default);
    let verbose = layered(overrides.verbose, file.verbose, || false);

    let identity_path = overrides
        .identity_path
        .map(|path| expand(&path.to_string_lossy(), None))
        .or_else(|| {
            file.identity_path
                .as_deref()
                .map(|raw| expand(raw, base_dir.as_deref()))
        });
    let known_hosts_path = file
        .known_hosts_path
        .as_deref()
        .map(|raw| expand(raw, base_dir.as_deref()));

    let config = Config {
        host: host.value.clone(),
        port: port.value,
        username: username.value.clone(),
        identity_path,
        known_hosts_path,
        working_dir: working_dir.value.clone(),
        env_name: file
            .env_name
            .unwrap_or_else(|| DEFAULT_ENV_NAME.to_string()),
        poll_interval_secs: poll_interval_secs.value,
        wait_timeout_secs: file.wait_timeout_secs,
        keepalive_secs: file.keepalive_secs.unwrap_or(DEFAULT_KEEPALIVE_SECS),
        failure_policy: failure_policy.value,
        verbose: verbose.value,
    };
    let report = ConfigReport {
        file: location,
        file_found,
        host,
        port,
        username,
        working_dir,
        poll_interval_secs,
        failure_policy,
        verbose,
    };
    Ok(LoadResult { config, report })
}

/// `--config` beats `CLEPS_CONFIG_PATH`, which beats the per-user default.
fn locate_config(flag: Option<PathBuf>) -> Result<Option<ConfigLocation>> {
    if let Some(path) = flag {
        return Ok(Some(ConfigLocation {
            path: expand(&path.to_string_lossy(), None),
            source: ConfigSource::Flag,
        }));
    }
    if let Some(raw) = std::env::var_os(CONFIG_ENV_VAR) {
        if raw.is_empty() {
            anyhow::bail!("{CONFIG_ENV_VAR} is set to an empty value");
        }
        return Ok(Some(ConfigLocation {
            path: expand(&raw.to_string_lossy(), None),
            source: ConfigSource::Env,
        }));
    }
    Ok(dirs::config_dir().map(|base| ConfigLocation {
        path: base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME),
        source: ConfigSource::Default,
    }))
}

fn read_file_config(location: &ConfigLocation) -> Result<(FileConfig, bool)> {
    let path = &location.path;
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !location.required() => {
            return Ok((FileConfig::default(), false));
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("cannot read config file {}", path.display()));
        }
    };
    let parsed = toml::from_str(&text)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    Ok((parsed, true))
}

/// Expands `~`; a relative result is anchored at `base` when one is given.
fn expand(raw: &str, base: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(shellexpand::tilde(raw).as_ref());
    match base {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

fn username_from_env() -> Result<String> {
    std::env::var(USER_ENV_VAR)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .with_context(|| format!("{USER_ENV_VAR} is unset or empty"))
}
