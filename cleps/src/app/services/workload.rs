// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use crate::app::services::remote_path;
use crate::app::types::WorkloadOrigin;

const REMOTE_SCHEMES: [&str; 4] = ["https://", "http://", "ssh://", "git@"];
const REMOTE_SUFFIX: &str = ".git";

/// True for origins the remote host can `git clone` directly.
pub fn is_remote_origin(raw: &str) -> bool {
    REMOTE_SCHEMES.iter().any(|scheme| raw.starts_with(scheme)) && raw.ends_with(REMOTE_SUFFIX)
}

/// `https://host/org/repo.git` and `git@host:org/repo.git` both give `repo`.
pub fn repo_name_from_url(url: &str) -> String {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(url);
    last.strip_suffix(REMOTE_SUFFIX).unwrap_or(last).to_string()
}

pub fn local_dir_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            // `.` or `..`: fall back to the canonical directory name when it resolves.
            std::fs::canonicalize(path)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "workload".to_string())
        }
    }
}

pub fn default_destination(working_dir: &str, origin: &WorkloadOrigin) -> String {
    remote_path::join(working_dir, &origin.name())
}

/// Git reports an existing clone target as
/// `fatal: destination path 'x' already exists and is not an empty directory.`
pub fn is_clone_destination_conflict(message: &str) -> bool {
    message.contains("already exists")
}

pub fn clone_command(url: &str, destination: &str) -> String {
    format!("git clone {url} {destination}")
}

pub fn checkout_command(destination: &str, revision: &str) -> String {
    format!("git -C {destination} checkout {revision}")
}

pub fn mkdir_command(path: &str) -> String {
    format!("mkdir -p {path}")
}
