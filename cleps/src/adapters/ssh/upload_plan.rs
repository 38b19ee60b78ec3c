// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Recursive upload planning.
//!
//! Enumerates a local tree and maps every file and directory onto a remote
//! root. No network access happens here.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use walkdir::WalkDir;

/// One local file and where it lands remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub local_path: PathBuf,
    pub remote_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub remote_root: String,
    /// Remote directories to create, parents before children.
    pub remote_dirs: Vec<String>,
    pub items: Vec<UploadItem>,
}

pub fn build_upload_plan(local_dir: &Path, remote_dir: &str) -> Result<UploadPlan> {
    if !local_dir.is_dir() {
        bail!("{} is not a directory", local_dir.display());
    }
    let remote_root = remote_dir.trim_end_matches('/').to_string();
    let mut remote_dirs = BTreeSet::new();
    remote_dirs.extend(remote_dir_prefixes(&remote_root));
    let mut items = Vec::new();

    for entry in WalkDir::new(local_dir).follow_links(false).sort_by_file_name() {
        let direntry = match entry {
            Ok(v) => v,
            Err(e) => {
                log::warn!("encountered error when enumerating local files: {:?}", e);
                continue;
            }
        };
        let Ok(rel_path) = direntry.path().strip_prefix(local_dir) else {
            log::warn!(
                "failed computing relative path for {:?} from {:?}",
                direntry.path(),
                local_dir
            );
            continue;
        };
        if rel_path.as_os_str().is_empty() {
            continue;
        }
        let remote_path = join_remote(&remote_root, rel_path);
        if direntry.file_type().is_dir() {
            remote_dirs.insert(remote_path);
        } else if direntry.file_type().is_file() {
            items.push(UploadItem {
                local_path: direntry.path().to_path_buf(),
                remote_path,
            });
        }
    }

    // BTreeSet order puts every parent before its children.
    Ok(UploadPlan {
        remote_root,
        remote_dirs: remote_dirs.into_iter().collect(),
        items,
    })
}

fn join_remote(remote_root: &str, rel_path: &Path) -> String {
    let rel = rel_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    if remote_root.is_empty() || remote_root == "." {
        rel
    } else {
        format!("{remote_root}/{rel}")
    }
}

/// `a/b/c` gives `a`, `a/b`, `a/b/c`; absolute paths keep their root and
/// never include `/` itself.
pub fn remote_dir_prefixes(remote_dir: &str) -> Vec<String> {
    let absolute = remote_dir.starts_with('/');
    let mut cur = String::new();
    let mut out = Vec::new();
    for seg in remote_dir.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if cur.is_empty() {
            cur = if absolute {
                format!("/{seg}")
            } else {
                seg.to_string()
            };
        } else {
            cur = format!("{cur}/{seg}");
        }
        out.push(cur.clone());
    }
    out
}
