// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Component, Path, PathBuf};

/// Joins a remote base and a child path without touching either side.
/// An absolute child replaces the base; the result is normalized.
pub fn join(base: &str, child: &str) -> String {
    let child_path = Path::new(child);
    let joined = if child_path.is_absolute() || child.starts_with('~') {
        child_path.to_path_buf()
    } else {
        Path::new(base).join(child_path)
    };
    let normalized = normalize_path(joined);
    if normalized.as_os_str().is_empty() {
        ".".to_string()
    } else {
        normalized.to_string_lossy().into_owned()
    }
}

/// Normalize a path syntactically
/// - remove `.`
/// - resolve .. where possible
/// - keeps an absolute root if present
pub fn normalize_path(p: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    let mut comps = p.as_ref().components().peekable();
    if let Some(Component::RootDir) = comps.peek() {
        out.push(Path::new(std::path::MAIN_SEPARATOR_STR));
        comps.next();
    }

    for comp in comps {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_parent = out
                    .components()
                    .next_back()
                    .is_some_and(|c| matches!(c, Component::ParentDir));
                if last_is_parent || !out.pop() {
                    out.push("..");
                }
            }
            Component::Normal(seg) => out.push(seg),
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    out
}

/// SFTP servers do not expand `~`; paths under the home directory are
/// made home-relative instead.
pub fn sftp_path(path: &str) -> String {
    if path == "~" {
        return ".".to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) if rest.is_empty() => ".".to_string(),
        Some(rest) => rest.to_string(),
        None => path.to_string(),
    }
}

/// Final component of a remote path, if any.
pub fn file_name(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}
