// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::ports::{ExecCapture, FileTransferPort, LocalFilesystemPort, RemoteExecPort};

pub fn capture(exit_code: Option<i32>, stdout: &str, stderr: &str) -> ExecCapture {
    ExecCapture {
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
        exit_code,
    }
}

pub fn ok(stdout: &str) -> AppResult<ExecCapture> {
    Ok(capture(Some(0), stdout, ""))
}

/// Replays scripted captures and asserts the exact command sequence.
pub struct SequencedRemoteExec {
    captures: Mutex<VecDeque<(String, AppResult<ExecCapture>)>>,
}

impl SequencedRemoteExec {
    pub fn new(captures: Vec<(String, AppResult<ExecCapture>)>) -> Self {
        Self {
            captures: Mutex::new(VecDeque::from(captures)),
        }
    }

    pub fn assert_drained(&self) {
        let captures = self.captures.lock().expect("captures lock");
        let left: Vec<&str> = captures.iter().map(|(cmd, _)| cmd.as_str()).collect();
        assert!(left.is_empty(), "commands never issued: {left:?}");
    }
}

#[async_trait]
impl RemoteExecPort for SequencedRemoteExec {
    async fn exec_capture(&self, command: &str) -> AppResult<ExecCapture> {
        let mut captures = self.captures.lock().expect("captures lock");
        let Some((expected, result)) = captures.pop_front() else {
            panic!("unexpected command: {command}");
        };
        assert_eq!(command, expected);
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    PushFile { local: PathBuf, remote: String },
    PushBytes { contents: String, remote: String },
    PushDir { local: PathBuf, remote: String },
    PullFile { remote: String, local: PathBuf },
}

/// Records transfers; `list_dir` answers from a fixed listing.
#[derive(Default)]
pub struct RecordingTransfer {
    pub transfers: Mutex<Vec<Transfer>>,
    listing: Vec<String>,
}

impl RecordingTransfer {
    pub fn with_listing(listing: &[&str]) -> Self {
        Self {
            transfers: Mutex::new(Vec::new()),
            listing: listing.iter().map(|name| name.to_string()).collect(),
        }
    }

    pub fn recorded(&self) -> Vec<Transfer> {
        self.transfers.lock().expect("transfers lock").clone()
    }

    fn record(&self, transfer: Transfer) {
        self.transfers.lock().expect("transfers lock").push(transfer);
    }
}

#[async_trait]
impl FileTransferPort for RecordingTransfer {
    async fn push_file(&self, local_path: &Path, remote_path: &str) -> AppResult<()> {
        self.record(Transfer::PushFile {
            local: local_path.to_path_buf(),
            remote: remote_path.to_string(),
        });
        Ok(())
    }

    async fn push_bytes(&self, contents: &[u8], remote_path: &str) -> AppResult<()> {
        self.record(Transfer::PushBytes {
            contents: String::from_utf8_lossy(contents).into_owned(),
            remote: remote_path.to_string(),
        });
        Ok(())
    }

    async fn push_dir(&self, local_dir: &Path, remote_dir: &str) -> AppResult<u64> {
        self.record(Transfer::PushDir {
            local: local_dir.to_path_buf(),
            remote: remote_dir.to_string(),
        });
        Ok(1)
    }

    async fn pull_file(&self, remote_path: &str, local_path: &Path) -> AppResult<()> {
        self.record(Transfer::PullFile {
            remote: remote_path.to_string(),
            local: local_path.to_path_buf(),
        });
        Ok(())
    }

    async fn list_dir(&self, _remote_dir: &str) -> AppResult<Vec<String>> {
        Ok(self.listing.clone())
    }
}

/// Local filesystem with a fixed set of existing paths.
#[derive(Default)]
pub struct FakeLocalFs {
    dirs: HashSet<PathBuf>,
    files: HashSet<PathBuf>,
    pub created: Mutex<Vec<PathBuf>>,
}

impl FakeLocalFs {
    pub fn with_dirs(dirs: &[&str]) -> Self {
        Self {
            dirs: dirs.iter().map(PathBuf::from).collect(),
            ..Self::default()
        }
    }

    pub fn with_files(files: &[&str]) -> Self {
        Self {
            files: files.iter().map(PathBuf::from).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl LocalFilesystemPort for FakeLocalFs {
    async fn is_dir(&self, path: &Path) -> AppResult<bool> {
        Ok(self.dirs.contains(path))
    }

    async fn is_file(&self, path: &Path) -> AppResult<bool> {
        Ok(self.files.contains(path))
    }

    async fn create_dir_all(&self, path: &Path) -> AppResult<()> {
        self.created
            .lock()
            .expect("created lock")
            .push(path.to_path_buf());
        Ok(())
    }
}
