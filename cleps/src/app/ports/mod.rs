// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod file_transfer;
pub mod local_fs;
pub mod remote_exec;

pub use file_transfer::FileTransferPort;
pub use local_fs::LocalFilesystemPort;
pub use remote_exec::{ExecCapture, RemoteExecPort};
