// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod conda;
pub mod remote_path;
pub mod scheduler;
pub mod slurm;
pub mod workload;
