// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
#[error("authentication_failure")]
pub struct AuthenticationFailure;

/// The transport went away; the session never reconnects on its own.
#[derive(Debug, ThisError)]
#[error("ssh session is closed")]
pub struct SessionClosed;
