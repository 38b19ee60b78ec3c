// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use russh::ChannelMsg;

use super::SessionManager;
use crate::app::ports::ExecCapture;

/// SSH extended-data stream number for stderr.
const STDERR_STREAM: u32 = 1;

/// Accumulates channel traffic until the server closes the channel.
#[derive(Debug, Default)]
struct Collector {
    capture: ExecCapture,
    closed: bool,
}

impl Collector {
    fn absorb(&mut self, msg: ChannelMsg) {
        match msg {
            ChannelMsg::Data { data } => self.capture.stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext } if ext == STDERR_STREAM => {
                self.capture.stderr.extend_from_slice(&data)
            }
            ChannelMsg::ExitStatus { exit_status } => {
                self.capture.exit_code = i32::try_from(exit_status).ok()
            }
            ChannelMsg::Close => self.closed = true,
            _ => {}
        }
    }
}

impl SessionManager {
    /// Runs `cmd` on its own channel; stdout and stderr are read to the end.
    pub async fn exec_capture(&self, cmd: &str) -> Result<ExecCapture> {
        let handle = self.live_handle().await?;
        let mut channel = handle
            .channel_open_session()
            .await
            .context("opening exec channel")?;
        log::debug!("remote command: {cmd}");
        channel
            .exec(true, cmd)
            .await
            .with_context(|| format!("requesting exec of `{cmd}`"))?;

        let mut collector = Collector::default();
        while !collector.closed {
            let Some(msg) = channel.wait().await else {
                break;
            };
            collector.absorb(msg);
        }
        let _ = channel.close().await;

        let capture = collector.capture;
        log::debug!(
            "remote command done: exit={:?}, {} bytes out, {} bytes err",
            capture.exit_code,
            capture.stdout.len(),
            capture.stderr.len()
        );
        Ok(capture)
    }
}
