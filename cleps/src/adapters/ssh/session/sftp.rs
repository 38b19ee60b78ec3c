// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result, anyhow};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use std::path::Path;
use tokio::fs as tokiofs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::SessionManager;
use crate::adapters::ssh::upload_plan::{build_upload_plan, remote_dir_prefixes};
use crate::app::services::remote_path::sftp_path;

const UPLOAD_BLOCK_SIZE: usize = 64 * 1024;

impl SessionManager {
    async fn sftp(&self) -> Result<SftpSession> {
        let handle = self.live_handle().await?;
        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .context("starting sftp subsystem")?;
        Ok(sftp)
    }

    pub async fn push_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let sftp = self.sftp().await?;
        let remote = sftp_path(remote_path);
        if let Some(parent) = Path::new(&remote).parent() {
            ensure_remote_dir(&sftp, &parent.to_string_lossy()).await?;
        }
        upload_file(&sftp, local_path, &remote).await?;
        Ok(())
    }

    pub async fn push_bytes(&self, contents: &[u8], remote_path: &str) -> Result<()> {
        let sftp = self.sftp().await?;
        let remote = sftp_path(remote_path);
        log::debug!("writing {} bytes to {}", contents.len(), remote);
        let mut rfile = sftp
            .open_with_flags(&remote, write_flags())
            .await
            .with_context(|| format!("opening remote file {remote}"))?;
        rfile
            .write_all(contents)
            .await
            .with_context(|| format!("writing remote file {remote}"))?;
        rfile.flush().await?;
        rfile.shutdown().await?;
        Ok(())
    }

    /// Uploads the whole tree under `local_dir` into `remote_dir`; returns the file count.
    pub async fn push_dir(&self, local_dir: &Path, remote_dir: &str) -> Result<u64> {
        let plan = build_upload_plan(local_dir, &sftp_path(remote_dir))?;
        let sftp = self.sftp().await?;
        for dir in &plan.remote_dirs {
            ensure_one_dir(&sftp, dir).await?;
        }
        let mut count = 0u64;
        for item in &plan.items {
            upload_file(&sftp, &item.local_path, &item.remote_path).await?;
            count += 1;
        }
        log::info!(
            "uploaded {} files from {} to {}",
            count,
            local_dir.display(),
            plan.remote_root
        );
        Ok(count)
    }

    pub async fn pull_file(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let sftp = self.sftp().await?;
        download_file(&sftp, &sftp_path(remote_path), local_path).await?;
        Ok(())
    }

    pub async fn list_dir(&self, remote_dir: &str) -> Result<Vec<String>> {
        let sftp = self.sftp().await?;
        let remote = sftp_path(remote_dir);
        let entries = sftp
            .read_dir(&remote)
            .await
            .with_context(|| format!("listing {remote}"))?;
        let names = entries
            .map(|entry| entry.file_name())
            .filter(|name| name != "." && name != "..")
            .collect();
        Ok(names)
    }
}

fn write_flags() -> OpenFlags {
    OpenFlags::WRITE
        .union(OpenFlags::CREATE)
        .union(OpenFlags::TRUNCATE)
}

async fn ensure_remote_dir(sftp: &SftpSession, remote_dir: &str) -> Result<()> {
    for cur in remote_dir_prefixes(remote_dir) {
        ensure_one_dir(sftp, &cur).await?;
    }
    Ok(())
}

async fn ensure_one_dir(sftp: &SftpSession, dir: &str) -> Result<()> {
    match sftp.metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(anyhow!("remote path exists but is not a directory: {dir}")),
        Err(e) => {
            log::debug!("creating remote dir {dir} ({e})");
            sftp.create_dir(dir)
                .await
                .with_context(|| format!("creating path {dir}"))
        }
    }
}

async fn upload_file(sftp: &SftpSession, local_path: &Path, remote_path: &str) -> Result<()> {
    log::debug!(
        "uploading file over sftp: {} -> {}",
        local_path.display(),
        remote_path
    );
    let mut lf = tokiofs::File::open(local_path)
        .await
        .with_context(|| format!("opening local file {}", local_path.display()))?;
    let mut rfile = sftp
        .open_with_flags(remote_path, write_flags())
        .await
        .with_context(|| format!("opening remote file {remote_path}"))?;
    let mut buf = vec![0u8; UPLOAD_BLOCK_SIZE];
    loop {
        let n = lf.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        rfile.write_all(&buf[..n]).await?;
    }
    rfile.flush().await?;
    rfile.shutdown().await?;
    Ok(())
}

async fn download_file(sftp: &SftpSession, remote_path: &str, local_path: &Path) -> Result<()> {
    if let Some(parent) = local_path.parent() {
        tokiofs::create_dir_all(parent).await?;
    }
    let mut rfile = sftp
        .open(remote_path)
        .await
        .with_context(|| format!("opening remote file {remote_path}"))?;
    let mut lfile = tokiofs::File::create(local_path)
        .await
        .with_context(|| format!("creating local file {}", local_path.display()))?;
    tokio::io::copy(&mut rfile, &mut lfile).await?;
    lfile.flush().await?;
    Ok(())
}
