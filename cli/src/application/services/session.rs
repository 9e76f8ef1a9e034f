//! The long-lived service session: service process control and backups.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, RemoteSession, ServiceProcess};
use crate::application::services::executor;
use crate::domain::AppConfig;
use crate::domain::server::{STOP_COMMAND, backup_command};

/// Owns the session opened after provisioning and the service running on it.
pub struct SessionController<S: RemoteSession> {
    session: S,
    process: Option<S::Process>,
    address: String,
    backed_up: bool,
}

impl<S: RemoteSession> SessionController<S> {
    /// Start `command` on `session` and take ownership of both.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    pub async fn start(session: S, address: String, command: &str) -> Result<Self> {
        let process = session
            .start_process(command)
            .await
            .context("starting server")?;
        tracing::info!(%address, %command, "server started");
        Ok(Self {
            session,
            process: Some(process),
            address,
            backed_up: false,
        })
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the service process is still attached.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.process.is_some()
    }

    /// Whether a backup has been downloaded during this session.
    #[must_use]
    pub fn backed_up(&self) -> bool {
        self.backed_up
    }

    /// Ask the server to stop and wait for it to exit.
    ///
    /// Returns `None` when no server was running.
    ///
    /// # Errors
    ///
    /// Returns an error if the stop command cannot be sent or the exit cannot
    /// be awaited.
    pub async fn stop(&mut self, reporter: &impl ProgressReporter) -> Result<Option<i32>> {
        let Some(mut process) = self.process.take() else {
            return Ok(None);
        };
        reporter.step("stopping server...");
        process
            .send_line(STOP_COMMAND)
            .await
            .context("sending stop command")?;
        let status = process.wait().await.context("waiting for server to exit")?;
        tracing::info!(status, "server exited");
        reporter.success("server stopped");
        Ok(Some(status))
    }

    /// Stop the server if needed, archive the world remotely and download it.
    ///
    /// Returns the local archive path; the archive is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if archiving or the download fails.
    pub async fn backup(
        &mut self,
        config: &AppConfig,
        reporter: &impl ProgressReporter,
    ) -> Result<PathBuf> {
        self.stop(reporter).await?;

        let remote = &config.backup.remote_archive;
        reporter.step("compressing world...");
        executor::run_checked(&self.session, "compress world", &backup_command(remote)).await?;

        let local = backup_path(&config.backup.local_directory, remote, chrono::Utc::now());
        reporter.step("downloading world...");
        let progress = reporter.transfer(remote);
        let received = self
            .session
            .download(remote, &local, progress.as_ref())
            .await;
        progress.finish();
        let bytes = received.with_context(|| format!("downloading {remote}"))?;

        tracing::info!(path = %local.display(), bytes, "backup downloaded");
        reporter.success(&format!("world saved to {}", local.display()));
        self.backed_up = true;
        Ok(local)
    }

    /// Close the session. A still-running server keeps running remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be closed cleanly.
    pub async fn close(self) -> Result<()> {
        if self.process.is_some() {
            tracing::warn!(address = %self.address, "closing session while server is running");
        }
        self.session.close().await.context("closing server session")
    }
}

/// `<dir>/<stem>-<timestamp>.tar.gz` for a remote archive name like
/// `out.tar.gz`.
#[must_use]
pub fn backup_path(dir: &Path, remote: &str, at: chrono::DateTime<chrono::Utc>) -> PathBuf {
    let name = Path::new(remote)
        .file_name()
        .map_or_else(|| remote.to_owned(), |n| n.to_string_lossy().into_owned());
    let stem = name.strip_suffix(".tar.gz").unwrap_or(&name);
    dir.join(format!("{stem}-{}.tar.gz", at.format("%Y%m%dT%H%M%SZ")))
}
