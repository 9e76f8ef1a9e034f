//! Upload task: pack the world and add-ons, deliver them verified, unpack
//! them remotely and write the service configuration.
//!
//! Runs on its own session, concurrently with the installation task.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::ports::{LocalPayload, ProgressReporter, RemoteSession, SessionConnector};
use crate::application::services::{executor, lifecycle};
use crate::application::services::transfer::{self, TransferJob};
use crate::domain::server::{
    PROPERTIES_FILE, WORLD_DIR, extract_command, remove_command, rename_command,
    render_properties,
};
use crate::domain::{AppConfig, ProvisionError};

/// What the upload task did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Full uploads needed until the checksums agreed.
    pub transfer_attempts: u32,
    /// Extraction re-runs while waiting for the archive tool.
    pub extract_retries: u32,
}

/// Connect to `address` and run the whole upload sequence.
///
/// # Errors
///
/// Returns the first failure; the instance is left as-is.
pub async fn run_upload<C: SessionConnector, L: LocalPayload>(
    connector: Arc<C>,
    local: Arc<L>,
    address: String,
    config: Arc<AppConfig>,
    reporter: impl ProgressReporter,
) -> Result<UploadReport> {
    reporter.step("connecting via SSH...");
    let session = connector
        .connect(&address)
        .await
        .context("upload session")?;

    let result = upload_payload(&session, local.as_ref(), &config, &reporter).await;

    lifecycle::close_quietly(&session, "upload").await;
    let report = result?;
    reporter.success("upload complete");
    Ok(report)
}

/// Upload sequence on an established session.
///
/// # Errors
///
/// Returns the first failing step.
pub async fn upload_payload(
    session: &impl RemoteSession,
    local: &impl LocalPayload,
    config: &AppConfig,
    reporter: &impl ProgressReporter,
) -> Result<UploadReport> {
    let world = &config.world_directory;
    let world_name = world
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ProvisionError::MissingPayload(world.display().to_string()))?;

    reporter.step("compressing world and mods...");
    let sources = payload_sources(local, config)?;
    let archive = &config.transfer.local_archive;
    let size = local
        .pack(&sources, archive)
        .await
        .context("compressing payload")?;
    tracing::info!(archive = %archive.display(), size, "payload packed");

    let job = TransferJob {
        local: archive.clone(),
        remote: config.transfer.remote_archive.clone(),
        algorithm: config.transfer.checksum,
    };
    let delivered =
        transfer::deliver(session, local, reporter, &job, &config.retry.transfer).await?;

    // The archive tool is installed by the concurrent installation task;
    // extraction fails until it is there.
    reporter.step("extracting archive...");
    let extract_retries = executor::run_until_success(
        session,
        &extract_command(&job.remote),
        &config.retry.extract,
        "archive extraction",
    )
    .await?;

    if world_name != WORLD_DIR {
        reporter.step("renaming world folder...");
        executor::run_checked(session, "rename world folder", &rename_command(&world_name))
            .await?;
    }

    reporter.step("removing archives...");
    executor::run_checked(session, "remove remote archive", &remove_command(&job.remote)).await?;
    local
        .remove(archive)
        .await
        .with_context(|| format!("removing {}", archive.display()))?;

    reporter.step("setting server properties...");
    let properties = render_properties(&config.server.properties);
    session
        .write_file(PROPERTIES_FILE, properties.as_bytes())
        .await
        .context("writing server properties")?;

    Ok(UploadReport {
        transfer_attempts: delivered.attempts,
        extract_retries,
    })
}

/// The world directory (required) and the add-ons directory (when present).
fn payload_sources(local: &impl LocalPayload, config: &AppConfig) -> Result<Vec<PathBuf>> {
    let world = &config.world_directory;
    if !local.is_dir(world) {
        return Err(ProvisionError::MissingPayload(world.display().to_string()).into());
    }
    let mut sources = vec![world.clone()];
    let addons = &config.addons_directory.0;
    if local.is_dir(addons) {
        sources.push(addons.clone());
    } else {
        tracing::warn!(dir = %addons.display(), "add-ons directory not found, skipping");
    }
    Ok(sources)
}
