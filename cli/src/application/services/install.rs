//! Installation task: provision the runtime and server software.
//!
//! Runs on its own session so its command stream never interleaves with the
//! upload task's.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, RemoteSession, SessionConnector};
use crate::application::services::{executor, lifecycle};
use crate::domain::AppConfig;
use crate::domain::server::{InstallStep, StepAction, installation_plan};

/// Connect to `address`, run the installation plan, close the session.
///
/// # Errors
///
/// Returns the first failing step; the instance is left as-is (no rollback).
pub async fn run_installation<C: SessionConnector>(
    connector: Arc<C>,
    address: String,
    config: Arc<AppConfig>,
    reporter: impl ProgressReporter,
) -> Result<()> {
    reporter.step("connecting via SSH...");
    let session = connector
        .connect(&address)
        .await
        .context("installation session")?;

    let plan = installation_plan(&config.installer_url, &config.allow_list);
    let result = apply_plan(&session, &plan, &reporter).await;

    lifecycle::close_quietly(&session, "installation").await;
    result?;
    reporter.success("installation complete");
    Ok(())
}

/// Apply each step in order, stopping at the first failure.
///
/// # Errors
///
/// Returns `ProvisionError::StepFailed` for a command exiting non-zero, or the
/// transport error.
pub async fn apply_plan(
    session: &impl RemoteSession,
    plan: &[InstallStep],
    reporter: &impl ProgressReporter,
) -> Result<()> {
    for step in plan {
        reporter.step(&format!("{}...", step.label));
        match &step.action {
            StepAction::Run(command) => {
                executor::run_checked(session, step.label, command).await?;
            }
            StepAction::Write { path, contents } => {
                session
                    .write_file(path, contents.as_bytes())
                    .await
                    .with_context(|| format!("{}: writing {path}", step.label))?;
            }
        }
    }
    Ok(())
}
