//! Provisioning orchestration: acquire an instance, bring it to a reachable
//! state, run installation and upload in parallel, then start the server.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinError;

use crate::application::ports::{ControlPlane, LocalPayload, ProgressReporter, SessionConnector};
use crate::application::services::lifecycle::{self, DestroyOutcome};
use crate::application::services::session::SessionController;
use crate::application::services::upload::{self, UploadReport};
use crate::application::services::{TaggedReporter, install};
use crate::domain::server::launch_command;
use crate::domain::{AppConfig, Instance, InstanceId, ProvisionError};

/// Everything a provisioning run needs, shared with the worker tasks.
pub struct Provisioner<CP, SC, LP, R> {
    control_plane: Arc<CP>,
    connector: Arc<SC>,
    local: Arc<LP>,
    reporter: Arc<R>,
    config: Arc<AppConfig>,
}

impl<CP, SC, LP, R> Provisioner<CP, SC, LP, R>
where
    CP: ControlPlane,
    SC: SessionConnector,
    LP: LocalPayload,
    R: ProgressReporter,
{
    #[must_use]
    pub fn new(
        control_plane: Arc<CP>,
        connector: Arc<SC>,
        local: Arc<LP>,
        reporter: Arc<R>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            control_plane,
            connector,
            local,
            reporter,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Create a fresh instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the control plane rejects the request.
    pub async fn acquire(&self) -> Result<Instance> {
        self.reporter.step("creating droplet...");
        let instance = lifecycle::create(self.control_plane.as_ref(), &self.config).await?;
        self.reporter
            .success(&format!("created droplet with ID {}", instance.id));
        Ok(instance)
    }

    /// Rebuild an existing instance from the base image and wait for the
    /// rebuild to settle.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance does not exist or the rebuild is
    /// rejected.
    pub async fn acquire_rebuilt(&self, id: InstanceId) -> Result<Instance> {
        self.reporter.step(&format!("rebuilding droplet {id}..."));
        let instance =
            lifecycle::rebuild(self.control_plane.as_ref(), id, &self.config.instance.image)
                .await?;
        let settle = Duration::from_secs(self.config.instance.rebuild_settle_secs);
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(instance)
    }

    /// Bring `instance` from address-pending to a running server.
    ///
    /// Installation and upload each run on their own worker task and
    /// session; the server is started only after both have finished. On
    /// failure the instance is left as it is.
    ///
    /// # Errors
    ///
    /// Returns the connectivity failure, the first task failure (with a
    /// `recover` hint), or the server start failure.
    pub async fn bring_up(
        &self,
        instance: &mut Instance,
    ) -> Result<SessionController<SC::Session>> {
        self.reporter.step("connecting via SSH...");
        let (first_contact, _) = lifecycle::establish_connectivity(
            self.control_plane.as_ref(),
            self.connector.as_ref(),
            instance,
            &self.config.retry.connect,
            self.reporter.as_ref(),
        )
        .await?;
        lifecycle::close_quietly(&first_contact, "connectivity check").await;
        self.reporter.success("connected!");

        let id = instance.id;
        let address = instance.require_address()?.to_owned();

        let install = tokio::spawn(install::run_installation(
            Arc::clone(&self.connector),
            address.clone(),
            Arc::clone(&self.config),
            TaggedReporter::new("install", Arc::clone(&self.reporter)),
        ));
        let upload = tokio::spawn(upload::run_upload(
            Arc::clone(&self.connector),
            Arc::clone(&self.local),
            address.clone(),
            Arc::clone(&self.config),
            TaggedReporter::new("upload", Arc::clone(&self.reporter)),
        ));

        // Barrier: both tasks are awaited even when one of them fails.
        let (installed, uploaded) = tokio::join!(install, upload);
        let installed = joined(installed, "installation");
        let uploaded = joined(uploaded, "upload");
        let report = settle_tasks(installed, uploaded)
            .with_context(|| format!("provisioning droplet {id} failed; run `recover {id}`"))?;
        tracing::info!(
            id,
            transfer_attempts = report.transfer_attempts,
            extract_retries = report.extract_retries,
            "provisioning complete"
        );

        self.reporter.step("starting server...");
        let session = self
            .connector
            .connect(&address)
            .await
            .context("opening server session")?;
        let command = launch_command(&self.config.server.memory, &self.config.server.launch_jar);
        let controller = SessionController::start(session, address.clone(), &command).await?;
        self.reporter.success(&format!(
            "The server IP is {address}. Please wait for it to start."
        ));
        Ok(controller)
    }

    /// Request deletion of `id`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the request could not be sent.
    pub async fn destroy(&self, id: InstanceId) -> Result<DestroyOutcome> {
        self.reporter.step("destroying droplet...");
        lifecycle::destroy(self.control_plane.as_ref(), id).await
    }
}

/// Flatten a worker's join result.
fn joined<T>(result: Result<Result<T>, JoinError>, task: &'static str) -> Result<T> {
    result.map_err(|e| {
        anyhow::Error::from(ProvisionError::TaskAborted {
            task,
            reason: e.to_string(),
        })
    })?
}

/// Combine both task results, returning the installation failure first.
fn settle_tasks(installed: Result<()>, uploaded: Result<UploadReport>) -> Result<UploadReport> {
    match (installed, uploaded) {
        (Ok(()), Ok(report)) => Ok(report),
        (Err(e), Ok(_)) | (Ok(()), Err(e)) => Err(e),
        (Err(install), Err(upload)) => {
            tracing::error!(error = %format!("{upload:#}"), "upload task failed as well");
            Err(install)
        }
    }
}
