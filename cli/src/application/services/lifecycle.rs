//! Instance lifecycle: create, poll until reachable, rebuild, destroy.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};

use crate::application::ports::{
    ControlPlane, InstanceSpec, ProgressReporter, RemoteSession, SessionConnector,
};
use crate::domain::instance::DESTROY_ACCEPTED_STATUS;
use crate::domain::{
    AppConfig, Instance, InstanceDescriptor, InstanceId, InstanceStatus, ProvisionError,
    RetryPolicy,
};

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// The control plane accepted the request.
    Destroyed,
    /// The control plane answered something other than its accepted code.
    Rejected { status: u16 },
}

/// Create-request parameters from the configuration.
#[must_use]
pub fn instance_spec(config: &AppConfig) -> InstanceSpec {
    InstanceSpec {
        name: config.instance.name.clone(),
        region: config.instance.region.clone(),
        size: config.instance.size.clone(),
        image: config.instance.image.clone(),
        ssh_keys: config
            .ssh_key_id
            .iter()
            .map(ToString::to_string)
            .collect(),
    }
}

/// Request a new instance. The returned instance has no address yet.
///
/// # Errors
///
/// Returns an error if the control plane rejects the request.
pub async fn create(cp: &impl ControlPlane, config: &AppConfig) -> Result<Instance> {
    let spec = instance_spec(config);
    let descriptor = cp
        .create_instance(&spec)
        .await
        .context("creating droplet")?;
    tracing::info!(id = descriptor.id, region = %spec.region, size = %spec.size, "droplet created");
    Ok(Instance::creating(descriptor.id))
}

/// Poll the control plane until the instance has an address and accepts a
/// session, then mark it active.
///
/// A connection is only attempted once the descriptor lists an address.
/// Fetch and connect failures are both treated as transient. Returns the
/// connectivity-check session and the number of retry cycles.
///
/// # Errors
///
/// Returns `ProvisionError::RetriesExhausted` once `policy` forbids another
/// attempt, or `LifecycleError` if the instance cannot become active.
pub async fn establish_connectivity<C: SessionConnector>(
    cp: &impl ControlPlane,
    connector: &C,
    instance: &mut Instance,
    policy: &RetryPolicy,
    reporter: &impl ProgressReporter,
) -> Result<(C::Session, u32)> {
    let mut attempt: u32 = 1;
    loop {
        match try_connect(cp, connector, instance).await {
            Ok(Some(session)) => {
                instance.transition(InstanceStatus::Active)?;
                tracing::info!(id = instance.id, retries = attempt - 1, "instance reachable");
                return Ok((session, attempt - 1));
            }
            Ok(None) => tracing::debug!(id = instance.id, attempt, "no address allocated yet"),
            Err(e) => {
                tracing::debug!(id = instance.id, attempt, error = %format!("{e:#}"), "connect failed");
            }
        }

        if !policy.allows(attempt + 1) {
            return Err(ProvisionError::RetriesExhausted {
                operation: "instance connectivity",
                attempts: attempt,
            }
            .into());
        }
        let delay = policy.delay_for(attempt);
        let secs = delay.as_secs();
        let unit = if secs == 1 { "second" } else { "seconds" };
        reporter.warn(&format!("failed to connect, retrying in {secs} {unit}..."));
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// One poll: re-fetch, record the address, connect if there is one.
async fn try_connect<C: SessionConnector>(
    cp: &impl ControlPlane,
    connector: &C,
    instance: &mut Instance,
) -> Result<Option<C::Session>> {
    let descriptor = cp.fetch_instance(instance.id).await?;
    instance.observe(&descriptor);
    let Some(address) = instance.address.as_deref() else {
        return Ok(None);
    };
    let session = connector.connect(address).await?;
    Ok(Some(session))
}

/// Confirm the instance exists, then rebuild it from `image`.
///
/// # Errors
///
/// Returns an error if the instance cannot be fetched or the rebuild is
/// rejected.
pub async fn rebuild(cp: &impl ControlPlane, id: InstanceId, image: &str) -> Result<Instance> {
    cp.fetch_instance(id)
        .await
        .with_context(|| format!("looking up droplet {id}"))?;
    cp.rebuild_instance(id, image)
        .await
        .with_context(|| format!("rebuilding droplet {id}"))?;
    tracing::info!(id, image, "droplet rebuild requested");
    Ok(Instance::rebuilding(id))
}

/// Request deletion. A non-accepted status is an outcome, not an error.
///
/// # Errors
///
/// Returns an error only when the request could not be sent.
pub async fn destroy(cp: &impl ControlPlane, id: InstanceId) -> Result<DestroyOutcome> {
    let status = cp
        .delete_instance(id)
        .await
        .with_context(|| format!("deleting droplet {id}"))?;
    if status == DESTROY_ACCEPTED_STATUS {
        tracing::info!(id, "droplet destroyed");
        Ok(DestroyOutcome::Destroyed)
    } else {
        tracing::warn!(id, status, "droplet delete rejected");
        Ok(DestroyOutcome::Rejected { status })
    }
}

/// Current control-plane view of an instance.
///
/// # Errors
///
/// Returns an error if the instance cannot be fetched.
pub async fn describe(cp: &impl ControlPlane, id: InstanceId) -> Result<InstanceDescriptor> {
    cp.fetch_instance(id)
        .await
        .with_context(|| format!("looking up droplet {id}"))
}

/// Close a session, logging instead of failing.
pub async fn close_quietly(session: &impl RemoteSession, what: &str) {
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "closing {what} session");
    }
}
