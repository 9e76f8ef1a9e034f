//! `mc-auto status <id>` — show the control plane's view of a droplet.

use anyhow::Result;

use crate::app::AppContext;
use crate::application::ports::ControlPlane;
use crate::application::services::lifecycle;
use crate::domain::{InstanceDescriptor, InstanceId};

/// Run `mc-auto status <id>`.
///
/// # Errors
///
/// Returns an error if the droplet cannot be fetched.
pub async fn run(app: &AppContext, cp: &impl ControlPlane, id: InstanceId) -> Result<()> {
    let descriptor = lifecycle::describe(cp, id).await?;
    app.output
        .table(&format!("Droplet {id}"), &status_lines(&descriptor));
    Ok(())
}

/// Key/value lines describing a droplet.
#[must_use]
pub fn status_lines(descriptor: &InstanceDescriptor) -> Vec<(&'static str, String)> {
    let mut lines = vec![("status", descriptor.status.clone())];
    match descriptor.primary_address() {
        Some(ip) => lines.push(("address", ip.to_owned())),
        None => lines.push(("address", "pending".to_owned())),
    }
    for address in descriptor.addresses.iter().filter(|a| !a.public) {
        lines.push(("private", address.ip.clone()));
    }
    lines
}
