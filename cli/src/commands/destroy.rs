//! `mc-auto destroy <id>` — delete a droplet outside the interactive loop.

use anyhow::Result;

use crate::app::AppContext;
use crate::application::ports::ControlPlane;
use crate::application::services::lifecycle::{self, DestroyOutcome};
use crate::domain::InstanceId;

/// Run `mc-auto destroy <id>`.
///
/// # Errors
///
/// Returns an error if the request fails or the control plane rejects it.
pub async fn run(app: &AppContext, cp: &impl ControlPlane, id: InstanceId) -> Result<()> {
    app.output.notice(&format!(
        "This will permanently delete droplet {id}.\nIts world is lost unless it was downloaded first."
    ));

    if !app.confirm("Continue?", false).await? {
        println!("Cancelled.");
        return Ok(());
    }

    match lifecycle::destroy(cp, id).await? {
        DestroyOutcome::Destroyed => {
            app.output.success(&format!("droplet {id} destroyed"));
            Ok(())
        }
        DestroyOutcome::Rejected { status } => {
            anyhow::bail!("failed with HTTP status code {status}")
        }
    }
}
