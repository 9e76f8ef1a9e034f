//! Remote command execution on an established session.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};

use crate::application::ports::RemoteSession;
use crate::domain::{ProvisionError, RetryPolicy};

/// Run `command` and return its exit status.
///
/// A non-zero status is returned, not raised: callers decide whether it is
/// fatal.
///
/// # Errors
///
/// Returns an error only when the session could not run the command.
pub async fn run(session: &impl RemoteSession, command: &str) -> Result<i32> {
    tracing::debug!(%command, "exec");
    let output = session
        .exec(command)
        .await
        .with_context(|| format!("running remote command `{command}`"))?;
    if !output.success() {
        tracing::debug!(
            %command,
            status = output.status,
            stderr = %output.stderr_lossy().trim(),
            "remote command exited non-zero"
        );
    }
    Ok(output.status)
}

/// Run `command` and fail the labelled step on a non-zero status.
///
/// # Errors
///
/// Returns `ProvisionError::StepFailed` for a non-zero status, or the
/// transport error.
pub async fn run_checked(session: &impl RemoteSession, step: &str, command: &str) -> Result<()> {
    let status = run(session, command).await?;
    if status != 0 {
        return Err(ProvisionError::StepFailed {
            step: step.to_owned(),
            status,
        }
        .into());
    }
    Ok(())
}

/// Re-run `command` until it exits zero, waiting per `policy` in between.
///
/// Returns the number of retries performed (0 when the first run succeeded).
///
/// # Errors
///
/// Returns `ProvisionError::RetriesExhausted` once the policy's cap is
/// reached, or the transport error.
pub async fn run_until_success(
    session: &impl RemoteSession,
    command: &str,
    policy: &RetryPolicy,
    operation: &'static str,
) -> Result<u32> {
    let mut attempt = 1;
    loop {
        let status = run(session, command).await?;
        if status == 0 {
            return Ok(attempt - 1);
        }
        if !policy.allows(attempt + 1) {
            return Err(ProvisionError::RetriesExhausted {
                operation,
                attempts: attempt,
            }
            .into());
        }
        tracing::info!(operation, attempt, status, "not ready yet, retrying");
        tokio::time::sleep(policy.delay_for(attempt)).await;
        attempt += 1;
    }
}
