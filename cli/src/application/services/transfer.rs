//! Verified file delivery: upload, compare checksums, re-send on mismatch.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::{LocalPayload, ProgressReporter, RemoteSession};
use crate::domain::{ChecksumAlgorithm, ProvisionError, RetryPolicy, TransferError};

/// One verified delivery of a local file.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub local: PathBuf,
    pub remote: String,
    pub algorithm: ChecksumAlgorithm,
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Number of full uploads performed (1 when the first one verified).
    pub attempts: u32,
    pub bytes: u64,
    /// Digest both sides agreed on.
    pub checksum: String,
}

/// Upload `job.local` until the remote copy's checksum equals the local one.
///
/// Every attempt re-sends the whole file; nothing remote is deleted between
/// attempts. A checksum mismatch, a broken upload stream and a dropped
/// connection while checksumming all count as a failed attempt. The loop ends
/// only on agreement or when `policy` forbids another attempt.
///
/// # Errors
///
/// - `ProvisionError::RetriesExhausted` when the cap is reached.
/// - `TransferError::RemoteChecksumFailed` if the remote checksum tool fails.
/// - Local I/O errors while hashing the payload.
pub async fn deliver(
    session: &impl RemoteSession,
    local: &impl LocalPayload,
    reporter: &impl ProgressReporter,
    job: &TransferJob,
    policy: &RetryPolicy,
) -> Result<TransferReport> {
    let expected = local
        .checksum(&job.local, job.algorithm)
        .await
        .with_context(|| format!("hashing {}", job.local.display()))?;
    tracing::debug!(file = %job.local.display(), %expected, "local checksum");

    let mut attempt = 1;
    loop {
        let warning = match send_once(session, reporter, job).await {
            Err(e) => {
                tracing::warn!(attempt, error = %format!("{e:#}"), "upload interrupted");
                "archive upload interrupted, retrying..."
            }
            Ok(bytes) => {
                reporter.step("verifying archive integrity...");
                match remote_checksum(session, &job.remote, job.algorithm).await? {
                    Some(observed) if observed == expected => {
                        tracing::info!(attempt, bytes, checksum = %observed, "transfer verified");
                        return Ok(TransferReport {
                            attempts: attempt,
                            bytes,
                            checksum: observed,
                        });
                    }
                    Some(observed) => {
                        tracing::warn!(attempt, %expected, %observed, "checksum mismatch");
                        "archive integrity check failed, retrying..."
                    }
                    None => "lost connection while verifying archive, retrying...",
                }
            }
        };

        if !policy.allows(attempt + 1) {
            return Err(ProvisionError::RetriesExhausted {
                operation: "verified upload",
                attempts: attempt,
            }
            .into());
        }
        reporter.warn(warning);
        tokio::time::sleep(policy.delay_for(attempt)).await;
        attempt += 1;
    }
}

async fn send_once(
    session: &impl RemoteSession,
    reporter: &impl ProgressReporter,
    job: &TransferJob,
) -> Result<u64> {
    reporter.step("uploading archive...");
    let progress = reporter.transfer(&job.remote);
    let sent = session
        .upload(&job.local, &job.remote, progress.as_ref())
        .await;
    progress.finish();
    sent.with_context(|| format!("uploading {}", job.local.display()))
}

/// Digest of `path` as computed on the instance.
///
/// `None` means the connection dropped before the command could answer.
///
/// # Errors
///
/// Returns an error if the checksum command itself fails or prints garbage.
pub async fn remote_checksum(
    session: &impl RemoteSession,
    path: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<Option<String>> {
    let output = match session.exec(&algorithm.remote_command(path)).await {
        Ok(output) if !output.transport_failed() => output,
        Ok(output) => {
            tracing::warn!(stderr = %output.stderr_lossy().trim(), "remote checksum lost its connection");
            return Ok(None);
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "remote checksum lost its connection");
            return Ok(None);
        }
    };
    if !output.success() {
        return Err(TransferError::RemoteChecksumFailed {
            status: output.status,
            stderr: output.stderr_lossy().trim().to_owned(),
        }
        .into());
    }
    Ok(Some(algorithm.parse_remote(&output.stdout_lossy())?))
}
