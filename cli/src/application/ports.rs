//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.
//!
//! Remote ports return `Send` futures: the installation and upload tasks run
//! on separate worker threads and drive their own sessions.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::domain::{ChecksumAlgorithm, InstanceDescriptor, InstanceId};

// ── Value Types ───────────────────────────────────────────────────────────────

/// Parameters of an instance create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub region: String,
    pub size: String,
    /// Base image slug, e.g. `"ubuntu-20-04-x64"`.
    pub image: String,
    /// Authorized SSH keys (ids or fingerprints).
    pub ssh_keys: Vec<String>,
}

/// Captured result of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; `-1` when the remote process was killed by a signal.
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Exit status the OpenSSH client uses for its own connection errors.
pub const TRANSPORT_FAILURE_STATUS: i32 = 255;

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// True when the connection failed rather than the remote command.
    #[must_use]
    pub fn transport_failed(&self) -> bool {
        self.status == TRANSPORT_FAILURE_STATUS
    }

    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

// ── Control Plane Port ────────────────────────────────────────────────────────

/// Cloud control-plane operations on a single instance.
pub trait ControlPlane: Send + Sync + 'static {
    /// Create an instance; the descriptor may not carry an address yet.
    fn create_instance(
        &self,
        spec: &InstanceSpec,
    ) -> impl Future<Output = Result<InstanceDescriptor>> + Send;

    /// Fetch the current descriptor.
    fn fetch_instance(
        &self,
        id: InstanceId,
    ) -> impl Future<Output = Result<InstanceDescriptor>> + Send;

    /// Rebuild the instance from a base image, keeping its id.
    fn rebuild_instance(
        &self,
        id: InstanceId,
        image: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Request deletion and return the raw HTTP status code.
    ///
    /// A non-success status is returned, not raised; `Err` is reserved for
    /// transport failures.
    fn delete_instance(&self, id: InstanceId) -> impl Future<Output = Result<u16>> + Send;
}

// ── Secure Shell Ports ────────────────────────────────────────────────────────

/// Opens authenticated sessions to an instance address.
pub trait SessionConnector: Send + Sync + 'static {
    type Session: RemoteSession;

    /// Connect to `address`. Unknown host keys are accepted.
    fn connect(&self, address: &str) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// One authenticated connection to an instance.
pub trait RemoteSession: Send + Sync + 'static {
    type Process: ServiceProcess;

    /// Run `command` through the remote shell and wait for it to exit.
    fn exec(&self, command: &str) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Stream a local file to `remote`, replacing it. Returns bytes sent.
    fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &dyn TransferProgress,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Stream `remote` into a local file. Returns bytes received.
    fn download(
        &self,
        remote: &str,
        local: &Path,
        progress: &dyn TransferProgress,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Overwrite `remote` with `contents`.
    fn write_file(&self, remote: &str, contents: &[u8])
    -> impl Future<Output = Result<()>> + Send;

    /// Start a long-running process with its console attached.
    fn start_process(&self, command: &str)
    -> impl Future<Output = Result<Self::Process>> + Send;

    /// Close the connection.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// A long-running remote process whose console we hold.
pub trait ServiceProcess: Send + 'static {
    /// Write one line to the process's input.
    fn send_line(&mut self, line: &str) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the process to exit and return its status.
    fn wait(&mut self) -> impl Future<Output = Result<i32>> + Send;
}

// ── Local Payload Port ────────────────────────────────────────────────────────

/// Local archive handling for the outbound payload.
pub trait LocalPayload: Send + Sync + 'static {
    /// Whether `path` is an existing directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Pack `sources` (directories, archived under their own names) into a
    /// compressed archive at `archive`. Returns the archive size in bytes.
    fn pack(
        &self,
        sources: &[PathBuf],
        archive: &Path,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Hex digest of a local file.
    fn checksum(
        &self,
        path: &Path,
        algorithm: ChecksumAlgorithm,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Delete a local file.
    fn remove(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;
}

// ── Progress Reporting Ports ──────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter: Send + Sync + 'static {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Create a byte-level progress sink for one transfer.
    fn transfer(&self, label: &str) -> Box<dyn TransferProgress>;
}

/// Byte-level progress for one upload or download.
pub trait TransferProgress: Send + Sync {
    fn begin(&self, total_bytes: u64);
    fn advance(&self, bytes: u64);
    fn finish(&self);
}

/// Progress sink that discards everything.
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn begin(&self, _: u64) {}
    fn advance(&self, _: u64) {}
    fn finish(&self) {}
}

// ── Prompt Port ───────────────────────────────────────────────────────────────

/// Interactive questions asked by the command dispatcher.
///
/// Answers may take as long as the user does, so implementations must not
/// block the async runtime while waiting.
pub trait Prompter {
    /// Ask a yes/no question.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails.
    fn confirm(&self, prompt: &str, default: bool) -> impl Future<Output = Result<bool>> + Send;

    /// Ask for a line of text.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails.
    fn input(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

impl<T: Prompter + ?Sized> Prompter for &T {
    fn confirm(&self, prompt: &str, default: bool) -> impl Future<Output = Result<bool>> + Send {
        (**self).confirm(prompt, default)
    }

    fn input(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).input(prompt)
    }
}
