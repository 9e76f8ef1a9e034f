//! Local process execution for the infrastructure adapters.
//!
//! `TokioCommandRunner` uses tokio for async process execution with a
//! guaranteed timeout and kill on all platforms.

use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

/// Default timeout for short local commands.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs local programs with a timeout.
///
/// `tokio::time::timeout` around `.output().await` does not kill the child
/// when the timeout fires on every platform; this runner uses
/// `tokio::select!` with an explicit `child.kill()` instead.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `program` to completion and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or times out.
    pub async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    /// Like [`run`](Self::run) with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or times out.
    pub async fn run_with_timeout(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<Output> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        collect(child, program, timeout).await
    }

    /// Run `program` with `input` on its stdin.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or times out.
    pub async fn run_with_stdin(
        &self,
        program: &str,
        args: &[String],
        input: &[u8],
    ) -> Result<Output> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let stdin_handle = child.stdin.take();
        let input_owned = input.to_vec();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin_handle {
                let _ = stdin.write_all(&input_owned).await;
            }
        });

        let output = collect(child, program, self.timeout).await;
        let _ = stdin_task.await;
        output
    }

    /// Spawn `program` with all three standard streams piped.
    ///
    /// The caller owns the child; it is killed when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned.
    pub fn spawn(&self, program: &str, args: &[String]) -> Result<Child> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))
    }

    /// Run `program` with null stdio and return its exit status.
    ///
    /// For programs that daemonize: a forked child holding a piped stream
    /// would keep `read_to_end` from ever returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or times out.
    pub async fn run_detached(&self, program: &str, args: &[String]) -> Result<ExitStatus> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        tokio::select! {
            status = child.wait() => status.with_context(|| format!("waiting for {program}")),
            () = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", self.timeout.as_secs())
            }
        }
    }
}

/// Wait for `child` while draining stdout and stderr, killing it on timeout.
async fn collect(mut child: Child, program: &str, timeout: Duration) -> Result<Output> {
    let mut stdout_handle = child.stdout.take();
    let mut stderr_handle = child.stderr.take();

    tokio::select! {
        result = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stdout_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stderr_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
            );
            Ok(Output {
                status: status.with_context(|| format!("waiting for {program}"))?,
                stdout,
                stderr,
            })
        } => result,
        () = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
        }
    }
}
