//! Secure-shell adapter over the system OpenSSH client.
//!
//! Each session is an OpenSSH control master on a private socket. Commands,
//! file streams and the server process are multiplexed over it, so a session
//! authenticates once no matter how many commands it runs. Host keys are not
//! verified: instances are fresh and their keys unknown in advance.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;

use crate::application::ports::{
    CommandOutput, RemoteSession, ServiceProcess, SessionConnector, TransferProgress,
};
use crate::domain::config::SshConfig;
use crate::domain::server::size_command;
use crate::domain::shell::quote;
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner};

const SSH: &str = "ssh";

/// Read/write chunk size for file streams.
const CHUNK: usize = 256 * 1024;

/// Client settings shared by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub exec_timeout: Duration,
}

impl From<&SshConfig> for SshOptions {
    fn from(config: &SshConfig) -> Self {
        Self {
            user: config.user.clone(),
            identity_file: config.identity_file.clone(),
            connect_timeout: config.connect_timeout(),
            exec_timeout: config.exec_timeout(),
        }
    }
}

impl SshOptions {
    /// Options every invocation carries, including the control socket.
    fn base_args(&self, socket: &Path) -> Vec<String> {
        let mut args = vec![
            "-S".to_owned(),
            socket.display().to_string(),
            "-l".to_owned(),
            self.user.clone(),
        ];
        for option in [
            "StrictHostKeyChecking=no".to_owned(),
            "UserKnownHostsFile=/dev/null".to_owned(),
            "BatchMode=yes".to_owned(),
            "LogLevel=ERROR".to_owned(),
            "ServerAliveInterval=15".to_owned(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ] {
            args.push("-o".to_owned());
            args.push(option);
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_owned());
            args.push(identity.display().to_string());
            args.push("-o".to_owned());
            args.push("IdentitiesOnly=yes".to_owned());
        }
        args
    }

    /// Start a backgrounded control master without a remote command.
    #[must_use]
    pub fn master_args(&self, socket: &Path, address: &str) -> Vec<String> {
        let mut args = self.base_args(socket);
        args.extend(["-M", "-f", "-N"].map(str::to_owned));
        args.push(address.to_owned());
        args
    }

    /// Run `command` through an existing master.
    #[must_use]
    pub fn command_args(&self, socket: &Path, address: &str, command: &str) -> Vec<String> {
        let mut args = self.base_args(socket);
        args.extend([address.to_owned(), "--".to_owned(), command.to_owned()]);
        args
    }

    /// Send a control request (`exit`, `check`) to the master.
    #[must_use]
    pub fn control_args(&self, socket: &Path, address: &str, request: &str) -> Vec<String> {
        vec![
            "-S".to_owned(),
            socket.display().to_string(),
            "-O".to_owned(),
            request.to_owned(),
            "-l".to_owned(),
            self.user.clone(),
            address.to_owned(),
        ]
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens OpenSSH sessions.
pub struct OpenSshConnector {
    options: Arc<SshOptions>,
}

impl OpenSshConnector {
    #[must_use]
    pub fn new(config: &SshConfig) -> Self {
        Self {
            options: Arc::new(SshOptions::from(config)),
        }
    }
}

impl SessionConnector for OpenSshConnector {
    type Session = OpenSshSession;

    async fn connect(&self, address: &str) -> Result<OpenSshSession> {
        let dir = tempfile::Builder::new()
            .prefix("mc-auto-ssh")
            .tempdir()
            .context("creating control socket directory")?;
        let socket = dir.path().join("control");

        let runner = TokioCommandRunner::new(self.options.connect_timeout + DEFAULT_CMD_TIMEOUT);
        let status = runner
            .run_detached(SSH, &self.options.master_args(&socket, address))
            .await
            .with_context(|| format!("ssh {address}"))?;
        anyhow::ensure!(status.success(), "ssh to {address} failed ({status})");
        tracing::debug!(%address, socket = %socket.display(), "ssh master up");

        Ok(OpenSshSession {
            options: Arc::clone(&self.options),
            address: address.to_owned(),
            socket,
            runner: TokioCommandRunner::new(self.options.exec_timeout),
            closed: AtomicBool::new(false),
            _dir: dir,
        })
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One control-master connection to an instance.
pub struct OpenSshSession {
    options: Arc<SshOptions>,
    address: String,
    socket: PathBuf,
    runner: TokioCommandRunner,
    closed: AtomicBool,
    _dir: tempfile::TempDir,
}

impl OpenSshSession {
    fn args(&self, command: &str) -> Vec<String> {
        self.options
            .command_args(&self.socket, &self.address, command)
    }

    fn exit_args(&self) -> Vec<String> {
        self.options
            .control_args(&self.socket, &self.address, "exit")
    }

    async fn remote_size(&self, remote: &str) -> Result<u64> {
        let output = self.exec(&size_command(remote)).await?;
        anyhow::ensure!(
            output.success(),
            "cannot stat {remote}: {}",
            output.stderr_lossy().trim()
        );
        output
            .stdout_lossy()
            .trim()
            .parse()
            .with_context(|| format!("unexpected size for {remote}"))
    }
}

/// Exit code of a finished child; `-1` when it was killed by a signal.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

impl RemoteSession for OpenSshSession {
    type Process = OpenSshProcess;

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let output = self
            .runner
            .run(SSH, &self.args(command))
            .await
            .with_context(|| format!("ssh {}", self.address))?;
        Ok(CommandOutput {
            status: exit_code(output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &dyn TransferProgress,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("opening {}", local.display()))?;
        let total = file.metadata().await?.len();
        progress.begin(total);

        let mut child = self
            .runner
            .spawn(SSH, &self.args(&format!("cat > {}", quote(remote))))?;
        let mut stdin = child.stdin.take().context("ssh stdin unavailable")?;

        let mut buf = vec![0u8; CHUNK];
        let mut sent: u64 = 0;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stdin
                .write_all(&buf[..n])
                .await
                .with_context(|| format!("streaming to {remote}"))?;
            sent += n as u64;
            progress.advance(n as u64);
        }
        stdin.shutdown().await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        anyhow::ensure!(
            output.status.success(),
            "upload to {remote} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(sent)
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        progress: &dyn TransferProgress,
    ) -> Result<u64> {
        let total = self.remote_size(remote).await?;
        progress.begin(total);

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let mut file = tokio::fs::File::create(local)
            .await
            .with_context(|| format!("creating {}", local.display()))?;

        let mut child = self
            .runner
            .spawn(SSH, &self.args(&format!("cat -- {}", quote(remote))))?;
        drop(child.stdin.take());
        let mut stdout = child.stdout.take().context("ssh stdout unavailable")?;

        let mut buf = vec![0u8; CHUNK];
        let mut received: u64 = 0;
        loop {
            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .await
                .with_context(|| format!("writing {}", local.display()))?;
            received += n as u64;
            progress.advance(n as u64);
        }
        file.flush().await?;

        let output = child.wait_with_output().await?;
        anyhow::ensure!(
            output.status.success(),
            "download of {remote} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(received)
    }

    async fn write_file(&self, remote: &str, contents: &[u8]) -> Result<()> {
        let output = self
            .runner
            .run_with_stdin(SSH, &self.args(&format!("cat > {}", quote(remote))), contents)
            .await?;
        anyhow::ensure!(
            output.status.success(),
            "writing {remote} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(())
    }

    async fn start_process(&self, command: &str) -> Result<OpenSshProcess> {
        let mut child = self.runner.spawn(SSH, &self.args(command))?;
        let stdin = child.stdin.take().context("ssh stdin unavailable")?;
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(drain("stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(drain("stderr", stderr));
        }
        Ok(OpenSshProcess {
            child,
            stdin,
            drains,
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let output = self
            .runner
            .run_with_timeout(SSH, &self.exit_args(), DEFAULT_CMD_TIMEOUT)
            .await?;
        anyhow::ensure!(
            output.status.success(),
            "closing ssh session to {} failed: {}",
            self.address,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        tracing::debug!(address = %self.address, "ssh master closed");
        Ok(())
    }
}

impl Drop for OpenSshSession {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        // The master is a daemon; without this it outlives us.
        let _ = std::process::Command::new(SSH)
            .args(self.exit_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Forward one output stream of the server into the log, line by line.
fn drain<S>(stream: &'static str, source: S) -> JoinHandle<()>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(source).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "mc_auto::server", stream, "{line}");
        }
    })
}

// ── Process ───────────────────────────────────────────────────────────────────

/// The server process started on a session.
pub struct OpenSshProcess {
    child: Child,
    stdin: ChildStdin,
    drains: Vec<JoinHandle<()>>,
}

impl ServiceProcess for OpenSshProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .context("writing to server console")?;
        self.stdin.flush().await.context("flushing server console")
    }

    async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await.context("waiting for server")?;
        for handle in self.drains.drain(..) {
            let _ = handle.await;
        }
        Ok(exit_code(status))
    }
}
