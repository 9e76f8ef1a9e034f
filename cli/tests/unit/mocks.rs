//! Shared mock infrastructure for unit tests.
//!
//! Provides scripted [`ControlPlane`] and [`SessionConnector`]
//! implementations backed by an in-memory remote host, plus recording
//! reporters and prompters, so each test file doesn't have to re-define the
//! same boilerplate.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use md5::{Digest, Md5};

use mc_auto::application::ports::{
    CommandOutput, ControlPlane, InstanceSpec, NoProgress, ProgressReporter, Prompter,
    RemoteSession, ServiceProcess, SessionConnector, TransferProgress,
};
use mc_auto::application::services::orchestrator::Provisioner;
use mc_auto::domain::checksum::hex_encode;
use mc_auto::domain::config::{AddonsDirectory, SshKeyRef};
use mc_auto::domain::{AppConfig, InstanceDescriptor, InstanceId, NetworkAddress, RetryPolicy};
use mc_auto::infra::payload::ArchivePayload;

// ── Remote host ───────────────────────────────────────────────────────────────

/// In-memory remote host shared by every session a connector opens.
///
/// Records one event per operation (`exec:<cmd>`, `upload:<path>`,
/// `write:<path>`, `start:<cmd>`, `send:<line>`, `close`), keeps uploaded and
/// written files, and answers `md5sum` from the stored bytes unless a script
/// says otherwise.
#[derive(Default)]
pub struct RemoteHost {
    events: Mutex<Vec<String>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    scripts: Mutex<Vec<(String, VecDeque<i32>)>>,
    delays: Mutex<Vec<(String, Duration)>>,
    corrupt_uploads: AtomicU32,
    dropped_uploads: AtomicU32,
}

impl RemoteHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Commands starting with `prefix` exit with `statuses` in turn, then 0.
    pub fn script(&self, prefix: &str, statuses: &[i32]) {
        self.scripts
            .lock()
            .unwrap()
            .push((prefix.to_owned(), statuses.iter().copied().collect()));
    }

    /// Commands starting with `prefix` take `delay` to run.
    pub fn delay(&self, prefix: &str, delay: Duration) {
        self.delays.lock().unwrap().push((prefix.to_owned(), delay));
    }

    /// Flip one bit in each of the next `n` uploads.
    pub fn corrupt_next_uploads(&self, n: u32) {
        self.corrupt_uploads.store(n, Ordering::SeqCst);
    }

    /// Break the stream of each of the next `n` uploads halfway through.
    pub fn drop_next_uploads(&self, n: u32) {
        self.dropped_uploads.store(n, Ordering::SeqCst);
    }

    pub fn put(&self, path: &str, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), contents.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Number of events starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    /// Index of the first event starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.events().iter().position(|e| e.starts_with(prefix))
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn delay_for(&self, command: &str) -> Option<Duration> {
        self.delays
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, d)| *d)
    }

    fn next_status(&self, command: &str) -> i32 {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .iter_mut()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .and_then(|(_, statuses)| statuses.pop_front())
            .unwrap_or(0)
    }

    fn take_corruption(&self) -> bool {
        take_one(&self.corrupt_uploads)
    }

    fn take_drop(&self) -> bool {
        take_one(&self.dropped_uploads)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn output(status: i32, stdout: String) -> CommandOutput {
    CommandOutput {
        status,
        stdout: stdout.into_bytes(),
        stderr: Vec::new(),
    }
}

// ── Mock: session ─────────────────────────────────────────────────────────────

pub struct FakeSession {
    host: Arc<RemoteHost>,
}

impl RemoteSession for FakeSession {
    type Process = FakeProcess;

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.host.record(format!("exec:{command}"));
        if let Some(delay) = self.host.delay_for(command) {
            tokio::time::sleep(delay).await;
        }
        if let Some(path) = command.strip_prefix("md5sum -- ") {
            let status = self.host.next_status(command);
            if status != 0 {
                return Ok(output(status, String::new()));
            }
            let path = path.trim_matches('\'');
            let bytes = self.host.file(path).unwrap_or_default();
            let digest = hex_encode(&Md5::digest(&bytes));
            return Ok(output(0, format!("{digest}  {path}\n")));
        }
        Ok(output(self.host.next_status(command), String::new()))
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &dyn TransferProgress,
    ) -> Result<u64> {
        let mut bytes = tokio::fs::read(local).await?;
        let len = bytes.len() as u64;
        progress.begin(len);
        if self.host.take_corruption() {
            if let Some(first) = bytes.first_mut() {
                *first ^= 0x01;
            }
        }
        self.host.record(format!("upload:{remote}"));
        if self.host.take_drop() {
            bytes.truncate(bytes.len() / 2);
            self.host.put(remote, &bytes);
            anyhow::bail!("upload to {remote} failed: client_loop: send disconnect: Connection reset by peer");
        }
        self.host.put(remote, &bytes);
        progress.advance(len);
        Ok(len)
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        progress: &dyn TransferProgress,
    ) -> Result<u64> {
        let Some(bytes) = self.host.file(remote) else {
            anyhow::bail!("no such remote file: {remote}");
        };
        let len = bytes.len() as u64;
        progress.begin(len);
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local, &bytes).await?;
        self.host.record(format!("download:{remote}"));
        progress.advance(len);
        Ok(len)
    }

    async fn write_file(&self, remote: &str, contents: &[u8]) -> Result<()> {
        self.host.record(format!("write:{remote}"));
        self.host.put(remote, contents);
        Ok(())
    }

    async fn start_process(&self, command: &str) -> Result<FakeProcess> {
        self.host.record(format!("start:{command}"));
        Ok(FakeProcess {
            host: Arc::clone(&self.host),
        })
    }

    async fn close(&self) -> Result<()> {
        self.host.record("close".to_owned());
        Ok(())
    }
}

pub struct FakeProcess {
    host: Arc<RemoteHost>,
}

impl ServiceProcess for FakeProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.host.record(format!("send:{line}"));
        Ok(())
    }

    async fn wait(&mut self) -> Result<i32> {
        Ok(0)
    }
}

// ── Mock: connector ───────────────────────────────────────────────────────────

/// Opens sessions to the shared host; the first `failures` connects fail.
pub struct FakeConnector {
    pub host: Arc<RemoteHost>,
    failures: AtomicU32,
    pub connects: AtomicU32,
}

impl FakeConnector {
    pub fn new(host: &Arc<RemoteHost>) -> Self {
        Self {
            host: Arc::clone(host),
            failures: AtomicU32::new(0),
            connects: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn failing_first(self, n: u32) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl SessionConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, address: &str) -> Result<FakeSession> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("ssh: connect to host {address} port 22: Connection refused");
        }
        Ok(FakeSession {
            host: Arc::clone(&self.host),
        })
    }
}

// ── Mock: control plane ───────────────────────────────────────────────────────

/// Control plane with one droplet whose address appears after a number of
/// fetches.
pub struct ScriptedControlPlane {
    pub id: InstanceId,
    pub address: String,
    pending_fetches: AtomicU32,
    delete_status: u16,
    missing: bool,
    pub fetches: AtomicU32,
    pub creates: Mutex<Vec<InstanceSpec>>,
    pub rebuilds: Mutex<Vec<(InstanceId, String)>>,
    pub deletes: Mutex<Vec<InstanceId>>,
}

impl ScriptedControlPlane {
    pub fn new(id: InstanceId) -> Self {
        Self {
            id,
            address: "203.0.113.10".to_owned(),
            pending_fetches: AtomicU32::new(0),
            delete_status: 204,
            missing: false,
            fetches: AtomicU32::new(0),
            creates: Mutex::new(Vec::new()),
            rebuilds: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
        }
    }

    /// The first `n` fetches report no address.
    #[must_use]
    pub fn address_after(self, n: u32) -> Self {
        self.pending_fetches.store(n, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn delete_status(mut self, status: u16) -> Self {
        self.delete_status = status;
        self
    }

    /// Every lookup fails as if the droplet did not exist.
    #[must_use]
    pub fn missing(mut self) -> Self {
        self.missing = true;
        self
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn descriptor(&self, with_address: bool) -> InstanceDescriptor {
        InstanceDescriptor {
            id: self.id,
            status: if with_address { "active" } else { "new" }.to_owned(),
            addresses: if with_address {
                vec![NetworkAddress {
                    ip: self.address.clone(),
                    public: true,
                }]
            } else {
                Vec::new()
            },
        }
    }
}

impl ControlPlane for ScriptedControlPlane {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<InstanceDescriptor> {
        self.creates.lock().unwrap().push(spec.clone());
        Ok(self.descriptor(false))
    }

    async fn fetch_instance(&self, id: InstanceId) -> Result<InstanceDescriptor> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.missing || id != self.id {
            anyhow::bail!("get droplet failed with HTTP status 404: not_found");
        }
        let pending = self
            .pending_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(self.descriptor(!pending))
    }

    async fn rebuild_instance(&self, id: InstanceId, image: &str) -> Result<()> {
        self.rebuilds.lock().unwrap().push((id, image.to_owned()));
        Ok(())
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<u16> {
        self.deletes.lock().unwrap().push(id);
        Ok(self.delete_status)
    }
}

// ── Mock: reporter ────────────────────────────────────────────────────────────

/// Records every message as `step: ...`, `success: ...` or `warn: ...`.
#[derive(Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    fn push(&self, kind: &str, message: &str) {
        self.lines.lock().unwrap().push(format!("{kind}: {message}"));
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.push("step", message);
    }

    fn success(&self, message: &str) {
        self.push("success", message);
    }

    fn warn(&self, message: &str) {
        self.push("warn", message);
    }

    fn transfer(&self, _: &str) -> Box<dyn TransferProgress> {
        Box::new(NoProgress)
    }
}

// ── Mock: prompter ────────────────────────────────────────────────────────────

/// Answers questions from queues; panics when a question was not expected.
#[derive(Default)]
pub struct ScriptedPrompter {
    confirms: Mutex<VecDeque<bool>>,
    inputs: Mutex<VecDeque<String>>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    #[must_use]
    pub fn confirming(self, answer: bool) -> Self {
        self.confirms.lock().unwrap().push_back(answer);
        self
    }

    #[must_use]
    pub fn answering(self, line: &str) -> Self {
        self.inputs.lock().unwrap().push_back(line.to_owned());
        self
    }
}

impl Prompter for ScriptedPrompter {
    async fn confirm(&self, prompt: &str, _: bool) -> Result<bool> {
        self.asked.lock().unwrap().push(prompt.to_owned());
        Ok(self
            .confirms
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected confirmation"))
    }

    async fn input(&self, prompt: &str) -> Result<String> {
        self.asked.lock().unwrap().push(prompt.to_owned());
        Ok(self
            .inputs
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected input prompt"))
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// A configuration whose world and add-ons live under `dir`, with every
/// retry loop immediate and unbounded.
pub fn test_config(dir: &Path) -> AppConfig {
    let world = dir.join("My World");
    std::fs::create_dir_all(world.join("region")).unwrap();
    std::fs::write(world.join("level.dat"), b"level data").unwrap();
    std::fs::write(world.join("region").join("r.0.0.mca"), vec![7u8; 4096]).unwrap();
    let mods = dir.join("mods");
    std::fs::create_dir_all(&mods).unwrap();
    std::fs::write(mods.join("fabric-api.jar"), b"jar").unwrap();

    let mut config = AppConfig {
        api_token: "dop_v1_test".to_owned(),
        world_directory: world,
        addons_directory: AddonsDirectory(mods),
        ssh_key_id: Some(SshKeyRef::Id(41_230_918)),
        installer_url: "https://maven.example.net/fabric-installer-1.0.0.jar".to_owned(),
        allow_list: vec!["alice".to_owned(), "bob".to_owned()],
        ..AppConfig::default()
    };
    config.instance.rebuild_settle_secs = 0;
    config.transfer.local_archive = dir.join("in.tar.gz");
    config.backup.local_directory = dir.join("backups");
    config.retry.connect = RetryPolicy::immediate();
    config.retry.transfer = RetryPolicy::immediate();
    config.retry.extract = RetryPolicy::immediate();
    config
}

pub fn backups_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir.join("backups"))
        .map(|entries| entries.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default()
}

pub type TestProvisioner =
    Provisioner<ScriptedControlPlane, FakeConnector, ArchivePayload, RecordingReporter>;

/// A provisioner wired to the given fakes, returning the shared reporter.
pub fn provisioner(
    config: AppConfig,
    cp: &Arc<ScriptedControlPlane>,
    host: &Arc<RemoteHost>,
) -> (TestProvisioner, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::default());
    let provisioner = Provisioner::new(
        Arc::clone(cp),
        Arc::new(FakeConnector::new(host)),
        Arc::new(ArchivePayload),
        Arc::clone(&reporter),
        Arc::new(config),
    );
    (provisioner, reporter)
}
