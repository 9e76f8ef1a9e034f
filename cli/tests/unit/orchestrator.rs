//! Provisioning: the server starts only after both worker tasks finish.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use mc_auto::domain::server::{ALLOW_LIST_FILE, PROPERTIES_FILE};
use mc_auto::domain::{Instance, InstanceStatus};

use crate::mocks::{RemoteHost, ScriptedControlPlane, provisioner, test_config};

const START: &str = "start:java -Xmx6G -jar 'fabric-server-launch.jar' nogui";

fn assert_started_after_both_tasks(host: &RemoteHost) {
    let start = host.position(START).expect("server started");
    let install_done = host.position(&format!("write:{ALLOW_LIST_FILE}")).unwrap();
    let upload_done = host.position(&format!("write:{PROPERTIES_FILE}")).unwrap();
    assert!(start > install_done, "start before installation finished");
    assert!(start > upload_done, "start before upload finished");
}

#[tokio::test(start_paused = true)]
async fn start_waits_for_slow_installation() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    host.delay(
        "export DEBIAN_FRONTEND=noninteractive && apt-get update",
        Duration::from_secs(600),
    );
    let cp = Arc::new(ScriptedControlPlane::new(7));
    let (provisioner, _) = provisioner(test_config(dir.path()), &cp, &host);
    let mut instance = Instance::creating(7);

    let controller = provisioner.bring_up(&mut instance).await.unwrap();

    assert_started_after_both_tasks(&host);
    assert!(controller.is_serving());
    assert_eq!(controller.address(), "203.0.113.10");
    assert_eq!(instance.status, InstanceStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn start_waits_for_slow_upload() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    host.delay("tar --use-compress-program=pigz -xf", Duration::from_secs(600));
    let cp = Arc::new(ScriptedControlPlane::new(7));
    let (provisioner, _) = provisioner(test_config(dir.path()), &cp, &host);
    let mut instance = Instance::creating(7);

    provisioner.bring_up(&mut instance).await.unwrap();

    assert_started_after_both_tasks(&host);
}

#[tokio::test]
async fn announces_address_once_started() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    let cp = Arc::new(ScriptedControlPlane::new(7).address_after(2));
    let (provisioner, reporter) = provisioner(test_config(dir.path()), &cp, &host);
    let mut instance = Instance::creating(7);

    provisioner.bring_up(&mut instance).await.unwrap();

    let lines = reporter.lines();
    assert!(lines.contains(&"success: connected!".to_owned()));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("success: The server IP is 203.0.113.10. Please wait for it to start.")
    );
    assert!(reporter.contains("[install] installation complete"));
    assert!(reporter.contains("[upload] upload complete"));
}

#[tokio::test]
async fn failed_installation_still_waits_for_upload_and_never_starts() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    host.script("export DEBIAN_FRONTEND=noninteractive && apt-get install", &[100]);
    let cp = Arc::new(ScriptedControlPlane::new(7));
    let (provisioner, _) = provisioner(test_config(dir.path()), &cp, &host);
    let mut instance = Instance::creating(7);

    let Err(err) = provisioner.bring_up(&mut instance).await else {
        panic!("bring_up should fail when installation fails");
    };

    assert!(err.to_string().contains("run `recover 7`"), "got: {err}");
    assert!(format!("{err:#}").contains("exit status 100"));
    assert!(host.position(START).is_none());
    assert!(host.file(PROPERTIES_FILE).is_some(), "upload ran to completion");
    assert!(cp.deletes.lock().unwrap().is_empty(), "no rollback");
}

#[tokio::test]
async fn acquire_and_destroy_report_progress() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    let cp = Arc::new(ScriptedControlPlane::new(3_164_444));
    let (provisioner, reporter) = provisioner(test_config(dir.path()), &cp, &host);

    let instance = provisioner.acquire().await.unwrap();
    provisioner.destroy(instance.id).await.unwrap();

    assert_eq!(
        reporter.lines(),
        vec![
            "step: creating droplet...",
            "success: created droplet with ID 3164444",
            "step: destroying droplet...",
        ]
    );
}
