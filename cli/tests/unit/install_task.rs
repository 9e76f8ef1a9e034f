//! Installation task: the plan runs in order and stops at the first failure.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use mc_auto::application::ports::SessionConnector;
use mc_auto::application::services::TaggedReporter;
use mc_auto::application::services::install::{apply_plan, run_installation};
use mc_auto::domain::ProvisionError;
use mc_auto::domain::server::{AGREEMENT_FILE, ALLOW_LIST_FILE, installation_plan};

use crate::mocks::{FakeConnector, RecordingReporter, RemoteHost, test_config};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

#[tokio::test]
async fn writes_agreement_and_exact_allow_list() {
    let host = RemoteHost::new();
    let session = FakeConnector::new(&host).connect("h").await.unwrap();
    let plan = installation_plan(
        "https://example.com/fabric-installer.jar",
        &names(&["alice", "bob", "alice"]),
    );

    apply_plan(&session, &plan, &RecordingReporter::default())
        .await
        .unwrap();

    assert_eq!(host.file(AGREEMENT_FILE).unwrap(), b"eula=true\n");
    let allow: Vec<String> =
        serde_json::from_slice(&host.file(ALLOW_LIST_FILE).unwrap()).unwrap();
    assert_eq!(allow, vec!["alice", "bob"]);
}

#[tokio::test]
async fn steps_run_in_order() {
    let host = RemoteHost::new();
    let session = FakeConnector::new(&host).connect("h").await.unwrap();
    let plan = installation_plan("https://example.com/i.jar", &[]);

    apply_plan(&session, &plan, &RecordingReporter::default())
        .await
        .unwrap();

    let update = host.position("exec:export DEBIAN_FRONTEND=noninteractive && apt-get update").unwrap();
    let java = host.position("exec:export DEBIAN_FRONTEND=noninteractive && apt-get install").unwrap();
    let fetch = host.position("exec:wget").unwrap();
    let install = host.position("exec:java -jar 'i.jar' server").unwrap();
    let eula = host.position("write:eula.txt").unwrap();
    assert!(update < java && java < fetch && fetch < install && install < eula);
}

#[tokio::test]
async fn failing_step_stops_the_plan() {
    let host = RemoteHost::new();
    host.script("wget", &[8]);
    let session = FakeConnector::new(&host).connect("h").await.unwrap();
    let plan = installation_plan("https://example.com/i.jar", &[]);

    let err = apply_plan(&session, &plan, &RecordingReporter::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::StepFailed { status: 8, .. })
    ));
    assert_eq!(host.count("exec:java"), 0);
    assert!(host.file(AGREEMENT_FILE).is_none());
}

#[tokio::test]
async fn run_installation_reports_completion_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    let reporter = Arc::new(RecordingReporter::default());

    run_installation(
        Arc::new(FakeConnector::new(&host)),
        "203.0.113.10".to_owned(),
        Arc::new(test_config(dir.path())),
        TaggedReporter::new("install", Arc::clone(&reporter)),
    )
    .await
    .unwrap();

    assert!(reporter.contains("[install] installation complete"));
    assert_eq!(host.events().last().map(String::as_str), Some("close"));
}
