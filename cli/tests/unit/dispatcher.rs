//! REPL dispatcher: commands drive the run state through its phases.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use mc_auto::commands::dispatch::{Dispatcher, Flow, Phase, ReplCommand};
use mc_auto::domain::DispatchError;

use crate::mocks::{RemoteHost, ScriptedControlPlane, ScriptedPrompter, backups_in, provisioner, test_config};

const ID: u64 = 3_164_444;

fn dispatch_error(err: &anyhow::Error) -> Option<&DispatchError> {
    err.downcast_ref::<DispatchError>()
}

#[tokio::test]
async fn create_then_create_again_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    let cp = Arc::new(ScriptedControlPlane::new(ID));
    let (provisioner, _) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default();
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);

    assert_eq!(dispatcher.dispatch_line("create").await.unwrap(), Flow::Continue);
    assert_eq!(dispatcher.phase(), Phase::Serving(ID));

    let err = dispatcher.dispatch_line("create").await.unwrap_err();
    assert_eq!(dispatch_error(&err), Some(&DispatchError::AlreadyProvisioned(ID)));
    assert_eq!(cp.creates.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn download_stops_server_and_keeps_backup() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    host.put("out.tar.gz", b"world backup");
    let cp = Arc::new(ScriptedControlPlane::new(ID));
    let (provisioner, reporter) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default();
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);

    dispatcher.dispatch(ReplCommand::Create).await.unwrap();
    dispatcher.dispatch(ReplCommand::Download).await.unwrap();

    let stop = host.position("send:stop").unwrap();
    let compress = host.position("exec:tar --use-compress-program='pigz -9' -cf").unwrap();
    assert!(stop < compress, "server stops before the world is archived");
    let backups = backups_in(dir.path());
    assert_eq!(backups.len(), 1);
    assert_eq!(std::fs::read(&backups[0]).unwrap(), b"world backup");
    assert!(reporter.contains("world saved to"));

    let session = dispatcher.state().session.as_ref().unwrap();
    assert!(session.backed_up());
    assert!(!session.is_serving());
}

#[tokio::test]
async fn destroy_unsaved_world_asks_first() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    let cp = Arc::new(ScriptedControlPlane::new(ID));
    let (provisioner, reporter) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default().confirming(false).confirming(true);
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);
    dispatcher.dispatch(ReplCommand::Create).await.unwrap();

    dispatcher.dispatch(ReplCommand::Destroy).await.unwrap();
    assert_eq!(dispatcher.phase(), Phase::Serving(ID), "declined");
    assert!(reporter.contains("destroy cancelled"));
    assert!(cp.deletes.lock().unwrap().is_empty());

    dispatcher.dispatch(ReplCommand::Destroy).await.unwrap();
    assert_eq!(dispatcher.phase(), Phase::Idle);
    assert_eq!(cp.deletes.lock().unwrap().as_slice(), [ID]);
    assert_eq!(prompter.asked.lock().unwrap().len(), 2);
    assert!(reporter.contains(&format!("droplet {ID} destroyed")));
}

#[tokio::test]
async fn destroy_after_download_does_not_ask() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    host.put("out.tar.gz", b"w");
    let cp = Arc::new(ScriptedControlPlane::new(ID));
    let (provisioner, _) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default();
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);

    dispatcher.dispatch(ReplCommand::Create).await.unwrap();
    dispatcher.dispatch(ReplCommand::Download).await.unwrap();
    dispatcher.dispatch(ReplCommand::Destroy).await.unwrap();

    assert_eq!(dispatcher.phase(), Phase::Idle);
    assert!(prompter.asked.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_destroy_keeps_instance_tracked() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    host.put("out.tar.gz", b"w");
    let cp = Arc::new(ScriptedControlPlane::new(ID).delete_status(500));
    let (provisioner, reporter) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default();
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);

    dispatcher.dispatch(ReplCommand::Create).await.unwrap();
    dispatcher.dispatch(ReplCommand::Download).await.unwrap();
    dispatcher.dispatch(ReplCommand::Destroy).await.unwrap();

    assert_eq!(dispatcher.phase(), Phase::Tracked(ID));
    assert!(reporter.contains("failed with HTTP status code 500"));
}

#[tokio::test]
async fn recover_prompts_for_id_and_rebuilds() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    let cp = Arc::new(ScriptedControlPlane::new(ID));
    let (provisioner, _) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default().answering(" 3164444 ");
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);

    dispatcher.dispatch_line("recover").await.unwrap();

    assert_eq!(dispatcher.phase(), Phase::Serving(ID));
    assert_eq!(cp.rebuilds.lock().unwrap()[0].0, ID);
    assert!(cp.creates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn recover_with_bad_id_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    let cp = Arc::new(ScriptedControlPlane::new(ID));
    let (provisioner, _) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default().answering("droplet");
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);

    let err = dispatcher.dispatch(ReplCommand::Recover(None)).await.unwrap_err();

    assert_eq!(
        dispatch_error(&err),
        Some(&DispatchError::InvalidInstanceId("droplet".into()))
    );
    assert_eq!(dispatcher.phase(), Phase::Idle);
    assert_eq!(cp.fetches(), 0);
}

#[tokio::test]
async fn failed_provisioning_keeps_instance_for_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    host.script("wget", &[4]);
    let cp = Arc::new(ScriptedControlPlane::new(ID));
    let (provisioner, _) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default();
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);

    assert!(dispatcher.dispatch(ReplCommand::Create).await.is_err());
    assert_eq!(dispatcher.phase(), Phase::Tracked(ID));

    // The installer download works the second time round.
    dispatcher.dispatch_line(&format!("recover {ID}")).await.unwrap();
    assert_eq!(dispatcher.phase(), Phase::Serving(ID));
}

#[tokio::test]
async fn session_commands_need_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    let cp = Arc::new(ScriptedControlPlane::new(ID));
    let (provisioner, _) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default();
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);

    let err = dispatcher.dispatch_line("download").await.unwrap_err();
    assert_eq!(dispatch_error(&err), Some(&DispatchError::NoSession));
    let err = dispatcher.dispatch_line("destroy").await.unwrap_err();
    assert_eq!(dispatch_error(&err), Some(&DispatchError::NoInstance));
    assert!(host.events().is_empty());
}

#[tokio::test]
async fn help_and_exit_flow() {
    let dir = tempfile::tempdir().unwrap();
    let host = RemoteHost::new();
    let cp = Arc::new(ScriptedControlPlane::new(ID));
    let (provisioner, reporter) = provisioner(test_config(dir.path()), &cp, &host);
    let prompter = ScriptedPrompter::default();
    let mut dispatcher = Dispatcher::new(provisioner, &prompter);

    assert_eq!(dispatcher.dispatch_line("help").await.unwrap(), Flow::Help);
    dispatcher.dispatch_line("create").await.unwrap();
    assert_eq!(dispatcher.dispatch_line("exit").await.unwrap(), Flow::Exit);

    assert_eq!(host.events().last().map(String::as_str), Some("close"));
    assert!(reporter.contains(&format!("droplet {ID} is still running")));
    assert!(cp.deletes.lock().unwrap().is_empty());
}
