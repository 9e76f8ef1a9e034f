//! The interactive loop: banner, prompt, dispatch, report errors, repeat.

use std::sync::Arc;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::orchestrator::Provisioner;
use crate::commands::dispatch::{Dispatcher, Flow, ReplCommand};
use crate::domain::AppConfig;
use crate::infra::control_plane::DigitalOceanClient;
use crate::infra::payload::ArchivePayload;
use crate::infra::ssh::OpenSshConnector;
use crate::output::{OutputContext, TerminalReporter};

const PROMPT: &str = " >>> ";

const BANNER: &str = "\
Welcome to mc-auto!
Spawns a Fabric Minecraft server on a DigitalOcean droplet, uploads your
world and mods, and tears it all down again when you are done.";

/// `(command, description)` pairs shown by `help` and the banner.
pub const COMMANDS: [(&str, &str); 6] = [
    (
        "create",
        "Create a droplet, upload the world, start the server and print its IP address.",
    ),
    (
        "recover [id]",
        "Rebuild an existing droplet (the ID is asked for when omitted), then do the same as create.",
    ),
    (
        "download",
        "Stop the server and download a compressed backup of the world. Without it the world is lost!",
    ),
    (
        "destroy",
        "Destroy the droplet. You are charged for it until you do.",
    ),
    ("help", "Show this list."),
    ("exit", "Leave mc-auto. A running droplet keeps running."),
];

fn print_commands(ctx: &OutputContext) {
    let rows: Vec<_> = COMMANDS
        .iter()
        .map(|(name, description)| (*name, (*description).to_owned()))
        .collect();
    ctx.table("Commands:", &rows);
}

/// Run the interactive loop until `exit` or end of input.
///
/// Command failures are printed and logged; the loop keeps going.
///
/// # Errors
///
/// Returns an error only if the production adapters cannot be built.
pub async fn run(app: &AppContext, config: AppConfig) -> Result<()> {
    let config = Arc::new(config);
    let control_plane = Arc::new(DigitalOceanClient::new(
        config.api_base_url.0.clone(),
        config.api_token.clone(),
    )?);
    let connector = Arc::new(OpenSshConnector::new(&config.ssh));
    let reporter = Arc::new(TerminalReporter::new(&app.output));
    let provisioner = Provisioner::new(
        control_plane,
        connector,
        Arc::new(ArchivePayload),
        reporter,
        Arc::clone(&config),
    );
    let mut dispatcher = Dispatcher::new(provisioner, app);

    app.output.notice(BANNER);
    print_commands(&app.output);

    loop {
        let Some(line) = app.read_line(PROMPT).await? else {
            dispatcher.dispatch(ReplCommand::Exit).await?;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match dispatcher.dispatch_line(&line).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Help) => print_commands(&app.output),
            Ok(Flow::Exit) => break,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), input = %line.trim(), "command failed");
                app.output.error(&format!("{e:#}"));
            }
        }
    }
    Ok(())
}
