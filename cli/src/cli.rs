//! CLI argument parsing with clap derive

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;
use crate::domain::InstanceId;
use crate::infra::control_plane::DigitalOceanClient;

/// Ephemeral Minecraft servers on DigitalOcean droplets
///
/// Without a subcommand, starts the interactive prompt.
#[derive(Parser)]
#[command(name = "mc-auto", version, propagate_version = true)]
pub struct Cli {
    /// Configuration file (default: ./config.json, ./config.yaml, ~/.mc-auto/config.yaml)
    #[arg(long, global = true, env = "MC_AUTO_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Answer yes to confirmations
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Destroy a droplet left running by an earlier session
    Destroy {
        /// Droplet ID
        id: InstanceId,
    },

    /// Show a droplet's status and addresses
    Status {
        /// Droplet ID
        id: InstanceId,
    },
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the command
    /// fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            config,
            quiet,
            no_color,
            yes,
            verbose: _,
            command,
        } = self;
        let app = AppContext::new(AppFlags {
            output: OutputFlags { no_color, quiet },
            behaviour: BehaviourFlags { yes, config },
        });
        let config = app.load_config()?;

        match command {
            None => commands::repl::run(&app, config).await,
            Some(Command::Destroy { id }) => {
                let cp = DigitalOceanClient::new(config.api_base_url.0, config.api_token)?;
                commands::destroy::run(&app, &cp, id).await
            }
            Some(Command::Status { id }) => {
                let cp = DigitalOceanClient::new(config.api_base_url.0, config.api_token)?;
                commands::status::run(&app, &cp, id).await
            }
        }
    }
}
