//! mc-auto - Ephemeral Minecraft servers on DigitalOcean droplets

use clap::Parser;

use mc_auto::cli::Cli;
use mc_auto::infra::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(e) = cli.run().await {
        tracing::debug!(error = ?e, "exiting with error");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
