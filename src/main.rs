//! RoboRemote client CLI
//!
//! Runs a single test session against a device from the command line, or
//! probes whether a harness answers on a local port.

use clap::Parser;
use commands::Commands;
use roboremote::{cli, commands};

#[derive(Parser)]
#[command(name = "roboremote", about = "Host-side session driver for RoboRemote tests")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
