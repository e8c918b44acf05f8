//! Command-line front end for the mailtunnel forwarder
//!
//! - `deliver` feeds one message from stdin through the forwarder
//! - `resolve` shows who an alias reaches
//! - `check` validates the configuration

use std::{net::SocketAddr, path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::{Parser, Subcommand};
use mailtunnel::Mailtunnel;
use mailtunnel_common::logging;
use tokio::io::AsyncReadExt;

/// Resolve organisation aliases and forward mail to them
#[derive(Parser, Debug)]
#[command(name = "mailtunnel")]
#[command(about = "Forward mail to organisation aliases", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file, instead of searching the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Forward the message on stdin and print the reply
    Deliver {
        /// Where the message came from
        #[arg(long, default_value = "127.0.0.1:25")]
        peer: SocketAddr,

        /// Envelope sender
        #[arg(long)]
        from: String,

        /// Envelope recipients
        #[arg(long = "to", required = true)]
        to: Vec<String>,
    },
    /// Print the addresses each alias reaches
    Resolve {
        /// Aliases such as `best+fu-kass`
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Validate the configuration
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Mailtunnel::find_config_file()?,
    };
    let config = Mailtunnel::load(&config_path)?;
    logging::init(&config.logging).context("Could not open the log file")?;

    match cli.command {
        Commands::Deliver { peer, from, to } => {
            let mut data = Vec::new();
            tokio::io::stdin().read_to_end(&mut data).await?;

            let reply = config.service()?.deliver(peer, &from, &to, &data).await;
            println!("{reply}");

            Ok(if reply.is_accepted() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Resolve { names } => {
            let service = config.service()?;
            let mut status = ExitCode::SUCCESS;

            for name in names {
                match service.resolve(&name) {
                    Ok(translated) => {
                        println!("{name}:");
                        for (address, origin) in translated {
                            println!("  {address} ({origin})");
                        }
                    }
                    Err(err) => {
                        eprintln!("{name}: {err}");
                        status = ExitCode::FAILURE;
                    }
                }
            }

            Ok(status)
        }
        Commands::Check => {
            config.validate()?;
            println!(
                "{}: {} groups, {} people",
                config_path.display(),
                config.facts.groups.len(),
                config.facts.people.len()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
