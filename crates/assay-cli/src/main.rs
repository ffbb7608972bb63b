use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    export::{self, ExportArgs},
    inspect::{self, InspectArgs},
    process::{self, ProcessArgs},
    refit::{self, RefitArgs},
};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "assay", about = "Assay plate processing CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every plate of a project and save the archive.
    Process(ProcessArgs),
    /// Write result and upload tables from an archive.
    Export(ExportArgs),
    /// Summarise an archive.
    Inspect(InspectArgs),
    /// Mask a point or change the displayed fit, then save a new archive.
    Refit(RefitArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Process(args) => process::run(&args),
        Command::Export(args) => export::run(&args),
        Command::Inspect(args) => inspect::run(&args),
        Command::Refit(args) => refit::run(&args),
    }
}
