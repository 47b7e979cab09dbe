use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::state;

#[derive(Args)]
pub struct TargetArgs {
    #[command(subcommand)]
    command: TargetCommands,
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Set the default local database path
    Set {
        /// The database file to replicate into
        path: String,
    },
    /// Unset the default local database path
    Unset,
    /// Show the current default local database path
    Get,
}

pub fn command(args: TargetArgs) -> Result<()> {
    match args.command {
        TargetCommands::Set { path } => {
            let mut state = state::load().context("Failed to load state")?;
            state.database_path = Some(path.clone());
            state::save(&state).context("Failed to save state")?;
            println!("Target database path set to: {}", path);
        }
        TargetCommands::Unset => {
            let mut state = state::load().context("Failed to load state")?;
            state.database_path = None;
            state::save(&state).context("Failed to save state")?;
            println!("Target database path unset.");
        }
        TargetCommands::Get => {
            let state = state::load().context("Failed to load state")?;
            match state.database_path {
                Some(path) => println!("Current target database path: {}", path),
                None => println!("Target database path is not set."),
            }
        }
    }
    Ok(())
}
