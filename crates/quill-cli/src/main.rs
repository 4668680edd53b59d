mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Process commands
    match &cli.command {
        Commands::Pull { folder, force } => {
            cli::commands::pull(folder, *force, cli.json).await?;
        }
        Commands::Push { folder } => {
            cli::commands::push(folder, cli.json).await?;
        }
        Commands::Status { folder } => {
            cli::commands::status(folder, cli.json)?;
        }
        Commands::Books => {
            cli::commands::books(cli.json).await?;
        }
        Commands::Link {
            folder,
            book,
            force,
        } => {
            cli::commands::link(folder, *book, *force).await?;
        }
        Commands::Setup { url, token } => {
            cli::commands::setup(url.as_deref(), token.as_deref())?;
        }
    }

    Ok(())
}
