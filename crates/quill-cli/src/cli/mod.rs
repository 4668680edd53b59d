pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(
    name = "quill",
    about = "Two-way sync between a local document tree and a remote book service"
)]
#[clap(version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[clap(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Overwrite a linked folder with its remote collection (destructive)
    #[clap(name = "pull")]
    Pull {
        /// Folder linked to a collection (relative to the content dir)
        folder: String,
        /// Skip the local-changes warning
        #[clap(long)]
        force: bool,
    },

    /// Push local changes under a linked folder to the remote collection
    #[clap(name = "push")]
    Push {
        /// Folder linked to a collection (relative to the content dir)
        folder: String,
    },

    /// Show which documents under a folder would be pushed
    #[clap(name = "status")]
    Status {
        /// Folder to inspect (relative to the content dir)
        folder: String,
    },

    /// List remote collections
    #[clap(name = "books")]
    Books,

    /// Link a folder to a remote collection by writing its sentinel file
    #[clap(name = "link")]
    Link {
        /// Folder to link (relative to the content dir; created if missing)
        folder: String,
        /// Collection id (skips the interactive picker)
        #[clap(long)]
        book: Option<i64>,
        /// Overwrite an existing link
        #[clap(long)]
        force: bool,
    },

    /// Configure the remote endpoint and token
    #[clap(name = "setup")]
    Setup {
        /// Base URL of the remote service
        #[clap(long)]
        url: Option<String>,
        /// API token
        #[clap(long)]
        token: Option<String>,
    },
}
