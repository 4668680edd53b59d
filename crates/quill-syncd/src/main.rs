mod watcher;

use anyhow::Result;
use clap::Parser;
use quill_core::config::Config;
use quill_core::reconcile::{Reconciled, Reconciler, SyncEvent};
use quill_core::sync::SyncGate;
use std::path::PathBuf;
use std::time::Duration;

use crate::watcher::FileWatcher;

#[derive(Parser)]
#[command(
    name = "quill-syncd",
    about = "Background reconciliation daemon for quill"
)]
struct Args {
    /// Path to configuration file (defaults to ~/.config/quill/quill.toml)
    #[arg(long)]
    config: Option<String>,

    /// Run in foreground mode (don't daemonize)
    #[arg(long)]
    foreground: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load_from(&expand_path(path))?,
        None => Config::load()?,
    };

    let content_dir = config.content_dir();
    std::fs::create_dir_all(&content_dir)?;

    if args.verbose {
        println!("quill-syncd watching {}", content_dir.display());
        match &config.api.base_url {
            Some(url) => println!("Remote service: {url}"),
            None => println!("No remote service configured - stamping headers only"),
        }
    }

    // Initialize file watcher
    let mut watcher = FileWatcher::new(&content_dir)?;

    // The gate is idle here: the daemon never runs pull/push itself, but the
    // reconciler still honors it and the settle delay below.
    let gate = SyncGate::new();
    let mut reconciler = Reconciler::new(content_dir.clone(), gate);

    if !args.foreground {
        println!("quill-syncd daemon started");
        // TODO: Daemonize process (platform-specific)
    }

    let settle = tokio::time::sleep(Duration::from_millis(config.daemon.settle_ms));
    tokio::pin!(settle);

    // Main event loop
    loop {
        tokio::select! {
            // Startup layout settles once; creation events count from here on
            _ = &mut settle, if !reconciler.is_settled() => {
                reconciler.settle();
                if args.verbose {
                    println!("Startup layout settled; watching for new documents");
                }
            }

            // Handle file system events
            event = watcher.next_event() => {
                if let Some(event) = event {
                    handle_event(&mut reconciler, &event, args.verbose);
                }
            }

            // Handle shutdown signals
            _ = tokio::signal::ctrl_c() => {
                println!("Received shutdown signal, stopping quill-syncd");
                break;
            }
        }
    }

    Ok(())
}

fn handle_event(reconciler: &mut Reconciler, event: &SyncEvent, verbose: bool) {
    match reconciler.handle(event) {
        Ok(Reconciled::FolderRenameIgnored) => {
            eprintln!(
                "quill-syncd: folder renames are not propagated to the remote side; \
                 rename the corresponding document instead"
            );
        }
        Ok(outcome) => {
            if verbose && outcome != Reconciled::Skipped {
                println!("Reconciled {event:?}: {outcome:?}");
            }
        }
        Err(e) => {
            eprintln!("quill-syncd: failed to reconcile {event:?}: {e:#}");
        }
    }
}

fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
