use anyhow::{bail, Context, Result};
use colored::Colorize;
use dialoguer::{Confirm, Select};
use std::fs;
use std::path::{Path, PathBuf};

use quill_core::api::HttpTransport;
use quill_core::config::{get_config, Config};
use quill_core::models::BookRef;
use quill_core::sync::{PushOutcome, SyncEngine};
use quill_core::{dirty, store};

fn engine() -> Result<SyncEngine<HttpTransport>> {
    let config = get_config();
    let base_url = config
        .api
        .base_url
        .as_deref()
        .context("no API base URL configured; run `quill setup --url <url>`")?;
    let transport = HttpTransport::new(base_url, config.api.token.as_deref())?;
    Ok(SyncEngine::new(transport).with_media_dir(config.media_dir()))
}

/// Resolve a folder argument against the content directory.
fn resolve_folder(folder: &str) -> PathBuf {
    let path = Path::new(folder);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        get_config().content_dir().join(folder)
    }
}

fn existing_folder(folder: &str) -> Result<PathBuf> {
    let path = resolve_folder(folder);
    if !path.is_dir() {
        bail!("folder does not exist: {}", path.display());
    }
    Ok(path)
}

/// Handle the 'pull' command: warn about unpushed local changes, then
/// overwrite the folder from the remote collection.
pub async fn pull(folder: &str, force: bool, json: bool) -> Result<()> {
    let path = existing_folder(folder)?;

    if !force && dirty::folder_needs_sync(&path)? {
        let proceed = Confirm::new()
            .with_prompt(
                "Local changes under this folder have not been pushed and will be destroyed. Pull anyway?",
            )
            .default(false)
            .interact()?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let outcome = engine()?.pull(&path).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "book_id": outcome.book_id,
                "pages_written": outcome.pages_written,
            })
        );
    } else {
        println!(
            "{} {} page(s) from book {}",
            "Pulled".green(),
            outcome.pages_written,
            outcome.book_id
        );
    }

    Ok(())
}

/// Handle the 'push' command.
pub async fn push(folder: &str, json: bool) -> Result<()> {
    let path = existing_folder(folder)?;
    let outcome = engine()?.push(&path).await?;

    if json {
        let value = match &outcome {
            PushOutcome::Pushed { pushed, refreshed } => serde_json::json!({
                "pushed": pushed,
                "errors": 0,
                "refreshed_pages": refreshed.pages_written,
            }),
            PushOutcome::Partial { pushed, errors } => serde_json::json!({
                "pushed": pushed,
                "errors": errors,
            }),
            PushOutcome::NothingChanged => serde_json::json!({
                "pushed": 0,
                "errors": 0,
            }),
        };
        println!("{value}");
        return Ok(());
    }

    match outcome {
        PushOutcome::Pushed { pushed, refreshed } => {
            println!(
                "{} {} document(s); refreshed {} page(s) from the server",
                "Pushed".green(),
                pushed,
                refreshed.pages_written
            );
        }
        PushOutcome::Partial { pushed, errors } => {
            println!(
                "{} {} document(s) pushed, {} failed; refresh skipped",
                "Partial:".yellow(),
                pushed,
                errors
            );
        }
        PushOutcome::NothingChanged => {
            println!("Nothing changed.");
        }
    }

    Ok(())
}

/// Handle the 'status' command: per-document dirty listing.
pub fn status(folder: &str, json: bool) -> Result<()> {
    let path = existing_folder(folder)?;

    let mut entries = Vec::new();
    for file in store::list_markdown_files(&path)? {
        if store::is_sentinel(&file) {
            continue;
        }
        let is_dirty = match store::read_document(&file) {
            Ok(doc) => dirty::needs_sync(
                &doc.header,
                store::modified_at(&file)?,
                &store::current_title(&file),
            ),
            // Undecodable files would error during push; show them as dirty.
            Err(_) => true,
        };
        let display = file
            .strip_prefix(&path)
            .unwrap_or(&file)
            .to_string_lossy()
            .to_string();
        entries.push((display, is_dirty));
    }

    if json {
        let value: Vec<_> = entries
            .iter()
            .map(|(file, is_dirty)| serde_json::json!({"file": file, "dirty": is_dirty}))
            .collect();
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No documents under {}", path.display());
        return Ok(());
    }

    let mut dirty_count = 0;
    for (file, is_dirty) in &entries {
        if *is_dirty {
            dirty_count += 1;
            println!("{} {}", "M".yellow(), file);
        } else {
            println!("  {file}");
        }
    }
    if dirty_count == 0 {
        println!("{}", "Everything synced.".green());
    } else {
        println!("{dirty_count} document(s) would be pushed");
    }

    Ok(())
}

/// Handle the 'books' command to list remote collections.
pub async fn books(json: bool) -> Result<()> {
    let books = engine()?.list_books().await?;

    if json {
        println!("{}", serde_json::to_string(&books)?);
        return Ok(());
    }

    if books.is_empty() {
        println!("No collections found.");
        return Ok(());
    }

    for book in &books {
        println!("{:>6}  {}", book.id.to_string().cyan(), book.subject);
    }

    Ok(())
}

/// Handle the 'link' command: write a sentinel binding a folder to a
/// remote collection.
pub async fn link(folder: &str, book: Option<i64>, force: bool) -> Result<()> {
    let path = resolve_folder(folder);
    fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create folder: {}", path.display()))?;

    if let Some(existing) = store::read_book(&path) {
        if !force {
            bail!(
                "folder is already linked to \"{}\" (id {}); use --force to overwrite",
                existing.title,
                existing.id
            );
        }
    }

    let books = engine()?.list_books().await?;
    if books.is_empty() {
        bail!("the remote side has no collections to link to");
    }

    let chosen = match book {
        Some(id) => books
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .with_context(|| format!("no remote collection with id {id}"))?,
        None => {
            let labels: Vec<String> = books
                .iter()
                .map(|b| format!("{} ({})", b.subject, b.id))
                .collect();
            let index = Select::new()
                .with_prompt("Link to which collection?")
                .items(&labels)
                .default(0)
                .interact()?;
            books[index].clone()
        }
    };

    store::write_book(
        &path,
        &BookRef {
            id: chosen.id,
            title: chosen.subject.clone(),
        },
    )?;
    println!("{} {} -> {}", "Linked".green(), path.display(), chosen.subject);

    Ok(())
}

/// Handle the 'setup' command: persist transport configuration.
pub fn setup(url: Option<&str>, token: Option<&str>) -> Result<()> {
    if url.is_none() && token.is_none() {
        bail!("nothing to configure; pass --url and/or --token");
    }

    let mut config = Config::load()?;
    if let Some(url) = url {
        config.api.base_url = Some(url.to_string());
    }
    if let Some(token) = token {
        config.api.token = Some(token.to_string());
    }
    config.save()?;

    println!("Configuration saved.");
    Ok(())
}
