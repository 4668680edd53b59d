use anyhow::{Context, Result};
use notify::event::{AccessKind, CreateKind, ModifyKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use quill_core::reconcile::SyncEvent;
use std::path::Path;
use tokio::sync::mpsc;

pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl FileWatcher {
    pub fn new(content_dir: &Path) -> Result<Self> {
        let (tx, receiver) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                if tx.send(res).is_err() {
                    // Channel closed, watcher is being dropped
                }
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(content_dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch directory: {}", content_dir.display()))?;

        Ok(Self {
            _watcher: watcher,
            receiver,
        })
    }

    /// Next reconciler-relevant event; `None` for raw events that map to
    /// nothing, or when the watcher channel closes.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        match self.receiver.recv().await {
            Some(Ok(event)) => map_event(&event),
            Some(Err(e)) => {
                eprintln!("File watcher error: {e}");
                None
            }
            None => None,
        }
    }
}

/// Map a raw notify event onto the reconciler's event union.
fn map_event(event: &Event) -> Option<SyncEvent> {
    match event.kind {
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => {
            Some(SyncEvent::Created(event.paths.first()?.clone()))
        }
        // Renames surface the destination path last.
        EventKind::Modify(ModifyKind::Name(_)) => {
            Some(SyncEvent::Renamed(event.paths.last()?.clone()))
        }
        EventKind::Access(AccessKind::Open(_)) => {
            Some(SyncEvent::Opened(event.paths.first()?.clone()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessMode, DataChange, MetadataKind, RenameMode};
    use std::path::PathBuf;

    #[test]
    fn create_events_map_to_created() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tree/Guide/New.md"));
        assert_eq!(
            map_event(&event),
            Some(SyncEvent::Created(PathBuf::from("/tree/Guide/New.md")))
        );
    }

    #[test]
    fn renames_map_to_the_destination_path() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/tree/Guide/Old.md"))
            .add_path(PathBuf::from("/tree/Guide/New.md"));
        assert_eq!(
            map_event(&event),
            Some(SyncEvent::Renamed(PathBuf::from("/tree/Guide/New.md")))
        );
    }

    #[test]
    fn opens_map_to_opened() {
        let event = Event::new(EventKind::Access(AccessKind::Open(AccessMode::Any)))
            .add_path(PathBuf::from("/tree/Guide/Intro.md"));
        assert_eq!(
            map_event(&event),
            Some(SyncEvent::Opened(PathBuf::from("/tree/Guide/Intro.md")))
        );
    }

    #[test]
    fn content_and_metadata_churn_is_filtered() {
        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/tree/Guide/Intro.md"));
        assert_eq!(map_event(&modify), None);

        let metadata = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))
            .add_path(PathBuf::from("/tree/Guide/Intro.md"));
        assert_eq!(map_event(&metadata), None);
    }
}
