//! Destination directory watcher.
//!
//! A thin wrapper around `notify` that forwards raw notifications into a tokio
//! channel. Only "a file appeared" notifications are interesting downstream;
//! [`appeared_file_name`] performs that classification.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Result, ThumbnailError};
use crate::thumbnail::file_name_of;

pub(crate) enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("paths", &event.paths)
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// Live watch on one directory. Dropping it stops the notify stream.
pub(crate) struct DirWatch {
    dir: PathBuf,
    watcher: RecommendedWatcher,
}

impl DirWatch {
    pub(crate) fn start(dir: &Path, tx: mpsc::UnboundedSender<WatchMessage>) -> Result<Self> {
        let watched = dir.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                let message = match res {
                    Ok(event) => WatchMessage::Event(event),
                    Err(err) => WatchMessage::Error(err.to_string()),
                };
                // Receiver is gone once the execution has finished.
                if tx.send(message).is_err() {
                    debug!(dir = %watched.display(), "watch event after execution finished");
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|source| ThumbnailError::Watch {
            path: dir.to_path_buf(),
            source,
        })?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| ThumbnailError::Watch {
                path: dir.to_path_buf(),
                source,
            })?;

        debug!(dir = %dir.display(), "watching destination directory");
        Ok(Self {
            dir: dir.to_path_buf(),
            watcher,
        })
    }

    pub(crate) fn close(mut self) {
        if let Err(err) = self.watcher.unwatch(&self.dir) {
            warn!(dir = %self.dir.display(), error = %err, "failed to unwatch destination directory");
        }
        debug!(dir = %self.dir.display(), "watch closed");
    }
}

impl fmt::Debug for DirWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirWatch").field("dir", &self.dir).finish()
    }
}

/// Base name of the file an event brought into existence, if any.
///
/// Creations and the target side of renames count; modifications, removals,
/// accesses and the source side of a rename do not.
pub(crate) fn appeared_file_name(event: &Event) -> Option<String> {
    let path = match event.kind {
        EventKind::Create(_) => event.paths.first()?,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.get(1)?,
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            event.paths.first()?
        }
        _ => return None,
    };
    file_name_of(path)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};

    use super::*;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn classifies_appearing_files() {
        let created = event(EventKind::Create(CreateKind::File), &["/out/000001.jpg"]);
        assert_eq!(appeared_file_name(&created).as_deref(), Some("000001.jpg"));

        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/out/000002.jpg.tmp", "/out/000002.jpg"],
        );
        assert_eq!(appeared_file_name(&renamed).as_deref(), Some("000002.jpg"));

        let moved_in = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/out/000003.jpg"],
        );
        assert_eq!(appeared_file_name(&moved_in).as_deref(), Some("000003.jpg"));
    }

    #[test]
    fn ignores_other_event_kinds() {
        for kind in [
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            EventKind::Remove(RemoveKind::File),
            EventKind::Access(AccessKind::Any),
            EventKind::Other,
        ] {
            let ev = event(kind, &["/out/000001.jpg"]);
            assert!(appeared_file_name(&ev).is_none(), "{:?}", ev.kind);
        }
        let empty = Event::new(EventKind::Create(CreateKind::File));
        assert!(appeared_file_name(&empty).is_none());
    }

    #[tokio::test]
    async fn forwards_created_files() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watch = DirWatch::start(dir.path(), tx).unwrap();

        std::fs::write(dir.path().join("000000.jpg"), b"jpg").unwrap();

        let name = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(message) = rx.recv().await {
                if let WatchMessage::Event(event) = message {
                    if let Some(name) = appeared_file_name(&event) {
                        return Some(name);
                    }
                }
            }
            None
        })
        .await
        .expect("watch event before timeout");

        assert_eq!(name.as_deref(), Some("000000.jpg"));
        watch.close();
    }

    #[test]
    fn missing_directory_is_a_watch_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = DirWatch::start(&dir.path().join("absent"), tx).unwrap_err();
        assert!(matches!(err, ThumbnailError::Watch { .. }));
    }
}
