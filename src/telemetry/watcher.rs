//! # Directory watch: "file closed for writing" notifications.
//!
//! The watcher is an external collaborator. The controller only brackets the
//! ENABLED state with [`DirectoryWatch::watch`] / [`DirectoryWatch::unwatch`];
//! the ingestion loop only consumes [`FileEvents`].
//!
//! ```text
//! inotify ──► notify::RecommendedWatcher ──► callback ──► unbounded channel
//!                                                               │
//!                                 FileEvents (Arc<Mutex<rx>>) ◄─┘
//!                                        │
//!                     ingestion loop: lock ─► recv ─► dispatch
//! ```
//!
//! ## Rules
//! - The stream outlives every loop run: a cancelled ingestion loop releases
//!   the lock and the next run picks up where it left off.
//! - A closed channel is irrecoverable and ends the ingestion loop.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{AccessKind, AccessMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::ControllerError;

/// One watcher notification: a file opened for writing was closed.
///
/// Backends drop every other kind of file-system event before it reaches the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
}

impl FileEvent {
    pub fn closed_write(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Item carried by the notification stream; `Err` holds a backend error message.
pub type WatchResult = Result<FileEvent, String>;

/// Sending side of a notification stream.
pub type FileEventSender = mpsc::UnboundedSender<WatchResult>;

/// Locked receiving side, held by one ingestion loop run at a time.
pub type FileEventStream = OwnedMutexGuard<mpsc::UnboundedReceiver<WatchResult>>;

/// Shared, non-restartable notification stream.
#[derive(Clone, Debug)]
pub struct FileEvents {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<WatchResult>>>,
}

impl FileEvents {
    /// Creates a connected sender/stream pair.
    pub fn channel() -> (FileEventSender, FileEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            FileEvents {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Takes exclusive ownership of the stream until the guard is dropped.
    pub async fn lock(&self) -> FileEventStream {
        Arc::clone(&self.rx).lock_owned().await
    }
}

/// Watch registration for the telemetry directory.
pub trait DirectoryWatch: Send + 'static {
    /// Registers `dir`. Returns `Ok(false)` if it was already watched.
    fn watch(&mut self, dir: &Path) -> Result<bool, ControllerError>;

    /// Unregisters `dir`; unknown directories are ignored.
    fn unwatch(&mut self, dir: &Path);

    fn is_watching(&self, dir: &Path) -> bool;

    /// Notification stream shared by every watched directory.
    fn events(&self) -> FileEvents;
}

/// inotify-backed watcher (via `notify`) emitting close-for-write notifications.
pub struct NotifyWatcher {
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
    events: FileEvents,
}

impl NotifyWatcher {
    pub fn new() -> Result<Self, ControllerError> {
        let (tx, events) = FileEvents::channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(ev) => {
                    if !matches!(
                        ev.kind,
                        notify::EventKind::Access(AccessKind::Close(AccessMode::Write))
                    ) {
                        return;
                    }
                    for path in ev.paths {
                        let _ = tx.send(Ok(FileEvent { path }));
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e.to_string()));
                }
            }
        })
        .map_err(|e| ControllerError::Watch(e.to_string()))?;

        Ok(Self {
            watcher,
            watched: HashSet::new(),
            events,
        })
    }
}

impl DirectoryWatch for NotifyWatcher {
    fn watch(&mut self, dir: &Path) -> Result<bool, ControllerError> {
        if self.watched.contains(dir) {
            debug!(dir = %dir.display(), "watch already registered");
            return Ok(false);
        }
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| ControllerError::Watch(format!("{}: {e}", dir.display())))?;
        self.watched.insert(dir.to_path_buf());
        debug!(dir = %dir.display(), "watch registered");
        Ok(true)
    }

    fn unwatch(&mut self, dir: &Path) {
        if self.watched.remove(dir) {
            if let Err(e) = self.watcher.unwatch(dir) {
                warn!(dir = %dir.display(), error = %e, "failed to remove watch");
            }
        }
    }

    fn is_watching(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    fn events(&self) -> FileEvents {
        self.events.clone()
    }
}

/// Watcher fed by hand through [`ChannelWatcher::sender`].
///
/// For embedding with an external notification source.
pub struct ChannelWatcher {
    tx: FileEventSender,
    watched: HashSet<PathBuf>,
    events: FileEvents,
}

impl ChannelWatcher {
    pub fn new() -> Self {
        let (tx, events) = FileEvents::channel();
        Self {
            tx,
            watched: HashSet::new(),
            events,
        }
    }

    pub fn sender(&self) -> FileEventSender {
        self.tx.clone()
    }
}

impl Default for ChannelWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryWatch for ChannelWatcher {
    fn watch(&mut self, dir: &Path) -> Result<bool, ControllerError> {
        Ok(self.watched.insert(dir.to_path_buf()))
    }

    fn unwatch(&mut self, dir: &Path) {
        self.watched.remove(dir);
    }

    fn is_watching(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    fn events(&self) -> FileEvents {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_channel_watcher_registration_is_idempotent() {
        let mut w = ChannelWatcher::new();
        let dir = Path::new("/tmp/dsm-watch");
        assert!(w.watch(dir).unwrap());
        assert!(!w.watch(dir).unwrap());
        assert!(w.is_watching(dir));
        w.unwatch(dir);
        assert!(!w.is_watching(dir));
    }

    #[tokio::test]
    async fn test_stream_survives_relock() {
        let (tx, events) = FileEvents::channel();
        tx.send(Ok(FileEvent::closed_write("/a.dat"))).unwrap();
        tx.send(Ok(FileEvent::closed_write("/b.dat"))).unwrap();

        {
            let mut stream = events.lock().await;
            let first = stream.recv().await.unwrap().unwrap();
            assert_eq!(first.path, PathBuf::from("/a.dat"));
        }
        let mut stream = events.lock().await;
        let second = stream.recv().await.unwrap().unwrap();
        assert_eq!(second.path, PathBuf::from("/b.dat"));
    }

    #[tokio::test]
    async fn test_notify_watcher_reports_closed_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = NotifyWatcher::new().unwrap();
        assert!(watcher.watch(dir.path()).unwrap());
        assert!(!watcher.watch(dir.path()).unwrap());

        let target = dir.path().join("dsm_test.dat");
        {
            let mut f = std::fs::File::create(&target).unwrap();
            f.write_all(b"x").unwrap();
        }

        let events = watcher.events();
        let mut stream = events.lock().await;
        let ev = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match stream.recv().await {
                    Some(Ok(ev)) if ev.path == target => break ev,
                    Some(_) => continue,
                    None => panic!("watch stream closed"),
                }
            }
        })
        .await
        .expect("no close-write notification");
        assert_eq!(ev, FileEvent::closed_write(&target));
    }
}
