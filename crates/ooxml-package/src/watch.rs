//! File-system watching for an open session.
//!
//! Two watches feed one channel: the directory holding the archive (so replace-by-rename and
//! deletion are seen) and the normal cache directory (so edits saved by an external editor
//! flow back into the archive). A tokio task drains the channel and drives the session.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::gate::ReloadGate;
use crate::session::{OpenOutcome, PackageSession};
use crate::PackageError;

const SETTLE: Duration = Duration::from_millis(100);

/// Called once when the watch task ends the session on its own (archive deleted, or a
/// reload found too many parts).
pub type OnClosed = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The archive file was created, modified, replaced or removed.
    ArchiveTouched,
    /// A file under the normal cache directory was written.
    CachedPartSaved(PathBuf),
}

/// Live watch of one session. Dropping it stops the watcher and aborts its task.
pub struct SessionWatch {
    // Never read; owning it keeps the OS watch registered.
    _watcher: StdMutex<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for SessionWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWatch")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl Drop for SessionWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SessionWatch {
    /// Start watching for `session`, whose state is passed in because the caller usually
    /// holds the session lock already.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        session: Weak<Mutex<PackageSession>>,
        archive_path: &Path,
        normal_dir: &Path,
        gate: Arc<ReloadGate>,
        on_closed: OnClosed,
    ) -> Result<Self, PackageError> {
        std::fs::create_dir_all(normal_dir)?;
        let normal_dir = normal_dir.canonicalize()?;
        let archive_path = archive_path.to_path_buf();
        let archive_dir = archive_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = {
            let archive_path = archive_path.clone();
            let normal_dir = normal_dir.clone();
            RecommendedWatcher::new(
                move |res: notify::Result<notify::Event>| match res {
                    Ok(event) => {
                        if let Some(mapped) = map_event(&event, &archive_path, &normal_dir) {
                            let _ = tx.send(mapped);
                        }
                    }
                    Err(err) => log::warn!("watch error: {err}"),
                },
                Config::default(),
            )?
        };
        watcher.watch(&archive_dir, RecursiveMode::NonRecursive)?;
        watcher.watch(&normal_dir, RecursiveMode::Recursive)?;
        log::debug!(
            "watching {} and {}",
            archive_path.display(),
            normal_dir.display()
        );

        let task = tokio::spawn(run(session, gate, archive_path, rx, on_closed));
        Ok(Self {
            _watcher: StdMutex::new(watcher),
            task,
        })
    }
}

async fn run(
    session: Weak<Mutex<PackageSession>>,
    gate: Arc<ReloadGate>,
    archive_path: PathBuf,
    mut events: UnboundedReceiver<WatchEvent>,
    on_closed: OnClosed,
) {
    while let Some(first) = events.recv().await {
        // A single save usually arrives as a burst of events; handle the burst once it settles.
        tokio::time::sleep(SETTLE).await;
        let mut pending = vec![first];
        while let Ok(event) = events.try_recv() {
            if !pending.contains(&event) {
                pending.push(event);
            }
        }

        let Some(session) = session.upgrade() else {
            break;
        };
        for event in pending {
            match event {
                WatchEvent::ArchiveTouched => {
                    if !archive_path.exists() {
                        log::info!("{} was deleted, closing it", archive_path.display());
                        let watch = {
                            let mut session = session.lock().await;
                            session.teardown().await;
                            session.take_watch()
                        };
                        on_closed();
                        // Aborts this task; nothing may await after it.
                        drop(watch);
                        return;
                    }

                    let modified = std::fs::metadata(&archive_path)
                        .and_then(|meta| meta.modified())
                        .ok();
                    let Some(_ticket) = gate.try_begin(modified) else {
                        continue;
                    };
                    let mut guard = session.lock().await;
                    if let OpenOutcome::TooManyParts { .. } = guard.open_package().await {
                        let watch = guard.take_watch();
                        drop(guard);
                        on_closed();
                        drop(watch);
                        return;
                    }
                }
                WatchEvent::CachedPartSaved(path) => {
                    if !path.is_file() {
                        continue;
                    }
                    let outcome = session.lock().await.update_ooxml_file(&path).await;
                    log::debug!("save of {} -> {outcome:?}", path.display());
                }
            }
        }
    }
}

fn map_event(event: &notify::Event, archive_path: &Path, normal_dir: &Path) -> Option<WatchEvent> {
    if matches!(event.kind, EventKind::Access(_)) {
        return None;
    }
    if event.paths.iter().any(|path| path == archive_path) {
        return Some(WatchEvent::ArchiveTouched);
    }

    let written = match event.kind {
        EventKind::Create(_) => event.paths.first(),
        EventKind::Modify(ModifyKind::Name(_)) => event.paths.last(),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            event.paths.first()
        }
        _ => None,
    }?;
    written
        .starts_with(normal_dir)
        .then(|| WatchEvent::CachedPartSaved(written.clone()))
}
