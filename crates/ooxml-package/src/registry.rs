use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use crate::config::ViewerConfig;
use crate::host::Host;
use crate::session::{OpenOutcome, PackageSession, SaveOutcome};
use crate::watch::{OnClosed, SessionWatch};
use crate::PackageError;

pub type SessionHandle = Arc<Mutex<PackageSession>>;

type SessionMap = Arc<StdMutex<HashMap<PathBuf, SessionHandle>>>;

/// The set of open packages, at most one session per archive path.
///
/// Sessions are keyed by canonical archive path. Opening a path that is already open tears
/// the old session down first.
pub struct SessionRegistry {
    storage_root: PathBuf,
    config: ViewerConfig,
    host: Arc<dyn Host>,
    sessions: SessionMap,
    watch_changes: bool,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("storage_root", &self.storage_root)
            .field("config", &self.config)
            .field("open", &self.open_archives())
            .field("watch_changes", &self.watch_changes)
            .finish()
    }
}

impl SessionRegistry {
    pub fn new(storage_root: impl Into<PathBuf>, config: ViewerConfig, host: Arc<dyn Host>) -> Self {
        Self {
            storage_root: storage_root.into(),
            config,
            host,
            sessions: Arc::default(),
            watch_changes: false,
        }
    }

    /// Watch opened archives and their normal caches for changes.
    pub fn with_watching(mut self, enabled: bool) -> Self {
        self.watch_changes = enabled;
        self
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Open (or reopen) the archive at `path`.
    ///
    /// Returns `Ok(None)` when the package was refused or could not be populated; the host
    /// has been told why. Errors are reserved for failures outside the package itself, such
    /// as a path that does not exist or a watcher that cannot start.
    pub async fn open(&self, path: &Path) -> Result<Option<SessionHandle>, PackageError> {
        let archive_path = path.canonicalize()?;
        let size = std::fs::metadata(&archive_path)?.len();
        let max = self.config.maximum_ooxml_file_size_bytes;
        if size > max {
            let err = PackageError::PackageTooLarge {
                path: archive_path,
                size,
                max,
            };
            let message = format!("{err}. Raise maximumOOXMLFileSizeBytes to open it.");
            log::warn!("{message}");
            self.host.show_warning(&message, true);
            return Ok(None);
        }

        self.close(&archive_path).await;

        // Watcher events carry canonical paths; the cache must be addressed the same way.
        std::fs::create_dir_all(&self.storage_root)?;
        let storage_root = self.storage_root.canonicalize()?;
        let session = PackageSession::new(
            &archive_path,
            &storage_root,
            self.config.clone(),
            self.host.clone(),
        );
        let handle: SessionHandle = Arc::new(Mutex::new(session));
        {
            let mut session = handle.lock().await;
            match session.open_package().await {
                OpenOutcome::Populated { .. } => {}
                OpenOutcome::TooManyParts { .. } => return Ok(None),
                OpenOutcome::Failed => {
                    session.teardown().await;
                    return Ok(None);
                }
            }

            if self.watch_changes {
                let watch = SessionWatch::spawn(
                    Arc::downgrade(&handle),
                    &archive_path,
                    &session.cache().normal_dir(),
                    session.gate(),
                    self.on_closed(&archive_path, &handle),
                );
                match watch {
                    Ok(watch) => session.attach_watch(watch),
                    Err(err) => {
                        session.teardown().await;
                        return Err(err);
                    }
                }
            }
        }

        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(archive_path, handle.clone());
        }
        Ok(Some(handle))
    }

    /// Removes the registry entry, but only if it still points at `handle`; a reopen may
    /// have replaced it in the meantime.
    fn on_closed(&self, archive_path: &Path, handle: &SessionHandle) -> OnClosed {
        let sessions = Arc::clone(&self.sessions);
        let archive_path = archive_path.to_path_buf();
        let handle = Arc::downgrade(handle);
        Box::new(move || {
            let Ok(mut sessions) = sessions.lock() else {
                return;
            };
            let current = sessions.get(&archive_path).map(Arc::downgrade);
            if current.is_some_and(|current| current.ptr_eq(&handle)) {
                sessions.remove(&archive_path);
            }
        })
    }

    pub fn get(&self, path: &Path) -> Option<SessionHandle> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let sessions = self.sessions.lock().ok()?;
        sessions.get(&key).cloned()
    }

    pub fn open_archives(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .sessions
            .lock()
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    /// Tear down the session for `path`, if one is open.
    pub async fn close(&self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let removed = self
            .sessions
            .lock()
            .ok()
            .and_then(|mut sessions| sessions.remove(&key));
        match removed {
            Some(handle) => {
                handle.lock().await.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        for path in self.open_archives() {
            self.close(&path).await;
        }
    }

    /// Route "a cached document was saved" to the session that owns `cache_path`.
    pub async fn document_saved(&self, cache_path: &Path) -> SaveOutcome {
        for handle in self.handles() {
            let mut session = handle.lock().await;
            if session.cache().path_belongs_to_cache(cache_path) {
                return session.update_ooxml_file(cache_path).await;
            }
        }
        SaveOutcome::Ignored
    }

    /// Route "a cached document was opened" to the session that owns `cache_path`.
    pub async fn document_opened(&self, cache_path: &Path) -> bool {
        for handle in self.handles() {
            let session = handle.lock().await;
            if session.cache().path_belongs_to_cache(cache_path) {
                return session.try_format_document(cache_path).await;
            }
        }
        false
    }

    fn handles(&self) -> Vec<SessionHandle> {
        self.sessions
            .lock()
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }
}
