//! On-disk cache of package parts.
//!
//! Each session gets its own base directory, `<storage root>/cache/<session hash>`, holding
//! three mirrors of the part tree: `normal` (what the user edits), `prev` (last content known
//! to match the archive) and `compare` (left side of diff views). The cache only stores and
//! retrieves bytes; deciding which variant to write is the session's job.
//!
//! I/O failures never propagate out of this module. They are logged, reported through
//! [`Host::show_error`], and the operation degrades to an empty result.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::Host;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheVariant {
    Normal,
    Prev,
    Compare,
}

impl CacheVariant {
    pub const ALL: [CacheVariant; 3] = [
        CacheVariant::Normal,
        CacheVariant::Prev,
        CacheVariant::Compare,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            CacheVariant::Normal => "normal",
            CacheVariant::Prev => "prev",
            CacheVariant::Compare => "compare",
        }
    }

    fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.dir_name() == name)
    }
}

/// Stable, filesystem-safe identifier for an archive path.
///
/// Two archives with the same file name in different directories get different hashes.
pub fn session_hash(archive_path: &Path) -> String {
    // Versioned so the naming scheme can change without reusing stale directories.
    const PREFIX: &[u8] = b"ooxml-viewer-session-v1\0";
    let mut hasher = Sha256::new();
    hasher.update(PREFIX);
    hasher.update(archive_path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

pub struct PartCache {
    base: PathBuf,
    host: Arc<dyn Host>,
}

impl PartCache {
    pub fn new(storage_root: &Path, archive_path: &Path, host: Arc<dyn Host>) -> Self {
        Self {
            base: storage_root.join("cache").join(session_hash(archive_path)),
            host,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn variant_dir(&self, variant: CacheVariant) -> PathBuf {
        self.base.join(variant.dir_name())
    }

    pub fn normal_dir(&self) -> PathBuf {
        self.variant_dir(CacheVariant::Normal)
    }

    pub fn file_path(&self, variant: CacheVariant, part: &str) -> PathBuf {
        let mut path = self.variant_dir(variant);
        path.extend(part.split('/').filter(|s| !s.is_empty()));
        path
    }

    pub fn normal_file_path(&self, part: &str) -> PathBuf {
        self.file_path(CacheVariant::Normal, part)
    }

    pub fn prev_file_path(&self, part: &str) -> PathBuf {
        self.file_path(CacheVariant::Prev, part)
    }

    pub fn compare_file_path(&self, part: &str) -> PathBuf {
        self.file_path(CacheVariant::Compare, part)
    }

    /// Create the base directory. Safe to call repeatedly.
    pub async fn init_cache(&self) {
        if let Err(err) = tokio::fs::create_dir_all(&self.base).await {
            self.report("create cache directory", &self.base, &err);
        }
    }

    /// Seed all three variants with `bytes` (no diff to show).
    pub async fn create_cached_files(&self, part: &str, bytes: &[u8]) {
        tokio::join!(
            self.write(CacheVariant::Normal, part, bytes),
            self.write(CacheVariant::Prev, part, bytes),
            self.write(CacheVariant::Compare, part, bytes),
        );
    }

    /// Seed normal and prev; compare starts empty so a diff shows the whole part as added.
    pub async fn create_cached_files_with_empty_compare(&self, part: &str, bytes: &[u8]) {
        tokio::join!(
            self.write(CacheVariant::Normal, part, bytes),
            self.write(CacheVariant::Prev, part, bytes),
            self.write(CacheVariant::Compare, part, &[]),
        );
    }

    /// Write normal and prev, moving the old normal content into compare.
    pub async fn update_cached_files(&self, part: &str, bytes: &[u8]) {
        let previous = self.get_cached_normal_file(part).await;
        tokio::join!(
            self.write(CacheVariant::Normal, part, bytes),
            self.write(CacheVariant::Prev, part, bytes),
            self.write(CacheVariant::Compare, part, &previous),
        );
    }

    /// Write normal and prev, leaving compare alone.
    pub async fn update_cached_files_no_compare(&self, part: &str, bytes: &[u8]) {
        tokio::join!(
            self.write(CacheVariant::Normal, part, bytes),
            self.write(CacheVariant::Prev, part, bytes),
        );
    }

    pub async fn update_compare_file(&self, part: &str, bytes: &[u8]) {
        self.write(CacheVariant::Compare, part, bytes).await;
    }

    /// Remove all three variants. Failures are logged only.
    pub async fn delete_cached_files(&self, part: &str) {
        tokio::join!(
            self.remove(CacheVariant::Normal, part),
            self.remove(CacheVariant::Prev, part),
            self.remove(CacheVariant::Compare, part),
        );
    }

    pub async fn get_cached_normal_file(&self, part: &str) -> Vec<u8> {
        self.read_or_empty(CacheVariant::Normal, part).await
    }

    pub async fn get_cached_prev_file(&self, part: &str) -> Vec<u8> {
        self.read_or_empty(CacheVariant::Prev, part).await
    }

    pub async fn get_cached_compare_file(&self, part: &str) -> Vec<u8> {
        self.read_or_empty(CacheVariant::Compare, part).await
    }

    /// Fallible read for callers that must not act on a missing file as if it were empty.
    pub async fn read_cached_file(&self, variant: CacheVariant, part: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.file_path(variant, part)).await
    }

    /// Map a cache file back to its part path (`.../normal/word/document.xml` ->
    /// `word/document.xml`). Paths outside this cache are returned unchanged.
    pub fn get_file_path_from_cache_file_path(&self, cache_path: &Path) -> String {
        let unchanged = || cache_path.to_string_lossy().into_owned();
        let Ok(relative) = cache_path.strip_prefix(&self.base) else {
            return unchanged();
        };

        let mut components = relative.components();
        let variant = match components.next() {
            Some(Component::Normal(first)) => first.to_str().and_then(CacheVariant::from_dir_name),
            _ => None,
        };
        if variant.is_none() {
            return unchanged();
        }

        components
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn path_belongs_to_cache(&self, path: &Path) -> bool {
        path.starts_with(&self.base)
    }

    pub fn cache_path_is_normal(&self, path: &Path) -> bool {
        path.starts_with(self.normal_dir())
    }

    /// Delete the whole base directory and recreate it empty. Never fails.
    pub async fn reset(&self) {
        match tokio::fs::remove_dir_all(&self.base).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("failed to clear cache {}: {err}", self.base.display()),
        }
        if let Err(err) = tokio::fs::create_dir_all(&self.base).await {
            log::warn!("failed to recreate cache {}: {err}", self.base.display());
        }
    }

    async fn write(&self, variant: CacheVariant, part: &str, bytes: &[u8]) {
        let path = self.file_path(variant, part);
        let result = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, bytes).await
        }
        .await;
        if let Err(err) = result {
            self.report("write cache file", &path, &err);
        }
    }

    async fn read_or_empty(&self, variant: CacheVariant, part: &str) -> Vec<u8> {
        match self.read_cached_file(variant, part).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.report("read cache file", &self.file_path(variant, part), &err);
                Vec::new()
            }
        }
    }

    async fn remove(&self, variant: CacheVariant, part: &str) {
        let path = self.file_path(variant, part);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("failed to delete cache file {}: {err}", path.display()),
        }
    }

    fn report(&self, action: &str, path: &Path, err: &io::Error) {
        log::error!("failed to {action} {}: {err}", path.display());
        self.host
            .show_error(&format!("Failed to {action} {}: {err}", path.display()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Errors(Mutex<Vec<String>>);

    impl Host for Errors {
        fn show_warning(&self, _message: &str, _modal: bool) {}

        fn show_error(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn cache(root: &Path) -> (PartCache, Arc<Errors>) {
        let errors = Arc::new(Errors::default());
        let cache = PartCache::new(root, Path::new("/docs/report.docx"), errors.clone());
        (cache, errors)
    }

    #[test]
    fn session_hash_depends_on_full_path() {
        let a = session_hash(Path::new("/a/report.docx"));
        let b = session_hash(Path::new("/b/report.docx"));
        assert_ne!(a, b);
        assert_eq!(a, session_hash(Path::new("/a/report.docx")));
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn layout_is_variant_then_part_path() {
        let (cache, _) = cache(Path::new("/store"));
        let hash = session_hash(Path::new("/docs/report.docx"));
        assert_eq!(
            cache.prev_file_path("word/document.xml"),
            Path::new("/store/cache")
                .join(hash)
                .join("prev")
                .join("word")
                .join("document.xml")
        );
    }

    #[test]
    fn cache_paths_map_back_to_part_paths() {
        let (cache, _) = cache(Path::new("/store"));
        let normal = cache.normal_file_path("word/_rels/document.xml.rels");
        assert_eq!(
            cache.get_file_path_from_cache_file_path(&normal),
            "word/_rels/document.xml.rels"
        );
        assert!(cache.cache_path_is_normal(&normal));

        let compare = cache.compare_file_path("[Content_Types].xml");
        assert_eq!(cache.get_file_path_from_cache_file_path(&compare), "[Content_Types].xml");
        assert!(cache.path_belongs_to_cache(&compare));
        assert!(!cache.cache_path_is_normal(&compare));
    }

    #[test]
    fn foreign_paths_are_returned_unchanged() {
        let (cache, _) = cache(Path::new("/store"));
        let outside = Path::new("/elsewhere/word/document.xml");
        assert_eq!(
            cache.get_file_path_from_cache_file_path(outside),
            "/elsewhere/word/document.xml"
        );
        assert!(!cache.path_belongs_to_cache(outside));
    }

    #[tokio::test]
    async fn update_moves_previous_normal_into_compare() {
        let tmp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(tmp.path());

        cache.create_cached_files("a.xml", b"one").await;
        cache.update_cached_files("a.xml", b"two").await;

        assert_eq!(cache.get_cached_normal_file("a.xml").await, b"two");
        assert_eq!(cache.get_cached_prev_file("a.xml").await, b"two");
        assert_eq!(cache.get_cached_compare_file("a.xml").await, b"one");
    }

    #[tokio::test]
    async fn no_compare_update_leaves_compare_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(tmp.path());

        cache.create_cached_files_with_empty_compare("a.xml", b"one").await;
        cache.update_cached_files_no_compare("a.xml", b"two").await;

        assert_eq!(cache.get_cached_normal_file("a.xml").await, b"two");
        assert!(cache.get_cached_compare_file("a.xml").await.is_empty());
    }

    #[tokio::test]
    async fn missing_file_reads_empty_and_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let (cache, errors) = cache(tmp.path());

        assert!(cache.get_cached_normal_file("nope.xml").await.is_empty());
        let errors = errors.0.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("nope.xml"), "{errors:?}");
    }

    #[tokio::test]
    async fn delete_removes_every_variant_and_tolerates_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (cache, errors) = cache(tmp.path());

        cache.create_cached_files("d/a.xml", b"x").await;
        cache.delete_cached_files("d/a.xml").await;
        cache.delete_cached_files("d/a.xml").await;

        for variant in CacheVariant::ALL {
            assert!(!cache.file_path(variant, "d/a.xml").exists());
        }
        assert!(errors.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_is_idempotent_and_leaves_empty_base() {
        let tmp = tempfile::tempdir().unwrap();
        let (cache, _) = cache(tmp.path());

        cache.create_cached_files("a.xml", b"x").await;
        cache.reset().await;
        cache.reset().await;

        assert!(cache.base_dir().is_dir());
        assert_eq!(std::fs::read_dir(cache.base_dir()).unwrap().count(), 0);
    }
}
