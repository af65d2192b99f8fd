//! Reconciliation of one opened package against its part tree and part cache.

use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::accessor::{content_type_for_part, ArchiveWriter, PackageAccessor, PackagePart};
use crate::cache::{CacheVariant, PartCache};
use crate::config::ViewerConfig;
use crate::gate::ReloadGate;
use crate::host::Host;
use crate::part_name::part_file_name;
use crate::tree::{Absence, PartStatus, PartTree};
use crate::watch::SessionWatch;

/// Result of [`PackageSession::open_package`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The tree and cache now mirror the archive.
    Populated { parts: usize },
    /// The archive has more entries than allowed; the session was torn down.
    TooManyParts { parts: usize, max: usize },
    /// The archive could not be read; previous state is kept.
    Failed,
}

/// Result of [`PackageSession::update_ooxml_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The path is not a normal cache file of this session.
    Ignored,
    /// The cached part matches what the archive already holds.
    Unchanged,
    Written,
    /// The archive is locked by another program; nothing changed.
    Locked,
    Failed,
}

/// One row of a package listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartSummary {
    pub path: String,
    pub status: PartStatus,
    pub size: usize,
    pub content_type: &'static str,
}

/// Everything tracked for one opened archive.
pub struct PackageSession {
    archive_path: PathBuf,
    accessor: PackageAccessor,
    tree: PartTree,
    cache: PartCache,
    host: Arc<dyn Host>,
    config: ViewerConfig,
    has_completed_first_population: bool,
    gate: Arc<ReloadGate>,
    watch: Option<SessionWatch>,
}

impl std::fmt::Debug for PackageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageSession")
            .field("archive_path", &self.archive_path)
            .field("cache", &self.cache.base_dir())
            .field(
                "has_completed_first_population",
                &self.has_completed_first_population,
            )
            .field("watching", &self.watch.is_some())
            .finish()
    }
}

impl PackageSession {
    pub fn new(
        archive_path: impl Into<PathBuf>,
        storage_root: &Path,
        config: ViewerConfig,
        host: Arc<dyn Host>,
    ) -> Self {
        let archive_path = archive_path.into();
        Self {
            accessor: PackageAccessor::new(&archive_path),
            tree: PartTree::new(archive_path.display().to_string()),
            cache: PartCache::new(storage_root, &archive_path, host.clone()),
            archive_path,
            host,
            config,
            has_completed_first_population: false,
            gate: Arc::new(ReloadGate::new()),
            watch: None,
        }
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn tree(&self) -> &PartTree {
        &self.tree
    }

    pub fn cache(&self) -> &PartCache {
        &self.cache
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn gate(&self) -> Arc<ReloadGate> {
        self.gate.clone()
    }

    pub fn has_completed_first_population(&self) -> bool {
        self.has_completed_first_population
    }

    pub fn status_of(&self, part: &str) -> Option<PartStatus> {
        self.tree.status_of(part)
    }

    /// See [`PackageAccessor::set_archive_writer`].
    pub fn set_archive_writer(&mut self, writer: ArchiveWriter) {
        self.accessor.set_archive_writer(writer);
    }

    /// Load the archive and reconcile the tree and cache with its contents.
    ///
    /// The first call populates; later calls (watcher reloads) classify every part as
    /// created, modified, unchanged or deleted relative to the previous pass.
    pub async fn open_package(&mut self) -> OpenOutcome {
        if self.has_completed_first_population {
            self.cache.init_cache().await;
        } else {
            // Whatever an earlier process left under this hash is not ours.
            self.cache.reset().await;
        }
        if let Err(err) = self.accessor.load() {
            self.report(
                &format!("Failed to open {}", self.archive_path.display()),
                err,
            );
            return OpenOutcome::Failed;
        }

        let contents = self.accessor.package_contents();
        let max = self.config.maximum_number_of_ooxml_parts;
        if contents.len() > max {
            let message = format!(
                "{} has {} parts, more than the configured maximum of {max}. \
                 Raise maximumNumberOfOOXMLParts to open it.",
                self.archive_path.display(),
                contents.len()
            );
            log::warn!("{message}");
            self.host.show_warning(&message, true);
            self.teardown().await;
            return OpenOutcome::TooManyParts {
                parts: contents.len(),
                max,
            };
        }

        let first_population = !self.has_completed_first_population;
        let mut present = HashSet::new();
        for part in contents.iter().filter(|part| !part.is_directory) {
            self.reconcile_part(part, first_population).await;
            present.insert(part.path.as_str());
        }
        self.remove_absent_parts(&present).await;
        self.sync_open_documents(&present).await;

        self.host.refresh_tree();
        self.has_completed_first_population = true;
        self.gate.observe(self.accessor.last_modified());
        log::info!(
            "{} {} with {} parts",
            if first_population { "opened" } else { "reloaded" },
            self.archive_path.display(),
            present.len()
        );
        OpenOutcome::Populated {
            parts: present.len(),
        }
    }

    async fn reconcile_part(&mut self, part: &PackagePart, first_population: bool) {
        let visit = self.tree.visit_part(&part.path, first_population);
        match visit.previous {
            None if first_population => {
                self.cache.create_cached_files(&part.path, &part.bytes).await;
            }
            None => {
                self.cache
                    .create_cached_files_with_empty_compare(&part.path, &part.bytes)
                    .await;
            }
            Some(PartStatus::Deleted) => {
                self.tree.apply_present(visit.id, true);
                self.cache
                    .create_cached_files_with_empty_compare(&part.path, &part.bytes)
                    .await;
            }
            Some(_) => {
                let prev = self.cache.get_cached_prev_file(&part.path).await;
                let changed = !ooxml_xml::xml_equal(&prev, &part.bytes);
                self.tree.apply_present(visit.id, changed);
                self.cache.update_cached_files(&part.path, &part.bytes).await;
            }
        }
    }

    async fn remove_absent_parts(&mut self, present: &HashSet<&str>) {
        for (id, path) in self.tree.file_nodes() {
            if present.contains(path.as_str()) {
                continue;
            }
            match self.tree.apply_absent(id) {
                Some(Absence::MarkedDeleted) => {
                    log::debug!("{path} is no longer in the archive");
                    self.cache.update_cached_files(&path, &[]).await;
                }
                Some(Absence::Removed) => {
                    log::debug!("dropping {path}");
                    self.cache.delete_cached_files(&path).await;
                }
                None => {}
            }
        }
    }

    /// Reformat open cached documents whose part survived the reload and close the rest.
    async fn sync_open_documents(&self, present: &HashSet<&str>) {
        let mut seen = HashSet::new();
        for document in self.host.open_documents() {
            if !seen.insert(document.clone()) || !self.cache.path_belongs_to_cache(&document) {
                continue;
            }
            let part = self.cache.get_file_path_from_cache_file_path(&document);
            if present.contains(part.as_str()) {
                self.format_part(&part).await;
            } else {
                self.host.close_document(&document);
            }
        }
    }

    /// Pretty-print the normal and compare copies of `part` in place.
    pub async fn format_part(&self, part: &str) {
        let normal = self.cache.get_cached_normal_file(part).await;
        if !ooxml_xml::is_xml(&normal) {
            return;
        }
        let minified = match ooxml_xml::minify(&normal, self.config.preserve_comments) {
            Ok(minified) => minified,
            Err(err) => {
                self.report(&format!("Failed to format {part}"), err);
                return;
            }
        };
        let limit = self.config.maximum_xml_parts_file_size_bytes;
        if minified.len() as u64 > limit {
            let message = format!(
                "{part} is {} bytes, more than the {limit} bytes allowed for formatting. \
                 Raise maximumXmlPartsFileSizeBytes to format it.",
                minified.len()
            );
            log::warn!("{message}");
            self.host.show_warning(&message, true);
            return;
        }

        let compare = self.cache.get_cached_compare_file(part).await;
        tokio::join!(
            async {
                if let Some(formatted) = self.reformatted(part, &normal) {
                    self.cache.update_cached_files_no_compare(part, &formatted).await;
                }
            },
            async {
                if let Some(formatted) = self.reformatted(part, &compare) {
                    self.cache.update_compare_file(part, &formatted).await;
                }
            },
        );
    }

    /// Formatted bytes, or `None` when formatting would not change anything.
    fn reformatted(&self, part: &str, bytes: &[u8]) -> Option<Vec<u8>> {
        if !ooxml_xml::is_xml(bytes) {
            return None;
        }
        match ooxml_xml::format(bytes) {
            Ok(formatted) if formatted != bytes => Some(formatted),
            Ok(_) => None,
            Err(err) => {
                self.report(&format!("Failed to format {part}"), err);
                None
            }
        }
    }

    /// Handle "a cached document was opened": format it if it belongs to this session.
    pub async fn try_format_document(&self, cache_path: &Path) -> bool {
        if !self.cache.path_belongs_to_cache(cache_path) {
            return false;
        }
        let part = self.cache.get_file_path_from_cache_file_path(cache_path);
        if self.tree.find(&part).is_none() {
            return false;
        }
        self.format_part(&part).await;
        true
    }

    /// Handle "a cached document was saved": write the edited part back into the archive.
    pub async fn update_ooxml_file(&mut self, cache_path: &Path) -> SaveOutcome {
        if !self.cache.cache_path_is_normal(cache_path) {
            return SaveOutcome::Ignored;
        }
        let part = self.cache.get_file_path_from_cache_file_path(cache_path);

        // An unreadable edit must not reach the archive as an empty part.
        let normal = match self.cache.read_cached_file(CacheVariant::Normal, &part).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.report(&format!("Failed to read {}", cache_path.display()), err);
                return SaveOutcome::Failed;
            }
        };
        let prev = self.cache.get_cached_prev_file(&part).await;
        if ooxml_xml::xml_equal(&normal, &prev) {
            log::debug!("{part} is unchanged, nothing to write");
            return SaveOutcome::Unchanged;
        }

        let payload = if ooxml_xml::is_xml(&normal) {
            match ooxml_xml::minify(&normal, self.config.preserve_comments) {
                Ok(minified) => minified,
                Err(err) => {
                    self.report(&format!("Failed to save {part}"), err);
                    return SaveOutcome::Failed;
                }
            }
        } else {
            normal.clone()
        };

        match self.accessor.update_package(&part, &payload).await {
            Ok(true) => {}
            Ok(false) => {
                let message = format!(
                    "Could not save {part}: {} is open in another program. \
                     Close it there and save again.",
                    self.archive_path.display()
                );
                log::warn!("{message}");
                self.host.show_warning(&message, true);
                self.host.make_active_editor_dirty();
                return SaveOutcome::Locked;
            }
            Err(err) => {
                self.report(&format!("Failed to save {part}"), err);
                return SaveOutcome::Failed;
            }
        }

        self.cache.create_cached_files(&part, &normal).await;
        self.gate.observe(self.accessor.last_modified());
        self.host.refresh_tree();
        log::info!("saved {part} into {}", self.archive_path.display());
        SaveOutcome::Written
    }

    /// Run the host's "find in files" over the normal copies of this package.
    pub fn search(&self, term: &str) {
        self.host.find_in_files(term, &self.cache.normal_dir());
    }

    pub async fn view_part(&self, part: &str) {
        self.format_part(part).await;
        self.host.open_file(&self.cache.normal_file_path(part));
    }

    pub async fn view_part_diff(&self, part: &str) {
        self.format_part(part).await;
        let name = part_file_name(part);
        self.host.open_diff(
            &self.cache.compare_file_path(part),
            &self.cache.normal_file_path(part),
            &format!("{name} ↔ compare.{name}"),
        );
    }

    /// File parts in tree order with their status and current archive size.
    pub fn part_summaries(&self) -> Vec<PartSummary> {
        self.tree
            .file_nodes()
            .into_iter()
            .filter_map(|(id, path)| {
                let status = self.tree.node(id)?.status();
                let size = self.accessor.part(&path).map_or(0, |part| part.bytes.len());
                Some(PartSummary {
                    content_type: content_type_for_part(&path),
                    path,
                    status,
                    size,
                })
            })
            .collect()
    }

    /// Forget the tree and empty the cache. The watch, if any, is left in place.
    pub async fn teardown(&mut self) {
        self.tree.clear();
        self.cache.reset().await;
        self.has_completed_first_population = false;
        self.host.refresh_tree();
    }

    /// Tear the session down and stop watching.
    ///
    /// Must not be called from the session's own watch task; that task uses
    /// [`PackageSession::teardown`] and [`PackageSession::take_watch`] instead.
    pub async fn close(&mut self) {
        self.teardown().await;
        self.watch = None;
        log::info!("closed {}", self.archive_path.display());
    }

    pub fn attach_watch(&mut self, watch: SessionWatch) {
        self.watch = Some(watch);
    }

    pub fn take_watch(&mut self) -> Option<SessionWatch> {
        self.watch.take()
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    fn report(&self, context: &str, err: impl Display) {
        let message = format!("{context}: {err}");
        log::error!("{message}");
        self.host.show_error(&message);
    }
}
