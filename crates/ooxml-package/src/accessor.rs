use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::part_name::normalize_part_name;
use crate::PackageError;

/// One entry of a loaded package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePart {
    pub path: String,
    pub is_directory: bool,
    pub bytes: Vec<u8>,
}

/// Puts an encoded archive in place of the file at the given path.
pub type ArchiveWriter = fn(&Path, &[u8]) -> io::Result<()>;

#[derive(Debug, Clone)]
struct EntryName {
    /// Normalized part path, the key into `parts`.
    path: String,
    /// Name as stored in the zip; written back unchanged.
    raw: String,
}

#[derive(Debug, Clone, Default)]
struct LoadedArchive {
    parts: BTreeMap<String, PackagePart>,
    /// Entry order of the source zip; preserved on write so `[Content_Types].xml` stays first.
    order: Vec<EntryName>,
}

/// In-memory view of one package file on disk.
#[derive(Debug)]
pub struct PackageAccessor {
    path: PathBuf,
    loaded: Option<Arc<LoadedArchive>>,
    writer: ArchiveWriter,
}

fn replace_on_disk(path: &Path, bytes: &[u8]) -> io::Result<()> {
    ooxml_fs::atomic_write_bytes(path, bytes)
}

impl PackageAccessor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: None,
            writer: replace_on_disk,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Replace how a rewritten archive reaches the disk. The default is an atomic replace.
    pub fn set_archive_writer(&mut self, writer: ArchiveWriter) {
        self.writer = writer;
    }

    /// Read and parse the archive, replacing any previously loaded state.
    ///
    /// On failure the previous state is kept.
    pub fn load(&mut self) -> Result<(), PackageError> {
        let bytes = std::fs::read(&self.path)?;
        let archive = read_archive(&bytes)?;
        log::debug!(
            "loaded {} with {} entries",
            self.path.display(),
            archive.order.len()
        );
        self.loaded = Some(Arc::new(archive));
        Ok(())
    }

    /// All entries sorted by path. Empty until [`PackageAccessor::load`] has succeeded.
    pub fn package_contents(&self) -> Vec<PackagePart> {
        match &self.loaded {
            Some(archive) => archive.parts.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn part(&self, path: &str) -> Option<&PackagePart> {
        self.loaded.as_ref()?.parts.get(path)
    }

    /// Replace (or add) one part and rewrite the whole archive on disk.
    ///
    /// Encoding and writing run on the blocking pool. Returns `Ok(false)` when nothing was
    /// loaded yet or when the archive is locked by another program; the in-memory table only
    /// takes the new bytes once the disk write succeeded.
    pub async fn update_package(&mut self, path: &str, bytes: &[u8]) -> Result<bool, PackageError> {
        let Some(archive) = self.loaded.clone() else {
            log::warn!(
                "refusing to update {path}: {} has not been loaded",
                self.path.display()
            );
            return Ok(false);
        };

        let dest = self.path.clone();
        let writer = self.writer;
        let part = path.to_string();
        let payload = bytes.to_vec();
        let written = tokio::task::spawn_blocking(move || {
            let encoded = write_archive(&archive, &part, &payload)?;
            Ok::<_, PackageError>(writer(&dest, &encoded))
        })
        .await
        .map_err(io::Error::other)??;
        if !classify_write(&self.path, written)? {
            return Ok(false);
        }

        let Some(loaded) = self.loaded.as_mut() else {
            return Ok(false);
        };
        let archive = Arc::make_mut(loaded);
        if !archive.parts.contains_key(path) {
            archive.order.push(EntryName {
                path: path.to_string(),
                raw: path.to_string(),
            });
        }
        archive.parts.insert(
            path.to_string(),
            PackagePart {
                path: path.to_string(),
                is_directory: false,
                bytes: bytes.to_vec(),
            },
        );
        log::debug!(
            "wrote {path} ({}, {} bytes) into {}",
            content_type_for_part(path),
            bytes.len(),
            self.path.display()
        );
        Ok(true)
    }

    /// Modification time of the archive file, if it can be read.
    pub fn last_modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

/// A write blocked by another program is `Ok(false)`; any other failure is an error.
fn classify_write(path: &Path, result: io::Result<()>) -> Result<bool, PackageError> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if ooxml_fs::is_file_locked_error(&err) => {
            log::warn!("{} is locked: {err}", path.display());
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

fn read_archive(bytes: &[u8]) -> Result<LoadedArchive, PackageError> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let mut archive = LoadedArchive::default();

    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        let raw = file.name().to_string();
        let path = normalize_part_name(&raw);
        if path.is_empty() {
            continue;
        }

        let is_directory = file.is_dir();
        // Do not trust the advertised size for allocation; zip metadata is untrusted.
        let mut buf = Vec::new();
        if !is_directory {
            file.read_to_end(&mut buf)?;
        }

        let part = PackagePart {
            path: path.clone(),
            is_directory,
            bytes: buf,
        };
        if archive.parts.insert(path.clone(), part).is_some() {
            return Err(PackageError::DuplicatePart(path));
        }
        archive.order.push(EntryName { path, raw });
    }

    Ok(archive)
}

fn write_archive(
    archive: &LoadedArchive,
    updated_path: &str,
    updated_bytes: &[u8],
) -> Result<Vec<u8>, PackageError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    let appended = (!archive.parts.contains_key(updated_path)).then(|| EntryName {
        path: updated_path.to_string(),
        raw: updated_path.to_string(),
    });
    for entry in archive.order.iter().chain(appended.as_ref()) {
        if entry.path == updated_path {
            zip.start_file(entry.raw.as_str(), options)?;
            zip.write_all(updated_bytes)?;
            continue;
        }
        let Some(part) = archive.parts.get(&entry.path) else {
            continue;
        };
        if part.is_directory {
            zip.add_directory(entry.raw.as_str(), options)?;
        } else {
            zip.start_file(entry.raw.as_str(), options)?;
            zip.write_all(&part.bytes)?;
        }
    }

    Ok(zip.finish()?.into_inner())
}

/// Best-effort media type for a part, derived from its extension.
///
/// Zip entries carry no media type; the value is informational (logs, listings).
pub fn content_type_for_part(path: &str) -> &'static str {
    if path == "[Content_Types].xml" {
        return "application/vnd.openxmlformats-package.content-types+xml";
    }
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".rels") {
        return "application/vnd.openxmlformats-package.relationships+xml";
    }
    if lower.ends_with(".xml") {
        return "application/xml";
    }
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
}
