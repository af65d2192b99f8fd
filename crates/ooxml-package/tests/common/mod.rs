#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ooxml_package::Host;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CONTENT_TYPES: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

pub fn document(text: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:body></w:document>"#
    )
    .into_bytes()
}

pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    std::fs::write(path, build_zip(entries)).unwrap();
}

pub fn read_entry(path: &Path, name: &str) -> Vec<u8> {
    let bytes = std::fs::read(path).unwrap();
    let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = zip.by_name(name).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}

/// Host that records every interaction for later assertions.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub warnings: Mutex<Vec<(String, bool)>>,
    pub errors: Mutex<Vec<String>>,
    pub dirty: Mutex<usize>,
    pub refreshes: Mutex<usize>,
    pub opened: Mutex<Vec<PathBuf>>,
    pub diffs: Mutex<Vec<(PathBuf, PathBuf, String)>>,
    pub searches: Mutex<Vec<(String, PathBuf)>>,
    pub closed: Mutex<Vec<PathBuf>>,
    pub open_documents: Mutex<Vec<PathBuf>>,
}

impl RecordingHost {
    pub fn set_open_documents(&self, documents: Vec<PathBuf>) {
        *self.open_documents.lock().unwrap() = documents;
    }

    pub fn warnings(&self) -> Vec<(String, bool)> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn dirty_count(&self) -> usize {
        *self.dirty.lock().unwrap()
    }

    pub fn refresh_count(&self) -> usize {
        *self.refreshes.lock().unwrap()
    }

    pub fn closed(&self) -> Vec<PathBuf> {
        self.closed.lock().unwrap().clone()
    }
}

impl Host for RecordingHost {
    fn show_warning(&self, message: &str, modal: bool) {
        self.warnings.lock().unwrap().push((message.to_string(), modal));
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn refresh_tree(&self) {
        *self.refreshes.lock().unwrap() += 1;
    }

    fn open_file(&self, path: &Path) {
        self.opened.lock().unwrap().push(path.to_path_buf());
    }

    fn open_diff(&self, left: &Path, right: &Path, title: &str) {
        self.diffs
            .lock()
            .unwrap()
            .push((left.to_path_buf(), right.to_path_buf(), title.to_string()));
    }

    fn find_in_files(&self, query: &str, include: &Path) {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), include.to_path_buf()));
    }

    fn make_active_editor_dirty(&self) {
        *self.dirty.lock().unwrap() += 1;
    }

    fn open_documents(&self) -> Vec<PathBuf> {
        self.open_documents.lock().unwrap().clone()
    }

    fn close_document(&self, path: &Path) {
        self.closed.lock().unwrap().push(path.to_path_buf());
        self.open_documents.lock().unwrap().retain(|doc| doc != path);
    }
}
