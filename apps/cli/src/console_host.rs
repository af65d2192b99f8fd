use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ooxml_package::Host;
use walkdir::WalkDir;

/// One line found by [`ConsoleHost::find_in_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub path: PathBuf,
    pub line: usize,
    pub text: String,
}

/// Terminal stand-in for an editor.
///
/// Prompts go to stderr, "open" documents are only remembered, and find-in-files scans the
/// directory itself so the caller can print the matches.
#[derive(Debug, Default)]
pub struct ConsoleHost {
    open: Mutex<Vec<PathBuf>>,
    matches: Mutex<Vec<SearchMatch>>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_matches(&self) -> Vec<SearchMatch> {
        self.matches
            .lock()
            .map(|mut matches| std::mem::take(&mut *matches))
            .unwrap_or_default()
    }
}

impl Host for ConsoleHost {
    fn show_warning(&self, message: &str, modal: bool) {
        if modal {
            eprintln!("warning: {message}");
        } else {
            log::warn!("{message}");
        }
    }

    fn show_error(&self, message: &str) {
        eprintln!("error: {message}");
    }

    fn refresh_tree(&self) {
        log::trace!("tree refreshed");
    }

    fn open_file(&self, path: &Path) {
        log::debug!("open {}", path.display());
        if let Ok(mut open) = self.open.lock() {
            if !open.iter().any(|p| p == path) {
                open.push(path.to_path_buf());
            }
        }
    }

    fn open_diff(&self, left: &Path, right: &Path, title: &str) {
        log::info!("{title}: {} <-> {}", left.display(), right.display());
    }

    fn find_in_files(&self, query: &str, include: &Path) {
        let mut found = Vec::new();
        for entry in WalkDir::new(include)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
        {
            let Ok(bytes) = std::fs::read(entry.path()) else {
                continue;
            };
            let text = String::from_utf8_lossy(&bytes);
            for (index, line) in text.lines().enumerate() {
                if line.contains(query) {
                    found.push(SearchMatch {
                        path: entry.path().to_path_buf(),
                        line: index + 1,
                        text: line.trim().to_string(),
                    });
                }
            }
        }
        if let Ok(mut matches) = self.matches.lock() {
            *matches = found;
        }
    }

    fn make_active_editor_dirty(&self) {
        log::warn!("edit kept in the cache; save again once the archive is writable");
    }

    fn open_documents(&self) -> Vec<PathBuf> {
        self.open.lock().map(|open| open.clone()).unwrap_or_default()
    }

    fn close_document(&self, path: &Path) {
        log::debug!("close {}", path.display());
        if let Ok(mut open) = self.open.lock() {
            open.retain(|p| p != path);
        }
    }
}
