use std::path::{Path, PathBuf};

/// The editor the engine is embedded in.
///
/// Everything the engine needs from the UI goes through this trait: prompts, the part tree
/// refresh signal, opening and closing cached documents, and workspace search. Methods that
/// only trigger UI have no-op defaults so headless hosts can skip them.
pub trait Host: Send + Sync {
    /// Show a warning. `modal` warnings need the user to act (locked archive, size limits).
    fn show_warning(&self, message: &str, modal: bool);

    /// Show a non-modal error notification.
    fn show_error(&self, message: &str);

    fn refresh_tree(&self) {}

    fn open_file(&self, _path: &Path) {}

    fn open_diff(&self, _left: &Path, _right: &Path, _title: &str) {}

    /// Run a "find in files" restricted to `include`.
    fn find_in_files(&self, _query: &str, _include: &Path) {}

    /// Flag the active editor as having unsaved changes without touching its content.
    fn make_active_editor_dirty(&self) {}

    /// Paths of the documents currently open in the editor.
    fn open_documents(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn close_document(&self, _path: &Path) {}
}
