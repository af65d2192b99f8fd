//! Filesystem helpers shared by the package engine.
//!
//! Archive write-back replaces the whole package file. To avoid leaving a truncated archive
//! behind when the process dies mid-save, the new bytes are written to a temp file next to
//! the destination and renamed into place. The same module classifies the "file is locked by
//! another program" failures that the engine treats as recoverable.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

#[cfg(windows)]
const LOCKED_OS_ERRORS: &[i32] = &[
    // ERROR_ACCESS_DENIED
    5,
    // ERROR_SHARING_VIOLATION
    32,
    // ERROR_LOCK_VIOLATION
    33,
    // ERROR_USER_MAPPED_FILE
    1224,
];

#[cfg(not(windows))]
const LOCKED_OS_ERRORS: &[i32] = &[
    // EBUSY
    16,
    // ETXTBSY
    26,
];

/// Returns `true` when `err` means the target file is held open (locked) by another process.
///
/// Office applications keep an exclusive handle on the package they have open. Writing to
/// such a file fails with a sharing violation on Windows and `EBUSY` on some Unix
/// filesystems; callers surface that to the user instead of treating it as fatal.
pub fn is_file_locked_error(err: &io::Error) -> bool {
    match err.raw_os_error() {
        Some(code) => LOCKED_OS_ERRORS.contains(&code),
        None => false,
    }
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` returns `Some("")` for bare relative names like `report.docx`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Atomically replace `dest` with `bytes`.
///
/// Parent directories are created when missing. An existing `dest` keeps its permissions.
/// If any step before the final rename fails, `dest` keeps its previous content and the temp
/// file is removed.
pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    match fs::metadata(dest) {
        Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    tmp.as_file_mut().write_all(bytes)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    let tmp_path = tmp.into_temp_path();
    replace_file(tmp_path.as_ref(), dest)?;

    // The file is already in place; directory sync is best-effort.
    let _ = sync_parent_dir(dest);
    Ok(())
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = File::open(parent_dir_or_dot(path))?;
    dir.sync_all()
}

fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt as _;
        use windows_sys::Win32::Storage::FileSystem::{MoveFileExW, MOVEFILE_REPLACE_EXISTING};

        fn to_wide_null(path: &Path) -> Vec<u16> {
            let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
            wide.push(0);
            wide
        }

        let from_w = to_wide_null(from);
        let to_w = to_wide_null(to);
        let ok = unsafe { MoveFileExW(from_w.as_ptr(), to_w.as_ptr(), MOVEFILE_REPLACE_EXISTING) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(windows))]
    {
        fs::rename(from, to)
    }
}
