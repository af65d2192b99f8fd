use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] ooxml_xml::XmlError),
    #[error("duplicate part name after normalization (possible invalid zip): {0}")]
    DuplicatePart(String),
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error(
        "package {} is too large to open: {size} bytes (max {max} bytes)",
        path.display()
    )]
    PackageTooLarge { path: PathBuf, size: u64, max: u64 },
}
