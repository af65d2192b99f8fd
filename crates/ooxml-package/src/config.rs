//! Settings consumed by the engine.
//!
//! The keys mirror the editor settings the values usually come from, so a settings file can
//! be deserialized as-is. Missing keys fall back to the defaults below.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::PackageError;

pub const DEFAULT_MAX_PACKAGE_BYTES: u64 = 50_000_000;
pub const DEFAULT_MAX_PARTS: usize = 1000;
pub const DEFAULT_MAX_XML_PART_BYTES: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    /// Keep XML comments when a part is minified for write-back.
    pub preserve_comments: bool,
    /// Archives larger than this are refused before they are read.
    #[serde(rename = "maximumOOXMLFileSizeBytes")]
    pub maximum_ooxml_file_size_bytes: u64,
    /// Archives with more entries than this are not populated at all.
    #[serde(rename = "maximumNumberOfOOXMLParts")]
    pub maximum_number_of_ooxml_parts: usize,
    /// Parts whose minified size exceeds this are shown unformatted.
    pub maximum_xml_parts_file_size_bytes: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            preserve_comments: true,
            maximum_ooxml_file_size_bytes: DEFAULT_MAX_PACKAGE_BYTES,
            maximum_number_of_ooxml_parts: DEFAULT_MAX_PARTS,
            maximum_xml_parts_file_size_bytes: DEFAULT_MAX_XML_PART_BYTES,
        }
    }
}

impl ViewerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, PackageError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, PackageError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Platform cache directory used as the storage root when none is configured.
pub fn default_storage_root() -> Option<PathBuf> {
    ProjectDirs::from("org", "ooxml", "ooxml-viewer").map(|dirs| dirs.cache_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = ViewerConfig::from_json_str(r#"{ "preserveComments": false }"#).unwrap();
        assert_eq!(
            config,
            ViewerConfig {
                preserve_comments: false,
                ..ViewerConfig::default()
            }
        );
    }

    #[test]
    fn ooxml_keys_keep_their_casing() {
        let config = ViewerConfig::from_json_str(
            r#"{
                "maximumOOXMLFileSizeBytes": 10,
                "maximumNumberOfOOXMLParts": 2,
                "maximumXmlPartsFileSizeBytes": 3
            }"#,
        )
        .unwrap();
        assert_eq!(config.maximum_ooxml_file_size_bytes, 10);
        assert_eq!(config.maximum_number_of_ooxml_parts, 2);
        assert_eq!(config.maximum_xml_parts_file_size_bytes, 3);
        assert!(config.preserve_comments);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = ViewerConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, PackageError::Config(_)), "{err}");
    }
}
