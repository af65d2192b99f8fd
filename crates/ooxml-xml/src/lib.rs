//! XML helpers for OOXML package parts.
//!
//! Parts are shown to the user pretty-printed and written back to the archive minified. Both
//! directions run through the same event rewriter so that `format` is idempotent and two
//! parts that differ only in indentation or comments minify to identical bytes.

mod rewrite;
mod sniff;

use thiserror::Error;

pub use sniff::is_xml;

/// Indentation used by [`format`].
pub const INDENT_WIDTH: usize = 2;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("element name is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Strip insignificant whitespace (and comments unless `preserve_comments` is set).
///
/// Whitespace-only text inside an element carrying `xml:space="preserve"` is kept.
pub fn minify(bytes: &[u8], preserve_comments: bool) -> Result<Vec<u8>, XmlError> {
    rewrite::rewrite(bytes, rewrite::Layout::Compact, preserve_comments)
}

/// Pretty-print with two-space indentation. Comments are kept.
pub fn format(bytes: &[u8]) -> Result<Vec<u8>, XmlError> {
    rewrite::rewrite(bytes, rewrite::Layout::Indented(INDENT_WIDTH), true)
}

/// Equality used for change detection.
///
/// Byte-identical blobs are equal. Otherwise two XML documents are equal when their minified,
/// comment-stripped forms match. Anything else (binary parts, malformed XML) is unequal.
pub fn xml_equal(a: &[u8], b: &[u8]) -> bool {
    if a == b {
        return true;
    }
    if !is_xml(a) || !is_xml(b) {
        return false;
    }
    match (minify(a, false), minify(b, false)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
