const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Returns `true` iff `bytes` start with an XML declaration (`<?xml`), optionally preceded by
/// a UTF-8 byte-order mark.
///
/// OOXML producers always emit the declaration on XML parts, so its presence is what separates
/// formattable parts from binary payloads (images, fonts, `vbaProject.bin`).
pub fn is_xml(bytes: &[u8]) -> bool {
    let bytes = strip_utf8_bom(bytes);
    let Some(rest) = bytes.strip_prefix(b"<?xml") else {
        return false;
    };
    // `<?xml-stylesheet ...?>` is a processing instruction, not a declaration.
    matches!(rest.first(), Some(b' ' | b'\t' | b'\r' | b'\n' | b'?'))
}

pub(crate) fn strip_utf8_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_marks_xml() {
        assert!(is_xml(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>"));
    }

    #[test]
    fn bom_is_skipped() {
        assert!(is_xml(b"\xEF\xBB\xBF<?xml version=\"1.0\"?><a/>"));
    }

    #[test]
    fn bare_markup_without_declaration_is_not_xml() {
        assert!(!is_xml(b"<a/>"));
        assert!(!is_xml(b"  <?xml version=\"1.0\"?><a/>"));
    }

    #[test]
    fn stylesheet_pi_is_not_a_declaration() {
        assert!(!is_xml(b"<?xml-stylesheet href=\"a.xsl\"?><a/>"));
    }

    #[test]
    fn empty_and_binary_are_not_xml() {
        assert!(!is_xml(b""));
        assert!(!is_xml(&[0x89, b'P', b'N', b'G']));
    }
}
