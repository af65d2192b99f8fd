use std::borrow::Cow;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::sniff::strip_utf8_bom;
use crate::XmlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    Compact,
    Indented(usize),
}

/// Re-emit `bytes` event by event.
///
/// Whitespace-only text is dropped outside `xml:space="preserve"` scopes and start tags are
/// rebuilt from their name and attributes, which normalizes spacing between attributes.
/// Text content is copied raw (still escaped), so entity references survive unchanged.
pub(crate) fn rewrite(
    bytes: &[u8],
    layout: Layout,
    keep_comments: bool,
) -> Result<Vec<u8>, XmlError> {
    let mut reader = Reader::from_reader(strip_utf8_bom(bytes));
    reader.config_mut().trim_text(false);

    let mut writer = Writer::new(Vec::with_capacity(bytes.len()));
    let mut indent = match layout {
        Layout::Compact => None,
        Layout::Indented(width) => Some(Indenter::new(width)),
    };

    // One entry per open element: whether whitespace is significant inside it.
    let mut preserve_space: Vec<bool> = Vec::new();
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        let significant = preserve_space.last().copied().unwrap_or(false);
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let (start, preserve) = normalize_start(&e, significant)?;
                before_markup(&mut writer, &mut indent, significant);
                writer.write_event(Event::Start(start))?;
                preserve_space.push(preserve);
                if let Some(indent) = indent.as_mut() {
                    indent.depth += 1;
                }
            }
            Event::Empty(e) => {
                let (start, _) = normalize_start(&e, significant)?;
                before_markup(&mut writer, &mut indent, significant);
                writer.write_event(Event::Empty(start))?;
            }
            Event::End(e) => {
                // `significant` still describes the element being closed here.
                preserve_space.pop();
                if let Some(indent) = indent.as_mut() {
                    indent.depth = indent.depth.saturating_sub(1);
                }
                before_markup(&mut writer, &mut indent, significant);
                let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            Event::Text(e) => {
                if significant || !e.iter().all(u8::is_ascii_whitespace) {
                    writer.write_event(Event::Text(e))?;
                    if let Some(indent) = indent.as_mut() {
                        indent.line_break = false;
                    }
                }
            }
            Event::Comment(_) if !keep_comments => {}
            other => {
                before_markup(&mut writer, &mut indent, significant);
                writer.write_event(other)?;
            }
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Line-break state for [`Layout::Indented`].
///
/// Follows quick-xml's own indenter (a break before every piece of markup that does not
/// directly follow text) but never inserts whitespace where it is significant.
#[derive(Debug)]
struct Indenter {
    width: usize,
    depth: usize,
    line_break: bool,
}

impl Indenter {
    fn new(width: usize) -> Self {
        Self {
            width,
            depth: 0,
            line_break: false,
        }
    }
}

fn before_markup(writer: &mut Writer<Vec<u8>>, indent: &mut Option<Indenter>, significant: bool) {
    let Some(indent) = indent.as_mut() else {
        return;
    };
    if indent.line_break && !significant {
        let out = writer.get_mut();
        out.push(b'\n');
        out.resize(out.len() + indent.depth * indent.width, b' ');
    }
    indent.line_break = true;
}

fn normalize_start(
    e: &BytesStart<'_>,
    inherited_preserve: bool,
) -> Result<(BytesStart<'static>, bool), XmlError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut start = BytesStart::new(name);
    let mut preserve = inherited_preserve;

    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"xml:space" {
            preserve = attr.value.as_ref() == b"preserve";
        }
        start.push_attribute(requote(attr));
    }

    Ok((start, preserve))
}

/// Attributes are always written double-quoted; a single-quoted source value may contain a
/// literal `"` that has to be escaped first.
fn requote(attr: Attribute<'_>) -> Attribute<'_> {
    if !attr.value.contains(&b'"') {
        return attr;
    }
    let mut escaped = Vec::with_capacity(attr.value.len() + 8);
    for &b in attr.value.iter() {
        if b == b'"' {
            escaped.extend_from_slice(b"&quot;");
        } else {
            escaped.push(b);
        }
    }
    Attribute {
        key: attr.key,
        value: Cow::Owned(escaped),
    }
}
