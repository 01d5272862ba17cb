//! Minimal repair of raw identification files so that a standard XML parser accepts them.
//!
//! Only two things are fixed: bare `&` characters are escaped and characters outside of the XML
//! 1.0 character ranges are removed. Everything else is kept byte for byte, so a document that is
//! already well formed comes out unchanged.

use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;

/// The predefined XML entities and numeric character references
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:amp|lt|gt|quot|apos|#[0-9]+|#x[0-9A-Fa-f]+);").unwrap()
});

/// Sections of a document that are copied without escaping ampersands (open, close)
const VERBATIM: &[(&str, &str)] = &[
    ("<!--", "-->"),
    ("<![CDATA[", "]]>"),
    ("<?", "?>"),
];

/// Check if a character is allowed by the XML 1.0 `Char` production.
pub const fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Decode the raw bytes of a file, invalid UTF-8 sequences are replaced with U+FFFD and a
/// leading byte order mark is removed.
pub fn decode(raw: &[u8]) -> Cow<'_, str> {
    match String::from_utf8_lossy(raw) {
        Cow::Borrowed(text) => Cow::Borrowed(text.strip_prefix('\u{FEFF}').unwrap_or(text)),
        Cow::Owned(text) if text.starts_with('\u{FEFF}') => {
            Cow::Owned(text['\u{FEFF}'.len_utf8()..].to_string())
        }
        Cow::Owned(text) => Cow::Owned(text),
    }
}

/// Repair a raw document to make it well formed. The input is returned borrowed if nothing
/// needed changing.
pub fn repair(raw: &str) -> Cow<'_, str> {
    let mut output = String::with_capacity(raw.len());
    let mut changed = false;
    let mut rest = raw;

    while let Some(index) = rest.find(|c: char| c == '&' || c == '<') {
        let (before, tail) = rest.split_at(index);
        changed |= push_xml_chars(&mut output, before);
        if tail.starts_with('&') {
            if let Some(entity) = ENTITY.find(tail) {
                output.push_str(entity.as_str());
                rest = &tail[entity.end()..];
            } else {
                output.push_str("&amp;");
                changed = true;
                rest = &tail[1..];
            }
        } else {
            let end = verbatim_length(tail);
            changed |= push_xml_chars(&mut output, &tail[..end]);
            rest = &tail[end..];
        }
    }
    changed |= push_xml_chars(&mut output, rest);

    if changed {
        Cow::Owned(output)
    } else {
        Cow::Borrowed(raw)
    }
}

/// The length of the verbatim section at the start of `tail` (which starts with `<`), or 1 if
/// this is a normal tag.
fn verbatim_length(tail: &str) -> usize {
    if tail.starts_with("<!DOCTYPE") {
        let close = match (tail.find('['), tail.find('>')) {
            (Some(bracket), Some(angle)) if bracket < angle => "]>",
            _ => ">",
        };
        return tail.find(close).map_or(tail.len(), |i| i + close.len());
    }
    VERBATIM
        .iter()
        .find(|(open, _)| tail.starts_with(open))
        .map_or(1, |(open, close)| {
            tail[open.len()..]
                .find(close)
                .map_or(tail.len(), |i| open.len() + i + close.len())
        })
}

/// Push all legal characters, returns true if any character was dropped.
fn push_xml_chars(output: &mut String, text: &str) -> bool {
    let mut dropped = false;
    for c in text.chars() {
        if is_xml_char(c) {
            output.push(c);
        } else {
            dropped = true;
        }
    }
    dropped
}
