//! Character set handling for MANSCDP bodies
//!
//! Devices declare their charset in the XML prolog, most often GB2312.
//! The WHATWG label table maps GB2312 onto GBK, a superset.

use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

/// Value of `encoding="..."` in a leading `<?xml ...?>` declaration
pub fn declared_encoding(data: &[u8]) -> Option<&str> {
    let start = data.windows(5).position(|w| w == b"<?xml")?;
    let end = data[start..].windows(2).position(|w| w == b"?>")? + start;
    let prolog = std::str::from_utf8(&data[start..end]).ok()?;

    let rest = &prolog[prolog.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    Some(&rest[..rest.find(quote)?])
}

/// Encoding for a label, UTF-8 when absent or unknown
pub fn encoding_for(label: Option<&str>) -> &'static Encoding {
    label
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(UTF_8)
}

/// Decode a body using the charset its prolog declares.
/// Returns the text and whether malformed sequences were replaced.
pub fn decode(data: &[u8]) -> (Cow<'_, str>, &'static Encoding, bool) {
    let encoding = encoding_for(declared_encoding(data));
    let (text, actual, had_errors) = encoding.decode(data);
    (text, actual, had_errors)
}

/// Encode text for the wire in the given charset
pub fn encode<'a>(text: &'a str, encoding: &'static Encoding) -> Cow<'a, [u8]> {
    let (bytes, _, _) = encoding.encode(text);
    bytes
}
