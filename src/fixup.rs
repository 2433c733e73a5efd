use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    static ref ESCAPED_QUOTE: Regex = Regex::new(r#"\\""#).expect("escaped quote pattern");
}

/// Undo pandoc's over-escaping of double quotes in man output.
///
/// Text lines get every `\"` turned into `"`. Request lines (those starting
/// with `.`) keep the escape, troff needs it there. Works on raw bytes and
/// keeps line endings as they are, same as `sed '/^\./!s/\\"/"/g'`.
pub fn fix_quotes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for line in raw.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b".") {
            out.extend_from_slice(line);
        } else {
            out.extend_from_slice(&ESCAPED_QUOTE.replace_all(line, &b"\""[..]));
        }
    }
    out
}
