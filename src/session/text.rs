//! Session text cleanup.
//!
//! The simulator writes its session text in a single-byte Windows code page
//! and does not quote free-form values such as driver and team names. The
//! helpers here turn raw section bytes into text a YAML parser accepts
//! without changing what the text says.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Bytes that are undefined in the code page and replaced by a space.
pub const DEFAULT_SUBSTITUTIONS: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

/// Keys whose values are free-form user input.
pub const DEFAULT_QUOTED_KEYS: [&str; 6] =
    ["AbbrevName", "TeamName", "UserName", "Initials", "DriverSetupName", "CarDesignStr"];

/// Text cleanup configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTextOptions {
    /// Bytes replaced with a space before decoding
    pub substitutions: Vec<u8>,
    /// Keys whose values are always quoted
    pub quoted_keys: Vec<String>,
}

impl Default for SessionTextOptions {
    fn default() -> Self {
        Self {
            substitutions: DEFAULT_SUBSTITUTIONS.to_vec(),
            quoted_keys: DEFAULT_QUOTED_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Windows-1252 code points for bytes 0x80..=0x9F. The five undefined
/// bytes keep their Latin-1 value.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

/// Decode single-byte code page text, one byte per character.
pub fn decode_code_page(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => CP1252_HIGH[usize::from(b - 0x80)],
            _ => char::from(b),
        })
        .collect()
}

/// Substitute, truncate at the first null, and decode raw section bytes.
pub fn decode_section(raw: &[u8], options: &SessionTextOptions) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let cleaned: Vec<u8> = raw[..end]
        .iter()
        .map(|b| if options.substitutions.contains(b) { b' ' } else { *b })
        .collect();
    decode_code_page(&cleaned)
}

/// Strip control characters and quote values the YAML grammar would
/// misread: every value of a configured key, and any value that starts
/// with a comma.
pub fn repair_yaml(text: &str, options: &SessionTextOptions) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    for line in text.split('\n') {
        let stripped: String =
            line.chars().filter(|c| !c.is_control() || *c == '\t').collect();
        out.push_str(&repair_line(&stripped, options));
        out.push('\n');
    }
    // split leaves one extra empty line at the end
    out.pop();
    out
}

fn repair_line<'a>(line: &'a str, options: &SessionTextOptions) -> Cow<'a, str> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let (dash, entry) = match body.strip_prefix("- ") {
        Some(rest) => ("- ", rest),
        None => ("", body),
    };

    let Some((key, value)) = entry.split_once(": ") else {
        return Cow::Borrowed(line);
    };
    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Cow::Borrowed(line);
    }

    let value = value.trim();
    if value.is_empty() {
        return Cow::Borrowed(line);
    }

    let force = value.starts_with(',') || options.quoted_keys.iter().any(|k| k == key);
    if !force {
        return Cow::Borrowed(line);
    }

    Cow::Owned(format!("{indent}{dash}{key}: {}", quote_scalar(value)))
}

/// Double-quoted YAML scalar with backslash, quote and newline escaped.
pub fn quote_scalar(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_page_decodes_one_byte_per_char() {
        assert_eq!(decode_code_page(b"Caf\xe9"), "Caf\u{e9}");
        assert_eq!(decode_code_page(&[0x80, 0x92, 0x9F]), "\u{20AC}\u{2019}\u{178}");
        assert_eq!(decode_code_page(&[0x81]).chars().count(), 1);
    }

    #[test]
    fn section_bytes_are_substituted_and_truncated() {
        let raw = b"  UserName: A\x81B\x9d\n\0\0garbage";
        let text = decode_section(raw, &SessionTextOptions::default());
        assert_eq!(text, "  UserName: A B \n");
    }

    #[test]
    fn substitution_table_is_configurable() {
        let options = SessionTextOptions { substitutions: vec![b'#'], ..Default::default() };
        assert_eq!(decode_section(b"a#b\x81", &options), "a b\u{81}");
    }

    #[test]
    fn quoted_keys_are_escaped() {
        let text = "   UserName: Sam \"Fast\" O\\Neil\n   CarNumber: 7";
        let repaired = repair_yaml(text, &SessionTextOptions::default());
        assert_eq!(repaired, "   UserName: \"Sam \\\"Fast\\\" O\\\\Neil\"\n   CarNumber: 7");
    }

    #[test]
    fn list_items_and_comma_values_are_quoted() {
        let text = "  - TeamName: #1 Racing\n    CarClassShortName: ,GT3\n    Plain: a, b";
        let repaired = repair_yaml(text, &SessionTextOptions::default());
        assert_eq!(
            repaired,
            "  - TeamName: \"#1 Racing\"\n    CarClassShortName: \",GT3\"\n    Plain: a, b"
        );
    }

    #[test]
    fn control_characters_are_stripped() {
        let text = "  TrackName: road\u{1}atlanta\u{7f}\r";
        let repaired = repair_yaml(text, &SessionTextOptions::default());
        assert_eq!(repaired, "  TrackName: roadatlanta");
    }

    #[test]
    fn lines_without_values_are_untouched() {
        let text = "DriverInfo:\n  Drivers:\n  - CarIdx: 0\n";
        assert_eq!(repair_yaml(text, &SessionTextOptions::default()), text);
    }
}
