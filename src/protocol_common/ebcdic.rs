//! EBCDIC code-page translation
//!
//! The 3270 data stream carries EBCDIC cell bytes. Sessions translate through
//! a pluggable [`CodePageTranslator`] looked up by name in a
//! [`CodePageRegistry`]; the built-in entry is CP037 (US/Canada) under the
//! name `"0037-ascii"`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Name of the translator every registry starts with
pub const DEFAULT_CODE_PAGE: &str = "0037-ascii";

/// EBCDIC CP037 to Unicode table, indexed by EBCDIC byte
const EBCDIC_CP037_TO_ASCII: [char; 256] = [
    // 0x00-0x0F: Control characters
    '\x00', '\x01', '\x02', '\x03', '\u{009C}', '\t', '\u{0086}', '\x7F',
    '\u{0097}', '\u{008D}', '\u{008E}', '\x0B', '\x0C', '\r', '\x0E', '\x0F',
    // 0x10-0x1F: Control characters
    '\x10', '\x11', '\x12', '\x13', '\u{009D}', '\u{0085}', '\x08', '\u{0087}',
    '\x18', '\x19', '\u{0092}', '\u{008F}', '\x1C', '\x1D', '\x1E', '\x1F',
    // 0x20-0x2F: Control characters and special
    '\u{0080}', '\u{0081}', '\u{0082}', '\u{0083}', '\u{0084}', '\n', '\x17', '\x1B',
    '\u{0088}', '\u{0089}', '\u{008A}', '\u{008B}', '\u{008C}', '\x05', '\x06', '\x07',
    // 0x30-0x3F: Control characters
    '\u{0090}', '\u{0091}', '\x16', '\u{0093}', '\u{0094}', '\u{0095}', '\u{0096}', '\x04',
    '\u{0098}', '\u{0099}', '\u{009A}', '\u{009B}', '\x14', '\x15', '\u{009E}', '\x1A',
    // 0x40-0x4F: Space and special characters
    ' ', '\u{00A0}', '\u{00E2}', '\u{00E4}', '\u{00E0}', '\u{00E1}', '\u{00E3}', '\u{00E5}',
    '\u{00E7}', '\u{00F1}', '\u{00A2}', '.', '<', '(', '+', '|',
    // 0x50-0x5F: Ampersand and special characters
    '&', '\u{00E9}', '\u{00EA}', '\u{00EB}', '\u{00E8}', '\u{00ED}', '\u{00EE}', '\u{00EF}',
    '\u{00EC}', '\u{00DF}', '!', '$', '*', ')', ';', '\u{00AC}',
    // 0x60-0x6F: Dash and special characters
    '-', '/', '\u{00C2}', '\u{00C4}', '\u{00C0}', '\u{00C1}', '\u{00C3}', '\u{00C5}',
    '\u{00C7}', '\u{00D1}', '\u{00A6}', ',', '%', '_', '>', '?',
    // 0x70-0x7F: Special characters and quotes
    '\u{00F8}', '\u{00C9}', '\u{00CA}', '\u{00CB}', '\u{00C8}', '\u{00CD}', '\u{00CE}', '\u{00CF}',
    '\u{00CC}', '`', ':', '#', '@', '\'', '=', '"',
    // 0x80-0x8F: Special character and lowercase a-i
    '\u{00D8}', 'a', 'b', 'c', 'd', 'e', 'f', 'g',
    'h', 'i', '\u{00AB}', '\u{00BB}', '\u{00F0}', '\u{00FD}', '\u{00FE}', '\u{00B1}',
    // 0x90-0x9F: Degree symbol and lowercase j-r
    '\u{00B0}', 'j', 'k', 'l', 'm', 'n', 'o', 'p',
    'q', 'r', '\u{00AA}', '\u{00BA}', '\u{00E6}', '\u{00B8}', '\u{00C6}', '\u{00A4}',
    // 0xA0-0xAF: Micro sign and lowercase s-z
    '\u{00B5}', '~', 's', 't', 'u', 'v', 'w', 'x',
    'y', 'z', '\u{00A1}', '\u{00BF}', '\u{00D0}', '\u{00DD}', '\u{00DE}', '\u{00AE}',
    // 0xB0-0xBF: Caret and special characters
    '^', '\u{00A3}', '\u{00A5}', '\u{00B7}', '\u{00A9}', '\u{00A7}', '\u{00B6}', '\u{00BC}',
    '\u{00BD}', '\u{00BE}', '[', ']', '\u{00AF}', '\u{00A8}', '\u{00B4}', '\u{00D7}',
    // 0xC0-0xCF: Left brace and uppercase A-I
    '{', 'A', 'B', 'C', 'D', 'E', 'F', 'G',
    'H', 'I', '\u{00AD}', '\u{00F4}', '\u{00F6}', '\u{00F2}', '\u{00F3}', '\u{00F5}',
    // 0xD0-0xDF: Right brace and uppercase J-R
    '}', 'J', 'K', 'L', 'M', 'N', 'O', 'P',
    'Q', 'R', '\u{00B9}', '\u{00FB}', '\u{00FC}', '\u{00F9}', '\u{00FA}', '\u{00FF}',
    // 0xE0-0xEF: Backslash and uppercase S-Z
    '\\', '\u{00F7}', 'S', 'T', 'U', 'V', 'W', 'X',
    'Y', 'Z', '\u{00B2}', '\u{00D4}', '\u{00D6}', '\u{00D2}', '\u{00D3}', '\u{00D5}',
    // 0xF0-0xFF: Digits 0-9 and special characters
    '0', '1', '2', '3', '4', '5', '6', '7',
    '8', '9', '\u{00B3}', '\u{00DB}', '\u{00DC}', '\u{00D9}', '\u{00DA}', '\u{009F}',
];

/// Reverse of the CP037 table for every code point below U+0100
static ASCII_TO_EBCDIC_CP037: Lazy<[u8; 256]> = Lazy::new(|| {
    // Unmapped characters become EBCDIC space
    let mut table = [0x40u8; 256];
    for (ebcdic, ch) in EBCDIC_CP037_TO_ASCII.iter().enumerate() {
        let code = *ch as u32;
        if code < 256 {
            table[code as usize] = ebcdic as u8;
        }
    }
    table
});

/// Convert an EBCDIC byte to a character using CP037
///
/// ```
/// use tn3270r::protocol_common::ebcdic::ebcdic_to_ascii;
///
/// assert_eq!(ebcdic_to_ascii(0xC1), 'A');
/// assert_eq!(ebcdic_to_ascii(0xF0), '0');
/// ```
pub fn ebcdic_to_ascii(byte: u8) -> char {
    EBCDIC_CP037_TO_ASCII[byte as usize]
}

/// Convert a character to its CP037 byte, EBCDIC space (0x40) if unmapped
///
/// ```
/// use tn3270r::protocol_common::ebcdic::ascii_to_ebcdic;
///
/// assert_eq!(ascii_to_ebcdic('A'), 0xC1);
/// assert_eq!(ascii_to_ebcdic('\u{2603}'), 0x40);
/// ```
pub fn ascii_to_ebcdic(ch: char) -> u8 {
    let code = ch as u32;
    if code < 256 {
        ASCII_TO_EBCDIC_CP037[code as usize]
    } else {
        0x40
    }
}

/// Translates between host EBCDIC bytes and local text
///
/// Implementations must be lossless for the characters they claim to support
/// and should map everything else to a code-page specific substitute.
pub trait CodePageTranslator: Send + Sync + fmt::Debug {
    /// Encode text into host bytes
    fn to_ebcdic(&self, text: &str) -> Vec<u8>;

    /// Decode host bytes into text
    fn from_ebcdic(&self, bytes: &[u8]) -> String;

    /// Decode a single cell
    fn decode_byte(&self, byte: u8) -> char {
        self.from_ebcdic(&[byte]).chars().next().unwrap_or(' ')
    }
}

/// CP037 translator backed by the static tables above
#[derive(Debug, Default, Clone, Copy)]
pub struct Cp037Translator;

impl CodePageTranslator for Cp037Translator {
    fn to_ebcdic(&self, text: &str) -> Vec<u8> {
        text.chars().map(ascii_to_ebcdic).collect()
    }

    fn from_ebcdic(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| ebcdic_to_ascii(b)).collect()
    }

    fn decode_byte(&self, byte: u8) -> char {
        ebcdic_to_ascii(byte)
    }
}

/// Name to translator map consulted when a session selects its code page
#[derive(Debug, Clone)]
pub struct CodePageRegistry {
    translators: HashMap<String, Arc<dyn CodePageTranslator>>,
}

impl CodePageRegistry {
    /// Registry holding only the built-in CP037 translator
    pub fn new() -> Self {
        let mut translators: HashMap<String, Arc<dyn CodePageTranslator>> = HashMap::new();
        translators.insert(DEFAULT_CODE_PAGE.to_string(), Arc::new(Cp037Translator));
        Self { translators }
    }

    /// Add or replace the translator registered under `name`
    pub fn register(&mut self, name: impl Into<String>, translator: Arc<dyn CodePageTranslator>) {
        let name = name.into();
        log::debug!("registering code page translator '{}'", name);
        self.translators.insert(name, translator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CodePageTranslator>> {
        self.translators.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.translators.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.translators.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CodePageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ebcdic_to_ascii_letters() {
        assert_eq!(ebcdic_to_ascii(0xC1), 'A');
        assert_eq!(ebcdic_to_ascii(0xE9), 'Z');
        assert_eq!(ebcdic_to_ascii(0x81), 'a');
        assert_eq!(ebcdic_to_ascii(0xA9), 'z');
        assert_eq!(ebcdic_to_ascii(0x40), ' ');
    }

    #[test]
    fn test_reverse_table_matches_forward() {
        let text = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 .,;:!?$#@";
        for ch in text.chars() {
            assert_eq!(ebcdic_to_ascii(ascii_to_ebcdic(ch)), ch, "round trip failed for '{}'", ch);
        }
        assert_eq!(ascii_to_ebcdic('\0'), 0x00);
    }

    #[test]
    fn test_cp037_translator() {
        let translator = Cp037Translator;
        assert_eq!(translator.to_ebcdic("HI"), vec![0xC8, 0xC9]);
        assert_eq!(translator.from_ebcdic(&[0xC8, 0xC5, 0xD3, 0xD3, 0xD6]), "HELLO");
        assert_eq!(translator.decode_byte(0xF5), '5');
    }

    #[derive(Debug)]
    struct Upper;

    impl CodePageTranslator for Upper {
        fn to_ebcdic(&self, text: &str) -> Vec<u8> {
            text.bytes().collect()
        }

        fn from_ebcdic(&self, bytes: &[u8]) -> String {
            String::from_utf8_lossy(bytes).to_uppercase()
        }
    }

    #[test]
    fn test_registry_register_and_lookup() {
        let mut registry = CodePageRegistry::new();
        assert!(registry.contains(DEFAULT_CODE_PAGE));
        assert!(registry.get("1047-ascii").is_none());

        registry.register("raw", Arc::new(Upper));
        let raw = registry.get("raw").unwrap();
        assert_eq!(raw.from_ebcdic(b"abc"), "ABC");
        assert_eq!(raw.decode_byte(b'q'), 'Q');
        assert_eq!(registry.names(), vec!["0037-ascii".to_string(), "raw".to_string()]);
    }
}
