//! Channel text encoding
//!
//! The firmware speaks the host platform's narrow encoding: Windows-1252 on
//! Windows, UTF-8 elsewhere. Frame lengths are measured in encoded bytes.

/// Code points for bytes 0x80..=0x9F in Windows-1252; `None` marks undefined bytes.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Text encoding used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelEncoding {
    /// UTF-8
    #[default]
    Utf8,
    /// Windows-1252
    Windows1252,
}

impl ChannelEncoding {
    /// Encoding of the host platform
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::Windows1252
        } else {
            Self::Utf8
        }
    }

    /// Encode text; characters Windows-1252 cannot represent become `?`
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Windows1252 => text.chars().map(encode_cp1252).collect(),
        }
    }

    /// Decode bytes; invalid sequences become U+FFFD
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Windows1252 => bytes.iter().map(|b| decode_cp1252(*b)).collect(),
        }
    }

    /// Length of `text` in encoded bytes
    pub fn encoded_len(&self, text: &str) -> usize {
        match self {
            Self::Utf8 => text.len(),
            Self::Windows1252 => text.chars().count(),
        }
    }
}

fn decode_cp1252(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[usize::from(byte - 0x80)].unwrap_or('\u{FFFD}'),
        _ => char::from(byte),
    }
}

fn encode_cp1252(c: char) -> u8 {
    let code = u32::from(c);
    if code < 0x80 || (0xA0..=0xFF).contains(&code) {
        return code as u8;
    }
    CP1252_HIGH
        .iter()
        .position(|candidate| *candidate == Some(c))
        .map(|index| 0x80 + index as u8)
        .unwrap_or(b'?')
}
