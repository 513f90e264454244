//! Framed packages of the sonic protocol
//!
//! A package travels as `<destination#source#id#length#content>` followed by
//! a newline. The content is raw text without escaping and may span lines.

use regex::Regex;
use sonicamp_core::{ConnectionError, Result};
use std::fmt;
use std::sync::OnceLock;

use super::encoding::ChannelEncoding;

/// Literal that opens a frame
pub const START_SYMBOL: u8 = b'<';
/// Literal that closes a frame
pub const END_SYMBOL: u8 = b'>';
/// Largest accepted content, in encoded bytes
pub const MAX_BODY_SIZE: usize = 2048;

fn frame_regex() -> &'static Regex {
    static FRAME: OnceLock<Regex> = OnceLock::new();
    FRAME.get_or_init(|| {
        Regex::new(r"(?s)^\s*<(\d+)#(\d+)#(\d+)#(\d+)#(.*)>\s*$").expect("invalid frame regex")
    })
}

/// One frame of the sonic protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Destination id.
    pub destination: u32,
    /// Source id.
    pub source: u32,
    /// Correlation id, echoed by the device in its answer.
    pub id: u16,
    /// Declared content length in encoded bytes.
    pub length: usize,
    /// Payload.
    pub content: String,
}

impl Package {
    /// Create a package whose length is the UTF-8 length of `content`
    pub fn new(destination: u32, source: u32, id: u16, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            destination,
            source,
            id,
            length: content.len(),
            content,
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}#{}#{}#{}#{}>",
            self.destination, self.source, self.id, self.length, self.content
        )
    }
}

/// Converts packages to bytes and back
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageParser {
    encoding: ChannelEncoding,
}

impl PackageParser {
    /// Create a parser for the given channel encoding
    pub fn new(encoding: ChannelEncoding) -> Self {
        Self { encoding }
    }

    /// Channel encoding in use
    pub fn encoding(&self) -> ChannelEncoding {
        self.encoding
    }

    /// Build a package whose length matches `content` in this encoding
    pub fn package(&self, destination: u32, source: u32, id: u16, content: &str) -> Package {
        Package {
            destination,
            source,
            id,
            length: self.encoding.encoded_len(content),
            content: content.to_string(),
        }
    }

    /// Serialize a package, newline terminated
    ///
    /// The length field is always computed from the content.
    pub fn write(&self, package: &Package) -> Vec<u8> {
        let text = format!(
            "<{}#{}#{}#{}#{}>\n",
            package.destination,
            package.source,
            package.id,
            self.encoding.encoded_len(&package.content),
            package.content
        );
        self.encoding.encode(&text)
    }

    /// Parse one frame from raw bytes
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Package> {
        self.parse(&self.encoding.decode(bytes))
    }

    /// Parse one frame from text
    pub fn parse(&self, text: &str) -> Result<Package> {
        let captures = frame_regex().captures(text).ok_or_else(|| framing(format!(
            "not a package: {:?}",
            truncate(text)
        )))?;

        let number = |index: usize| captures.get(index).map(|m| m.as_str()).unwrap_or_default();
        let destination = number(1)
            .parse::<u32>()
            .map_err(|_| framing(format!("invalid destination {}", number(1))))?;
        let source = number(2)
            .parse::<u32>()
            .map_err(|_| framing(format!("invalid source {}", number(2))))?;
        let id = number(3)
            .parse::<u16>()
            .map_err(|_| framing(format!("invalid id {}", number(3))))?;
        let length = number(4)
            .parse::<usize>()
            .map_err(|_| framing(format!("invalid length {}", number(4))))?;
        let content = captures
            .get(5)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let actual = self.encoding.encoded_len(&content);
        if actual > MAX_BODY_SIZE {
            return Err(framing(format!(
                "body of {} bytes exceeds {} bytes",
                actual, MAX_BODY_SIZE
            )));
        }
        if actual != length {
            tracing::debug!(id, declared = length, actual, "Package length mismatch");
        }

        Ok(Package {
            destination,
            source,
            id,
            length,
            content,
        })
    }
}

fn framing(reason: String) -> sonicamp_core::Error {
    ConnectionError::Framing { reason }.into()
}

fn truncate(text: &str) -> String {
    text.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_computes_length() {
        let parser = PackageParser::default();
        let package = parser.package(0, 0, 1, "?info");
        assert_eq!(parser.write(&package), b"<0#0#1#5#?info>\n".to_vec());
    }

    #[test]
    fn test_parse_multiline_content() {
        let parser = PackageParser::default();
        let package = parser
            .parse("<0#0#7#24#LOG=INFO: hi\n1050#1000 kHz>\n")
            .unwrap();
        assert_eq!(package.id, 7);
        assert_eq!(package.content, "LOG=INFO: hi\n1050#1000 kHz");
    }

    #[test]
    fn test_parse_tolerates_wrong_length() {
        let parser = PackageParser::default();
        let package = parser.parse("<0#0#1#30#mvp_worker v1.0.0 (build 42)>").unwrap();
        assert_eq!(package.length, 30);
        assert_eq!(package.content, "mvp_worker v1.0.0 (build 42)");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let parser = PackageParser::default();
        assert!(parser.parse("mvp_worker v1.0.0").is_err());
        assert!(parser.parse("<0#0#x#1#a>").is_err());
        assert!(parser.parse("<0#0#65536#1#a>").is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_body() {
        let parser = PackageParser::default();
        let body = "a".repeat(MAX_BODY_SIZE + 1);
        let frame = format!("<0#0#1#{}#{}>", body.len(), body);
        assert!(parser.parse(&frame).is_err());
    }
}
