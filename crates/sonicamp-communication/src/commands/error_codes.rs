//! Device error code decoder
//! Converts the numeric error codes of error answers to readable messages

use regex::Regex;
use sonicamp_core::ProtocolError;
use std::sync::OnceLock;

/// Lowest code that denotes an error answer
pub const ERROR_CODE_BASE: i32 = 20000;

static ERROR_ANSWER_REGEX: OnceLock<Regex> = OnceLock::new();

/// Error codes the firmware answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    /// 20001
    CommandNotKnown,
    /// 20002
    NotImplemented,
    /// 20003
    NotPermitted,
    /// 20004
    SyntaxError,
    /// 20005
    InvalidValue,
    /// 20006
    ParseError,
}

impl DeviceErrorCode {
    /// Look up a numeric code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            20001 => Some(Self::CommandNotKnown),
            20002 => Some(Self::NotImplemented),
            20003 => Some(Self::NotPermitted),
            20004 => Some(Self::SyntaxError),
            20005 => Some(Self::InvalidValue),
            20006 => Some(Self::ParseError),
            _ => None,
        }
    }

    /// Numeric code
    pub fn code(&self) -> i32 {
        match self {
            Self::CommandNotKnown => 20001,
            Self::NotImplemented => 20002,
            Self::NotPermitted => 20003,
            Self::SyntaxError => 20004,
            Self::InvalidValue => 20005,
            Self::ParseError => 20006,
        }
    }

    /// Short name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommandNotKnown => "command_not_known",
            Self::NotImplemented => "not_implemented",
            Self::NotPermitted => "not_permitted",
            Self::SyntaxError => "syntax_error",
            Self::InvalidValue => "invalid_value",
            Self::ParseError => "parse_error",
        }
    }
}

/// Decode an error code to a human-readable message
pub fn decode_error(code: i32) -> String {
    match DeviceErrorCode::from_code(code) {
        Some(DeviceErrorCode::CommandNotKnown) => {
            "The device does not know this command.".to_string()
        }
        Some(DeviceErrorCode::NotImplemented) => {
            "The command is known but not implemented by this firmware.".to_string()
        }
        Some(DeviceErrorCode::NotPermitted) => {
            "The command is not permitted in the current mode.".to_string()
        }
        Some(DeviceErrorCode::SyntaxError) => "The command is malformed.".to_string(),
        Some(DeviceErrorCode::InvalidValue) => {
            "The argument is outside the accepted values.".to_string()
        }
        Some(DeviceErrorCode::ParseError) => {
            "The device could not parse the request.".to_string()
        }
        None => format!("Unknown device error code: {}", code),
    }
}

/// Format error code with its message
pub fn format_error(code: i32) -> String {
    format!("error {}: {}", code, decode_error(code))
}

/// Recognize an error answer `2xxxx[#value]`
///
/// Returns the decoded error, or `None` for regular answers.
pub fn parse_error_answer(body: &str) -> Option<ProtocolError> {
    let regex = ERROR_ANSWER_REGEX.get_or_init(|| {
        Regex::new(r"(?s)^\s*(2\d{4})(?:#(.*))?$").expect("invalid error answer regex")
    });
    let captures = regex.captures(body)?;
    let code: i32 = captures.get(1)?.as_str().parse().ok()?;
    let kind = DeviceErrorCode::from_code(code)
        .map(|c| c.kind().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let value = captures
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty());
    Some(ProtocolError::DeviceError { code, kind, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_codes() {
        for code in 20001..=20006 {
            let decoded = DeviceErrorCode::from_code(code).unwrap();
            assert_eq!(decoded.code(), code);
            assert!(!decode_error(code).starts_with("Unknown"));
        }
        assert!(decode_error(20099).starts_with("Unknown"));
        assert!(format_error(20004).contains("malformed"));
    }

    #[test]
    fn test_parse_error_answer() {
        assert_eq!(
            parse_error_answer("20005#9999999"),
            Some(ProtocolError::DeviceError {
                code: 20005,
                kind: "invalid_value".to_string(),
                value: Some("9999999".to_string()),
            })
        );
        assert_eq!(
            parse_error_answer("20001"),
            Some(ProtocolError::DeviceError {
                code: 20001,
                kind: "command_not_known".to_string(),
                value: None,
            })
        );
        assert_eq!(parse_error_answer("1050#1000 kHz"), None);
        assert_eq!(parse_error_answer("200012"), None);
    }
}
