//! Answers received for commands

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sonicamp_core::{FieldValue, ProtocolError};
use std::collections::BTreeMap;

use super::error_codes::{parse_error_answer, ERROR_CODE_BASE};

/// The device's reply to one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Answer body as received.
    pub raw_message: String,
    /// Whether the body matched the contract.
    pub valid: bool,
    /// Whether validation ran at all.
    pub was_validated: bool,
    /// Code echoed at the start of the body, if any.
    pub command_code: Option<i32>,
    /// Decoded fields keyed by resolved dotted path.
    pub field_value_dict: BTreeMap<String, FieldValue>,
    /// When the body arrived.
    pub received_timestamp: DateTime<Utc>,
    /// Why validation failed.
    pub invalid_reason: Option<String>,
}

impl Answer {
    /// Unvalidated answer for a body
    pub fn new(raw_message: impl Into<String>) -> Self {
        Self {
            raw_message: raw_message.into(),
            valid: false,
            was_validated: false,
            command_code: None,
            field_value_dict: BTreeMap::new(),
            received_timestamp: Utc::now(),
            invalid_reason: None,
        }
    }

    /// Whether the device answered with an error code
    pub fn is_error(&self) -> bool {
        self.command_code.is_some_and(|code| code >= ERROR_CODE_BASE)
    }

    /// The device error carried by this answer
    pub fn device_error(&self) -> Option<ProtocolError> {
        if !self.is_error() {
            return None;
        }
        parse_error_answer(&self.raw_message)
    }

    /// Look up a decoded field
    pub fn field(&self, path: &str) -> Option<&FieldValue> {
        self.field_value_dict.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_answer() {
        let mut answer = Answer::new("20003#ramp");
        answer.command_code = Some(20003);
        assert!(answer.is_error());
        assert!(matches!(
            answer.device_error(),
            Some(ProtocolError::DeviceError { code: 20003, .. })
        ));

        let mut answer = Answer::new("1050#1000 kHz");
        answer.command_code = Some(1050);
        assert!(!answer.is_error());
        assert_eq!(answer.device_error(), None);
    }
}
