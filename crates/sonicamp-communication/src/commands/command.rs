//! Bound commands and command instances
//!
//! A [`BoundCommand`] is a contract narrowed to the one command and answer
//! definition that apply to the connected device. A [`Command`] is one
//! request built from it: the formatted message plus, once received, the
//! interpreted [`Answer`].

use serde::{Deserialize, Serialize};
use sonicamp_core::{FieldValue, ProtocolError};
use std::sync::Arc;

use super::answer::Answer;
use super::codes::CommandCode;
use super::contract::{AnswerDef, CommandDef, ParamDef};
use super::error_codes::parse_error_answer;
use super::validator::AnswerValidator;

/// Arguments of a command instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandArgs {
    /// Value of the index parameter.
    pub index: Option<FieldValue>,
    /// Value of the setter parameter.
    pub value: Option<FieldValue>,
}

impl CommandArgs {
    /// No arguments
    pub fn none() -> Self {
        Self::default()
    }

    /// Only a setter value
    pub fn value(value: impl Into<FieldValue>) -> Self {
        Self {
            index: None,
            value: Some(value.into()),
        }
    }

    /// Only an index
    pub fn index(index: impl Into<FieldValue>) -> Self {
        Self {
            index: Some(index.into()),
            value: None,
        }
    }

    /// Index and setter value
    pub fn indexed(index: impl Into<FieldValue>, value: impl Into<FieldValue>) -> Self {
        Self {
            index: Some(index.into()),
            value: Some(value.into()),
        }
    }
}

/// A contract resolved for one device
#[derive(Debug, Clone)]
pub struct BoundCommand {
    /// Command code.
    pub code: CommandCode,
    /// Selected spelling.
    pub command_def: CommandDef,
    /// Selected answer layout.
    pub answer_def: AnswerDef,
    /// Compiled answer matcher.
    pub validator: AnswerValidator,
}

impl BoundCommand {
    /// Bind a command and answer definition
    pub fn new(
        code: CommandCode,
        command_def: CommandDef,
        answer_def: AnswerDef,
    ) -> Result<Self, regex::Error> {
        let validator = AnswerValidator::new(&answer_def)?;
        Ok(Self {
            code,
            command_def,
            answer_def,
            validator,
        })
    }

    fn invalid(&self, reason: impl Into<String>) -> ProtocolError {
        ProtocolError::InvalidArgument {
            command: self.command_def.identifier.clone(),
            reason: reason.into(),
        }
    }

    /// Spell a request, checking the arguments against the parameter types
    pub fn format(&self, args: &CommandArgs) -> Result<String, ProtocolError> {
        let mut message = self.command_def.identifier.clone();
        match (&self.command_def.index_param, &args.index) {
            (Some(param), Some(index)) => {
                message.push_str(&self.format_param(param, index)?);
            }
            (Some(param), None) => return Err(self.invalid(format!("missing {}", param.name))),
            (None, Some(_)) => return Err(self.invalid("takes no index")),
            (None, None) => {}
        }
        match (&self.command_def.setter_param, &args.value) {
            (Some(param), Some(value)) => {
                message.push('=');
                message.push_str(&self.format_param(param, value)?);
            }
            (Some(param), None) => return Err(self.invalid(format!("missing {}", param.name))),
            (None, Some(_)) => return Err(self.invalid("takes no value")),
            (None, None) => {}
        }
        Ok(message)
    }

    fn format_param(&self, param: &ParamDef, value: &FieldValue) -> Result<String, ProtocolError> {
        param
            .field_type
            .check(value)
            .map_err(|e| self.invalid(format!("{}: {}", param.name, e)))?;
        Ok(param.field_type.format_argument(value))
    }

    /// Parse the text after a matched spelling into arguments
    ///
    /// The remainder is split on the first `=`; the part before it is the
    /// index, the part after it the setter value. Anything the definition
    /// does not expect is rejected.
    pub fn parse_arguments(&self, remainder: &str) -> Result<CommandArgs, ProtocolError> {
        let (head, tail) = match remainder.split_once('=') {
            Some((head, tail)) => (head.trim(), Some(tail.trim())),
            None => (remainder.trim(), None),
        };

        let index = match (&self.command_def.index_param, head) {
            (Some(param), "") => return Err(self.invalid(format!("missing {}", param.name))),
            (Some(param), text) => Some(self.parse_param(param, text)?),
            (None, "") => None,
            (None, text) => return Err(self.invalid(format!("unexpected argument {text:?}"))),
        };
        let value = match (&self.command_def.setter_param, tail) {
            (Some(param), Some(text)) => Some(self.parse_param(param, text)?),
            (Some(param), None) => return Err(self.invalid(format!("missing {}", param.name))),
            (None, None) => None,
            (None, Some(text)) => {
                return Err(self.invalid(format!("unexpected argument {text:?}")))
            }
        };
        Ok(CommandArgs { index, value })
    }

    fn parse_param(&self, param: &ParamDef, text: &str) -> Result<FieldValue, ProtocolError> {
        param
            .field_type
            .parse_argument(text)
            .map_err(|e| self.invalid(format!("{}: {}", param.name, e)))
    }

    /// Interpret an answer body for a request made with `args`
    pub fn interpret(&self, body: &str, args: &CommandArgs) -> Answer {
        let mut answer = Answer::new(body.trim());
        answer.was_validated = true;

        if let Some(ProtocolError::DeviceError { code, kind, .. }) = parse_error_answer(body) {
            answer.command_code = Some(code);
            answer.invalid_reason = Some(kind);
            return answer;
        }

        let mut payload = body.trim();
        if self.answer_def.code_prefixed {
            let (code, rest) = payload.split_once('#').unwrap_or((payload, ""));
            match code.trim().parse::<i32>() {
                Ok(code) if code == self.code.value() => {
                    answer.command_code = Some(code);
                    payload = rest;
                }
                Ok(code) => {
                    answer.command_code = Some(code);
                    answer.invalid_reason =
                        Some(format!("expected code {}, got {}", self.code.value(), code));
                    return answer;
                }
                Err(_) => {
                    answer.invalid_reason = Some("missing command code".to_string());
                    return answer;
                }
            }
        }

        match self.validator.validate(payload) {
            Ok(fields) => {
                for (path, value) in fields {
                    match path.resolve(args.index.as_ref(), args.value.as_ref()) {
                        Some(key) => {
                            answer.field_value_dict.insert(key, value);
                        }
                        None => tracing::warn!(
                            command = %self.code,
                            field = %path,
                            "Answer field depends on a parameter the request did not have"
                        ),
                    }
                }
                answer.valid = true;
            }
            Err(reason) => answer.invalid_reason = Some(reason),
        }
        answer
    }
}

/// One request and, once received, its answer
#[derive(Debug, Clone)]
pub struct Command {
    bound: Arc<BoundCommand>,
    args: CommandArgs,
    message: String,
    answer: Option<Answer>,
}

impl Command {
    /// Build a request, checking the arguments
    pub fn new(bound: Arc<BoundCommand>, args: CommandArgs) -> Result<Self, ProtocolError> {
        let message = bound.format(&args)?;
        Ok(Self {
            bound,
            args,
            message,
            answer: None,
        })
    }

    /// Command code
    pub fn code(&self) -> CommandCode {
        self.bound.code
    }

    /// Arguments of this request
    pub fn args(&self) -> &CommandArgs {
        &self.args
    }

    /// Text written to the device
    pub fn byte_message(&self) -> &str {
        &self.message
    }

    /// Whether the answer may span several lines
    pub fn expects_multiline(&self) -> bool {
        self.bound.answer_def.multiline
    }

    /// Validate a received body and store the answer
    pub fn receive_answer(&mut self, body: &str) {
        let answer = self.bound.interpret(body, &self.args);
        if !answer.valid && !answer.is_error() {
            tracing::warn!(
                command = %self.message,
                answer = %answer.raw_message,
                reason = answer.invalid_reason.as_deref().unwrap_or_default(),
                "Invalid answer"
            );
        }
        self.answer = Some(answer);
    }

    /// The received answer
    pub fn answer(&self) -> Option<&Answer> {
        self.answer.as_ref()
    }

    /// Take the received answer
    pub fn into_answer(self) -> Option<Answer> {
        self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fields::{AnswerField, FieldPath, FieldType, ParamRole};
    use sonicamp_core::SiUnit;

    fn set_frequency() -> Arc<BoundCommand> {
        Arc::new(
            BoundCommand::new(
                CommandCode::SetFrequency,
                CommandDef::new("!freq")
                    .alias("!f")
                    .setter("frequency", FieldType::int().range(0.0, 10_000_000.0)),
                AnswerDef::new(vec![AnswerField::new(
                    "frequency",
                    FieldType::float().with_unit(SiUnit::Hertz),
                )])
                .code_prefixed(),
            )
            .unwrap(),
        )
    }

    fn set_atf() -> Arc<BoundCommand> {
        Arc::new(
            BoundCommand::new(
                CommandCode::SetAtf,
                CommandDef::new("!atf")
                    .index("index", FieldType::int().allowed([1, 2, 3]))
                    .setter("frequency", FieldType::int()),
                AnswerDef::new(vec![AnswerField::at(
                    FieldPath::derived("atf", ParamRole::Index),
                    FieldType::int(),
                )]),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_format_and_answer() {
        let mut command =
            Command::new(set_frequency(), CommandArgs::value(1_000_000u32)).unwrap();
        assert_eq!(command.byte_message(), "!freq=1000000");

        command.receive_answer("1050#1000 kHz");
        let answer = command.answer().unwrap();
        assert!(answer.valid);
        assert_eq!(answer.command_code, Some(1050));
        assert_eq!(
            answer.field("frequency"),
            Some(&FieldValue::Float(1_000_000.0))
        );
    }

    #[test]
    fn test_wrong_code_is_invalid() {
        let mut command = Command::new(set_frequency(), CommandArgs::value(5u32)).unwrap();
        command.receive_answer("1051#5 Hz");
        assert!(!command.answer().unwrap().valid);
    }

    #[test]
    fn test_error_answer_is_recognized() {
        let mut command = Command::new(set_frequency(), CommandArgs::value(5u32)).unwrap();
        command.receive_answer("20005#5");
        let answer = command.into_answer().unwrap();
        assert!(answer.is_error());
        assert!(!answer.valid);
    }

    #[test]
    fn test_argument_checks() {
        assert!(Command::new(set_frequency(), CommandArgs::none()).is_err());
        assert!(Command::new(set_frequency(), CommandArgs::value(20_000_000u32)).is_err());
        assert!(Command::new(set_atf(), CommandArgs::indexed(4, 1000)).is_err());
        assert_eq!(
            Command::new(set_atf(), CommandArgs::indexed(2, 1_200_000))
                .unwrap()
                .byte_message(),
            "!atf2=1200000"
        );
    }

    #[test]
    fn test_parse_arguments() {
        let atf = set_atf();
        assert_eq!(
            atf.parse_arguments("2=1200000").unwrap(),
            CommandArgs::indexed(2, 1_200_000)
        );
        assert!(atf.parse_arguments("=1200000").is_err());
        assert!(atf.parse_arguments("4=1200000").is_err());
        assert!(set_frequency().parse_arguments("=12 13").is_err());
        assert!(set_frequency().parse_arguments("x=12").is_err());
    }

    #[test]
    fn test_derived_path_resolved_from_index() {
        let mut command = Command::new(set_atf(), CommandArgs::indexed(3, 1_100_000)).unwrap();
        command.receive_answer("1100000");
        assert_eq!(
            command.answer().unwrap().field("atf.3"),
            Some(&FieldValue::Int(1_100_000))
        );
    }
}
