//! Answer validation
//!
//! Each [`AnswerDef`] is compiled into one anchored regex. Every field
//! contributes `prefix (?P<alias>capture) [unit] postfix`, fields are joined
//! by the answer separator, and the captures are converted by their field
//! types.

use regex::Regex;
use sonicamp_core::FieldValue;

use super::contract::AnswerDef;
use super::fields::{AnswerField, FieldPath};

/// Compiled matcher for one answer layout
#[derive(Debug, Clone)]
pub struct AnswerValidator {
    regex: Regex,
    fields: Vec<AnswerField>,
}

fn unit_group(alias: &str) -> String {
    format!("{alias}__si")
}

impl AnswerValidator {
    /// Compile the regex for an answer layout
    pub fn new(def: &AnswerDef) -> Result<Self, regex::Error> {
        let pattern = if def.fields.is_empty() {
            "(?s)^.*$".to_string()
        } else {
            let body: Vec<String> = def
                .fields
                .iter()
                .map(|field| {
                    let alias = field.path.alias();
                    format!(
                        "{}(?P<{}>{}){}{}",
                        regex::escape(&field.prefix),
                        alias,
                        field.field_type.capture_pattern(),
                        field
                            .field_type
                            .unit_pattern(&unit_group(&alias))
                            .unwrap_or_default(),
                        regex::escape(&field.postfix)
                    )
                })
                .collect();
            format!(
                r"(?s)^\s*{}\s*$",
                body.join(&regex::escape(&def.separator))
            )
        };

        Ok(Self {
            regex: Regex::new(&pattern)?,
            fields: def.fields.clone(),
        })
    }

    /// The synthesized pattern
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether the text has the right shape, without converting fields
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Match and convert an answer body
    ///
    /// Returns the fields by their unresolved path, or a description of the
    /// first mismatch.
    pub fn validate(&self, text: &str) -> Result<Vec<(FieldPath, FieldValue)>, String> {
        let captures = self
            .regex
            .captures(text)
            .ok_or_else(|| format!("does not match {}", self.regex.as_str()))?;

        self.fields
            .iter()
            .map(|field| {
                let alias = field.path.alias();
                let raw = captures
                    .name(&alias)
                    .map(|m| m.as_str())
                    .ok_or_else(|| format!("missing field {}", field.path))?;
                let written_prefix = captures.name(&unit_group(&alias)).map(|m| m.as_str());
                let value = field
                    .field_type
                    .convert(raw, written_prefix)
                    .map_err(|e| format!("field {}: {}", field.path, e))?;
                Ok((field.path.clone(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fields::{FieldType, ParamRole};
    use sonicamp_core::SiUnit;

    fn dash() -> AnswerValidator {
        AnswerValidator::new(&AnswerDef::new(vec![
            AnswerField::new("frequency", FieldType::int()),
            AnswerField::new("gain", FieldType::int()),
            AnswerField::new("signal", FieldType::signal()),
            AnswerField::new("temperature", FieldType::float()),
        ]))
        .unwrap()
    }

    #[test]
    fn test_accepts_legal_and_rejects_illegal() {
        let validator = dash();
        let fields = validator.validate("1000000#50#1#23.5").unwrap();
        assert_eq!(fields[0].1, FieldValue::Int(1_000_000));
        assert_eq!(fields[2].1, FieldValue::Bool(true));
        assert_eq!(fields[3].1, FieldValue::Float(23.5));

        assert!(validator.validate("fast#50#1#23.5").is_err());
        assert!(validator.validate("1000000#50#maybe#23.5").is_err());
        assert!(validator.validate("1000000#50#1").is_err());
    }

    #[test]
    fn test_unit_suffix_scales() {
        let validator = AnswerValidator::new(&AnswerDef::new(vec![AnswerField::new(
            "frequency",
            FieldType::float().with_unit(SiUnit::Hertz),
        )]))
        .unwrap();
        assert_eq!(
            validator.validate("1000 kHz").unwrap()[0].1,
            FieldValue::Float(1_000_000.0)
        );
        assert_eq!(
            validator.validate("1.5 MHz").unwrap()[0].1,
            FieldValue::Float(1_500_000.0)
        );
        assert_eq!(
            validator.validate("1200 Hz").unwrap()[0].1,
            FieldValue::Float(1200.0)
        );
        assert!(validator.validate("1200 parsecs").is_err());
    }

    #[test]
    fn test_prefix_postfix_and_derived_alias() {
        let validator = AnswerValidator::new(
            &AnswerDef::new(vec![AnswerField::at(
                FieldPath::derived("atf", ParamRole::Index),
                FieldType::int(),
            )
            .with_prefix("atf=")
            .with_postfix(";")]),
        )
        .unwrap();
        assert!(validator.pattern().contains("x_atf__d_index"));
        let fields = validator.validate("atf=1200000;").unwrap();
        assert_eq!(fields[0].0, FieldPath::derived("atf", ParamRole::Index));
        assert!(validator.validate("1200000").is_err());
    }

    #[test]
    fn test_empty_answer_accepts_anything() {
        let validator = AnswerValidator::new(&AnswerDef::empty()).unwrap();
        assert!(validator.validate("whatever\nyou say").unwrap().is_empty());
    }
}
