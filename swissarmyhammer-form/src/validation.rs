//! Rule evaluation for tag values.
//!
//! A rule only runs when its type is enabled in the tag's `validateSet`.
//! Placeholder values (`${name}`) bypass `regex` and `custom` rules since
//! they are resolved later. Validation failures are reported as
//! [`ValidateInfo`]; errors are reserved for broken configuration such as a
//! pattern that does not compile.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{FormError, Result};
use crate::rules::{RuleType, ValidationRule, ValidatorRegistry};
use crate::tag::Tag;
use crate::value::{is_placeholder, is_required_empty, pattern_subject};

/// Message reported by a failed `required` rule.
pub const REQUIRED_MESSAGE: &str = "required field";

/// Outcome of the most recent validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidateInfo {
    pub valid: bool,
    pub message: String,
}

impl ValidateInfo {
    /// A passing result.
    pub fn ok() -> Self {
        Self {
            valid: true,
            message: String::new(),
        }
    }

    /// A failing result with `message`.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

impl Default for ValidateInfo {
    fn default() -> Self {
        Self::ok()
    }
}

/// How a rule list is walked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMode {
    /// Stop at the first failing rule and report it.
    #[default]
    FirstFailure,
    /// Run every rule; the result is the AND of all of them and the report
    /// holds whichever rule ran last.
    EvaluateAll,
}

/// Result of running a rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    /// The info of the last rule evaluated, `None` for an empty list.
    pub info: Option<ValidateInfo>,
}

/// Evaluates rules for one tag.
pub struct ValidationEngine<'a> {
    validate_set: &'a [String],
    registry: &'a ValidatorRegistry,
    mode: ValidationMode,
}

impl<'a> ValidationEngine<'a> {
    /// An engine enforcing the rule types in `validate_set`.
    pub fn new(
        validate_set: &'a [String],
        registry: &'a ValidatorRegistry,
        mode: ValidationMode,
    ) -> Self {
        Self {
            validate_set,
            registry,
            mode,
        }
    }

    /// Whether rules of `type_` are enforced.
    pub fn is_enabled(&self, type_: &RuleType) -> bool {
        self.validate_set.iter().any(|t| t == type_.as_str())
    }

    /// Run `rules` in order against `value`.
    pub fn run(
        &self,
        tag: &Tag,
        rules: &[ValidationRule],
        value: &Value,
        parent_value: &Value,
    ) -> Result<ValidationReport> {
        let mut valid = true;
        let mut info = None;
        for rule in rules {
            let result = self.rule_result(tag, rule, value, parent_value)?;
            valid &= result.valid;
            let failed = !result.valid;
            info = Some(result);
            if failed && self.mode == ValidationMode::FirstFailure {
                break;
            }
        }
        Ok(ValidationReport { valid, info })
    }

    /// Evaluate a single rule.
    pub fn rule_result(
        &self,
        tag: &Tag,
        rule: &ValidationRule,
        value: &Value,
        parent_value: &Value,
    ) -> Result<ValidateInfo> {
        if !self.is_enabled(&rule.type_) {
            return Ok(ValidateInfo::ok());
        }

        let info = match rule.type_ {
            RuleType::Required => {
                if is_required_empty(value) {
                    ValidateInfo::fail(REQUIRED_MESSAGE)
                } else {
                    ValidateInfo::ok()
                }
            }
            RuleType::Regex => {
                if is_placeholder(value) {
                    return Ok(ValidateInfo::ok());
                }
                let pattern = rule.pattern()?;
                let regex = Regex::new(pattern).map_err(|source| FormError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
                if regex.is_match(&pattern_subject(value)) {
                    ValidateInfo::ok()
                } else {
                    ValidateInfo::fail(rule.error_message.clone())
                }
            }
            RuleType::Custom => {
                if is_placeholder(value) {
                    return Ok(ValidateInfo::ok());
                }
                let validator = rule.validator(self.registry)?;
                let outcome = validator(tag, value, parent_value)?;
                if outcome.result {
                    ValidateInfo::ok()
                } else {
                    ValidateInfo::fail(outcome.error_message)
                }
            }
            RuleType::Other(_) => ValidateInfo::ok(),
        };

        if !info.valid {
            debug!(tag = %tag.tag_code(), rule = %rule.type_, message = %info.message, "rule failed");
        }
        Ok(info)
    }
}
