//! Declarative validation rules.
//!
//! Rules are declared as `{type, args, error_message}` objects. `regex`
//! rules carry a pattern in `args`; `custom` rules carry either the name of a
//! registered validator or an in-process closure.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{FormError, Result};
use crate::tag::Tag;

/// The kind of a validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleType {
    Required,
    Regex,
    Custom,
    /// Any other type name. Always valid.
    Other(String),
}

impl RuleType {
    /// The rule type name as written in configuration.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Required => "required",
            Self::Regex => "regex",
            Self::Custom => "custom",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for RuleType {
    fn from(name: &str) -> Self {
        match name {
            "required" => Self::Required,
            "regex" => Self::Regex,
            "custom" => Self::Custom,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RuleType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RuleType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

/// What a custom validator reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomOutcome {
    pub result: bool,
    #[serde(default)]
    pub error_message: String,
}

impl CustomOutcome {
    /// A passing outcome.
    pub fn pass() -> Self {
        Self {
            result: true,
            error_message: String::new(),
        }
    }

    /// A failing outcome with `message`.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            result: false,
            error_message: message.into(),
        }
    }
}

/// A custom validator, called with the tag, its value and its parent value.
pub type CustomValidator = Arc<dyn Fn(&Tag, &Value, &Value) -> Result<CustomOutcome>>;

/// Rule arguments.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleArgs {
    /// A regex pattern, or the name of a registered custom validator.
    Text(String),
    /// An in-process validator; these exist only in code.
    #[serde(skip)]
    Function(CustomValidator),
}

impl fmt::Debug for RuleArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A single validation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Rule type. Serialized as `type`.
    #[serde(rename = "type")]
    pub type_: RuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<RuleArgs>,
    #[serde(default)]
    pub error_message: String,
}

impl ValidationRule {
    /// A `required` rule.
    pub fn required() -> Self {
        Self {
            type_: RuleType::Required,
            args: None,
            error_message: String::new(),
        }
    }

    /// A `regex` rule failing with `error_message` when `pattern` does not match.
    pub fn regex(pattern: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            type_: RuleType::Regex,
            args: Some(RuleArgs::Text(pattern.into())),
            error_message: error_message.into(),
        }
    }

    /// A custom rule resolved by name through a [`ValidatorRegistry`].
    pub fn named(validator: impl Into<String>) -> Self {
        Self {
            type_: RuleType::Custom,
            args: Some(RuleArgs::Text(validator.into())),
            error_message: String::new(),
        }
    }

    /// A custom rule backed by a closure.
    pub fn custom(
        validator: impl Fn(&Tag, &Value, &Value) -> Result<CustomOutcome> + 'static,
    ) -> Self {
        Self {
            type_: RuleType::Custom,
            args: Some(RuleArgs::Function(Arc::new(validator))),
            error_message: String::new(),
        }
    }

    /// The pattern text of a `regex` rule.
    pub fn pattern(&self) -> Result<&str> {
        match &self.args {
            Some(RuleArgs::Text(pattern)) => Ok(pattern),
            _ => Err(FormError::MissingRuleArgs {
                rule: self.type_.to_string(),
            }),
        }
    }

    /// The validator of a `custom` rule, resolving names through `registry`.
    pub fn validator(&self, registry: &ValidatorRegistry) -> Result<CustomValidator> {
        match &self.args {
            Some(RuleArgs::Function(f)) => Ok(f.clone()),
            Some(RuleArgs::Text(name)) => registry.get(name),
            None => Err(FormError::MissingRuleArgs {
                rule: self.type_.to_string(),
            }),
        }
    }
}

/// Named custom validators available to `custom` rules declared in config.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: IndexMap<String, CustomValidator>,
}

impl ValidatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator under `name`.
    pub fn register(
        mut self,
        name: impl Into<String>,
        validator: impl Fn(&Tag, &Value, &Value) -> Result<CustomOutcome> + 'static,
    ) -> Self {
        self.validators.insert(name.into(), Arc::new(validator));
        self
    }

    /// Look up a validator by name.
    pub fn get(&self, name: &str) -> Result<CustomValidator> {
        self.validators
            .get(name)
            .cloned()
            .ok_or_else(|| FormError::UnknownValidator {
                name: name.to_string(),
            })
    }

    /// Whether a validator is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.validators.keys()).finish()
    }
}
