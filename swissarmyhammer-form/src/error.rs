//! Error types for form tag operations

use std::fmt;
use thiserror::Error;

/// Result type for form tag operations
pub type Result<T> = std::result::Result<T, FormError>;

/// Why a global variable lookup failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableLookupFailure {
    /// No global variable registry has been installed
    RegistryUnavailable,
    /// The registry exists but has no entry for the key
    Unmapped { key: String },
}

impl fmt::Display for VariableLookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistryUnavailable => write!(f, "global variables are not available"),
            Self::Unmapped { key } => write!(f, "'{key}' does not match any variable"),
        }
    }
}

/// Errors that can occur while building, validating or reading form tags
#[derive(Debug, Error)]
pub enum FormError {
    /// A nested field value does not exist at the given path segment
    #[error("form data has no property '{segment}'")]
    MissingPath { segment: String },

    /// Global variable lookup failed
    #[error("variable lookup failed: {reason}")]
    MissingVariable { reason: VariableLookupFailure },

    /// A `regex` rule carries a pattern that does not compile
    #[error("invalid validation pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A `custom` rule names a validator that was never registered
    #[error("custom validator not registered: {name}")]
    UnknownValidator { name: String },

    /// A rule is missing the arguments its type needs
    #[error("rule '{rule}' is missing its args")]
    MissingRuleArgs { rule: String },

    /// A custom validator reported an error instead of a result
    #[error("custom validator failed on tag '{tag}': {message}")]
    ValidatorFailed { tag: String, message: String },

    /// Tag configuration is missing a required attribute
    #[error("tag attribute '{attr}' is required")]
    MissingAttribute { attr: String },

    /// A lifecycle step was called out of order
    #[error("tag '{tag}' cannot {action} while {state}")]
    Lifecycle {
        tag: String,
        action: &'static str,
        state: &'static str,
    },

    /// Failed to acquire a lock on shared state
    #[error("lock error: {0}")]
    Lock(String),

    /// Form definition could not be loaded
    #[error("form configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl FormError {
    /// Create a missing path error
    pub fn missing_path(segment: impl Into<String>) -> Self {
        Self::MissingPath {
            segment: segment.into(),
        }
    }

    /// Create a missing variable error for an unmapped key
    pub fn unmapped_variable(key: impl Into<String>) -> Self {
        Self::MissingVariable {
            reason: VariableLookupFailure::Unmapped { key: key.into() },
        }
    }

    /// Create a missing variable error for an absent registry
    pub fn variables_unavailable() -> Self {
        Self::MissingVariable {
            reason: VariableLookupFailure::RegistryUnavailable,
        }
    }
}

impl From<figment::Error> for FormError {
    fn from(error: figment::Error) -> Self {
        Self::Config(Box::new(error))
    }
}
