//! Process-global variable registry.
//!
//! Unlike the hook constants injected into each tag, these variables are
//! reachable from anywhere in the process. The owning container installs
//! them; tags only read.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::RwLock;
use tracing::debug;

use crate::error::{FormError, Result};
use crate::value::{Constants, Variable};

/// `None` until a container installs its variables.
static GLOBAL_VARIABLES: Lazy<RwLock<Option<Constants>>> = Lazy::new(|| RwLock::new(None));

/// Handle to the process-global variable registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalVariables;

impl GlobalVariables {
    /// Get the global registry handle
    pub fn global() -> Self {
        Self
    }

    /// Replace the registry contents.
    pub fn install(&self, variables: Constants) -> Result<()> {
        let mut guard = GLOBAL_VARIABLES
            .write()
            .map_err(|e| FormError::Lock(e.to_string()))?;
        debug!(count = variables.len(), "global variables installed");
        *guard = Some(variables);
        Ok(())
    }

    /// Set a single variable, creating the registry if needed.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let mut guard = GLOBAL_VARIABLES
            .write()
            .map_err(|e| FormError::Lock(e.to_string()))?;
        guard
            .get_or_insert_with(Constants::new)
            .insert(key.into(), Variable::new(value));
        Ok(())
    }

    /// Remove the registry entirely.
    pub fn clear(&self) -> Result<()> {
        let mut guard = GLOBAL_VARIABLES
            .write()
            .map_err(|e| FormError::Lock(e.to_string()))?;
        *guard = None;
        Ok(())
    }

    /// Whether a registry has been installed.
    pub fn is_available(&self) -> Result<bool> {
        let guard = GLOBAL_VARIABLES
            .read()
            .map_err(|e| FormError::Lock(e.to_string()))?;
        Ok(guard.is_some())
    }

    /// The value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Value> {
        let guard = GLOBAL_VARIABLES
            .read()
            .map_err(|e| FormError::Lock(e.to_string()))?;
        let variables = guard.as_ref().ok_or_else(FormError::variables_unavailable)?;
        variables
            .get(key)
            .map(|var| var.value.clone())
            .ok_or_else(|| FormError::unmapped_variable(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VariableLookupFailure;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_registry_errors() {
        let vars = GlobalVariables::global();
        vars.clear().unwrap();
        assert!(!vars.is_available().unwrap());
        let err = vars.get("${region}").unwrap_err();
        assert!(matches!(
            err,
            FormError::MissingVariable {
                reason: VariableLookupFailure::RegistryUnavailable
            }
        ));
    }

    #[test]
    #[serial]
    fn installed_variables_resolve() {
        let vars = GlobalVariables::global();
        let mut table = Constants::new();
        table.insert("${region}".into(), Variable::new(json!("eu-west")));
        vars.install(table).unwrap();

        assert_eq!(vars.get("${region}").unwrap(), json!("eu-west"));
        let err = vars.get("${zone}").unwrap_err();
        assert!(matches!(
            err,
            FormError::MissingVariable {
                reason: VariableLookupFailure::Unmapped { ref key }
            } if key == "${zone}"
        ));
        vars.clear().unwrap();
    }

    #[test]
    #[serial]
    fn set_creates_registry() {
        let vars = GlobalVariables::global();
        vars.clear().unwrap();
        vars.set("${count}", json!(3)).unwrap();
        assert_eq!(vars.get("${count}").unwrap(), json!(3));
        vars.clear().unwrap();
    }
}
