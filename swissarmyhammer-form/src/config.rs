//! Form definitions loaded from configuration files.
//!
//! A [`FormDefinition`] carries the tag configurations for one form, the hook
//! constants injected into every tag and the validation mode. Sources are
//! merged in precedence order:
//!
//! 1. Default values
//! 2. The definition file (YAML, JSON or TOML by extension)
//! 3. Environment variables prefixed with `SAH_FORM_`

use std::path::Path;
use std::rc::Rc;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Result;
use crate::events::{EventBus, TagWrapper};
use crate::tag::{TagConfig, TagEnv};
use crate::validation::ValidationMode;
use crate::value::Constants;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SAH_FORM_";

/// Supported definition file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Yaml,
    Json,
    Toml,
}

impl DefinitionFormat {
    /// Pick a format from a file extension. Unknown extensions read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Everything needed to build the tags of one form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormDefinition {
    #[serde(default)]
    pub tags: Vec<TagConfig>,
    /// Hook constants keyed by placeholder.
    #[serde(default)]
    pub constants: Constants,
    #[serde(default)]
    pub validation_mode: ValidationMode,
}

impl FormDefinition {
    /// Load a definition file with environment overrides applied.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = DefinitionFormat::from_path(path);
        debug!(path = %path.display(), ?format, "loading form definition");

        let file = match format {
            DefinitionFormat::Yaml => Figment::from(Yaml::file(path)),
            DefinitionFormat::Json => Figment::from(Json::file(path)),
            DefinitionFormat::Toml => Figment::from(Toml::file(path)),
        };
        Self::extract(Self::base().merge(file).merge(Self::env()))
    }

    /// Parse a definition from a string without environment overrides.
    pub fn from_str(source: &str, format: DefinitionFormat) -> Result<Self> {
        let data = match format {
            DefinitionFormat::Yaml => Figment::from(Yaml::string(source)),
            DefinitionFormat::Json => Figment::from(Json::string(source)),
            DefinitionFormat::Toml => Figment::from(Toml::string(source)),
        };
        Self::extract(Self::base().merge(data))
    }

    fn base() -> Figment {
        Figment::new().merge(Serialized::defaults(FormDefinition::default()))
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).map(|key| key.as_str().to_lowercase().into())
    }

    fn extract(figment: Figment) -> Result<Self> {
        let definition: Self = figment.extract()?;
        for tag in &definition.tags {
            tag.check()?;
        }
        trace!(
            tags = definition.tags.len(),
            constants = definition.constants.len(),
            mode = ?definition.validation_mode,
            "form definition extracted"
        );
        Ok(definition)
    }

    /// Find a tag config by its code.
    pub fn tag(&self, tag_code: &str) -> Option<&TagConfig> {
        self.tags.iter().find(|t| t.tag_code == tag_code)
    }

    /// An environment carrying this form's constants and validation mode.
    pub fn env_for(&self, bus: Rc<dyn EventBus>, wrapper: Rc<dyn TagWrapper>) -> TagEnv {
        TagEnv::new(bus, wrapper)
            .with_constants(Rc::new(self.constants.clone()))
            .with_mode(self.validation_mode)
    }
}
