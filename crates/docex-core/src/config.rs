use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{DocexError, Result};

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Concurrency limits for one orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Worker-pool size for ingestion and evaluator work.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Permits bounding concurrent extract/evaluate/export stages.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl OrchestratorConfig {
    pub fn new(max_workers: usize, max_concurrency: usize) -> Self {
        Self {
            max_workers,
            max_concurrency,
        }
    }

    /// Defaults overridden by `DOCEX_MAX_WORKERS` / `DOCEX_MAX_CONCURRENCY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_usize("DOCEX_MAX_WORKERS") {
            self.max_workers = v;
        }
        if let Some(v) = env_usize("DOCEX_MAX_CONCURRENCY") {
            self.max_concurrency = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(DocexError::Config("max_workers must be greater than 0".into()));
        }
        if self.max_concurrency == 0 {
            return Err(DocexError::Config(
                "max_concurrency must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring non-numeric environment override");
            None
        }
    }
}

/// A role implementation that can be built from its own configuration section.
pub trait Component: Sized {
    type Config: DeserializeOwned;

    /// Key of the section holding this component's configuration, e.g. `reader`.
    const CONFIG_KEY: &'static str;

    fn from_config(config: Self::Config) -> Result<Self>;
}

/// Declarative configuration bundle for a whole pipeline.
///
/// ```yaml
/// orchestrator:
///   max_workers: 4
///   max_concurrency: 10
/// components:
///   reader: { mime_type: application/pdf }
///   converter: {}
/// evaluators:
///   accuracy: {}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub components: Mapping,
    #[serde(default)]
    pub evaluators: Mapping,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DocexError::Config(format!("reading config {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: PipelineConfig = serde_yaml::from_str(raw)?;
        config.orchestrator.apply_env_overrides();
        Ok(config)
    }

    pub fn has_component(&self, key: &str) -> bool {
        self.components.contains_key(key)
    }

    /// Typed configuration for role `T`; missing sections are a configuration error.
    pub fn component_config<T: Component>(&self) -> Result<T::Config> {
        let section = self.components.get(T::CONFIG_KEY).ok_or_else(|| {
            DocexError::Config(format!(
                "missing required configuration section 'components.{}'",
                T::CONFIG_KEY
            ))
        })?;
        decode_section(section, "components", T::CONFIG_KEY)
    }

    /// Build role `T` from its section.
    pub fn build<T: Component>(&self) -> Result<T> {
        T::from_config(self.component_config::<T>()?)
    }

    /// Configuration for evaluator `E`, or `None` when the bundle has no entry for it.
    pub fn evaluator_config<E: Component>(&self) -> Result<Option<E::Config>> {
        match self.evaluators.get(E::CONFIG_KEY) {
            Some(section) => decode_section(section, "evaluators", E::CONFIG_KEY).map(Some),
            None => Ok(None),
        }
    }
}

fn decode_section<C: DeserializeOwned>(section: &Value, group: &str, key: &str) -> Result<C> {
    // `reader:` with no body parses as null; treat it as an empty mapping.
    let section = if section.is_null() {
        Value::Mapping(Mapping::new())
    } else {
        section.clone()
    };
    serde_yaml::from_value(section)
        .map_err(|e| DocexError::Config(format!("invalid configuration for '{group}.{key}': {e}")))
}
