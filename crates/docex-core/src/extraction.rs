use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::PipelineContext;
use crate::document::Document;
use crate::error::Result;

/// Caller-supplied structured-data contract that extraction fills in.
///
/// The orchestrators never inspect a schema's fields; they only move values of
/// it between stages.
pub trait ExtractionSchema:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    /// JSON rendering of the empty schema, used as the output contract in prompts.
    fn template() -> Value {
        serde_json::to_value(Self::default()).unwrap_or(Value::Null)
    }
}

/// Untyped schema: any JSON value. The template is `null`.
impl ExtractionSchema for Value {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult<S> {
    pub data: S,
    /// Auxiliary detail such as model name or token usage.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl<S> ExtractionResult<S> {
    pub fn new(data: S) -> Self {
        Self {
            data,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait Extractor<S: ExtractionSchema>: Send + Sync {
    async fn extract(
        &self,
        document: &Document,
        context: &PipelineContext,
    ) -> Result<ExtractionResult<S>>;
}

/// Persists one document's extraction result. Called once per surviving item.
#[async_trait]
pub trait ExtractionExporter<S: ExtractionSchema>: Send + Sync {
    async fn export(
        &self,
        document: &Document,
        result: &ExtractionResult<S>,
        context: &PipelineContext,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Invoice {
        number: Option<String>,
        total: Option<i64>,
    }

    impl ExtractionSchema for Invoice {}

    #[test]
    fn test_template_renders_default_fields() {
        let template = Invoice::template();
        let obj = template.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj["number"].is_null());
        assert!(obj["total"].is_null());
    }

    #[test]
    fn test_result_metadata_builder() {
        let result = ExtractionResult::new(Invoice::default())
            .with_metadata("model", "test-model")
            .with_metadata("input_tokens", 120);
        assert_eq!(result.metadata["model"], "test-model");
        assert_eq!(result.metadata["input_tokens"], 120);
    }

    #[test]
    fn test_result_deserializes_without_metadata() {
        let result: ExtractionResult<Invoice> =
            serde_json::from_str(r#"{"data": {"number": "INV-1", "total": 10}}"#).unwrap();
        assert_eq!(result.data.number.as_deref(), Some("INV-1"));
        assert!(result.metadata.is_empty());
    }
}
