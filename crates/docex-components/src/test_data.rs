use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use docex_core::config::Component;
use docex_core::context::PipelineContext;
use docex_core::document::PathIdentifier;
use docex_core::error::{DocexError, Result};
use docex_core::evaluation::{TestDataLoader, TestExample};
use docex_core::extraction::{ExtractionResult, ExtractionSchema};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonTestDataLoaderConfig {
    /// Directory that relative input paths are resolved against.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

/// Loads labelled examples from a JSON array of
/// `{"inputs": {"input_path": ...}, "expectations": {...}}` entries.
///
/// `input_pdf_path` is accepted in place of `input_path`. The example id is the
/// input file's stem.
pub struct JsonTestDataLoader<S> {
    base_dir: Option<PathBuf>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: ExtractionSchema> JsonTestDataLoader<S> {
    pub fn new(config: JsonTestDataLoaderConfig) -> Self {
        Self {
            base_dir: config.base_dir,
            _schema: PhantomData,
        }
    }

    fn resolve(&self, input: &str) -> PathBuf {
        let path = Path::new(input);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn parse_entry(&self, source: &str, index: usize, entry: Value) -> Result<TestExample<S>> {
        let invalid = |message: String| DocexError::Read {
            path: source.to_string(),
            message: format!("entry {index}: {message}"),
        };

        let Value::Object(mut entry) = entry else {
            return Err(invalid("each test data entry must be an object".into()));
        };

        let expectations = entry
            .remove("expectations")
            .filter(|v| !v.is_null())
            .ok_or_else(|| invalid("missing expectations".into()))?;

        let input = entry
            .get("inputs")
            .and_then(|inputs| inputs.get("input_path").or_else(|| inputs.get("input_pdf_path")))
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing inputs.input_path".into()))?;

        let resolved = self.resolve(input);
        let id = resolved
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| invalid(format!("input path {input} has no file name")))?;

        let data: S = serde_json::from_value(expectations)
            .map_err(|e| invalid(format!("expectations do not match the schema: {e}")))?;

        Ok(TestExample {
            id,
            path_identifier: PathIdentifier::new(resolved.to_string_lossy()),
            truth: ExtractionResult::new(data),
        })
    }
}

impl<S: ExtractionSchema> Component for JsonTestDataLoader<S> {
    type Config = JsonTestDataLoaderConfig;
    const CONFIG_KEY: &'static str = "test_data_loader";

    fn from_config(config: Self::Config) -> Result<Self> {
        Ok(Self::new(config))
    }
}

impl<S: ExtractionSchema> TestDataLoader<S> for JsonTestDataLoader<S> {
    fn load_test_data(
        &self,
        path: &PathIdentifier,
        _context: &PipelineContext,
    ) -> Result<Vec<TestExample<S>>> {
        let raw = std::fs::read_to_string(&path.path).map_err(|e| DocexError::Read {
            path: path.path.clone(),
            message: format!("test data not found: {e}"),
        })?;

        let Value::Array(entries) = serde_json::from_str::<Value>(&raw)? else {
            return Err(DocexError::Read {
                path: path.path.clone(),
                message: "test data must be a JSON array".to_string(),
            });
        };

        let examples = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| self.parse_entry(&path.path, i, entry))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(path = %path, count = examples.len(), "Parsed test data");
        Ok(examples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Lease {
        tenant: Option<String>,
        rent: Option<u32>,
    }

    impl ExtractionSchema for Lease {}

    fn load(body: &str, config: JsonTestDataLoaderConfig) -> Result<Vec<TestExample<Lease>>> {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test_data.json");
        std::fs::write(&file, body).unwrap();
        JsonTestDataLoader::<Lease>::new(config).load_test_data(
            &PathIdentifier::new(file.to_string_lossy()),
            &PipelineContext::new(),
        )
    }

    #[test]
    fn test_loads_examples_in_order() {
        let body = r#"[
            {"inputs": {"input_path": "docs/lease_a.pdf"},
             "expectations": {"tenant": "A", "rent": 900}},
            {"inputs": {"input_pdf_path": "docs/lease_b.pdf"},
             "expectations": {"tenant": null, "rent": null}}
        ]"#;
        let examples = load(body, JsonTestDataLoaderConfig::default()).unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].id, "lease_a");
        assert_eq!(examples[0].path_identifier.path, "docs/lease_a.pdf");
        assert_eq!(examples[0].truth.data.rent, Some(900));
        assert_eq!(examples[1].id, "lease_b");
        assert_eq!(examples[1].truth.data, Lease::default());
    }

    #[test]
    fn test_relative_paths_resolve_against_base_dir() {
        let body = r#"[{"inputs": {"input_path": "a.pdf"}, "expectations": {}}]"#;
        let config = JsonTestDataLoaderConfig {
            base_dir: Some(PathBuf::from("/srv/leases")),
        };
        let examples = load(body, config).unwrap();
        assert_eq!(examples[0].path_identifier.path, "/srv/leases/a.pdf");
    }

    #[test]
    fn test_missing_expectations_names_entry() {
        let body = r#"[
            {"inputs": {"input_path": "a.pdf"}, "expectations": {}},
            {"inputs": {"input_path": "b.pdf"}}
        ]"#;
        let err = load(body, JsonTestDataLoaderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("entry 1"), "{err}");
    }

    #[test]
    fn test_missing_input_path_is_error() {
        let body = r#"[{"inputs": {}, "expectations": {}}]"#;
        let err = load(body, JsonTestDataLoaderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("inputs.input_path"), "{err}");
    }

    #[test]
    fn test_non_array_is_error() {
        let err = load(r#"{"inputs": {}}"#, JsonTestDataLoaderConfig::default()).unwrap_err();
        assert!(matches!(err, DocexError::Read { .. }));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = JsonTestDataLoader::<Lease>::new(JsonTestDataLoaderConfig::default())
            .load_test_data(
                &PathIdentifier::new("/nonexistent/test_data.json"),
                &PipelineContext::new(),
            )
            .unwrap_err();
        assert!(matches!(err, DocexError::Read { .. }));
    }
}
