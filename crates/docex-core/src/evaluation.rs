use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::PipelineContext;
use crate::document::{Document, PathIdentifier};
use crate::error::Result;
use crate::extraction::{ExtractionResult, ExtractionSchema};

/// One metric computed by one evaluator for one example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub name: String,
    pub result: Value,
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EvaluationResult {
    pub fn new(
        name: impl Into<String>,
        result: impl Into<Value>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            result: result.into(),
            description: description.into(),
            metadata: Map::new(),
        }
    }

    /// Numeric view of `result`; booleans count as 1.0 / 0.0.
    pub fn score(&self) -> Option<f64> {
        match &self.result {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// Ground truth paired with the location of the document it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExample<S> {
    pub id: String,
    pub path_identifier: PathIdentifier,
    #[serde(rename = "true")]
    pub truth: ExtractionResult<S>,
}

/// A document together with every evaluator's output for it, in evaluator
/// registration order.
pub type EvaluatedDocument = (Document, Vec<EvaluationResult>);

/// Compares a prediction against ground truth. CPU-bound; runs on the worker pool.
pub trait Evaluator<S: ExtractionSchema>: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        truth: &ExtractionResult<S>,
        pred: &ExtractionResult<S>,
        context: &PipelineContext,
    ) -> Result<EvaluationResult>;
}

/// Persists the results of a whole evaluation run in a single call, so that
/// cross-document aggregates can be computed.
#[async_trait]
pub trait EvaluationExporter: Send + Sync {
    async fn export(&self, results: &[EvaluatedDocument], context: &PipelineContext) -> Result<()>;
}

pub trait TestDataLoader<S: ExtractionSchema>: Send + Sync {
    fn load_test_data(
        &self,
        path: &PathIdentifier,
        context: &PipelineContext,
    ) -> Result<Vec<TestExample<S>>>;
}
