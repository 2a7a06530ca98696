use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use docex_core::config::Component;
use docex_core::context::PipelineContext;
use docex_core::error::{DocexError, Result};
use docex_core::evaluation::{EvaluationResult, Evaluator};
use docex_core::extraction::{ExtractionResult, ExtractionSchema};

use crate::judge::{ExactMatch, FieldJudge, LlmJudge, LlmJudgeConfig};

/// Shared settings for the field-level evaluators.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldEvaluatorConfig {
    /// Top-level schema fields left out of the comparison.
    #[serde(default)]
    pub ignore_fields: Vec<String>,
    /// Compare field values through an LLM judge instead of exact equality.
    #[serde(default)]
    pub use_llm_judge: bool,
    #[serde(default)]
    pub llm_judge: LlmJudgeConfig,
}

impl FieldEvaluatorConfig {
    fn judge(&self) -> Result<Arc<dyn FieldJudge>> {
        if self.use_llm_judge {
            Ok(Arc::new(LlmJudge::from_config(self.llm_judge.clone())?))
        } else {
            Ok(Arc::new(ExactMatch))
        }
    }
}

struct FieldPair {
    field: String,
    truth: Value,
    pred: Value,
}

/// Flattens truth and prediction into their top-level fields, truth order first.
fn field_pairs<S: ExtractionSchema>(
    evaluator: &str,
    ignore: &[String],
    truth: &ExtractionResult<S>,
    pred: &ExtractionResult<S>,
) -> Result<Vec<FieldPair>> {
    let truth = as_object(evaluator, &truth.data)?;
    let mut pred = as_object(evaluator, &pred.data)?;

    Ok(truth
        .into_iter()
        .filter(|(key, _)| !ignore.contains(key))
        .map(|(field, truth)| {
            let pred = pred.remove(&field).unwrap_or(Value::Null);
            FieldPair { field, truth, pred }
        })
        .collect())
}

fn as_object<S: ExtractionSchema>(evaluator: &str, data: &S) -> Result<Map<String, Value>> {
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(map),
        other => Err(DocexError::Evaluation {
            evaluator: evaluator.to_string(),
            message: format!("expected a JSON object, got {other}"),
        }),
    }
}

fn is_match(judge: &dyn FieldJudge, pair: &FieldPair) -> Result<bool> {
    judge.same(&pair.field, &pair.truth, &pair.pred)
}

/// Field-level accuracy: matching fields over all truth fields.
pub struct AccuracyEvaluator {
    config: FieldEvaluatorConfig,
    judge: Arc<dyn FieldJudge>,
}

impl AccuracyEvaluator {
    pub const NAME: &'static str = "accuracy";

    /// Exact comparison. `use_llm_judge` is honoured by [`Component::from_config`].
    pub fn new(config: FieldEvaluatorConfig) -> Self {
        Self::with_judge(config, Arc::new(ExactMatch))
    }

    pub fn with_judge(config: FieldEvaluatorConfig, judge: Arc<dyn FieldJudge>) -> Self {
        Self { config, judge }
    }
}

impl Component for AccuracyEvaluator {
    type Config = FieldEvaluatorConfig;
    const CONFIG_KEY: &'static str = Self::NAME;

    fn from_config(config: Self::Config) -> Result<Self> {
        let judge = config.judge()?;
        Ok(Self::with_judge(config, judge))
    }
}

impl<S: ExtractionSchema> Evaluator<S> for AccuracyEvaluator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        truth: &ExtractionResult<S>,
        pred: &ExtractionResult<S>,
        _context: &PipelineContext,
    ) -> Result<EvaluationResult> {
        let pairs = field_pairs(Self::NAME, &self.config.ignore_fields, truth, pred)?;
        let total = pairs.len();
        let mut matches = 0usize;
        for pair in &pairs {
            if is_match(self.judge.as_ref(), pair)? {
                matches += 1;
            }
        }
        let accuracy = if total == 0 {
            0.0
        } else {
            matches as f64 / total as f64
        };

        let mut result = EvaluationResult::new(
            Self::NAME,
            accuracy,
            format!(
                "Field-level accuracy ({matches}/{total}, {} comparison).",
                self.judge.name()
            ),
        );
        result.metadata.insert("matches".into(), Value::from(matches));
        result.metadata.insert("total".into(), Value::from(total));
        result.metadata.insert("judge".into(), Value::from(self.judge.name()));
        Ok(result)
    }
}

/// Field-level F1.
///
/// Fields null on both sides are skipped. A match with non-null truth is a true
/// positive; a mismatch counts as a false positive when the prediction is
/// non-null and as a false negative when the truth is non-null.
pub struct F1Evaluator {
    config: FieldEvaluatorConfig,
    judge: Arc<dyn FieldJudge>,
}

impl F1Evaluator {
    pub const NAME: &'static str = "f1";

    /// Exact comparison. `use_llm_judge` is honoured by [`Component::from_config`].
    pub fn new(config: FieldEvaluatorConfig) -> Self {
        Self::with_judge(config, Arc::new(ExactMatch))
    }

    pub fn with_judge(config: FieldEvaluatorConfig, judge: Arc<dyn FieldJudge>) -> Self {
        Self { config, judge }
    }
}

impl Component for F1Evaluator {
    type Config = FieldEvaluatorConfig;
    const CONFIG_KEY: &'static str = Self::NAME;

    fn from_config(config: Self::Config) -> Result<Self> {
        let judge = config.judge()?;
        Ok(Self::with_judge(config, judge))
    }
}

#[derive(Debug, Default, PartialEq)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

fn count_fields(judge: &dyn FieldJudge, pairs: &[FieldPair]) -> Result<Counts> {
    let mut counts = Counts::default();
    for pair in pairs {
        if pair.truth.is_null() && pair.pred.is_null() {
            continue;
        }
        if is_match(judge, pair)? {
            counts.tp += 1;
            continue;
        }
        if !pair.pred.is_null() {
            counts.fp += 1;
        }
        if !pair.truth.is_null() {
            counts.fn_ += 1;
        }
    }
    Ok(counts)
}

impl<S: ExtractionSchema> Evaluator<S> for F1Evaluator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        truth: &ExtractionResult<S>,
        pred: &ExtractionResult<S>,
        _context: &PipelineContext,
    ) -> Result<EvaluationResult> {
        let pairs = field_pairs(Self::NAME, &self.config.ignore_fields, truth, pred)?;
        let Counts { tp, fp, fn_ } = count_fields(self.judge.as_ref(), &pairs)?;

        let denom = 2 * tp + fp + fn_;
        let f1 = if denom == 0 {
            0.0
        } else {
            (2 * tp) as f64 / denom as f64
        };

        let mut result = EvaluationResult::new(
            Self::NAME,
            f1,
            format!("Field-level F1 score (tp={tp}, fp={fp}, fn={fn_})."),
        );
        result.metadata.insert("tp".into(), Value::from(tp));
        result.metadata.insert("fp".into(), Value::from(fp));
        result.metadata.insert("fn".into(), Value::from(fn_));
        result.metadata.insert("judge".into(), Value::from(self.judge.name()));
        Ok(result)
    }
}
