use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use docex_core::config::Component;
use docex_core::context::PipelineContext;
use docex_core::document::Document;
use docex_core::error::{DocexError, Result};
use docex_core::evaluation::{EvaluatedDocument, EvaluationExporter};
use docex_core::extraction::{ExtractionExporter, ExtractionResult, ExtractionSchema};

#[derive(Debug, Clone, Deserialize)]
pub struct LocalFileExporterConfig {
    pub output_dir: PathBuf,
}

fn create_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        DocexError::Export(format!("creating output directory {}: {e}", dir.display()))
    })
}

async fn write_json(path: &Path, value: &Value) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| DocexError::Export(format!("writing {}: {e}", path.display())))
}

/// Writes one `result_{document_id}.json` per extracted document.
///
/// A second document with an already exported id is refused rather than
/// overwriting the earlier file.
pub struct LocalFileExtractionExporter {
    output_dir: PathBuf,
    exported: Mutex<HashSet<String>>,
}

impl LocalFileExtractionExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        create_output_dir(&output_dir)?;
        Ok(Self {
            output_dir,
            exported: Mutex::new(HashSet::new()),
        })
    }

    pub fn output_path(&self, document: &Document) -> PathBuf {
        self.output_dir.join(format!("result_{}.json", document.id()))
    }

    fn exported_ids(&self) -> Result<std::sync::MutexGuard<'_, HashSet<String>>> {
        self.exported
            .lock()
            .map_err(|_| DocexError::Internal("exported id set lock poisoned".to_string()))
    }

    fn claim(&self, document: &Document) -> Result<()> {
        if self.exported_ids()?.insert(document.id().to_string()) {
            Ok(())
        } else {
            Err(DocexError::Export(format!(
                "document id {} was already exported; refusing to overwrite {}",
                document.id(),
                self.output_path(document).display()
            )))
        }
    }
}

impl Component for LocalFileExtractionExporter {
    type Config = LocalFileExporterConfig;
    const CONFIG_KEY: &'static str = "exporter";

    fn from_config(config: Self::Config) -> Result<Self> {
        Self::new(config.output_dir)
    }
}

#[async_trait]
impl<S: ExtractionSchema> ExtractionExporter<S> for LocalFileExtractionExporter {
    async fn export(
        &self,
        document: &Document,
        result: &ExtractionResult<S>,
        _context: &PipelineContext,
    ) -> Result<()> {
        let record = json!({
            "document_id": document.id(),
            "source_path": document.path_identifier().path,
            "exported_at": Utc::now().to_rfc3339(),
            "data": serde_json::to_value(&result.data)?,
            "metadata": result.metadata,
        });
        let path = self.output_path(document);
        self.claim(document)?;
        if let Err(e) = write_json(&path, &record).await {
            // Release the id so a retry of the same document can export.
            self.exported_ids()?.remove(document.id());
            return Err(e);
        }
        tracing::debug!(path = %path.display(), "Wrote extraction result");
        Ok(())
    }
}

/// Aggregate of one metric across the exported documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    /// Documents that produced a numeric value for this metric.
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub documents: usize,
    pub metrics: BTreeMap<String, MetricSummary>,
}

/// Per-metric means over every document; non-numeric results are skipped.
pub fn summarize(results: &[EvaluatedDocument]) -> EvaluationSummary {
    let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (_, evaluations) in results {
        for evaluation in evaluations {
            if let Some(score) = evaluation.score() {
                let entry = totals.entry(evaluation.name.clone()).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }
    }

    let metrics = totals
        .into_iter()
        .map(|(name, (sum, count))| {
            (
                name,
                MetricSummary {
                    mean: sum / count as f64,
                    count,
                },
            )
        })
        .collect();

    EvaluationSummary {
        documents: results.len(),
        metrics,
    }
}

/// Writes `documents/{document_id}.json` per evaluated document plus a
/// run-level `summary.json` beside the `documents/` directory.
///
/// A batch in which two documents share an id is rejected before anything is
/// written.
pub struct LocalFileEvaluationExporter {
    output_dir: PathBuf,
}

impl LocalFileEvaluationExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        create_output_dir(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.output_dir.join("documents")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("summary.json")
    }
}

fn check_unique_ids(results: &[EvaluatedDocument]) -> Result<()> {
    let mut seen = HashSet::with_capacity(results.len());
    for (document, _) in results {
        if !seen.insert(document.id()) {
            return Err(DocexError::Export(format!(
                "duplicate document id {} in evaluation batch ({})",
                document.id(),
                document.path_identifier()
            )));
        }
    }
    Ok(())
}

impl Component for LocalFileEvaluationExporter {
    type Config = LocalFileExporterConfig;
    const CONFIG_KEY: &'static str = "evaluation_exporter";

    fn from_config(config: Self::Config) -> Result<Self> {
        Self::new(config.output_dir)
    }
}

#[async_trait]
impl EvaluationExporter for LocalFileEvaluationExporter {
    async fn export(
        &self,
        results: &[EvaluatedDocument],
        _context: &PipelineContext,
    ) -> Result<()> {
        check_unique_ids(results)?;

        let documents_dir = self.documents_dir();
        create_output_dir(&documents_dir)?;
        for (document, evaluations) in results {
            let record = json!({
                "document_id": document.id(),
                "source_path": document.path_identifier().path,
                "evaluations": evaluations,
            });
            let path = documents_dir.join(format!("{}.json", document.id()));
            write_json(&path, &record).await?;
        }

        let summary = summarize(results);
        let record = json!({
            "generated_at": Utc::now().to_rfc3339(),
            "documents": summary.documents,
            "metrics": summary.metrics,
        });
        write_json(&self.summary_path(), &record).await?;

        tracing::info!(
            documents = summary.documents,
            metrics = summary.metrics.len(),
            output_dir = %self.output_dir.display(),
            "Wrote evaluation results"
        );
        Ok(())
    }
}
