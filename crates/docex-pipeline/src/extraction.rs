use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use docex_core::config::{Component, OrchestratorConfig, PipelineConfig};
use docex_core::context::PipelineContext;
use docex_core::document::{Document, PathIdentifier};
use docex_core::error::{DocexError, Result};
use docex_core::extraction::{ExtractionExporter, ExtractionSchema, Extractor};
use docex_core::ingest::{Converter, FileLister, Reader};

use crate::ingest::{ingest, ingest_on_pool};
use crate::pool::{isolate_panics, WorkerPool};

/// Drives Read -> Convert -> Extract -> Export over a batch of inputs.
///
/// Ingestion runs on a worker pool sized by `max_workers`; extraction and export
/// share `max_concurrency` permits. Each item is exported on its own, and one
/// item's failure is logged without affecting the rest of the batch.
pub struct ExtractionOrchestrator<S: ExtractionSchema> {
    config: OrchestratorConfig,
    lister: Option<Arc<dyn FileLister>>,
    reader: Arc<dyn Reader>,
    converter: Arc<dyn Converter>,
    extractor: Arc<dyn Extractor<S>>,
    exporter: Arc<dyn ExtractionExporter<S>>,
}

impl<S: ExtractionSchema> ExtractionOrchestrator<S> {
    pub fn new(
        config: OrchestratorConfig,
        reader: Arc<dyn Reader>,
        converter: Arc<dyn Converter>,
        extractor: Arc<dyn Extractor<S>>,
        exporter: Arc<dyn ExtractionExporter<S>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            lister: None,
            reader,
            converter,
            extractor,
            exporter,
        })
    }

    /// Build every role from its section of `config`.
    pub fn from_config<R, C, X, E>(config: &PipelineConfig) -> Result<Self>
    where
        R: Reader + Component + 'static,
        C: Converter + Component + 'static,
        X: Extractor<S> + Component + 'static,
        E: ExtractionExporter<S> + Component + 'static,
    {
        let reader = config.build::<R>()?;
        let converter = config.build::<C>()?;
        let extractor = config.build::<X>()?;
        let exporter = config.build::<E>()?;

        Self::new(
            config.orchestrator.clone(),
            Arc::new(reader),
            Arc::new(converter),
            Arc::new(extractor),
            Arc::new(exporter),
        )
    }

    pub fn with_lister(mut self, lister: Arc<dyn FileLister>) -> Self {
        self.lister = Some(lister);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Enumerate inputs with the configured lister.
    pub fn list_inputs(&self, context: &PipelineContext) -> Result<Vec<PathIdentifier>> {
        let lister = self.lister.as_ref().ok_or_else(|| {
            DocexError::Config("no file lister configured for this orchestrator".to_string())
        })?;
        lister.list_files(context)
    }

    /// Read and convert one input on the calling thread.
    pub fn ingest(&self, path: &PathIdentifier, context: &PipelineContext) -> Result<Document> {
        ingest(self.reader.as_ref(), self.converter.as_ref(), path, context)
    }

    /// Full lifecycle of one input.
    ///
    /// The permit is taken only after ingestion, so ingestion is bounded by the
    /// pool alone; it is held through extract and export and released on every
    /// exit path.
    pub async fn process_document(
        &self,
        path: &PathIdentifier,
        pool: &WorkerPool,
        permits: &Semaphore,
        context: &PipelineContext,
    ) -> Result<()> {
        let document =
            ingest_on_pool(pool, &self.reader, &self.converter, path, context).await?;

        let _permit = permits
            .acquire()
            .await
            .map_err(|_| DocexError::Internal("concurrency limiter closed".to_string()))?;

        let result = self.extractor.extract(&document, context).await?;
        self.exporter.export(&document, &result, context).await?;

        info!(document_id = document.id(), "Completed extraction");
        Ok(())
    }

    /// Process every input concurrently. Item failures are logged, never returned;
    /// the only error is failing to set up the run itself.
    pub async fn run(
        &self,
        paths: &[PathIdentifier],
        context: Option<PipelineContext>,
    ) -> Result<()> {
        let context = context.unwrap_or_default();
        let run_id = Uuid::new_v4();
        let span = info_span!("extraction_run", %run_id, items = paths.len());

        async move {
            let pool = WorkerPool::new(self.config.max_workers)?;
            let permits = Semaphore::new(self.config.max_concurrency);

            info!(
                max_workers = self.config.max_workers,
                max_concurrency = self.config.max_concurrency,
                "Starting extraction run"
            );

            let tasks = paths.iter().map(|path| {
                isolate_panics(self.process_document(path, &pool, &permits, &context))
                    .instrument(info_span!("document", path = %path))
            });
            let outcomes = join_all(tasks).await;

            let mut failed = 0usize;
            for (path, outcome) in paths.iter().zip(outcomes) {
                if let Err(e) = outcome {
                    failed += 1;
                    error!(path = %path, error = %e, "Extraction pipeline failed for document");
                }
            }

            info!(
                succeeded = paths.len() - failed,
                failed,
                "Extraction run complete"
            );
            Ok::<(), DocexError>(())
        }
        .instrument(span)
        .await
    }
}
