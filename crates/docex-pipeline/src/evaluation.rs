use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use docex_core::config::{Component, OrchestratorConfig, PipelineConfig};
use docex_core::context::PipelineContext;
use docex_core::document::{Document, PathIdentifier};
use docex_core::error::{DocexError, Result};
use docex_core::evaluation::{
    EvaluatedDocument, EvaluationExporter, EvaluationResult, Evaluator, TestDataLoader, TestExample,
};
use docex_core::extraction::{ExtractionSchema, Extractor};
use docex_core::ingest::{Converter, Reader};

use crate::ingest::{ingest, ingest_on_pool};
use crate::pool::{isolate_panics, WorkerPool};

type EvaluatorBuilder<S> = Box<dyn FnOnce() -> Result<Arc<dyn Evaluator<S>>>>;

/// An evaluator type paired with the configuration it should be built from.
///
/// Bindings are resolved when the orchestrator is constructed; a binding without
/// configuration makes construction fail.
pub struct EvaluatorBinding<S: ExtractionSchema> {
    name: &'static str,
    builder: Option<EvaluatorBuilder<S>>,
}

impl<S: ExtractionSchema> EvaluatorBinding<S> {
    pub fn new<E>(config: Option<E::Config>) -> Self
    where
        E: Evaluator<S> + Component + 'static,
        E::Config: 'static,
    {
        let builder = config.map(|config| -> EvaluatorBuilder<S> {
            Box::new(move || {
                let evaluator = E::from_config(config)?;
                Ok(Arc::new(evaluator) as Arc<dyn Evaluator<S>>)
            })
        });
        Self {
            name: E::CONFIG_KEY,
            builder,
        }
    }

    /// Bind `E` to its entry under `evaluators` in `config`, if any.
    pub fn from_pipeline_config<E>(config: &PipelineConfig) -> Result<Self>
    where
        E: Evaluator<S> + Component + 'static,
        E::Config: 'static,
    {
        Ok(Self::new::<E>(config.evaluator_config::<E>()?))
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn is_configured(&self) -> bool {
        self.builder.is_some()
    }

    fn resolve(self) -> Result<Arc<dyn Evaluator<S>>> {
        match self.builder {
            Some(build) => build(),
            None => Err(DocexError::Config(format!(
                "No configuration found for evaluator '{}'",
                self.name
            ))),
        }
    }
}

/// Drives Read -> Convert -> Extract -> {Evaluate}* over labelled examples, then
/// hands every surviving result to the exporter in one batched call.
pub struct EvaluationOrchestrator<S: ExtractionSchema> {
    config: OrchestratorConfig,
    test_data_loader: Arc<dyn TestDataLoader<S>>,
    reader: Arc<dyn Reader>,
    converter: Arc<dyn Converter>,
    extractor: Arc<dyn Extractor<S>>,
    evaluators: Vec<Arc<dyn Evaluator<S>>>,
    exporter: Arc<dyn EvaluationExporter>,
}

impl<S: ExtractionSchema> EvaluationOrchestrator<S> {
    pub fn new(
        config: OrchestratorConfig,
        test_data_loader: Arc<dyn TestDataLoader<S>>,
        reader: Arc<dyn Reader>,
        converter: Arc<dyn Converter>,
        extractor: Arc<dyn Extractor<S>>,
        evaluators: Vec<Arc<dyn Evaluator<S>>>,
        exporter: Arc<dyn EvaluationExporter>,
    ) -> Result<Self> {
        config.validate()?;
        if evaluators.is_empty() {
            return Err(DocexError::Config(
                "evaluation requires at least one evaluator".to_string(),
            ));
        }
        Ok(Self {
            config,
            test_data_loader,
            reader,
            converter,
            extractor,
            evaluators,
            exporter,
        })
    }

    /// Build every role from `config` and resolve `evaluators` in order.
    ///
    /// Fails on the first binding that has no configuration.
    pub fn from_config<T, R, C, X, E>(
        config: &PipelineConfig,
        evaluators: Vec<EvaluatorBinding<S>>,
    ) -> Result<Self>
    where
        T: TestDataLoader<S> + Component + 'static,
        R: Reader + Component + 'static,
        C: Converter + Component + 'static,
        X: Extractor<S> + Component + 'static,
        E: EvaluationExporter + Component + 'static,
    {
        if let Some(missing) = evaluators.iter().find(|b| !b.is_configured()) {
            return Err(DocexError::Config(format!(
                "No configuration found for evaluator '{}'",
                missing.name()
            )));
        }
        let evaluators = evaluators
            .into_iter()
            .map(EvaluatorBinding::resolve)
            .collect::<Result<Vec<_>>>()?;

        let test_data_loader = config.build::<T>()?;
        let reader = config.build::<R>()?;
        let converter = config.build::<C>()?;
        let extractor = config.build::<X>()?;
        let exporter = config.build::<E>()?;

        Self::new(
            config.orchestrator.clone(),
            Arc::new(test_data_loader),
            Arc::new(reader),
            Arc::new(converter),
            Arc::new(extractor),
            evaluators,
            Arc::new(exporter),
        )
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn evaluator_names(&self) -> Vec<&str> {
        self.evaluators.iter().map(|e| e.name()).collect()
    }

    pub fn load_examples(
        &self,
        path: &PathIdentifier,
        context: &PipelineContext,
    ) -> Result<Vec<TestExample<S>>> {
        let examples = self.test_data_loader.load_test_data(path, context)?;
        info!(path = %path, count = examples.len(), "Loaded evaluation examples");
        Ok(examples)
    }

    pub fn ingest(&self, path: &PathIdentifier, context: &PipelineContext) -> Result<Document> {
        ingest(self.reader.as_ref(), self.converter.as_ref(), path, context)
    }

    /// Ingest, extract and evaluate one example.
    ///
    /// Evaluators run concurrently on the pool; results come back in registration
    /// order. Nothing is exported here.
    pub async fn process_example(
        &self,
        example: &TestExample<S>,
        pool: &WorkerPool,
        permits: &Semaphore,
        context: &PipelineContext,
    ) -> Result<EvaluatedDocument> {
        let document = ingest_on_pool(
            pool,
            &self.reader,
            &self.converter,
            &example.path_identifier,
            context,
        )
        .await?;

        let _permit = permits
            .acquire()
            .await
            .map_err(|_| DocexError::Internal("concurrency limiter closed".to_string()))?;

        let pred = Arc::new(self.extractor.extract(&document, context).await?);
        let truth = Arc::new(example.truth.clone());

        let evaluations = self.evaluators.iter().map(|evaluator| {
            let evaluator = Arc::clone(evaluator);
            let truth = Arc::clone(&truth);
            let pred = Arc::clone(&pred);
            let context = context.clone();
            pool.run(move || evaluator.evaluate(&truth, &pred, &context))
        });
        let results: Vec<EvaluationResult> = try_join_all(evaluations).await?;

        info!(
            example_id = %example.id,
            document_id = document.id(),
            metrics = results.len(),
            "Completed evaluation"
        );
        Ok((document, results))
    }

    /// Evaluate every example concurrently, then export the survivors once.
    ///
    /// Failed examples are logged and left out of the export. When every example
    /// fails the exporter is not called. An exporter error is returned.
    pub async fn run(
        &self,
        examples: &[TestExample<S>],
        context: Option<PipelineContext>,
    ) -> Result<()> {
        let context = context.unwrap_or_default();
        let run_id = Uuid::new_v4();
        let span = info_span!("evaluation_run", %run_id, items = examples.len());

        async move {
            let pool = WorkerPool::new(self.config.max_workers)?;
            let permits = Semaphore::new(self.config.max_concurrency);

            info!(
                evaluators = ?self.evaluator_names(),
                max_workers = self.config.max_workers,
                max_concurrency = self.config.max_concurrency,
                "Starting evaluation run"
            );

            let tasks = examples.iter().map(|example| {
                isolate_panics(self.process_example(example, &pool, &permits, &context))
                    .instrument(info_span!(
                        "example",
                        example_id = %example.id,
                        path = %example.path_identifier
                    ))
            });
            let outcomes = join_all(tasks).await;

            let mut results = Vec::with_capacity(examples.len());
            for (example, outcome) in examples.iter().zip(outcomes) {
                match outcome {
                    Ok(evaluated) => results.push(evaluated),
                    Err(e) => error!(
                        example_id = %example.id,
                        path = %example.path_identifier,
                        error = %e,
                        "Evaluation pipeline failed for example"
                    ),
                }
            }

            let failed = examples.len() - results.len();
            if results.is_empty() {
                warn!(failed, "No examples survived evaluation; skipping export");
                return Ok(());
            }

            self.exporter.export(&results, &context).await?;
            info!(
                exported = results.len(),
                failed,
                "Evaluation run complete"
            );
            Ok::<(), DocexError>(())
        }
        .instrument(span)
        .await
    }
}
