#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use docex_core::{
    Component, ContentType, Converter, DocexError, Document, EvaluatedDocument,
    EvaluationExporter, ExtractionExporter, ExtractionResult, ExtractionSchema, Extractor, Page,
    PageData, PathIdentifier, PipelineContext, RawBytes, Reader, Result, TestExample,
};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub number: Option<String>,
    pub total: Option<i64>,
}

impl ExtractionSchema for Invoice {}

pub fn invoice(number: &str, total: i64) -> Invoice {
    Invoice {
        number: Some(number.to_string()),
        total: Some(total),
    }
}

pub fn paths(names: &[&str]) -> Vec<PathIdentifier> {
    names.iter().map(|n| PathIdentifier::new(*n)).collect()
}

/// Examples whose ground truth matches what [`StubExtractor`] predicts.
pub fn examples(names: &[&str]) -> Vec<TestExample<Invoice>> {
    names
        .iter()
        .map(|n| TestExample {
            id: format!("ex-{n}"),
            path_identifier: PathIdentifier::new(*n),
            truth: ExtractionResult::new(invoice(n, 100)),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Concurrency gauge
// ---------------------------------------------------------------------------

/// Tracks how many callers are inside a section at once, and the peak.
#[derive(Default)]
pub struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Stub roles
// ---------------------------------------------------------------------------

/// Returns the path as bytes; fails for paths in `fail_on`.
///
/// Records the context value under `tenant` and the name of the span that is
/// current on the worker thread for every read.
#[derive(Default)]
pub struct StubReader {
    pub fail_on: HashSet<String>,
    pub hold: Duration,
    pub gauge: Gauge,
    pub seen_tenants: Mutex<Vec<Option<Value>>>,
    pub seen_spans: Mutex<Vec<Option<&'static str>>>,
    pub threads: Mutex<Vec<String>>,
}

impl StubReader {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            fail_on: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn holding(hold: Duration) -> Self {
        Self {
            hold,
            ..Default::default()
        }
    }
}

impl Reader for StubReader {
    fn read(&self, path: &PathIdentifier, context: &PipelineContext) -> Result<RawBytes> {
        self.gauge.enter();
        std::thread::sleep(self.hold);

        self.seen_tenants.lock().unwrap().push(context.get("tenant"));
        self.seen_spans
            .lock()
            .unwrap()
            .push(tracing::Span::current().metadata().map(|m| m.name()));
        self.threads.lock().unwrap().push(
            std::thread::current()
                .name()
                .unwrap_or_default()
                .to_string(),
        );
        context.insert(format!("read:{}", path.path), true);

        self.gauge.exit();
        if self.fail_on.contains(&path.path) {
            return Err(DocexError::Read {
                path: path.path.clone(),
                message: "simulated read failure".to_string(),
            });
        }
        Ok(RawBytes::new(path.path.clone().into_bytes(), path.clone())
            .with_mime_type("text/plain"))
    }
}

/// One text page holding the raw bytes; the document id is the path.
pub struct StubConverter;

impl Converter for StubConverter {
    fn convert(&self, raw: RawBytes, _context: &PipelineContext) -> Result<Document> {
        let text = String::from_utf8_lossy(&raw.file_bytes).into_owned();
        Document::new(
            raw.path_identifier.path.clone(),
            ContentType::Text,
            vec![Page::text(1, text)?],
            raw.path_identifier,
            Map::new(),
        )
    }
}

/// Predicts `invoice(document_id, 100)` after an async delay.
///
/// Returns an error for ids in `fail_on` and panics for ids in `panic_on`.
#[derive(Default)]
pub struct StubExtractor {
    pub fail_on: HashSet<String>,
    pub panic_on: HashSet<String>,
    pub delay: Duration,
    pub gauge: Gauge,
    pub calls: AtomicUsize,
}

impl StubExtractor {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            fail_on: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn panicking(names: &[&str]) -> Self {
        Self {
            panic_on: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Extractor<Invoice> for StubExtractor {
    async fn extract(
        &self,
        document: &Document,
        _context: &PipelineContext,
    ) -> Result<ExtractionResult<Invoice>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.exit();

        if self.panic_on.contains(document.id()) {
            panic!("extractor blew up on {}", document.id());
        }
        if self.fail_on.contains(document.id()) {
            return Err(DocexError::Extraction(format!(
                "simulated extraction failure for {}",
                document.id()
            )));
        }
        Ok(ExtractionResult::new(invoice(document.id(), 100)).with_metadata("model", "stub"))
    }
}

/// Takes the invoice number from the first line of the first text page.
pub struct FirstLineExtractor {
    total: i64,
}

#[derive(Deserialize)]
pub struct FirstLineConfig {
    pub total: i64,
}

impl Component for FirstLineExtractor {
    type Config = FirstLineConfig;
    const CONFIG_KEY: &'static str = "extractor";

    fn from_config(config: Self::Config) -> Result<Self> {
        Ok(Self {
            total: config.total,
        })
    }
}

#[async_trait]
impl Extractor<Invoice> for FirstLineExtractor {
    async fn extract(
        &self,
        document: &Document,
        _context: &PipelineContext,
    ) -> Result<ExtractionResult<Invoice>> {
        let number = match document.pages().first().map(|p| p.data()) {
            Some(PageData::Text(text)) => {
                text.content.lines().next().unwrap_or_default().to_string()
            }
            _ => return Err(DocexError::Extraction("expected a text page".to_string())),
        };
        Ok(ExtractionResult::new(invoice(&number, self.total)))
    }
}

/// Records the id of every exported document.
#[derive(Default)]
pub struct RecordingExtractionExporter {
    pub fail_on: HashSet<String>,
    pub exported: Mutex<Vec<String>>,
    pub gauge: Gauge,
    pub delay: Duration,
}

impl RecordingExtractionExporter {
    pub fn exported(&self) -> Vec<String> {
        let mut ids = self.exported.lock().unwrap().clone();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ExtractionExporter<Invoice> for RecordingExtractionExporter {
    async fn export(
        &self,
        document: &Document,
        _result: &ExtractionResult<Invoice>,
        _context: &PipelineContext,
    ) -> Result<()> {
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.exit();

        if self.fail_on.contains(document.id()) {
            return Err(DocexError::Export("simulated export failure".to_string()));
        }
        self.exported
            .lock()
            .unwrap()
            .push(document.id().to_string());
        Ok(())
    }
}

/// One exported batch: document ids with their metric names in order.
pub type Batch = Vec<(String, Vec<String>)>;

#[derive(Default)]
pub struct RecordingEvaluationExporter {
    pub fail: bool,
    pub batches: Mutex<Vec<Batch>>,
}

impl RecordingEvaluationExporter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvaluationExporter for RecordingEvaluationExporter {
    async fn export(
        &self,
        results: &[EvaluatedDocument],
        _context: &PipelineContext,
    ) -> Result<()> {
        let batch = results
            .iter()
            .map(|(document, evaluations)| {
                (
                    document.id().to_string(),
                    evaluations.iter().map(|e| e.name.clone()).collect(),
                )
            })
            .collect();
        self.batches.lock().unwrap().push(batch);

        if self.fail {
            return Err(DocexError::Export("simulated batch export failure".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// In-memory sink for a `tracing_subscriber::fmt` subscriber.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Lines at ERROR level.
    pub fn errors(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains("ERROR"))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install a capturing subscriber for the current thread until the guard drops.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
