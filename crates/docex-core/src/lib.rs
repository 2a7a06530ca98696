pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod evaluation;
pub mod extraction;
pub mod ingest;

pub use config::{Component, OrchestratorConfig, PipelineConfig};
pub use context::PipelineContext;
pub use document::{
    ContentType, Document, ImageData, Page, PageData, PathIdentifier, RawBytes, TextData,
};
pub use error::{DocexError, Result};
pub use evaluation::{
    EvaluatedDocument, EvaluationExporter, EvaluationResult, Evaluator, TestDataLoader, TestExample,
};
pub use extraction::{ExtractionExporter, ExtractionResult, ExtractionSchema, Extractor};
pub use ingest::{Converter, FileLister, Reader};
