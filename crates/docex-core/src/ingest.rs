use crate::context::PipelineContext;
use crate::document::{Document, PathIdentifier, RawBytes};
use crate::error::Result;

/// Enumerates the work items of an extraction run.
pub trait FileLister: Send + Sync {
    fn list_files(&self, context: &PipelineContext) -> Result<Vec<PathIdentifier>>;
}

/// Loads raw bytes for one work item.
///
/// Readers run on worker-pool threads, never on the async scheduler.
pub trait Reader: Send + Sync {
    fn read(&self, path: &PathIdentifier, context: &PipelineContext) -> Result<RawBytes>;
}

/// Turns raw bytes into a structured [`Document`]. CPU-bound; runs on the worker pool.
pub trait Converter: Send + Sync {
    fn convert(&self, raw: RawBytes, context: &PipelineContext) -> Result<Document>;
}
