use std::sync::Arc;

use docex_core::context::PipelineContext;
use docex_core::document::{Document, PathIdentifier};
use docex_core::error::Result;
use docex_core::ingest::{Converter, Reader};

use crate::pool::WorkerPool;

/// Read then convert, synchronously. Only ever called on a pool thread or by callers
/// that accept blocking.
pub(crate) fn ingest(
    reader: &dyn Reader,
    converter: &dyn Converter,
    path: &PathIdentifier,
    context: &PipelineContext,
) -> Result<Document> {
    let raw = reader.read(path, context)?;
    tracing::debug!(
        path = %path,
        bytes = raw.file_bytes.len(),
        mime_type = %raw.mime_type,
        "Read document bytes"
    );
    converter.convert(raw, context)
}

pub(crate) async fn ingest_on_pool(
    pool: &WorkerPool,
    reader: &Arc<dyn Reader>,
    converter: &Arc<dyn Converter>,
    path: &PathIdentifier,
    context: &PipelineContext,
) -> Result<Document> {
    let reader = Arc::clone(reader);
    let converter = Arc::clone(converter);
    let path = path.clone();
    let context = context.clone();

    pool.run(move || ingest(reader.as_ref(), converter.as_ref(), &path, &context))
        .await
}
