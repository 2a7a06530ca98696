pub mod evaluation;
pub mod extraction;
mod ingest;
pub mod pool;

pub use evaluation::{EvaluationOrchestrator, EvaluatorBinding};
pub use extraction::ExtractionOrchestrator;
pub use pool::{AmbientState, WorkerPool};
