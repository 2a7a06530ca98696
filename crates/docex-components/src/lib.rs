mod anthropic;
mod converter;
mod evaluator;
mod exporter;
mod judge;
mod lister;
mod reader;
mod test_data;

pub use anthropic::{AnthropicExtractor, AnthropicExtractorConfig};
pub use converter::{ImageConverter, ImageConverterConfig, TextConverter, TextConverterConfig};
pub use evaluator::{AccuracyEvaluator, F1Evaluator, FieldEvaluatorConfig};
pub use exporter::{
    summarize, EvaluationSummary, LocalFileEvaluationExporter, LocalFileExporterConfig,
    LocalFileExtractionExporter, MetricSummary,
};
pub use judge::{ExactMatch, FieldJudge, LlmJudge, LlmJudgeConfig};
pub use lister::{LocalFileLister, LocalFileListerConfig};
pub use reader::{LocalFileReader, LocalFileReaderConfig};
pub use test_data::{JsonTestDataLoader, JsonTestDataLoaderConfig};
