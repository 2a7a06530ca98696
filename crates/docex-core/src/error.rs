use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Read error ({path}): {message}")]
    Read { path: String, message: String },

    #[error("Conversion error: {0}")]
    Convert(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Evaluation error ({evaluator}): {message}")]
    Evaluation { evaluator: String, message: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker pool error: {0}")]
    Worker(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DocexError>;
