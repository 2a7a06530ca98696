use std::path::Path;

use serde::Deserialize;

use docex_core::config::Component;
use docex_core::context::PipelineContext;
use docex_core::document::{PathIdentifier, RawBytes, DEFAULT_MIME_TYPE};
use docex_core::error::{DocexError, Result};
use docex_core::ingest::Reader;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalFileReaderConfig {
    /// Forces a mime type instead of guessing it from the file extension.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Reads document bytes from local disk.
pub struct LocalFileReader {
    mime_type: Option<String>,
}

impl LocalFileReader {
    pub fn new(config: LocalFileReaderConfig) -> Self {
        Self {
            mime_type: config.mime_type,
        }
    }

    fn mime_type_for(&self, path: &Path) -> String {
        if let Some(forced) = &self.mime_type {
            return forced.clone();
        }
        mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string()
    }
}

impl Component for LocalFileReader {
    type Config = LocalFileReaderConfig;
    const CONFIG_KEY: &'static str = "reader";

    fn from_config(config: Self::Config) -> Result<Self> {
        Ok(Self::new(config))
    }
}

impl Reader for LocalFileReader {
    fn read(&self, path: &PathIdentifier, _context: &PipelineContext) -> Result<RawBytes> {
        let file_path = Path::new(&path.path);
        let bytes = std::fs::read(file_path).map_err(|e| DocexError::Read {
            path: path.path.clone(),
            message: e.to_string(),
        })?;

        Ok(RawBytes::new(bytes, path.clone()).with_mime_type(self.mime_type_for(file_path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_bytes_and_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lease.txt");
        std::fs::write(&file, b"hello").unwrap();

        let reader = LocalFileReader::new(LocalFileReaderConfig::default());
        let raw = reader
            .read(
                &PathIdentifier::new(file.to_string_lossy()),
                &PipelineContext::new(),
            )
            .unwrap();

        assert_eq!(raw.file_bytes, b"hello");
        assert_eq!(raw.mime_type, "text/plain");
    }

    #[test]
    fn test_forced_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scan.bin");
        std::fs::write(&file, [0u8, 1, 2]).unwrap();

        let reader = LocalFileReader::new(LocalFileReaderConfig {
            mime_type: Some("image/png".into()),
        });
        let raw = reader
            .read(
                &PathIdentifier::new(file.to_string_lossy()),
                &PipelineContext::new(),
            )
            .unwrap();
        assert_eq!(raw.mime_type, "image/png");
    }

    #[test]
    fn test_unknown_extension_defaults_to_pdf() {
        let reader = LocalFileReader::new(LocalFileReaderConfig::default());
        assert_eq!(
            reader.mime_type_for(Path::new("blob.zzzunknown")),
            DEFAULT_MIME_TYPE
        );
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let reader = LocalFileReader::new(LocalFileReaderConfig::default());
        let err = reader
            .read(&PathIdentifier::new("/definitely/not/here.pdf"), &PipelineContext::new())
            .unwrap_err();
        match err {
            DocexError::Read { path, .. } => assert_eq!(path, "/definitely/not/here.pdf"),
            other => panic!("expected Read error, got {other:?}"),
        }
    }
}
