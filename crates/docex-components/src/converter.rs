use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use docex_core::config::Component;
use docex_core::context::PipelineContext;
use docex_core::document::{ContentType, Document, Page, PathIdentifier, RawBytes};
use docex_core::error::{DocexError, Result};
use docex_core::ingest::Converter;

const FORM_FEED: &str = "\u{000c}";

/// Document id derived from the source path: the file stem when there is one.
fn document_id(path: &PathIdentifier) -> String {
    Path::new(&path.path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.path.clone())
}

fn source_metadata(raw: &RawBytes) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("mime_type".into(), Value::from(raw.mime_type.clone()));
    metadata.insert("size_bytes".into(), Value::from(raw.file_bytes.len()));
    metadata
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextConverterConfig {
    #[serde(default = "default_page_separator")]
    pub page_separator: String,
}

impl Default for TextConverterConfig {
    fn default() -> Self {
        Self {
            page_separator: default_page_separator(),
        }
    }
}

fn default_page_separator() -> String {
    FORM_FEED.to_string()
}

/// Decodes bytes as UTF-8 (lossily) and splits pages on a separator, form feed by default.
pub struct TextConverter {
    page_separator: String,
}

impl TextConverter {
    pub fn new(config: TextConverterConfig) -> Self {
        Self {
            page_separator: config.page_separator,
        }
    }
}

impl Component for TextConverter {
    type Config = TextConverterConfig;
    const CONFIG_KEY: &'static str = "converter";

    fn from_config(config: Self::Config) -> Result<Self> {
        if config.page_separator.is_empty() {
            return Err(DocexError::Config(
                "converter.page_separator must not be empty".to_string(),
            ));
        }
        Ok(Self::new(config))
    }
}

impl Converter for TextConverter {
    fn convert(&self, raw: RawBytes, _context: &PipelineContext) -> Result<Document> {
        let text = String::from_utf8_lossy(&raw.file_bytes);
        let pages = text
            .split(self.page_separator.as_str())
            .enumerate()
            .map(|(i, content)| Page::text(i as u32 + 1, content))
            .collect::<Result<Vec<_>>>()?;

        let metadata = source_metadata(&raw);
        Document::new(
            document_id(&raw.path_identifier),
            ContentType::Text,
            pages,
            raw.path_identifier,
            metadata,
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConverterConfig {}

/// Wraps a single image file as a one-page image document.
pub struct ImageConverter;

impl Component for ImageConverter {
    type Config = ImageConverterConfig;
    const CONFIG_KEY: &'static str = "converter";

    fn from_config(_config: Self::Config) -> Result<Self> {
        Ok(ImageConverter)
    }
}

impl Converter for ImageConverter {
    fn convert(&self, raw: RawBytes, _context: &PipelineContext) -> Result<Document> {
        if !raw.mime_type.starts_with("image/") {
            return Err(DocexError::Convert(format!(
                "{} is {}, expected an image",
                raw.path_identifier, raw.mime_type
            )));
        }

        let metadata = source_metadata(&raw);
        let id = document_id(&raw.path_identifier);
        let page = Page::image(1, raw.file_bytes, raw.mime_type)?;
        Document::new(
            id,
            ContentType::Image,
            vec![page],
            raw.path_identifier,
            metadata,
        )
    }
}
