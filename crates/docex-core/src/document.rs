use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DocexError, Result};

pub const DEFAULT_MIME_TYPE: &str = "application/pdf";

/// Opaque handle to a work item's source location.
///
/// `context` carries source-specific side metadata (pre-resolved credentials,
/// bucket names) that only the matching reader understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathIdentifier {
    pub path: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl PathIdentifier {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            context: Map::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for PathIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Raw file content produced by a reader, before any parsing.
#[derive(Debug, Clone)]
pub struct RawBytes {
    pub file_bytes: Vec<u8>,
    pub path_identifier: PathIdentifier,
    pub mime_type: String,
}

impl RawBytes {
    pub fn new(file_bytes: Vec<u8>, path_identifier: PathIdentifier) -> Self {
        Self {
            file_bytes,
            path_identifier,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Image,
    Text,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Image => f.write_str("image"),
            ContentType::Text => f.write_str("text"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub content: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextData {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageData {
    Image(ImageData),
    Text(TextData),
}

impl PageData {
    pub fn content_type(&self) -> ContentType {
        match self {
            PageData::Image(_) => ContentType::Image,
            PageData::Text(_) => ContentType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    page_number: u32,
    data: PageData,
}

impl Page {
    /// `page_number` is 1-based.
    pub fn new(page_number: u32, data: PageData) -> Result<Self> {
        if page_number == 0 {
            return Err(DocexError::InvalidDocument(
                "page numbers are 1-based, got 0".to_string(),
            ));
        }
        Ok(Self { page_number, data })
    }

    pub fn text(page_number: u32, content: impl Into<String>) -> Result<Self> {
        Self::new(
            page_number,
            PageData::Text(TextData {
                content: content.into(),
            }),
        )
    }

    pub fn image(page_number: u32, content: Vec<u8>, mime_type: impl Into<String>) -> Result<Self> {
        Self::new(
            page_number,
            PageData::Image(ImageData {
                content,
                mime_type: mime_type.into(),
            }),
        )
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn data(&self) -> &PageData {
        &self.data
    }
}

/// A fully parsed document.
///
/// Every page carries a payload matching `content_type`; this is checked once in
/// [`Document::new`] and the value is immutable afterwards.
#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    content_type: ContentType,
    pages: Vec<Page>,
    path_identifier: PathIdentifier,
    metadata: Map<String, Value>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        content_type: ContentType,
        pages: Vec<Page>,
        path_identifier: PathIdentifier,
        metadata: Map<String, Value>,
    ) -> Result<Self> {
        let id = id.into();
        if let Some(page) = pages
            .iter()
            .find(|p| p.data.content_type() != content_type)
        {
            return Err(DocexError::InvalidDocument(format!(
                "document {id} is {content_type} but page {} holds {} data",
                page.page_number,
                page.data.content_type()
            )));
        }

        Ok(Self {
            id,
            content_type,
            pages,
            path_identifier,
            metadata,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn path_identifier(&self) -> &PathIdentifier {
        &self.path_identifier
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}
