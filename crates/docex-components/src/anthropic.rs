use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use docex_core::config::Component;
use docex_core::context::PipelineContext;
use docex_core::document::{Document, PageData};
use docex_core::error::{DocexError, Result};
use docex_core::extraction::{ExtractionResult, ExtractionSchema, Extractor};

pub(crate) const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MODEL: &str = "claude-haiku-4-5-20251001";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicExtractorConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Extra domain guidance appended to the system prompt.
    #[serde(default)]
    pub instructions: Option<String>,
}

fn default_model() -> String {
    MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    MAX_TOKENS
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_api_url() -> String {
    ANTHROPIC_API_URL.to_string()
}

impl Default for AnthropicExtractorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            api_url: default_api_url(),
            instructions: None,
        }
    }
}

/// Schema-driven extraction through the Anthropic Messages API.
///
/// Text pages are sent as text blocks and image pages as base64 image blocks, in
/// page order. The model is asked for a JSON object shaped like the schema's
/// template, which is then deserialized into the schema type.
pub struct AnthropicExtractor {
    client: MessagesClient,
    config: AnthropicExtractorConfig,
}

// ── Anthropic Messages API request/response types ──────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicRequest {
    pub(crate) model: String,
    pub(crate) max_tokens: u32,
    pub(crate) system: String,
    pub(crate) messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Message {
    role: String,
    content: Vec<RequestBlock>,
}

impl Message {
    pub(crate) fn user(content: Vec<RequestBlock>) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum RequestBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicResponse {
    /// The first text block of the reply.
    pub(crate) fn text(&self) -> Result<&str> {
        self.content
            .iter()
            .find_map(|block| {
                if block.block_type == "text" {
                    block.text.as_deref()
                } else {
                    None
                }
            })
            .ok_or_else(|| {
                DocexError::Extraction("No text content block in API response".to_string())
            })
    }
}

// ── HTTP client ────────────────────────────────────────────────────────────

/// Authenticated Messages API endpoint shared by the extractor and the LLM judge.
pub(crate) struct MessagesClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl MessagesClient {
    pub(crate) fn new(http: reqwest::Client, api_key: String, api_url: String) -> Self {
        Self {
            http,
            api_key,
            api_url,
        }
    }

    /// Read the API key from `api_key_env`; an unset or blank variable is a
    /// configuration error naming `role`.
    pub(crate) fn api_key_from_env(api_key_env: &str, role: &str) -> Result<String> {
        std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                DocexError::Config(format!("{role} API key variable {api_key_env} is not set"))
            })
    }

    pub(crate) async fn send(&self, request: &AnthropicRequest) -> Result<AnthropicResponse> {
        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| DocexError::Extraction(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(DocexError::Extraction(format!(
                "Anthropic API returned status {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DocexError::Extraction(format!("Failed to parse API response: {e}")))
    }
}

/// Drop a markdown code fence around a model reply, if there is one.
///
/// The opening fence line (with any language tag) and the closing fence are
/// removed; whatever sits between them is returned untouched.
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(fenced) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match fenced.split_once('\n') {
        Some((_tag, rest)) => rest,
        None => fenced,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

// ── Implementation ─────────────────────────────────────────────────────────

impl AnthropicExtractor {
    pub fn new(api_key: impl Into<String>, config: AnthropicExtractorConfig) -> Self {
        Self {
            client: MessagesClient::new(
                reqwest::Client::new(),
                api_key.into(),
                config.api_url.clone(),
            ),
            config,
        }
    }

    fn build_system_prompt(template: &Value, instructions: Option<&str>) -> String {
        let template =
            serde_json::to_string_pretty(template).unwrap_or_else(|_| "{}".to_string());
        let mut prompt = format!(
            r#"You are a structured data extraction system.

Read the document provided by the user and fill in the following JSON template:

{template}

Rules:
- Return ONLY valid JSON (no markdown fences, no commentary) with exactly the template's keys.
- Use null for any value the document does not state.
- Copy values as written in the document; do not infer or embellish."#
        );
        if let Some(extra) = instructions {
            prompt.push_str("\n\n");
            prompt.push_str(extra);
        }
        prompt
    }

    fn build_content(document: &Document) -> Vec<RequestBlock> {
        let mut blocks = Vec::with_capacity(document.pages().len() + 1);
        blocks.push(RequestBlock::Text {
            text: format!(
                "Document: {} ({} pages)",
                document.path_identifier(),
                document.pages().len()
            ),
        });
        for page in document.pages() {
            match page.data() {
                PageData::Text(text) => blocks.push(RequestBlock::Text {
                    text: format!("--- Page {} ---\n{}", page.page_number(), text.content),
                }),
                PageData::Image(image) => blocks.push(RequestBlock::Image {
                    source: ImageSource {
                        source_type: "base64",
                        media_type: image.mime_type.clone(),
                        data: BASE64.encode(&image.content),
                    },
                }),
            }
        }
        blocks
    }

    fn build_request<S: ExtractionSchema>(&self, document: &Document) -> AnthropicRequest {
        let instructions = self.config.instructions.as_deref();
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: Self::build_system_prompt(&S::template(), instructions),
            messages: vec![Message::user(Self::build_content(document))],
        }
    }

    fn parse_llm_response<S: ExtractionSchema>(raw_json: &str) -> Result<S> {
        // Models sometimes fence the JSON despite the instructions.
        let cleaned = strip_code_fences(raw_json);

        serde_json::from_str(cleaned).map_err(|e| {
            tracing::error!(raw = %cleaned, error = %e, "Failed to parse LLM extraction JSON");
            DocexError::Extraction(format!("Failed to parse LLM JSON output: {e}"))
        })
    }
}

impl Component for AnthropicExtractor {
    type Config = AnthropicExtractorConfig;
    const CONFIG_KEY: &'static str = "extractor";

    fn from_config(config: Self::Config) -> Result<Self> {
        let api_key = MessagesClient::api_key_from_env(&config.api_key_env, "extractor")?;
        Ok(Self::new(api_key, config))
    }
}

#[async_trait]
impl<S: ExtractionSchema> Extractor<S> for AnthropicExtractor {
    async fn extract(
        &self,
        document: &Document,
        _context: &PipelineContext,
    ) -> Result<ExtractionResult<S>> {
        let request = self.build_request::<S>(document);

        tracing::debug!(
            model = %self.config.model,
            document_id = document.id(),
            pages = document.pages().len(),
            "Sending extraction request to Anthropic API"
        );

        let response = self.client.send(&request).await?;
        let text = response.text()?;

        tracing::debug!(
            stop_reason = ?response.stop_reason,
            response_len = text.len(),
            "Received extraction response from Anthropic API"
        );

        let data = Self::parse_llm_response::<S>(text)?;

        let mut result =
            ExtractionResult::new(data).with_metadata("model", self.config.model.clone());
        if let Some(reason) = &response.stop_reason {
            result = result.with_metadata("stop_reason", reason.clone());
        }
        if let Some(usage) = &response.usage {
            result = result
                .with_metadata("input_tokens", usage.input_tokens)
                .with_metadata("output_tokens", usage.output_tokens);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docex_core::document::{ContentType, Page, PathIdentifier};
    use serde_json::{json, Map};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Receipt {
        merchant: Option<String>,
        total: Option<f64>,
    }

    impl ExtractionSchema for Receipt {}

    fn extractor() -> AnthropicExtractor {
        AnthropicExtractor::new("test-key", AnthropicExtractorConfig::default())
    }

    #[test]
    fn test_parse_plain_json() {
        let parsed: Receipt =
            AnthropicExtractor::parse_llm_response(r#"{"merchant": "Corner Shop", "total": 12.5}"#)
                .unwrap();
        assert_eq!(parsed.merchant.as_deref(), Some("Corner Shop"));
        assert_eq!(parsed.total, Some(12.5));
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let raw = "```json\n{\"merchant\": null, \"total\": 3}\n```";
        let parsed: Receipt = AnthropicExtractor::parse_llm_response(raw).unwrap();
        assert_eq!(parsed.merchant, None);
        assert_eq!(parsed.total, Some(3.0));
    }

    #[test]
    fn test_parse_garbage_is_extraction_error() {
        let err =
            AnthropicExtractor::parse_llm_response::<Receipt>("I could not find it").unwrap_err();
        assert!(matches!(err, DocexError::Extraction(_)));
    }

    #[test]
    fn test_parse_fence_with_closing_brace_first_is_extraction_error() {
        let err = AnthropicExtractor::parse_llm_response::<Value>("```\n}\n{").unwrap_err();
        assert!(matches!(err, DocexError::Extraction(_)));
    }

    #[test]
    fn test_parse_fenced_array_reply() {
        let parsed: Value = AnthropicExtractor::parse_llm_response("```json\n[1, 2]\n```").unwrap();
        assert_eq!(parsed, json!([1, 2]));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```{}```"), "{}");
        assert_eq!(strip_code_fences("```\n"), "");
        assert_eq!(strip_code_fences("```"), "");
    }

    #[test]
    fn test_system_prompt_embeds_template_and_instructions() {
        let prompt = AnthropicExtractor::build_system_prompt(
            &Receipt::template(),
            Some("Totals include tax."),
        );
        assert!(prompt.contains("\"merchant\""));
        assert!(prompt.contains("\"total\""));
        assert!(prompt.ends_with("Totals include tax."));
    }

    #[test]
    fn test_request_blocks_follow_page_order() {
        let pages = vec![
            Page::image(1, vec![1, 2, 3], "image/png").unwrap(),
            Page::image(2, vec![4], "image/jpeg").unwrap(),
        ];
        let document = Document::new(
            "scan",
            ContentType::Image,
            pages,
            PathIdentifier::new("scan.pdf"),
            Map::new(),
        )
        .unwrap();

        let request = extractor().build_request::<Receipt>(&document);
        let body = serde_json::to_value(&request).unwrap();
        let content = &body["messages"][0]["content"];

        assert_eq!(content.as_array().unwrap().len(), 3);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["type"], "base64");
        assert_eq!(content[1]["source"]["media_type"], "image/png");
        assert_eq!(content[1]["source"]["data"], "AQID");
        assert_eq!(content[2]["source"]["media_type"], "image/jpeg");
        assert_eq!(body["max_tokens"], json!(MAX_TOKENS));
    }

    #[test]
    fn test_response_text_picks_first_text_block() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking"},
                {"type": "text", "text": "{}"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 2}
        }))
        .unwrap();
        assert_eq!(response.text().unwrap(), "{}");
        assert_eq!(response.usage.unwrap().output_tokens, 2);
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = AnthropicExtractorConfig {
            api_key_env: "DOCEX_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        let err = AnthropicExtractor::from_config(config).err().unwrap();
        assert!(matches!(err, DocexError::Config(_)));
    }
}
