use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use docex_core::error::{DocexError, Result};

use crate::anthropic::{
    strip_code_fences, AnthropicRequest, Message, MessagesClient, RequestBlock, ANTHROPIC_API_URL,
};

const JUDGE_MODEL: &str = "claude-haiku-4-5-20251001";
const JUDGE_MAX_TOKENS: u32 = 256;
const JUDGE_NAME: &str = "llm_judge";

const JUDGE_SYSTEM: &str = "You compare an extracted field value against its ground truth. \
Reply with ONLY a JSON object of the form {\"is_equal\": true} or {\"is_equal\": false}.";

const DEFAULT_PROMPT: &str = "Ground truth value: {true_value}\n\
Predicted value: {pred_value}\n\n\
Do these two values express the same information? Ignore differences in formatting, \
casing, whitespace, units notation and abbreviations.";

/// Decides whether a predicted field value counts as equal to the truth.
///
/// Judges are called from evaluator code on worker pool threads, so they may block.
pub trait FieldJudge: Send + Sync {
    fn name(&self) -> &str;

    fn same(&self, field: &str, truth: &Value, pred: &Value) -> Result<bool>;
}

/// Strict JSON equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl FieldJudge for ExactMatch {
    fn name(&self) -> &str {
        "exact"
    }

    fn same(&self, _field: &str, truth: &Value, pred: &Value) -> Result<bool> {
        Ok(truth == pred)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmJudgeConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// User prompt; `{true_value}` and `{pred_value}` are substituted.
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

fn default_model() -> String {
    JUDGE_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    JUDGE_MAX_TOKENS
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_api_url() -> String {
    ANTHROPIC_API_URL.to_string()
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

impl Default for LlmJudgeConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            api_url: default_api_url(),
            prompt: default_prompt(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    is_equal: bool,
}

/// LLM-as-a-judge comparison through the Anthropic Messages API.
///
/// Identical values are accepted without a request. Otherwise each call blocks
/// the current thread on a private single-threaded runtime, which is why the
/// judge refuses to run on a thread that is already driving async tasks.
pub struct LlmJudge {
    client: MessagesClient,
    config: LlmJudgeConfig,
}

impl LlmJudge {
    pub fn new(api_key: impl Into<String>, config: LlmJudgeConfig) -> Self {
        // Idle connections would outlive the per-call runtime that opened them.
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();
        Self::with_client(http, api_key, config)
    }

    fn with_client(
        http: reqwest::Client,
        api_key: impl Into<String>,
        config: LlmJudgeConfig,
    ) -> Self {
        Self {
            client: MessagesClient::new(http, api_key.into(), config.api_url.clone()),
            config,
        }
    }

    pub fn from_config(config: LlmJudgeConfig) -> Result<Self> {
        let api_key = MessagesClient::api_key_from_env(&config.api_key_env, "LLM judge")?;
        Ok(Self::new(api_key, config))
    }

    fn render_prompt(&self, truth: &Value, pred: &Value) -> String {
        self.config
            .prompt
            .replace("{true_value}", &display_value(truth))
            .replace("{pred_value}", &display_value(pred))
    }

    fn build_request(&self, truth: &Value, pred: &Value) -> AnthropicRequest {
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: JUDGE_SYSTEM.to_string(),
            messages: vec![Message::user(vec![RequestBlock::Text {
                text: self.render_prompt(truth, pred),
            }])],
        }
    }

    fn ask(&self, request: &AnthropicRequest) -> Result<bool> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(judge_error(
                "cannot block inside an async runtime; run evaluators on the worker pool",
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let response = runtime
            .block_on(self.client.send(request))
            .map_err(|e| judge_error(e.to_string()))?;
        let text = response.text().map_err(|e| judge_error(e.to_string()))?;
        let verdict: Verdict = serde_json::from_str(strip_code_fences(text))
            .map_err(|e| judge_error(format!("unreadable verdict {text:?}: {e}")))?;
        Ok(verdict.is_equal)
    }
}

impl FieldJudge for LlmJudge {
    fn name(&self) -> &str {
        JUDGE_NAME
    }

    fn same(&self, field: &str, truth: &Value, pred: &Value) -> Result<bool> {
        if truth == pred {
            return Ok(true);
        }
        let is_equal = self.ask(&self.build_request(truth, pred))?;
        debug!(field, is_equal, model = %self.config.model, "LLM judge verdict");
        Ok(is_equal)
    }
}

/// Strings are shown bare, everything else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn judge_error(message: impl Into<String>) -> DocexError {
    DocexError::Evaluation {
        evaluator: JUDGE_NAME.to_string(),
        message: message.into(),
    }
}
