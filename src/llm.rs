//! SQL generation through a hosted or local LLM.
//!
//! The question is embedded in a fixed instructional prompt that describes
//! the schema and asks for a bare `SELECT` statement. Whatever comes back is
//! stripped of markdown code fences and handed on as a candidate; nothing
//! here decides whether it is safe.
//!
//! # Supported Providers
//!
//! | Provider | Endpoint | Authentication |
//! |----------|----------|----------------|
//! | OpenAI-compatible | configurable, default Groq | Bearer token |
//! | Anthropic | `api.anthropic.com` | x-api-key header |
//! | Ollama | Local (configurable) | None |
//!
//! There is no retry at this layer: any failure goes straight back to the
//! pipeline, which may answer from a fallback template instead.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use sql_query_gate::llm::{LlmClient, LlmProvider};
//!
//! let provider = LlmProvider::Ollama {
//!     base_url: "http://localhost:11434".into(),
//!     model:    "llama3.2".into()
//! };
//!
//! let client = LlmClient::new(provider, Duration::from_secs(30)).unwrap();
//! assert_eq!(client.timeout(), Duration::from_secs(30));
//! ```

use std::{sync::LazyLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppResult, GeneratorError, config_error, http_error};

/// Default OpenAI-compatible endpoint
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

const SYSTEM_PROMPT: &str =
    "You are a SQL expert that converts natural language to PostgreSQL queries.";

const SQL_PROMPT_TEMPLATE: &str = "\
You are a SQL expert. Convert the following natural language query into a PostgreSQL SQL query.

Database Schema:
- vendors (id, name, email, phone, address)
- customers (id, name, email, phone, address)
- invoices (id, invoice_number, vendor_id, customer_id, issue_date, due_date, status, subtotal, tax, total, currency, notes)
- line_items (id, invoice_id, category_id, description, quantity, unit_price, amount)
- categories (id, name)
- payments (id, invoice_id, amount, payment_date, method, reference)

Important rules:
1. ONLY generate SELECT statements (no INSERT, UPDATE, DELETE, DROP, etc.)
2. Use proper PostgreSQL syntax with snake_case column names (e.g., invoice_number not invoiceNumber)
3. Use appropriate JOINs when querying related tables
4. Include ORDER BY and LIMIT clauses when appropriate
5. Return ONLY a single SQL SELECT statement: no prose, no markdown fencing, no trailing semicolon

Natural language query: {query}

SQL query:";

const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 500;

static FENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```[A-Za-z]*[ \t]*(?:\r?\n|$)").expect("fence pattern is valid")
});

/// Build the generation prompt for one question
pub fn build_prompt(question: &str) -> String {
    SQL_PROMPT_TEMPLATE.replace("{query}", question.trim())
}

/// Remove markdown code-fence wrapping from model output.
///
/// ```
/// use sql_query_gate::llm::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
/// ```
pub fn strip_code_fences(text: &str) -> String {
    let without_lines = FENCE_LINE.replace_all(text.trim(), "");
    let mut sql = without_lines.trim();
    if let Some(rest) = sql.strip_prefix("```") {
        sql = rest
            .strip_prefix("sql")
            .or_else(|| rest.strip_prefix("SQL"))
            .unwrap_or(rest);
    }
    sql.trim_end_matches('`').trim().to_string()
}

/// Anything that turns a question into candidate SQL text.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, question: &str) -> Result<String, GeneratorError>;
}

/// Generator that always fails with the same reason, used when the
/// configuration cannot produce a working client (e.g. no API key).
#[derive(Debug, Clone)]
pub struct UnavailableGenerator {
    reason: GeneratorError
}

impl UnavailableGenerator {
    pub fn new(reason: GeneratorError) -> Self {
        Self {
            reason
        }
    }
}

#[async_trait]
impl SqlGenerator for UnavailableGenerator {
    async fn generate(&self, _question: &str) -> Result<String, GeneratorError> {
        Err(self.reason.clone())
    }
}

/// LLM provider configuration with authentication credentials.
#[derive(Clone)]
pub enum LlmProvider {
    /// Any OpenAI chat-completions compatible API (OpenAI, Groq, ...)
    OpenAI {
        api_key: String,
        /// Full chat-completions URL
        api_url: String,
        model:   String
    },
    /// Anthropic API (Claude models)
    Anthropic { api_key: String, model: String },
    /// Local Ollama instance
    Ollama {
        /// Base URL (e.g., "http://localhost:11434")
        base_url: String,
        model:    String
    }
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI {
                ..
            } => "OpenAI",
            Self::Anthropic {
                ..
            } => "Anthropic",
            Self::Ollama {
                ..
            } => "Ollama"
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::OpenAI {
                model, ..
            }
            | Self::Anthropic {
                model, ..
            }
            | Self::Ollama {
                model, ..
            } => model
        }
    }
}

// Keys stay out of logs and debug output.
impl std::fmt::Debug for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider")
            .field("provider", &self.name())
            .field("model", &self.model())
            .finish_non_exhaustive()
    }
}

/// HTTP client for LLM API communication.
pub struct LlmClient {
    provider: LlmProvider,
    client:   reqwest::Client,
    timeout:  Duration
}

#[derive(Serialize)]
struct OpenAIRequest {
    model:       String,
    messages:    Vec<ChatMessage>,
    temperature: f32,
    max_tokens:  u32
}

#[derive(Serialize)]
struct ChatMessage {
    role:    String,
    content: String
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>
}

#[derive(Serialize)]
struct AnthropicRequest {
    model:       String,
    system:      String,
    max_tokens:  u32,
    temperature: f32,
    messages:    Vec<ChatMessage>
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String
}

#[derive(Serialize)]
struct OllamaRequest {
    model:  String,
    system: String,
    prompt: String,
    stream: bool
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String
}

impl LlmClient {
    /// Create a client whose every call is bounded by `timeout`
    pub fn new(provider: LlmProvider, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            provider,
            client,
            timeout
        })
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call_provider(&self, prompt: &str) -> Result<String, GeneratorError> {
        match &self.provider {
            LlmProvider::OpenAI {
                api_key,
                api_url,
                model
            } => self.call_openai(api_key, api_url, model, prompt).await,
            LlmProvider::Anthropic {
                api_key,
                model
            } => self.call_anthropic(api_key, model, prompt).await,
            LlmProvider::Ollama {
                base_url,
                model
            } => self.call_ollama(base_url, model, prompt).await
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder
    ) -> Result<reqwest::Response, GeneratorError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Timeout(self.timeout.as_secs())
            } else {
                http_error(e)
            }
        })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Status {
                status,
                body
            });
        }
        Ok(response)
    }

    async fn call_openai(
        &self,
        api_key: &str,
        api_url: &str,
        model: &str,
        prompt: &str
    ) -> Result<String, GeneratorError> {
        let request = OpenAIRequest {
            model:       model.to_string(),
            messages:    vec![
                ChatMessage {
                    role:    String::from("system"),
                    content: SYSTEM_PROMPT.to_string()
                },
                ChatMessage {
                    role:    String::from("user"),
                    content: prompt.to_string()
                },
            ],
            temperature: TEMPERATURE,
            max_tokens:  MAX_TOKENS
        };
        let response = self
            .send(
                self.client
                    .post(api_url)
                    .header("Authorization", format!("Bearer {}", api_key))
                    .json(&request)
            )
            .await?;
        let result: OpenAIResponse = response.json().await.map_err(http_error)?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(GeneratorError::EmptyResponse)
    }

    async fn call_anthropic(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str
    ) -> Result<String, GeneratorError> {
        let request = AnthropicRequest {
            model:       model.to_string(),
            system:      SYSTEM_PROMPT.to_string(),
            max_tokens:  MAX_TOKENS,
            temperature: TEMPERATURE,
            messages:    vec![ChatMessage {
                role:    String::from("user"),
                content: prompt.to_string()
            }]
        };
        let response = self
            .send(
                self.client
                    .post("https://api.anthropic.com/v1/messages")
                    .header("x-api-key", api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&request)
            )
            .await?;
        let result: AnthropicResponse = response.json().await.map_err(http_error)?;
        result
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or(GeneratorError::EmptyResponse)
    }

    async fn call_ollama(
        &self,
        base_url: &str,
        model: &str,
        prompt: &str
    ) -> Result<String, GeneratorError> {
        let request = OllamaRequest {
            model:  model.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: prompt.to_string(),
            stream: false
        };
        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
        let response = self.send(self.client.post(&url).json(&request)).await?;
        let result: OllamaResponse = response.json().await.map_err(http_error)?;
        Ok(result.response)
    }
}

#[async_trait]
impl SqlGenerator for LlmClient {
    async fn generate(&self, question: &str) -> Result<String, GeneratorError> {
        let prompt = build_prompt(question);
        debug!(provider = self.provider.name(), model = self.provider.model(), "requesting SQL");
        let raw = self.call_provider(&prompt).await?;
        let sql = strip_code_fences(&raw);
        if sql.is_empty() {
            return Err(GeneratorError::EmptyResponse);
        }
        Ok(sql)
    }
}
