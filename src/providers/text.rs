//! Text generation adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::{check_status, join_url, require_secret};
use crate::fallback::{Capability, FallbackRequest, Output, ProviderAdapter, ProviderError, Secret};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";

/// Token budget when the request does not set one.
pub const DEFAULT_MAX_TOKENS: u32 = 150;

fn validate_prompt(request: &FallbackRequest) -> Result<&str, ProviderError> {
    let prompt = request.payload.trim();
    if prompt.is_empty() {
        return Err(ProviderError::Unsupported("empty prompt".to_string()));
    }
    Ok(prompt)
}

// === Gemini ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContentIn<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContentIn<'a> {
    parts: Vec<GeminiPartIn<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPartIn<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentOut>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentOut {
    #[serde(default)]
    parts: Vec<GeminiPartOut>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartOut {
    #[serde(default)]
    text: Option<String>,
}

/// Google Gemini `generateContent`.
pub struct GeminiText {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiText {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiText {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capability(&self) -> Capability {
        Capability::TextGenerate
    }

    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let key = require_secret(secret)?;
        let prompt = validate_prompt(request)?;
        let url = join_url(
            &self.base_url,
            &format!("v1beta/models/{}:generateContent", self.model),
        );
        let body = GeminiRequest {
            contents: vec![GeminiContentIn {
                parts: vec![GeminiPartIn { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            },
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?;
        let body: GeminiResponse = check_status(response).await?.json().await?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(Output::Text(text.trim().to_string()))
    }
}

// === OpenAI-compatible chat ===

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageIn<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessageIn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    #[serde(default)]
    content: Option<String>,
}

/// `/v1/chat/completions` on OpenAI, Groq or OpenRouter.
pub struct OpenAiChat {
    name: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(
        name: impl Into<String>,
        http: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            http,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    pub fn openai(http: reqwest::Client) -> Self {
        Self::new("openai", http, OPENAI_BASE_URL, "gpt-3.5-turbo")
    }

    pub fn groq(http: reqwest::Client) -> Self {
        Self::new("groq", http, GROQ_BASE_URL, "llama-3.1-8b-instant")
    }

    pub fn openrouter(http: reqwest::Client) -> Self {
        Self::new("openrouter", http, OPENROUTER_BASE_URL, "anthropic/claude-3-haiku")
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiChat {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> Capability {
        Capability::TextGenerate
    }

    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let key = require_secret(secret)?;
        let prompt = validate_prompt(request)?;
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessageIn {
                role: "user",
                content: prompt,
            }],
            max_tokens: request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        };

        let response = self
            .http
            .post(join_url(&self.base_url, "v1/chat/completions"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        let body: ChatResponse = check_status(response).await?.json().await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(Output::Text(text.trim().to_string()))
    }
}
