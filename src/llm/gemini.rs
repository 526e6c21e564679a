//! Google Gemini `generateContent` provider

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::llm::client::{ModelError, ModelOutput, SummarizationModel, classify_http_error, parse_json_payload};
use crate::summary::{BudgetHint, SummaryRequest};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default model to use
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Environment variable holding the API key
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Configuration for the Gemini client
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            temperature: 0.3,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Create a client, reading the key from `api_key_env`
    pub fn from_env(api_key_env: &str, config: GeminiConfig) -> Result<Self, ModelError> {
        let api_key = std::env::var(api_key_env).map_err(|_| ModelError::MissingApiKey {
            env_var: api_key_env.to_string(),
        })?;
        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: String, config: GeminiConfig) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn build_request(&self, prompt: &str, budget: &BudgetHint) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": budget.max_output_tokens,
                "responseMimeType": "application/json"
            }
        })
    }

    fn parse_response(&self, body: &Value) -> Result<ModelOutput, ModelError> {
        let text = body["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect::<Vec<_>>().join(""))
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ModelError::Parse("response has no candidate text".to_string()))?;
        let fields = parse_json_payload(&text)?;
        Ok(ModelOutput::new(fields, self.config.model.clone()))
    }
}

#[async_trait]
impl SummarizationModel for GeminiClient {
    async fn submit(&self, request: &SummaryRequest, budget: &BudgetHint) -> Result<ModelOutput, ModelError> {
        let prompt = request.render(budget);
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.config.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(&prompt, budget))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.config.timeout)
                } else {
                    ModelError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_http_error(status.as_u16(), &body, retry_after));
        }

        let body: Value = response.json().await.map_err(|e| ModelError::Parse(e.to_string()))?;
        self.parse_response(&body)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient").field("model", &self.config.model).finish()
    }
}
