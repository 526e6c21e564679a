//! OpenAI chat completions provider (JSON response format)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::llm::client::{ModelError, ModelOutput, SummarizationModel, classify_http_error, parse_json_payload};
use crate::summary::{BudgetHint, SummaryRequest};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str =
    "You are a sharp tech/business analyst. Always respond with valid JSON only, no markdown formatting.";

/// Default model to use
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Environment variable holding the API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for the OpenAI client
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_OPENAI_MODEL.to_string(),
            temperature: 0.3,
            timeout: Duration::from_secs(120),
        }
    }
}

/// OpenAI API client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    config: OpenAiConfig,
}

impl OpenAiClient {
    /// Create a client, reading the key from `api_key_env`
    pub fn from_env(api_key_env: &str, config: OpenAiConfig) -> Result<Self, ModelError> {
        let api_key = std::env::var(api_key_env).map_err(|_| ModelError::MissingApiKey {
            env_var: api_key_env.to_string(),
        })?;
        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: String, config: OpenAiConfig) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn build_request(&self, prompt: &str, budget: &BudgetHint) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": self.config.temperature,
            "max_tokens": budget.max_output_tokens,
            "response_format": { "type": "json_object" }
        })
    }

    fn parse_response(&self, body: &Value) -> Result<ModelOutput, ModelError> {
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ModelError::Parse("response has no message content".to_string()))?;
        let fields = parse_json_payload(text)?;
        let model = body["model"].as_str().unwrap_or(&self.config.model).to_string();
        Ok(ModelOutput::new(fields, model))
    }
}

#[async_trait]
impl SummarizationModel for OpenAiClient {
    async fn submit(&self, request: &SummaryRequest, budget: &BudgetHint) -> Result<ModelOutput, ModelError> {
        let prompt = request.render(budget);

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
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

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient").field("model", &self.config.model).finish()
    }
}
