//! Summarization model contract and error taxonomy

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::summary::{BudgetHint, SummaryRequest};

/// Stateless summarization backend - each call is independent
#[async_trait]
pub trait SummarizationModel: Send + Sync {
    /// Summarize one item within `budget`
    async fn submit(&self, request: &SummaryRequest, budget: &BudgetHint) -> Result<ModelOutput, ModelError>;

    /// Model name recorded on processed items
    fn name(&self) -> &str;
}

/// Structured fields as returned by a model, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// Validated into a `SummaryResponse` by the write funnel
    pub fields: Value,
    pub model: String,
}

impl ModelOutput {
    pub fn new(fields: Value, model: impl Into<String>) -> Self {
        Self {
            fields,
            model: model.into(),
        }
    }
}

/// How the scheduler treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Escalating backoff, lane failover on exhaustion
    RateLimited,
    /// Lane is out for this run: reroute without backoff
    LaneExhausted,
    /// Short backoff, same lane
    Transient,
}

/// Errors that can occur during a model call
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Unparseable response: {0}")]
    Parse(String),

    #[error("API error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },
}

impl ModelError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ModelError::RateLimited { .. } => FailureKind::RateLimited,
            ModelError::QuotaExhausted(_) | ModelError::MissingApiKey { .. } => FailureKind::LaneExhausted,
            ModelError::Parse(_) | ModelError::Server { .. } | ModelError::Timeout(_) | ModelError::Network(_) => {
                FailureKind::Transient
            }
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind() == FailureKind::RateLimited
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::Network(err.to_string())
    }
}

/// Map a non-success HTTP response to a model error.
///
/// A 429 that names a free-tier quota of zero means the lane is done for the
/// day; retrying it only burns the run's time.
pub fn classify_http_error(status: u16, body: &str, retry_after: Option<Duration>) -> ModelError {
    let lower = body.to_lowercase();
    if status == 429 {
        if lower.contains("free_tier") && lower.contains("limit: 0") {
            return ModelError::QuotaExhausted(body.chars().take(200).collect());
        }
        return ModelError::RateLimited { retry_after };
    }
    ModelError::Server {
        status,
        message: body.chars().take(500).collect(),
    }
}

/// Strip a ```json fence and parse the object inside.
pub fn parse_json_payload(text: &str) -> Result<Value, ModelError> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.trim_start_matches("json").trim_start();
        body = body.strip_suffix("```").unwrap_or(body).trim();
    }
    let value: Value = serde_json::from_str(body).map_err(|e| ModelError::Parse(e.to_string()))?;
    if !value.is_object() {
        return Err(ModelError::Parse("expected a JSON object".to_string()));
    }
    Ok(value)
}

/// In-memory model that replays scripted results.
///
/// Results are consumed per content id first, then from the shared queue.
/// Once both are empty every call succeeds with `default_output`.
pub struct ScriptedModel {
    name: String,
    per_item: Mutex<HashMap<String, VecDeque<Result<Value, ModelError>>>>,
    queue: Mutex<VecDeque<Result<Value, ModelError>>>,
    default_output: Value,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(name: impl Into<String>, default_output: Value) -> Self {
        Self {
            name: name.into(),
            per_item: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            default_output,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Hold every call for `delay` (useful for observing concurrency)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Script results for one content id, consumed in order
    pub fn script_item(self, content_id: impl Into<String>, results: Vec<Result<Value, ModelError>>) -> Self {
        if let Ok(mut map) = self.per_item.lock() {
            map.entry(content_id.into()).or_default().extend(results);
        }
        self
    }

    /// Script results for whichever calls come next
    pub fn script(self, results: Vec<Result<Value, ModelError>>) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(results);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Content ids in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_result(&self, content_id: &str) -> Result<Value, ModelError> {
        if let Ok(mut map) = self.per_item.lock() {
            if let Some(result) = map.get_mut(content_id).and_then(VecDeque::pop_front) {
                return result;
            }
        }
        if let Ok(mut queue) = self.queue.lock() {
            if let Some(result) = queue.pop_front() {
                return result;
            }
        }
        Ok(self.default_output.clone())
    }
}

#[async_trait]
impl SummarizationModel for ScriptedModel {
    async fn submit(&self, request: &SummaryRequest, _budget: &BudgetHint) -> Result<ModelOutput, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.content_id.clone());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.next_result(&request.content_id);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map(|fields| ModelOutput::new(fields, self.name.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentKind, RawItem};
    use chrono::Utc;
    use serde_json::json;

    fn request(url: &str) -> SummaryRequest {
        let item = RawItem::new("src", "Src", ContentKind::Article, "t", url, Utc::now(), Some("body".into()));
        SummaryRequest::from_item(&item)
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ModelError::RateLimited { retry_after: None }.kind(), FailureKind::RateLimited);
        assert_eq!(ModelError::QuotaExhausted("limit: 0".into()).kind(), FailureKind::LaneExhausted);
        assert_eq!(ModelError::Parse("bad".into()).kind(), FailureKind::Transient);
        assert_eq!(
            ModelError::Server {
                status: 503,
                message: "unavailable".into()
            }
            .kind(),
            FailureKind::Transient
        );
        assert_eq!(ModelError::Timeout(Duration::from_secs(60)).kind(), FailureKind::Transient);
    }

    #[test]
    fn test_classify_http_error() {
        assert!(matches!(
            classify_http_error(429, "Too many requests", Some(Duration::from_secs(5))),
            ModelError::RateLimited { retry_after: Some(_) }
        ));
        let quota = classify_http_error(429, "Quota exceeded for metric free_tier_requests, limit: 0", None);
        assert_eq!(quota.kind(), FailureKind::LaneExhausted);
        assert!(matches!(classify_http_error(503, "overloaded", None), ModelError::Server { status: 503, .. }));
    }

    #[test]
    fn test_parse_json_payload_strips_fence() {
        let value = parse_json_payload("```json\n{\"core_summary\": \"x\"}\n```").unwrap();
        assert_eq!(value["core_summary"], "x");
    }

    #[test]
    fn test_parse_json_payload_rejects_non_object() {
        assert!(matches!(parse_json_payload("[1, 2]"), Err(ModelError::Parse(_))));
        assert!(matches!(parse_json_payload("not json"), Err(ModelError::Parse(_))));
    }

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let req = request("https://example.com/1");
        let model = ScriptedModel::new("scripted", json!({"core_summary": "default"}))
            .script_item(req.content_id.clone(), vec![Err(ModelError::RateLimited { retry_after: None })])
            .script(vec![Ok(json!({"core_summary": "queued"}))]);
        let budget = BudgetHint::default();

        assert!(model.submit(&req, &budget).await.unwrap_err().is_rate_limit());
        assert_eq!(model.submit(&req, &budget).await.unwrap().fields["core_summary"], "queued");
        assert_eq!(model.submit(&req, &budget).await.unwrap().fields["core_summary"], "default");
        assert_eq!(model.calls(), 3);
        assert_eq!(model.seen().len(), 3);
    }
}
