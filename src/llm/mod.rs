//! Summarization model layer
//!
//! This module provides:
//! - SummarizationModel trait and the ModelError taxonomy
//! - Gemini and OpenAI HTTP providers
//! - ScriptedModel for tests and dry integration runs

pub mod client;
pub mod gemini;
pub mod openai;

pub use client::{
    FailureKind, ModelError, ModelOutput, ScriptedModel, SummarizationModel, classify_http_error, parse_json_payload,
};
pub use gemini::{DEFAULT_GEMINI_MODEL, GEMINI_API_KEY_ENV, GeminiClient, GeminiConfig};
pub use openai::{DEFAULT_OPENAI_MODEL, OPENAI_API_KEY_ENV, OpenAiClient, OpenAiConfig};
