//! # Enrichment Client
//!
//! Calls the LLM completion endpoint with the rolling transcript and turns
//! the response into a `context_partial` payload. Every failure mode
//! (missing credential, network error, unusable response shape) is logged
//! and swallowed; enrichment never blocks or fails the transcription path.

use crate::config::EnrichmentConfig;
use crate::enrichment::extract;
use crate::enrichment::prompt;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable holding the completion-endpoint credential.
const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Payload of a `context_partial` message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextPayload {
    /// Enrichment text for display
    pub context: String,

    /// Model that generated it
    pub model: String,

    /// Generation timestamp, ISO-8601
    pub generated_at: String,

    /// Length of the transcript the context was derived from
    pub source_len: usize,
}

/// Expected completion response schema. One documented shape; anything
/// else is a failed attempt, not a reason to probe alternatives.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Fire-and-forget client for the completion endpoint.
pub struct EnrichmentClient {
    http: reqwest::Client,
    api_key: Option<String>,
    config: EnrichmentConfig,
}

impl EnrichmentClient {
    /// Build the client, picking the credential up from the environment.
    /// A missing key downgrades `enrich` to a no-op rather than failing
    /// connections later.
    pub fn from_env(config: EnrichmentConfig) -> Self {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() {
            warn!(
                "{} is not set; transcription will run without context enrichment",
                API_KEY_VAR
            );
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            api_key,
            config,
        }
    }

    /// Request context for the given transcript fragments (oldest first).
    ///
    /// Returns `Ok(None)` when there is nothing to send for this cycle:
    /// no credential, empty transcript, or an unusable response. `Err` is
    /// reserved for transport-level failures; callers log either outcome
    /// and move on, there are no retries.
    pub async fn enrich(&self, fragments: &[String]) -> Result<Option<ContextPayload>> {
        let combined = prompt::combine_fragments(fragments);
        if combined.is_empty() {
            return Ok(None);
        }

        let Some(api_key) = &self.api_key else {
            debug!("Skipping enrichment: no credential configured");
            return Ok(None);
        };

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": prompt::SYSTEM_PROMPT},
                {"role": "user", "content": prompt::build_user_prompt(&combined)},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let completion: ChatCompletionResponse = response.json().await?;
        let raw = completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| anyhow!("Completion response carried no message content"))?;

        let Some(context) = extract::context_from_response(raw) else {
            debug!("No context could be extracted from the completion response");
            return Ok(None);
        };

        Ok(Some(ContextPayload {
            context,
            model: self.config.model.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            source_len: combined.len(),
        }))
    }

    /// Whether a credential is available, for the health endpoint.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Model name used for enrichment.
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EnrichmentConfig {
        EnrichmentConfig {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 600,
            temperature: 0.0,
            api_base: "https://api.openai.com/v1".to_string(),
        }
    }

    #[test]
    fn context_payload_wire_shape() {
        let payload = ContextPayload {
            context: "Key concepts: quorum, log matching.".to_string(),
            model: "gpt-4o-mini".to_string(),
            generated_at: "2025-01-01T12:00:00+00:00".to_string(),
            source_len: 42,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["context"], "Key concepts: quorum, log matching.");
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["source_len"], 42);
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn completion_response_schema_parses() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "{\"context\": \"hi\"}"}}
            ],
            "usage": {"total_tokens": 10}
        }"#;

        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"context\": \"hi\"}")
        );
    }

    #[tokio::test]
    async fn enrich_without_credential_is_a_noop() {
        // Construct directly so the test does not depend on the process
        // environment.
        let client = EnrichmentClient {
            http: reqwest::Client::new(),
            api_key: None,
            config: test_config(),
        };

        let result = client
            .enrich(&["some transcript".to_string()])
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn enrich_with_empty_transcript_is_a_noop() {
        let client = EnrichmentClient {
            http: reqwest::Client::new(),
            api_key: Some("sk-test".to_string()),
            config: test_config(),
        };

        let result = client.enrich(&[]).await.unwrap();
        assert!(result.is_none());
    }
}
