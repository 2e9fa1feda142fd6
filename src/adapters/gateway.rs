use crate::domain::ports::{CompletionGateway, CompletionRequest};
use crate::core::prompt;
use crate::utils::error::{GatewayError, InsightError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl GatewaySettings {
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("GROQ_API_KEY").map_err(|_| InsightError::MissingConfigError {
                field: "GROQ_API_KEY".to_string(),
            })?;
        Ok(Self {
            api_key,
            model: std::env::var("GROQ_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }
}

/// Chat-completions client for Groq-style OpenAI-compatible endpoints.
/// JSON response mode, low temperature, bounded retries with exponential
/// backoff, and a one-shot repair re-prompt for non-conforming output.
/// Responses are never cached or written anywhere.
pub struct GroqGateway {
    client: Client,
    settings: GatewaySettings,
}

impl GroqGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(GatewaySettings::from_env()?)
    }

    /// Cheap health probe before committing to a full pipeline run.
    pub async fn test_connection(&self) -> bool {
        let request = CompletionRequest {
            system_message: "You are helpful. Respond with valid JSON.".to_string(),
            prompt: "Return JSON: {\"status\": \"ok\"}".to_string(),
            shape: crate::domain::ports::OutputShape::new(
                "connection_probe",
                "{ \"status\": \"ok\" }",
                |value| match value.get("status").and_then(|v| v.as_str()) {
                    Some("ok") => Ok(()),
                    _ => Err("missing status=ok".to_string()),
                },
            ),
        };
        self.complete(request).await.is_ok()
    }

    /// One chat completion with transport-level retry. Returns the raw
    /// message content; conformance is the caller's concern.
    async fn send(&self, system_message: &str, prompt: &str) -> std::result::Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.settings.base_url);
        let body = json!({
            "model": self.settings.model,
            "messages": [
                { "role": "system", "content": system_message },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.1,
            "max_tokens": MAX_TOKENS,
            "response_format": { "type": "json_object" },
        });

        let mut last_error = String::new();
        for attempt in 0..self.settings.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
            }

            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.settings.api_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let payload: Value = response.json().await.map_err(|e| {
                            GatewayError::Unavailable {
                                attempts: attempt + 1,
                                message: format!("unreadable response body: {}", e),
                            }
                        })?;
                        let content = payload["choices"][0]["message"]["content"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string();
                        return Ok(content);
                    }
                    // 429 and 5xx are transient; anything else will not
                    // improve on retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_error = format!("HTTP {}", status);
                        tracing::debug!(
                            "Gateway attempt {}/{} failed: {}",
                            attempt + 1,
                            self.settings.max_retries,
                            last_error
                        );
                        continue;
                    }
                    return Err(GatewayError::Unavailable {
                        attempts: attempt + 1,
                        message: format!("HTTP {}", status),
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::debug!(
                        "Gateway attempt {}/{} failed: {}",
                        attempt + 1,
                        self.settings.max_retries,
                        last_error
                    );
                }
            }
        }

        Err(GatewayError::Unavailable {
            attempts: self.settings.max_retries,
            message: last_error,
        })
    }
}

/// Pull the first JSON object out of a reply that may carry prose
/// around it. JSON mode usually makes this a no-op.
fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[async_trait]
impl CompletionGateway for GroqGateway {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Value, GatewayError> {
        let raw = self.send(&request.system_message, &request.prompt).await?;

        let failure = match extract_json(&raw) {
            Some(value) => match (request.shape.check)(&value) {
                Ok(()) => return Ok(value),
                Err(message) => message,
            },
            None => "reply is not valid JSON".to_string(),
        };

        // Exactly one repair attempt: quote the malformed reply and the
        // expected shape back to the model.
        tracing::debug!(
            "Output failed '{}' validation ({}), attempting repair",
            request.shape.name,
            failure
        );
        let repaired_prompt =
            prompt::repair_prompt(&request.prompt, &raw, request.shape.schema_reminder);
        let raw = self.send(&request.system_message, &repaired_prompt).await?;

        match extract_json(&raw) {
            Some(value) => match (request.shape.check)(&value) {
                Ok(()) => Ok(value),
                Err(message) => Err(GatewayError::MalformedOutput {
                    shape: request.shape.name.to_string(),
                    message,
                }),
            },
            None => Err(GatewayError::MalformedOutput {
                shape: request.shape.name.to_string(),
                message: "repaired reply is still not valid JSON".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let value = extract_json("{\"a\": 1}").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_json_with_prose() {
        let value = extract_json("Sure, here you go: {\"a\": 1} hope that helps").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_json_garbage() {
        assert!(extract_json("no json here").is_none());
    }
}
