use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;

use super::{StructuringError, StructuringService, records_from_completion};
use crate::{Config, ExtractedText, StructuredRecord};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no API key configured (set DOCSHEET_API_KEY, pass --api-key, or add it to the config file)")]
    MissingApiKey,
    #[error("no canvas id configured (set DOCSHEET_CANVAS_ID, pass --canvas-id, or add it to the config file)")]
    MissingCanvasId,
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Client for the canvas completions endpoint.
///
/// One `POST /v2/chat/completions` per document. The canvas id and the
/// credential are fixed at construction; nothing about the request is
/// derived from document content except the text variable.
pub struct CanvasClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    canvas_id: String,
    records_field: String,
    text_variable: String,
    timeout: Duration,
}

impl std::fmt::Debug for CanvasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"***")
            .field("canvas_id", &self.canvas_id)
            .field("records_field", &self.records_field)
            .field("text_variable", &self.text_variable)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CanvasClient {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let canvas_id = config
            .canvas_id
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or(ConfigError::MissingCanvasId)?;

        let base = config.base_url.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(config.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.structuring_concurrency.max(1))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Ok(Self {
            client,
            endpoint: format!("{}/v2/chat/completions", base),
            api_key,
            canvas_id,
            records_field: config.records_field.clone(),
            text_variable: config.text_variable.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Request body for one document.
    pub fn request_body(&self, text: &str) -> Value {
        let mut variables = serde_json::Map::new();
        variables.insert(self.text_variable.clone(), Value::String(text.to_string()));
        json!({
            "canvas_id": self.canvas_id,
            "variables": variables,
            "stream": false,
        })
    }
}

impl StructuringService for CanvasClient {
    fn name(&self) -> &str {
        "Canvas"
    }

    fn structure<'a>(
        &'a self,
        document: &'a ExtractedText,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StructuredRecord>, StructuringError>> + Send + 'a>>
    {
        Box::pin(async move {
            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&self.request_body(&document.text))
                .send()
                .await
                .map_err(|e| StructuringError::Service {
                    status: e.status().map(|s| s.as_u16()),
                    message: if e.is_timeout() {
                        format!("request timed out after {}s", self.timeout.as_secs())
                    } else {
                        e.to_string()
                    },
                })?;

            let status = resp.status();
            if status.as_u16() == 429 {
                return Err(StructuringError::Service {
                    status: Some(429),
                    message: "Rate limited (429)".into(),
                });
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                return Err(StructuringError::Service {
                    status: Some(status.as_u16()),
                    message: if snippet.is_empty() {
                        format!("HTTP {}", status)
                    } else {
                        format!("HTTP {}: {}", status, snippet)
                    },
                });
            }

            let payload: Value = resp.json().await.map_err(|e| {
                StructuringError::schema("$", format!("response body is not JSON: {}", e))
            })?;

            let records = records_from_completion(&payload, &self.records_field)?;
            tracing::debug!(
                document = %document.handle.path.display(),
                records = records.len(),
                "canvas completion decoded"
            );
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        Config {
            api_key: Some("key".into()),
            canvas_id: Some("canvas-123".into()),
            base_url: "https://api.example.test/".into(),
            ..Config::default()
        }
    }

    #[test]
    fn requires_api_key() {
        let config = Config {
            api_key: None,
            ..configured()
        };
        assert_eq!(
            CanvasClient::from_config(&config).unwrap_err(),
            ConfigError::MissingApiKey
        );
    }

    #[test]
    fn blank_canvas_id_is_missing() {
        let config = Config {
            canvas_id: Some("  ".into()),
            ..configured()
        };
        assert_eq!(
            CanvasClient::from_config(&config).unwrap_err(),
            ConfigError::MissingCanvasId
        );
    }

    #[test]
    fn rejects_non_http_base_url() {
        let config = Config {
            base_url: "ftp://example".into(),
            ..configured()
        };
        assert!(matches!(
            CanvasClient::from_config(&config),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = CanvasClient::from_config(&configured()).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://api.example.test/v2/chat/completions"
        );
    }

    #[test]
    fn body_carries_canvas_and_text_variable() {
        let client = CanvasClient::from_config(&configured()).unwrap();
        let body = client.request_body("page text");
        assert_eq!(body["canvas_id"], "canvas-123");
        assert_eq!(body["variables"]["arquivo"], "page text");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn debug_hides_key() {
        let client = CanvasClient::from_config(&configured()).unwrap();
        let dbg = format!("{:?}", client);
        assert!(!dbg.contains("\"key\""));
        assert!(dbg.contains("***"));
    }
}
