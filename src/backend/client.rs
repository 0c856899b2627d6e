//! Ollama-compatible inference client.
//!
//! Talks to the `/api/generate` endpoint of a local model runtime with
//! streaming disabled, so every call returns the full completion at once.

use crate::config::BackendConfig;
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anything that can turn a prompt into text for a named model.
///
/// The pipeline only ever has one call outstanding, but the trait is
/// `Send + Sync` so implementations can be shared with spawned tasks.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run `model` on `prompt`, optionally with a system prompt.
    ///
    /// An `Err` means the backend failed. An empty `Ok` string is a valid
    /// (if useless) completion and must not be treated as a failure.
    async fn generate(&self, model: &str, prompt: &str, system: Option<&str>) -> Result<String>;
}

#[async_trait]
impl<'a, T: Generator + ?Sized> Generator for &'a T {
    async fn generate(&self, model: &str, prompt: &str, system: Option<&str>) -> Result<String> {
        (**self).generate(model, prompt, system).await
    }
}

/// Sampling options forwarded to the backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

fn options_unset(options: &&GenerateOptions) -> bool {
    options.temperature.is_none() && options.top_p.is_none()
}

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "options_unset")]
    options: &'a GenerateOptions,
}

/// Response from `/api/generate` with streaming disabled.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
}

/// Error body returned by the backend.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

/// Ollama-compatible inference client.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    api_base: String,
    options: GenerateOptions,
}

impl OllamaClient {
    /// Create a new client with the given backend configuration.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            options: GenerateOptions {
                temperature: config.temperature,
                top_p: config.top_p,
            },
        })
    }

    /// Same connection, different sampling options.
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/api/generate", base)
    }

    /// Test connectivity by asking `model` for a one-word reply.
    pub async fn test_connection(&self, model: &str) -> Result<String> {
        let response = self
            .generate(model, "Say 'hello' and nothing else.", None)
            .await?;

        if response.to_lowercase().contains("hello") {
            Ok(response)
        } else {
            Err(EvalError::Backend(format!(
                "Unexpected response: {}",
                response
            )))
        }
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, model: &str, prompt: &str, system: Option<&str>) -> Result<String> {
        let request = GenerateRequest {
            model,
            prompt,
            system: system.filter(|s| !s.is_empty()),
            stream: false,
            options: &self.options,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(EvalError::Backend(format!(
                    "API error ({}): {}",
                    status, api_error.error
                )));
            }
            return Err(EvalError::Backend(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        let completion: GenerateResponse = serde_json::from_str(&body)?;
        Ok(completion.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_construction() {
        let config = BackendConfig {
            api_base: "http://localhost:11434/".to_string(),
            ..Default::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/api/generate");

        let config2 = BackendConfig {
            api_base: "http://gpu-box:11434".to_string(),
            ..Default::default()
        };
        let client2 = OllamaClient::new(&config2).unwrap();
        assert_eq!(client2.endpoint(), "http://gpu-box:11434/api/generate");
    }

    #[test]
    fn test_request_serialization() {
        let options = GenerateOptions::default();
        let request = GenerateRequest {
            model: "qwen2.5:14b",
            prompt: "2 + 2?",
            system: None,
            stream: false,
            options: &options,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "qwen2.5:14b");
        assert_eq!(json["stream"], false);
        assert!(json.get("system").is_none());
        assert!(json.get("options").is_none());

        let options = GenerateOptions {
            temperature: Some(0.1),
            top_p: None,
        };
        let request = GenerateRequest {
            model: "gemma3:1b",
            prompt: "rank",
            system: Some("You are a judge."),
            stream: false,
            options: &options,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system"], "You are a judge.");
        assert!(json["options"].get("top_p").is_none());
        assert!(json["options"]["temperature"].is_number());
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"model":"gemma3:1b","response":"4","done":true,"total_duration":12345}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.response, "4");

        let err = r#"{"error":"model 'nope' not found"}"#;
        let parsed: ApiError = serde_json::from_str(err).unwrap();
        assert!(parsed.error.contains("not found"));
    }
}
