//! Inference backends.
//!
//! The runner only needs `infer(prompt, model, system) -> text`. Two HTTP
//! implementations are provided: Ollama's native generate API and the
//! OpenAI-compatible chat completions API used by hosted models.

use crate::config::{BackendConfig, BackendKind};
use crate::error::{BenchError, InferenceError};
use crate::registry::ModelDescriptor;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// A synchronous request/response text completion capability.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn infer(
        &self,
        prompt: &str,
        model: &str,
        system: Option<&str>,
    ) -> Result<String, InferenceError>;
}

/// Build the backend selected in configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Box<dyn InferenceBackend>, BenchError> {
    Ok(match config.kind {
        BackendKind::Ollama => Box::new(OllamaBackend::new(config)?),
        BackendKind::OpenAi => Box::new(OpenAiBackend::new(config)?),
    })
}

fn build_client(config: &BackendConfig) -> Result<Client, BenchError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
        .map_err(|e| BenchError::config(format!("failed to build HTTP client: {e}")))
}

/// POST a JSON body and return the decoded JSON reply, mapping non-2xx to an error.
async fn post_json(
    client: &Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    timeout_secs: u64,
) -> Result<Value, InferenceError> {
    let mut request = client.post(url).json(body);
    if let Some(key) = bearer {
        request = request.bearer_auth(key);
    }

    let response = request
        .send()
        .await
        .map_err(|e| InferenceError::from_reqwest(e, timeout_secs))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| InferenceError::from_reqwest(e, timeout_secs))?;

    if !status.is_success() {
        return Err(InferenceError::HttpStatus {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|e| InferenceError::ResponseParse {
        message: format!("Invalid JSON: {e}"),
    })
}

/// Ollama `/api/generate` backend.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BenchError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Request body for a non-streaming generate call that keeps the model loaded.
    pub fn request_body(prompt: &str, model: &str, system: Option<&str>) -> Value {
        let mut body = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "keep_alive": -1,
        });
        if let Some(system) = system.filter(|s| !s.is_empty()) {
            body["system"] = json!(system);
        }
        body
    }

    pub fn parse_response(json: &Value) -> Result<String, InferenceError> {
        json.get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| InferenceError::ResponseParse {
                message: "missing 'response' field".into(),
            })
    }

    /// List installed models with their sizes via `/api/tags`.
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| InferenceError::from_reqwest(e, self.timeout_secs))?;
        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::HttpStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let json: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::from_reqwest(e, self.timeout_secs))?;
        Ok(Self::parse_tags(&json))
    }

    /// Convert a `/api/tags` reply into descriptors (sizes in GiB).
    pub fn parse_tags(json: &Value) -> Vec<ModelDescriptor> {
        json.get("models")
            .and_then(Value::as_array)
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| {
                        let name = m.get("name").and_then(Value::as_str)?;
                        Some(ModelDescriptor {
                            name: name.to_string(),
                            size_gb: m
                                .get("size")
                                .and_then(Value::as_u64)
                                .map(|bytes| bytes as f64 / (1024.0 * 1024.0 * 1024.0)),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn infer(
        &self,
        prompt: &str,
        model: &str,
        system: Option<&str>,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(url = %url, model = %model, "Sending Ollama generate request");
        let body = Self::request_body(prompt, model, system);
        let json = post_json(&self.client, &url, None, &body, self.timeout_secs).await?;
        Self::parse_response(&json)
    }
}

/// OpenAI-compatible `/chat/completions` backend.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl OpenAiBackend {
    /// Create a backend, reading the API key from `config.api_key_env`.
    pub fn new(config: &BackendConfig) -> Result<Self, BenchError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            BenchError::config(format!("env var '{}' not set", config.api_key_env))
        })?;
        Self::new_with_key(config, api_key)
    }

    pub fn new_with_key(config: &BackendConfig, api_key: String) -> Result<Self, BenchError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn request_body(prompt: &str, model: &str, system: Option<&str>) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = system.filter(|s| !s.is_empty()) {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));
        json!({
            "model": model,
            "messages": messages,
            "stream": false,
        })
    }

    pub fn parse_response(json: &Value) -> Result<String, InferenceError> {
        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| InferenceError::ResponseParse {
                message: "missing choices[0].message.content".into(),
            })
    }
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn infer(
        &self,
        prompt: &str,
        model: &str,
        system: Option<&str>,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %model, "Sending chat completion request");
        let body = Self::request_body(prompt, model, system);
        let json = post_json(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.timeout_secs,
        )
        .await?;
        Self::parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_request_body() {
        let body = OllamaBackend::request_body("take off", "qwen2.5_0.5b", None);
        assert_eq!(body["model"], "qwen2.5_0.5b");
        assert_eq!(body["prompt"], "take off");
        assert_eq!(body["stream"], false);
        assert_eq!(body["keep_alive"], -1);
        assert!(body.get("system").is_none());

        let body = OllamaBackend::request_body("x", "m", Some("You fly drones."));
        assert_eq!(body["system"], "You fly drones.");
    }

    #[test]
    fn test_ollama_parse_response() {
        let json = json!({ "model": "m", "response": "takeoff()", "done": true });
        assert_eq!(OllamaBackend::parse_response(&json).unwrap(), "takeoff()");
        assert!(OllamaBackend::parse_response(&json!({ "done": true })).is_err());
    }

    #[test]
    fn test_ollama_parse_tags() {
        let json = json!({
            "models": [
                { "name": "qwen2.5_0.5b_drone_q4:latest", "size": 369_098_752u64 },
                { "name": "no-size" },
                { "size": 1 }
            ]
        });
        let models = OllamaBackend::parse_tags(&json);
        assert_eq!(models.len(), 2);
        assert!((models[0].size_gb.unwrap() - 0.34375).abs() < 1e-9);
        assert_eq!(models[1].size_gb, None);
        assert!(OllamaBackend::parse_tags(&json!({})).is_empty());
    }

    #[test]
    fn test_openai_request_body() {
        let body = OpenAiBackend::request_body("land", "deepseek-chat", Some("sys"));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "land");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_openai_parse_response() {
        let json = json!({
            "choices": [{ "message": { "role": "assistant", "content": "land()" } }]
        });
        assert_eq!(OpenAiBackend::parse_response(&json).unwrap(), "land()");
        assert!(OpenAiBackend::parse_response(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_create_backend_ollama() {
        let backend = create_backend(&BackendConfig::default()).unwrap();
        assert_eq!(backend.name(), "ollama");
    }

    #[test]
    fn test_openai_new_with_key() {
        let config = BackendConfig {
            kind: BackendKind::OpenAi,
            base_url: "https://api.deepseek.com/".into(),
            ..Default::default()
        };
        let backend = OpenAiBackend::new_with_key(&config, "sk-test".into()).unwrap();
        assert_eq!(backend.name(), "openai");
        assert_eq!(backend.base_url, "https://api.deepseek.com");
    }
}
