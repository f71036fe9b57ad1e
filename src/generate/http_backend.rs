//! OpenAI-compatible chat completions backend

use super::Generator;
use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generator calling `POST {url}/v1/chat/completions`
pub struct HttpGenerator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl HttpGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Self::with_api_key(config, config.api_key())
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(&config.url)?
            .join("/v1/chat/completions")
            .map_err(|e| Error::Config(format!("Invalid generation URL: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        debug!("Requesting completion from {}", self.model);
        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Generation(e.to_string()))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("Invalid completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Generation("Completion had no content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: String) -> GenerationConfig {
        GenerationConfig {
            url,
            model: "test-chat".to_string(),
            ..GenerationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_sends_system_and_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "test-chat",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello.\nCONFIDENCE_SCORE: 90"}}]
            })))
            .mount(&server)
            .await;

        let generator = HttpGenerator::with_api_key(&config(server.uri()), None).unwrap();
        let text = generator.generate("be brief", "hi").await.unwrap();

        assert_eq!(text, "Hello.\nCONFIDENCE_SCORE: 90");
    }

    #[tokio::test]
    async fn test_generate_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let generator = HttpGenerator::with_api_key(&config(server.uri()), None).unwrap();
        assert!(matches!(
            generator.generate("s", "u").await,
            Err(Error::Generation(_))
        ));
    }
}
