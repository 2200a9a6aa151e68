use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use parley_core::config::{LlmConfig, LlmProvider};

use crate::llm::{LlmClient, ProviderError};

/// Chat-completions client. Works against OpenAI and any server exposing the same API (Ollama).
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    require_key: bool,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(
        api_key: Option<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            require_key: true,
            base_url: parley_core::config::DEFAULT_OPENAI_BASE_URL.to_string(),
            model: model.into(),
            temperature: 0.0,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let mut client = Self::new(
            config.api_key.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )?
        .with_base_url(config.effective_base_url())
        .with_temperature(config.temperature);
        client.require_key = config.provider == LlmProvider::OpenAi;
        Ok(client)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn bearer(&self) -> Result<Option<String>, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().trim().to_string())
            .filter(|key| !key.is_empty());

        match key {
            Some(key) => Ok(Some(format!("Bearer {key}"))),
            None if self.require_key => Err(ProviderError::MissingCredentials),
            None => Ok(None),
        }
    }
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let bearer = self.bearer()?;

        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        let mut request =
            self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(bearer) = bearer {
            request = request.header("Authorization", bearer);
        }

        let response =
            request.send().await.map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        debug!(event_name = "llm.completion.response", status = %status, model = %self.model);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::Transport(e.to_string()))?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
