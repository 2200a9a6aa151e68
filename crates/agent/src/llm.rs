use async_trait::async_trait;
use thiserror::Error;

/// Failures that leave the resolver without any reply text to interpret.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("language model credentials are not configured")]
    MissingCredentials,
    #[error("language model request failed: {0}")]
    Transport(String),
    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model returned no content")]
    EmptyResponse,
    #[error("language model client could not be built: {0}")]
    Setup(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends one system instruction plus one user utterance and asks for a JSON object back.
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError>;

    fn model(&self) -> &str;
}
