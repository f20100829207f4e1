use serde::Deserialize;
use serde_json::json;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("missing required env var `{0}`")]
    MissingEnvVar(String),
    #[error("fallback generator request failed: {0}")]
    Request(String),
    #[error("fallback generator responded with an unusable payload: {0}")]
    Response(String),
    #[error("fallback generator returned no completion text")]
    EmptyCompletion,
}

/// Hosted free-text answer service, used only when no structured intent
/// matches. Callers fail open: any error becomes a fixed apology reply.
pub trait FallbackGenerator: Send + Sync {
    fn generate(&self, system_prompt: &str, user_text: &str) -> Result<String, FallbackError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn from_env(api_base: &str, model: &str) -> Result<Self, FallbackError> {
        let api_key = std::env::var(OPENAI_API_KEY_ENV)
            .map_err(|_| FallbackError::MissingEnvVar(OPENAI_API_KEY_ENV.to_string()))?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }
}

impl FallbackGenerator for OpenAiGenerator {
    fn generate(&self, system_prompt: &str, user_text: &str) -> Result<String, FallbackError> {
        let url = format!("{}/v1/chat/completions", self.api_base);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_text },
            ],
        });

        let response = ureq::post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(|e| FallbackError::Request(e.to_string()))?;
        let completion: ChatCompletionResponse = response
            .into_json()
            .map_err(|e| FallbackError::Response(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(FallbackError::EmptyCompletion)
    }
}
