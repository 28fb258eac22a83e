use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::LLMConfig;
use crate::errors::GenerationError;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Text-generation backend the question generator talks to.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one prompt and return the raw completion text
    async fn complete(
        &self,
        system_message: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, GenerationError>;

    /// Whether the backend currently answers at all
    async fn is_alive(&self) -> bool;

    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

/// Common message structure for chat requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

/// Enum-based LLM provider implementation
#[derive(Debug, Clone)]
pub enum LLMProvider {
    OpenAI(OpenAIProvider),
    Gemini(GeminiProvider),
    Ollama(OllamaProvider),
}

#[async_trait]
impl ModelClient for LLMProvider {
    async fn complete(
        &self,
        system_message: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        match self {
            LLMProvider::OpenAI(provider) => provider.make_request(system_message, prompt, temperature).await,
            LLMProvider::Gemini(provider) => provider.make_request(system_message, prompt, temperature).await,
            LLMProvider::Ollama(provider) => provider.make_request(system_message, prompt, temperature).await,
        }
    }

    async fn is_alive(&self) -> bool {
        match self {
            LLMProvider::OpenAI(provider) => provider.is_alive().await,
            LLMProvider::Gemini(provider) => provider.is_alive().await,
            LLMProvider::Ollama(provider) => provider.is_alive().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI(_) => "OpenAI",
            LLMProvider::Gemini(_) => "Gemini",
            LLMProvider::Ollama(_) => "Ollama",
        }
    }

    fn model_name(&self) -> &str {
        match self {
            LLMProvider::OpenAI(provider) => &provider.model,
            LLMProvider::Gemini(provider) => &provider.model,
            LLMProvider::Ollama(provider) => &provider.model,
        }
    }
}

/// Transport-level failures all mean the backend is not usable right now.
fn transport_error(provider: &str, err: reqwest::Error) -> GenerationError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    error!(provider = provider, error = %err, "LLM request {}", kind);
    GenerationError::ServiceUnavailable(format!("{} {}: {}", provider, kind, err))
}

/// Turn a non-success status into `ServiceUnavailable`, passing successful responses through
async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, GenerationError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!(
        provider = provider,
        status = %status,
        error = %error_text,
        "LLM API request failed"
    );
    Err(GenerationError::ServiceUnavailable(format!(
        "{} API returned {}: {}",
        provider, status, error_text
    )))
}

fn undecodable(provider: &str, err: reqwest::Error) -> GenerationError {
    GenerationError::GenerationFailed(format!("{} response could not be decoded: {}", provider, err))
}

/// OpenAI-compatible chat completions provider
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<LLMMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIChoice {
    message: LLMMessage,
}

impl OpenAIProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }

    pub async fn make_request(
        &self,
        system_message: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            messages.push(LLMMessage {
                role: "system".to_string(),
                content: sys_msg.to_string(),
            });
        }

        messages.push(LLMMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens: 2000,
        };

        info!(
            provider = "OpenAI",
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| transport_error("OpenAI", e))?;

        let response = check_status("OpenAI", response).await?;
        let openai_response: OpenAIResponse =
            response.json().await.map_err(|e| undecodable("OpenAI", e))?;

        let response_content = openai_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::GenerationFailed("No choices in OpenAI response".to_string()))?;

        info!(
            provider = "OpenAI",
            response_length = response_content.len(),
            "Successfully received LLM response"
        );

        Ok(response_content)
    }

    pub async fn is_alive(&self) -> bool {
        self.client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }
}

/// Gemini provider implementation
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: i32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: model.unwrap_or_else(|| "gemini-2.0-flash-exp".to_string()),
        }
    }

    pub async fn make_request(
        &self,
        system_message: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        let full_prompt = match system_message {
            Some(sys_msg) => format!("{}\n\n{}", sys_msg, prompt),
            None => prompt.to_string(),
        };

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: full_prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature,
                top_k: 40,
                top_p: 0.9,
                max_output_tokens: 2048,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        info!(
            provider = "Gemini",
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| transport_error("Gemini", e))?;

        let response = check_status("Gemini", response).await?;
        let gemini_response: GeminiResponse =
            response.json().await.map_err(|e| undecodable("Gemini", e))?;

        let response_content = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| {
                GenerationError::GenerationFailed("No candidate text in Gemini response".to_string())
            })?;

        info!(
            provider = "Gemini",
            response_length = response_content.len(),
            "Successfully received LLM response"
        );

        Ok(response_content)
    }

    pub async fn is_alive(&self) -> bool {
        self.client
            .get(format!("{}/models?key={}", self.base_url, self.api_key))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }
}

/// Local Ollama server provider
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

impl OllamaProvider {
    pub fn new(client: Client, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.unwrap_or_else(|| "llama3.2:3b".to_string()),
        }
    }

    pub async fn make_request(
        &self,
        system_message: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        let full_prompt = match system_message {
            Some(sys_msg) => format!("{}\n\n{}", sys_msg, prompt),
            None => prompt.to_string(),
        };

        let request_body = OllamaRequest {
            model: self.model.clone(),
            prompt: full_prompt,
            stream: false,
            options: OllamaOptions {
                temperature,
                top_p: 0.9,
                num_predict: 2000,
            },
        };

        info!(
            provider = "Ollama",
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| transport_error("Ollama", e))?;

        let response = check_status("Ollama", response).await?;
        let ollama_response: OllamaResponse =
            response.json().await.map_err(|e| undecodable("Ollama", e))?;

        if ollama_response.response.trim().is_empty() {
            return Err(GenerationError::GenerationFailed(
                "Empty response from Ollama".to_string(),
            ));
        }

        info!(
            provider = "Ollama",
            response_length = ollama_response.response.len(),
            "Successfully received LLM response"
        );

        Ok(ollama_response.response)
    }

    pub async fn is_alive(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(provider = "Ollama", error = %e, "Health check failed");
                false
            }
        }
    }
}

/// Factory for creating LLM providers based on provider type
pub struct LLMProviderFactory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProviderType {
    OpenAI,
    Gemini,
    Ollama,
}

impl LLMProviderType {
    /// Map a user-supplied provider name; unknown names fall back to OpenAI
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "gemini" | "google" => LLMProviderType::Gemini,
            "ollama" | "local" => LLMProviderType::Ollama,
            "openai" | "chatgpt" | "gpt" => LLMProviderType::OpenAI,
            _ => {
                info!("Unknown LLM provider '{}', defaulting to OpenAI", name);
                LLMProviderType::OpenAI
            }
        }
    }
}

impl LLMProviderFactory {
    /// Create a provider sharing one HTTP client that enforces the configured timeout
    pub fn create_provider(config: &LLMConfig) -> Result<LLMProvider> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let provider = match config.provider {
            LLMProviderType::OpenAI => LLMProvider::OpenAI(OpenAIProvider::new(
                client,
                config.api_key.clone(),
                config.base_url.clone(),
                config.model.clone(),
            )),
            LLMProviderType::Gemini => LLMProvider::Gemini(GeminiProvider::new(
                client,
                config.api_key.clone(),
                config.base_url.clone(),
                config.model.clone(),
            )),
            LLMProviderType::Ollama => LLMProvider::Ollama(OllamaProvider::new(
                client,
                config.base_url.clone(),
                config.model.clone(),
            )),
        };

        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(provider: LLMProviderType, base_url: Option<&str>) -> LLMConfig {
        LLMConfig {
            api_key: "test-key".to_string(),
            base_url: base_url.map(str::to_string),
            provider,
            model: None,
            temperature: 0.7,
            timeout_secs: 2,
        }
    }

    #[test]
    fn test_provider_name_parsing() {
        let test_cases = vec![
            ("openai", LLMProviderType::OpenAI),
            ("ChatGPT", LLMProviderType::OpenAI),
            ("gpt", LLMProviderType::OpenAI),
            ("gemini", LLMProviderType::Gemini),
            ("Google", LLMProviderType::Gemini),
            ("ollama", LLMProviderType::Ollama),
            ("LOCAL", LLMProviderType::Ollama),
            ("claude", LLMProviderType::OpenAI),
            ("", LLMProviderType::OpenAI),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                LLMProviderType::from_name(input),
                expected,
                "Input '{}' should map to {:?}",
                input,
                expected
            );
        }
    }

    #[test]
    fn test_factory_defaults() {
        let openai = LLMProviderFactory::create_provider(&config_for(LLMProviderType::OpenAI, None)).unwrap();
        assert_eq!(openai.provider_name(), "OpenAI");
        assert_eq!(openai.model_name(), "gpt-4o-mini");

        let gemini = LLMProviderFactory::create_provider(&config_for(LLMProviderType::Gemini, None)).unwrap();
        assert_eq!(gemini.provider_name(), "Gemini");
        assert_eq!(gemini.model_name(), "gemini-2.0-flash-exp");

        let ollama = LLMProviderFactory::create_provider(&config_for(LLMProviderType::Ollama, None)).unwrap();
        assert_eq!(ollama.provider_name(), "Ollama");
        assert_eq!(ollama.model_name(), "llama3.2:3b");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_service_unavailable() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let provider = LLMProviderFactory::create_provider(&config_for(
            LLMProviderType::Ollama,
            Some("http://127.0.0.1:9"),
        ))
        .unwrap();

        let result = provider.complete(Some("system"), "prompt", 0.5).await;
        assert!(matches!(result, Err(GenerationError::ServiceUnavailable(_))));
        assert!(!provider.is_alive().await);
    }
}
