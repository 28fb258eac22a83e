use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

use crate::llm_providers::LLMProviderType;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub generation: GenerationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Large Language Model service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub provider: LLMProviderType,
    pub model: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// What to hand back when the model cannot produce questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Surface `ServiceUnavailable` / `GenerationFailed` to the caller
    Strict,
    /// Serve deterministic templated questions instead
    Mock,
}

impl FromStr for FallbackPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" | "fail" | "error" => Ok(FallbackPolicy::Strict),
            "mock" | "fallback" | "lenient" => Ok(FallbackPolicy::Mock),
            other => Err(anyhow!(
                "Invalid GENERATION_FALLBACK value: '{}'. Expected 'strict' or 'mock'",
                other
            )),
        }
    }
}

/// Question generation policy
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    pub fallback: FallbackPolicy,
    pub max_questions: usize,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            llm: LLMConfig::from_env()?,
            generation: GenerationConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    pub fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            llm_temperature = self.llm.temperature,
            llm_timeout_secs = self.llm.timeout_secs,
            generation_fallback = ?self.generation.fallback,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!(
                "LLM_TEMPERATURE must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("LLM_TIMEOUT_SECS must be greater than 0"));
        }

        if self.generation.max_questions == 0 {
            return Err(anyhow!("MAX_QUESTIONS must be greater than 0"));
        }

        if self.llm.provider != LLMProviderType::Ollama
            && (self.llm.api_key.is_empty() || self.llm.api_key == "your-api-key")
        {
            warn!("LLM API key appears to be placeholder or empty - question generation may not work");
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:study_quiz.db".to_string());

        Ok(DatabaseConfig { url })
    }
}

impl LLMConfig {
    fn from_env() -> Result<Self> {
        let api_key = env::var("LLM_API_KEY").unwrap_or_else(|_| "your-api-key".to_string());

        let base_url = env::var("LLM_BASE_URL").ok();

        let provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = LLMProviderType::from_name(&provider_str);

        let model = env::var("LLM_MODEL").ok();

        let temperature = parse_env("LLM_TEMPERATURE", 0.7_f32)?;
        let timeout_secs = parse_env("LLM_TIMEOUT_SECS", 120_u64)?;

        Ok(LLMConfig {
            api_key,
            base_url,
            provider,
            model,
            temperature,
            timeout_secs,
        })
    }
}

impl GenerationConfig {
    fn from_env() -> Result<Self> {
        let fallback = match env::var("GENERATION_FALLBACK") {
            Ok(value) => value.parse::<FallbackPolicy>()?,
            Err(_) => {
                info!("GENERATION_FALLBACK not set, using strict failure policy");
                FallbackPolicy::Strict
            }
        };

        let max_questions = parse_env("MAX_QUESTIONS", 20_usize)?;

        Ok(GenerationConfig {
            fallback,
            max_questions,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "8000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    /// Loaded on its own first so the subscriber exists before the rest of the config is read
    pub fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,study_quiz=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

/// Read and parse a variable, falling back to `default` only when it is unset
fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
            },
            llm: LLMConfig {
                api_key: "sk-valid-key".to_string(),
                base_url: None,
                provider: LLMProviderType::OpenAI,
                model: None,
                temperature: 0.7,
                timeout_secs: 120,
            },
            generation: GenerationConfig {
                fallback: FallbackPolicy::Strict,
                max_questions: 20,
            },
            server: ServerConfig {
                port: 8000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
        }
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:study_quiz.db"), "sqli***z.db");
        assert_eq!(mask_sensitive_data("sk-1234567890abcdef"), "sk-1***cdef");
    }

    #[test]
    fn test_database_config_defaults() {
        unsafe {
            env::remove_var("DATABASE_URL");
        }

        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.url, "sqlite:study_quiz.db");
    }

    #[test]
    fn test_fallback_policy_parsing() {
        assert_eq!("strict".parse::<FallbackPolicy>().unwrap(), FallbackPolicy::Strict);
        assert_eq!("Mock".parse::<FallbackPolicy>().unwrap(), FallbackPolicy::Mock);
        assert_eq!(" lenient ".parse::<FallbackPolicy>().unwrap(), FallbackPolicy::Mock);
        assert!("sometimes".parse::<FallbackPolicy>().is_err());
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        unsafe {
            env::set_var("STUDY_QUIZ_TEST_NUMBER", "twelve");
        }
        assert!(parse_env("STUDY_QUIZ_TEST_NUMBER", 1_u64).is_err());

        unsafe {
            env::set_var("STUDY_QUIZ_TEST_NUMBER", " 42 ");
        }
        assert_eq!(parse_env("STUDY_QUIZ_TEST_NUMBER", 1_u64).unwrap(), 42);

        unsafe {
            env::remove_var("STUDY_QUIZ_TEST_NUMBER");
        }
        assert_eq!(parse_env("STUDY_QUIZ_TEST_NUMBER", 1_u64).unwrap(), 1);
    }

    #[test]
    fn test_config_validation() {
        let config = valid_config();
        assert!(config.validate().is_ok());

        let mut invalid_config = config.clone();
        invalid_config.server.port = 0;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config.clone();
        invalid_config.llm.temperature = 3.5;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config.clone();
        invalid_config.llm.timeout_secs = 0;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config.clone();
        invalid_config.database.url = "postgres://localhost/quiz".to_string();
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config;
        invalid_config.generation.max_questions = 0;
        assert!(invalid_config.validate().is_err());
    }
}
