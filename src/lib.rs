pub mod api;
pub mod config;
pub mod database;
pub mod errors;
pub mod fallback_questions;
pub mod llm_providers;
pub mod llm_service;
pub mod logging;
pub mod models;
pub mod progress;
pub mod quiz_service;
pub mod sanitizer;
pub mod validator;


pub use database::Database;
pub use errors::*;
pub use llm_providers::{LLMProvider, LLMProviderFactory, LLMProviderType, ModelClient};
pub use llm_service::LLMService;
pub use models::*;
pub use quiz_service::QuizService;
