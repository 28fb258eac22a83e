use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{FallbackPolicy, GenerationConfig, LLMConfig};
use crate::errors::GenerationError;
use crate::fallback_questions::generate_fallback_questions;
use crate::llm_providers::ModelClient;
use crate::models::{Difficulty, GeneratedQuestions, HealthStatus, Question, QuestionSource};
use crate::sanitizer;
use crate::validator::validate_questions;

// Import logging macros
use crate::log_llm_operation;

const SYSTEM_MESSAGE: &str = "You are an expert educator who writes high-quality multiple-choice quiz questions. Respond with valid JSON only: no markdown, no code fences, no text before or after the JSON array.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub fallback: FallbackPolicy,
}

impl GenerationSettings {
    pub fn from_config(llm: &LLMConfig, generation: &GenerationConfig) -> Self {
        Self {
            temperature: llm.temperature,
            fallback: generation.fallback,
        }
    }
}

/// Question generator: prompts the model, recovers its output and validates the result.
#[derive(Clone)]
pub struct LLMService {
    model: Arc<dyn ModelClient>,
    settings: GenerationSettings,
}

impl LLMService {
    pub fn new(model: Arc<dyn ModelClient>, settings: GenerationSettings) -> Self {
        Self { model, settings }
    }

    pub fn provider_name(&self) -> &'static str {
        self.model.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.settings.fallback
    }

    /// Produce up to `count` questions about `topic`. Under the `mock` policy any model
    /// failure is answered with templated questions instead of an error.
    pub async fn generate_questions(
        &self,
        topic: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<GeneratedQuestions, GenerationError> {
        match self.generate_from_model(topic, difficulty, count).await {
            Ok(questions) => Ok(GeneratedQuestions {
                questions,
                source: QuestionSource::Model,
            }),
            Err(e) => match self.settings.fallback {
                FallbackPolicy::Strict => Err(e),
                FallbackPolicy::Mock => {
                    warn!(
                        topic = %topic,
                        difficulty = %difficulty,
                        error = %e,
                        "Model generation failed, serving fallback questions"
                    );
                    let questions = generate_fallback_questions(topic, difficulty, count);
                    if questions.is_empty() {
                        return Err(e);
                    }
                    Ok(GeneratedQuestions {
                        questions,
                        source: QuestionSource::Fallback,
                    })
                }
            },
        }
    }

    async fn generate_from_model(
        &self,
        topic: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Question>, GenerationError> {
        let provider = self.model.provider_name();
        log_llm_operation!(start, "generate_questions", provider = provider, topic = topic, count = count);
        let started = Instant::now();

        let prompt = build_prompt(topic, difficulty, count);
        let response_text = self
            .model
            .complete(Some(SYSTEM_MESSAGE), &prompt, self.settings.temperature)
            .await
            .inspect_err(|e| {
                log_llm_operation!(error, "generate_questions", provider = provider, error = e);
            })?;

        debug!(
            topic = %topic,
            response_content = %response_text,
            "Raw LLM response for question generation"
        );

        let records = parse_model_output(&response_text).inspect_err(|e| {
            log_llm_operation!(error, "generate_questions", provider = provider, error = e);
        })?;

        let questions = validate_questions(records).into_questions(count)?;

        log_llm_operation!(
            success,
            "generate_questions",
            provider = provider,
            duration_ms = started.elapsed().as_millis() as u64,
            count = questions.len()
        );

        Ok(questions)
    }

    pub async fn health(&self) -> HealthStatus {
        HealthStatus {
            model_available: self.model.is_alive().await,
            provider: self.model.provider_name().to_string(),
            model: self.model.model_name().to_string(),
        }
    }
}

/// Sanitize and parse raw model text, allowing a single repair pass before giving up.
pub fn parse_model_output(raw: &str) -> Result<Vec<serde_json::Value>, GenerationError> {
    let sanitized = sanitizer::sanitize(raw);
    debug!(extracted_json = %sanitized, "Sanitized LLM response");

    match sanitizer::parse_question_array(&sanitized) {
        Ok(records) => Ok(records),
        Err(first_error) => {
            log_llm_operation!(warn, "parse_questions", format!("first parse failed ({}), attempting repair", first_error));
            let repaired = sanitizer::repair(&sanitized);
            sanitizer::parse_question_array(&repaired).map_err(|e| {
                GenerationError::GenerationFailed(format!(
                    "model response is not valid question JSON: {}",
                    e
                ))
            })
        }
    }
}

fn difficulty_instructions(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "Write introductory questions for beginners. Focus on definitions and core concepts, in plain and direct language."
        }
        Difficulty::Medium => {
            "Write intermediate questions that require understanding and applying the concepts, including short practical scenarios."
        }
        Difficulty::Hard => {
            "Write advanced questions that require analysis, synthesis and critical thinking, including tricky scenarios and edge cases."
        }
    }
}

pub fn build_prompt(topic: &str, difficulty: Difficulty, count: usize) -> String {
    format!(
        r#"Generate exactly {count} multiple choice questions about "{topic}".

Difficulty: {difficulty}
Guidance: {instructions}

Answer with a JSON array only, using this structure:
[
  {{
    "question": "A clear, specific question?",
    "options": ["First option", "Second option", "Third option", "Fourth option"],
    "correct_answer": "First option",
    "explanation": "Why this answer is correct and which concept it illustrates"
  }}
]

Rules:
- Exactly 4 distinct options per question, without letter prefixes
- correct_answer must be an exact copy of one of the options
- Keep every string on a single line
- Give a short but informative explanation for each question"#,
        count = count,
        topic = topic.trim(),
        difficulty = difficulty,
        instructions = difficulty_instructions(difficulty),
    )
}
