use serde_json::Value;
use std::collections::HashSet;

use crate::errors::GenerationError;
use crate::models::Question;

// Import logging macros
use crate::log_validation;

pub const OPTION_COUNT: usize = 4;

/// Why a single candidate record was left out of the batch. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationDropped {
    #[error("record {index} is not a JSON object")]
    NotAnObject { index: usize },

    #[error("record {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("record {index} has {found} options, expected exactly 4")]
    WrongOptionCount { index: usize, found: usize },

    #[error("record {index} has empty or repeated options")]
    IndistinctOptions { index: usize },
}

/// Outcome of validating one parsed batch
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub questions: Vec<Question>,
    pub dropped: Vec<ValidationDropped>,
    pub repaired: usize,
}

impl ValidationReport {
    /// Keep at most `count` questions, failing when none are left
    pub fn into_questions(self, count: usize) -> Result<Vec<Question>, GenerationError> {
        let mut questions = self.questions;
        questions.truncate(count);

        if questions.is_empty() {
            return Err(GenerationError::GenerationFailed(format!(
                "no usable questions in model response ({} records dropped)",
                self.dropped.len()
            )));
        }
        Ok(questions)
    }
}

/// Check every candidate record, dropping malformed ones and repairing a correct answer
/// that does not match any option.
pub fn validate_questions(records: Vec<Value>) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (index, record) in records.into_iter().enumerate() {
        match validate_record(index, record) {
            Ok((question, was_repaired)) => {
                if was_repaired {
                    report.repaired += 1;
                }
                report.questions.push(question);
            }
            Err(dropped) => {
                log_validation!(failure, "question_validator", error = dropped);
                report.dropped.push(dropped);
            }
        }
    }

    log_validation!(
        success,
        "question_validator",
        format!(
            "{} kept, {} dropped, {} correct answers repaired",
            report.questions.len(),
            report.dropped.len(),
            report.repaired
        )
    );

    report
}

fn validate_record(index: usize, record: Value) -> Result<(Question, bool), ValidationDropped> {
    let Value::Object(fields) = record else {
        return Err(ValidationDropped::NotAnObject { index });
    };

    let question = fields
        .get("question")
        .or_else(|| fields.get("text"))
        .and_then(coerce_text)
        .filter(|text| !text.is_empty())
        .ok_or(ValidationDropped::MissingField { index, field: "question" })?;

    let options = match fields.get("options") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => {
            return Err(ValidationDropped::MissingField { index, field: "options" });
        }
        Some(_) => return Err(ValidationDropped::WrongOptionCount { index, found: 1 }),
    };

    let correct_answer = fields
        .get("correct_answer")
        .and_then(coerce_text)
        .ok_or(ValidationDropped::MissingField { index, field: "correct_answer" })?;

    let explanation = fields
        .get("explanation")
        .and_then(coerce_text)
        .ok_or(ValidationDropped::MissingField { index, field: "explanation" })?;

    if options.len() != OPTION_COUNT {
        return Err(ValidationDropped::WrongOptionCount {
            index,
            found: options.len(),
        });
    }

    let options: Vec<String> = options
        .iter()
        .map(|option| coerce_text(option).unwrap_or_default())
        .collect();

    let distinct: HashSet<&str> = options.iter().map(String::as_str).collect();
    if distinct.len() != OPTION_COUNT || distinct.contains("") {
        return Err(ValidationDropped::IndistinctOptions { index });
    }

    let (correct_answer, was_repaired) = if options.contains(&correct_answer) {
        (correct_answer, false)
    } else {
        tracing::warn!(
            component = "question_validator",
            index,
            correct_answer = %correct_answer,
            "Correct answer not among options, using first option"
        );
        (options[0].clone(), true)
    };

    Ok((
        Question {
            question,
            options,
            correct_answer,
            explanation,
        },
        was_repaired,
    ))
}

/// Trimmed text form of a scalar. `null`, arrays and objects count as missing.
fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
