//! Deterministic question bank served when the model cannot be used and the deployment
//! runs with the `mock` fallback policy.

use crate::models::{Difficulty, Question};

pub const TEMPLATES_PER_DIFFICULTY: usize = 5;

fn templates(difficulty: Difficulty) -> [(&'static str, &'static str); TEMPLATES_PER_DIFFICULTY] {
    match difficulty {
        Difficulty::Easy => [
            (
                "What is the basic definition of {topic}?",
                "Knowing the definition is the first step toward understanding a subject.",
            ),
            (
                "Which of the following is a fundamental idea in {topic}?",
                "Fundamental ideas are the building blocks the rest of the topic relies on.",
            ),
            (
                "What is the main purpose of {topic}?",
                "Understanding why something exists makes its details easier to remember.",
            ),
            (
                "Which term is most closely associated with {topic}?",
                "Core vocabulary lets you read and discuss the topic with confidence.",
            ),
            (
                "Which statement best describes {topic}?",
                "A clear one-line description shows you can summarise the topic.",
            ),
        ],
        Difficulty::Medium => [
            (
                "How would you apply {topic} to a real-world problem?",
                "Applying a concept shows understanding beyond memorisation.",
            ),
            (
                "How does {topic} relate to its common applications?",
                "Connecting theory to practice deepens comprehension.",
            ),
            (
                "Which approach works best when dealing with {topic}?",
                "Choosing between approaches requires knowing their strengths.",
            ),
            (
                "In the context of {topic}, which strategy would you pick first?",
                "Strategic choices reflect an intermediate grasp of the subject.",
            ),
            (
                "What are the practical consequences of {topic}?",
                "Reasoning about consequences links concepts to outcomes.",
            ),
        ],
        Difficulty::Hard => [
            (
                "Analyse the implications of {topic} in an advanced scenario.",
                "Advanced analysis weighs several interacting factors at once.",
            ),
            (
                "How would you critically evaluate competing approaches to {topic}?",
                "Critical evaluation means judging trade-offs, not just listing them.",
            ),
            (
                "What are the main limitations and advantages of {topic}?",
                "Expert understanding includes knowing where an idea stops working.",
            ),
            (
                "How does {topic} integrate with other advanced subjects?",
                "Synthesis across subjects is a sign of deep understanding.",
            ),
            (
                "What is the best resolution when {topic} conflicts with other priorities?",
                "Resolving conflicts requires system-level reasoning.",
            ),
        ],
    }
}

fn option_texts(topic: &str) -> [String; 4] {
    [
        format!("A correct understanding of {}", topic),
        format!("A common misconception about {}", topic),
        format!("A partially correct reading of {}", topic),
        format!("An unrelated approach to {}", topic),
    ]
}

/// Build `min(count, 5)` questions for `topic`. The correct option sits at index `i % 4`
/// so that answers are not always in the same slot.
pub fn generate_fallback_questions(topic: &str, difficulty: Difficulty, count: usize) -> Vec<Question> {
    let topic = topic.trim();

    templates(difficulty)
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, (template, explanation))| {
            let mut options = option_texts(topic);
            let correct_answer = options[0].clone();
            let slot = i % options.len();
            options.swap(0, slot);

            Question {
                question: template.replace("{topic}", topic),
                options: options.to_vec(),
                correct_answer,
                explanation: explanation.to_string(),
            }
        })
        .collect()
}
