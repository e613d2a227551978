// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Structured essay feedback from a language model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

use crate::llm::{GenerationParams, TextGenerator};
use crate::{FeedbackError, Result};

/// Grade reported when the model reply could not be parsed
pub const UNPARSED_GRADE: &str = "N/A";

/// Essay used by `feedback --sample`
pub const SAMPLE_ESSAY: &str = "Technology has become an essential part of our lives. \
While it helps in many ways, it also causes people to be distracted, spend too much time \
on their phones, and have less real communication. Balancing the use of technology is important.";

/// Feedback on one essay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Predicted letter grade (A-F), or `N/A`
    pub grade: String,
    /// Comments on clarity, structure, grammar and logic
    pub feedback: String,
    /// Suggested next steps
    pub action_plan: String,
}

impl Feedback {
    /// Fallback used when the reply is not the expected JSON
    pub fn unparsed(raw: &str) -> Self {
        Self {
            grade: UNPARSED_GRADE.to_string(),
            feedback: raw.to_string(),
            action_plan: String::new(),
        }
    }

    /// False for the fallback, or for a model that literally graded `N/A`
    pub fn is_parsed(&self) -> bool {
        self.grade != UNPARSED_GRADE
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grade: {}", self.grade)?;
        writeln!(f)?;
        writeln!(f, "Feedback:")?;
        writeln!(f, "{}", self.feedback)?;
        if !self.action_plan.is_empty() {
            writeln!(f)?;
            writeln!(f, "Action plan:")?;
            writeln!(f, "{}", self.action_plan)?;
        }
        Ok(())
    }
}

/// Build the tutor prompt around an essay
pub fn build_prompt(essay: &str) -> String {
    format!(
        r#"
You are an AI writing tutor. A student submitted the essay below.

Tasks:
1. Provide constructive feedback (clarity, structure, grammar, logic).
2. Predict a letter grade (A-F).
3. Suggest a concise, personalised next-step plan for improvement.

Essay:
"""{}"""

Respond **only** with valid JSON:
{{
"grade": "<letter>",
"feedback": "<detailed feedback>",
"action_plan": "<next steps>"
}}
"#,
        essay.trim()
    )
}

/// Parse a model reply, falling back to the raw text
///
/// Any JSON object carrying `grade`, `feedback` and `action_plan` is
/// accepted. Non-string values are flattened: arrays become one item per
/// line, everything else its JSON text. Replies that are not valid JSON, or
/// not such an object, become grade `N/A` with the trimmed reply as the
/// feedback and an empty action plan.
pub fn parse_feedback(raw: &str) -> Feedback {
    let text = raw.trim();
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Model reply is not valid JSON: {}", e);
            return Feedback::unparsed(text);
        }
    };

    let fields = value.as_object().and_then(|obj| {
        Some((
            obj.get("grade")?,
            obj.get("feedback")?,
            obj.get("action_plan")?,
        ))
    });

    match fields {
        Some((grade, feedback, action_plan)) => Feedback {
            grade: flatten(grade),
            feedback: flatten(feedback),
            action_plan: flatten(action_plan),
        },
        None => {
            debug!("Model reply JSON lacks grade/feedback/action_plan");
            Feedback::unparsed(text)
        }
    }
}

fn flatten(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(flatten).collect::<Vec<_>>().join("\n"),
        other => other.to_string(),
    }
}

/// Turns essays into feedback with one model call each
pub struct FeedbackAgent {
    generator: Box<dyn TextGenerator>,
    params: GenerationParams,
}

impl FeedbackAgent {
    pub fn new(generator: Box<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self { generator, params }
    }

    pub fn backend(&self) -> &'static str {
        self.generator.name()
    }

    /// Generate feedback for one essay
    pub async fn generate_feedback(&self, essay: &str) -> Result<Feedback> {
        if essay.trim().is_empty() {
            return Err(FeedbackError::EmptyEssay);
        }

        let prompt = build_prompt(essay);
        info!(
            "Requesting feedback from {} ({} chars of essay)",
            self.generator.name(),
            essay.trim().len()
        );

        let raw = self.generator.generate(&prompt, &self.params).await?;
        let feedback = parse_feedback(&raw);

        if feedback == Feedback::unparsed(raw.trim()) {
            warn!("Model reply was not valid JSON, returning raw text");
        }

        Ok(feedback)
    }
}
