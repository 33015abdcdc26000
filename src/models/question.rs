// src/models/question.rs

use serde::{Deserialize, Serialize};

/// A question from the question bank.
///
/// Carries the answer key (`correct_option`, `explanation`), so it must only
/// leave the server through `services::sanitizer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,

    /// The text content of the question.
    pub text: String,

    /// Ordered list of options. Answers are indices into this list.
    pub options: Vec<String>,

    /// Index of the correct entry in `options`.
    pub correct_option: u32,

    /// Explanation of the correct answer, shown on the result page.
    pub explanation: String,

    pub topic_id: i64,

    /// 1 (easy) to 3 (hard).
    pub difficulty_level: i32,

    /// Optional diagram reference (URL or inline SVG).
    pub diagram: Option<String>,
}

/// DTO for sending a question to a client whose attempt is still running.
/// Excludes `correct_option` and `explanation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
    pub topic_id: i64,
    pub difficulty_level: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,
}

/// Question list attached to an attempt view.
///
/// Which variant is used depends only on the attempt state; see
/// `sanitizer::questions_for_attempt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuestionSet {
    Sanitized(Vec<PublicQuestion>),
    Full(Vec<Question>),
}

impl QuestionSet {
    pub fn len(&self) -> usize {
        match self {
            QuestionSet::Sanitized(qs) => qs.len(),
            QuestionSet::Full(qs) => qs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reveals_answers(&self) -> bool {
        matches!(self, QuestionSet::Full(_))
    }
}
