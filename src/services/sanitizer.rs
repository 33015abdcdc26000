// src/services/sanitizer.rs

//! Keeps the answer key away from clients whose attempt is still running.

use crate::models::{
    attempt::Attempt,
    question::{PublicQuestion, Question, QuestionSet},
};

/// Strips `correct_option` and `explanation`.
pub fn sanitize(question: Question) -> PublicQuestion {
    PublicQuestion {
        id: question.id,
        text: question.text,
        options: question.options,
        topic_id: question.topic_id,
        difficulty_level: question.difficulty_level,
        diagram: question.diagram,
    }
}

pub fn sanitize_all(questions: Vec<Question>) -> Vec<PublicQuestion> {
    questions.into_iter().map(sanitize).collect()
}

/// Picks the question representation allowed for `attempt`.
/// Only a completed attempt gets the answer key.
pub fn questions_for_attempt(attempt: &Attempt, questions: Vec<Question>) -> QuestionSet {
    if attempt.is_completed {
        QuestionSet::Full(questions)
    } else {
        QuestionSet::Sanitized(sanitize_all(questions))
    }
}
