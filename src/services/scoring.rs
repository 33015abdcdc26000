// src/services/scoring.rs

use serde::{Deserialize, Serialize};

use crate::models::question::Question;

/// Points awarded per correct and per incorrect answer. Skipped answers score 0.
///
/// The default `(+1, 0)` is the baseline: the score is the number of correct
/// answers. Test descriptors advertise negative marks, but they are only
/// subtracted when the scheme is configured with a negative `incorrect_points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkingScheme {
    pub correct_points: i32,
    pub incorrect_points: i32,
}

impl Default for MarkingScheme {
    fn default() -> Self {
        Self {
            correct_points: 1,
            incorrect_points: 0,
        }
    }
}

/// Outcome of scoring one set of answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub correct: u32,
    pub incorrect: u32,
    pub skipped: u32,
    pub score: i32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.correct + self.incorrect + self.skipped
    }
}

/// Scores `answers` against the ordered question list of a test.
///
/// Answer `i` is compared with `questions[i].correct_option`. An answer with
/// no matching question (shorter question list) counts as incorrect, and a
/// question with no answer slot counts as skipped.
pub fn score_answers(
    answers: &[Option<u32>],
    questions: &[Question],
    scheme: MarkingScheme,
) -> ScoreBreakdown {
    let n = answers.len().max(questions.len());
    let mut correct = 0u32;
    let mut skipped = 0u32;

    for i in 0..n {
        match answers.get(i).copied().flatten() {
            None => skipped += 1,
            Some(choice) => {
                if questions.get(i).is_some_and(|q| q.correct_option == choice) {
                    correct += 1;
                }
            }
        }
    }

    let incorrect = n as u32 - correct - skipped;
    let score = correct as i32 * scheme.correct_points + incorrect as i32 * scheme.incorrect_points;

    ScoreBreakdown {
        correct,
        incorrect,
        skipped,
        score,
    }
}
