// src/models/attempt.rs

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{question::QuestionSet, test::Test};
use crate::services::scoring::ScoreBreakdown;

/// Lifecycle state of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Active,
    Completed,
}

/// One user's run through a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_completed: bool,

    /// Selected option per question, `None` when skipped.
    /// Length always equals the test's `total_questions`.
    pub answers: Vec<Option<u32>>,

    /// Question indices flagged by the user.
    pub marked_for_review: BTreeSet<u32>,

    /// Seconds spent so far. Never decreases, never exceeds the test budget.
    pub time_spent: u32,

    /// Set once on completion (or backfilled lazily), never cleared.
    pub score: Option<i32>,
}

impl Attempt {
    pub fn status(&self) -> AttemptStatus {
        if self.is_completed {
            AttemptStatus::Completed
        } else {
            AttemptStatus::Active
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_completed
    }
}

/// Insert payload for a fresh attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: i64,
    pub test_id: i64,
    pub total_questions: u32,
    pub start_time: DateTime<Utc>,
}

/// Fields replaced by an autosave. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptPatch {
    pub answers: Option<Vec<Option<u32>>>,
    pub marked_for_review: Option<BTreeSet<u32>>,
    pub time_spent: Option<u32>,
}

impl AttemptPatch {
    pub fn is_empty(&self) -> bool {
        self.answers.is_none() && self.marked_for_review.is_none() && self.time_spent.is_none()
    }

    /// Applies the patch in place. `time_spent` only moves forward.
    pub fn apply_to(&self, attempt: &mut Attempt) {
        if let Some(answers) = &self.answers {
            attempt.answers = answers.clone();
        }
        if let Some(marked) = &self.marked_for_review {
            attempt.marked_for_review = marked.clone();
        }
        if let Some(time_spent) = self.time_spent {
            attempt.time_spent = attempt.time_spent.max(time_spent);
        }
    }
}

/// Final write performed by submit. Every field is already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub answers: Vec<Option<u32>>,
    pub marked_for_review: BTreeSet<u32>,
    pub time_spent: u32,
    pub end_time: DateTime<Utc>,
    pub score: i32,
}

impl Completion {
    pub fn apply_to(&self, attempt: &mut Attempt) {
        attempt.answers = self.answers.clone();
        attempt.marked_for_review = self.marked_for_review.clone();
        attempt.time_spent = attempt.time_spent.max(self.time_spent);
        attempt.end_time = Some(self.end_time);
        attempt.is_completed = true;
        attempt.score = Some(self.score);
    }
}

/// DTO for `POST /api/test-attempts`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttemptRequest {
    #[validate(range(min = 1, message = "testId must be a positive id"))]
    pub test_id: i64,

    /// Optional; must match the authenticated user when present.
    pub user_id: Option<i64>,
}

/// DTO for `PUT /api/test-attempts/{id}`.
///
/// Arrays are full snapshots, never deltas.
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAttemptRequest {
    #[validate(length(max = 1000))]
    pub answers: Option<Vec<Option<u32>>>,

    #[validate(length(max = 1000))]
    pub marked_for_review: Option<Vec<u32>>,

    pub time_spent: Option<u32>,

    /// `true` turns the request into a submit.
    pub is_completed: Option<bool>,

    /// Accepted for compatibility and ignored; the server clock sets `endTime`.
    pub end_time: Option<DateTime<Utc>>,
}

impl UpdateAttemptRequest {
    pub fn into_patch(self) -> AttemptPatch {
        AttemptPatch {
            answers: self.answers,
            marked_for_review: self.marked_for_review.map(|m| m.into_iter().collect()),
            time_spent: self.time_spent,
        }
    }
}

/// DTO for `POST /api/test-attempts/{id}/submit`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    #[validate(length(max = 1000))]
    pub answers: Vec<Option<u32>>,
    pub time_spent: u32,
}

impl SubmitAttemptRequest {
    pub fn into_patch(self) -> AttemptPatch {
        AttemptPatch {
            answers: Some(self.answers),
            marked_for_review: None,
            time_spent: Some(self.time_spent),
        }
    }
}

/// Response for `GET /api/test-attempts/{id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub test_attempt: Attempt,
    pub status: AttemptStatus,
    pub test: Test,
    pub questions: QuestionSet,

    /// Present once the attempt is completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,

    /// Present while the attempt is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(n: usize) -> Attempt {
        Attempt {
            id: 1,
            user_id: 1,
            test_id: 1,
            start_time: Utc::now(),
            end_time: None,
            is_completed: false,
            answers: vec![None; n],
            marked_for_review: BTreeSet::new(),
            time_spent: 120,
            score: None,
        }
    }

    #[test]
    fn test_patch_keeps_time_spent_monotonic() {
        let mut attempt = active(3);
        let patch = AttemptPatch {
            time_spent: Some(60),
            ..Default::default()
        };
        patch.apply_to(&mut attempt);
        assert_eq!(attempt.time_spent, 120);

        let patch = AttemptPatch {
            time_spent: Some(180),
            ..Default::default()
        };
        patch.apply_to(&mut attempt);
        assert_eq!(attempt.time_spent, 180);
    }

    #[test]
    fn test_patch_replaces_whole_arrays() {
        let mut attempt = active(3);
        attempt.answers = vec![Some(1), Some(2), None];
        attempt.marked_for_review = [0, 2].into_iter().collect();

        let patch = AttemptPatch {
            answers: Some(vec![None, Some(0), None]),
            marked_for_review: Some(BTreeSet::new()),
            time_spent: None,
        };
        patch.apply_to(&mut attempt);

        assert_eq!(attempt.answers, vec![None, Some(0), None]);
        assert!(attempt.marked_for_review.is_empty());
    }

    #[test]
    fn test_update_request_dedups_review_marks() {
        let req = UpdateAttemptRequest {
            marked_for_review: Some(vec![3, 1, 3]),
            ..Default::default()
        };
        let patch = req.into_patch();
        assert_eq!(
            patch.marked_for_review.unwrap().into_iter().collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_attempt_serializes_camel_case() {
        let json = serde_json::to_value(active(2)).unwrap();
        assert_eq!(json["isCompleted"], false);
        assert_eq!(json["answers"], serde_json::json!([null, null]));
        assert_eq!(json["markedForReview"], serde_json::json!([]));
        assert_eq!(json["timeSpent"], 120);
    }
}
