// src/store/mod.rs

//! Persistence seam.
//!
//! Handlers and services only talk to `dyn Store`. `PgStore` is the
//! production backend, `MemoryStore` backs tests and the demo mode.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptPatch, Completion, NewAttempt},
        catalog::{ExamType, Subject, Topic},
        question::Question,
        test::{Test, TestFilter},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_exam_types(&self) -> Result<Vec<ExamType>, AppError>;

    async fn get_exam_type(&self, id: i64) -> Result<Option<ExamType>, AppError>;

    async fn list_subjects(&self, exam_type_id: Option<i64>) -> Result<Vec<Subject>, AppError>;

    async fn get_subject(&self, id: i64) -> Result<Option<Subject>, AppError>;

    async fn list_topics(&self, subject_id: Option<i64>) -> Result<Vec<Topic>, AppError>;

    /// Tests in catalog order (ascending id).
    async fn list_tests(&self, filter: TestFilter) -> Result<Vec<Test>, AppError>;

    async fn get_test(&self, id: i64) -> Result<Option<Test>, AppError>;

    /// Questions in the order of `ids`. Unknown ids are left out.
    async fn get_questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>, AppError>;

    async fn insert_attempt(&self, new: NewAttempt) -> Result<Attempt, AppError>;

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError>;

    /// All attempts of a user, newest first.
    async fn list_attempts(&self, user_id: i64) -> Result<Vec<Attempt>, AppError>;

    /// Most recent active attempt of `user_id` on `test_id`.
    async fn find_active_attempt(
        &self,
        user_id: i64,
        test_id: i64,
    ) -> Result<Option<Attempt>, AppError>;

    /// Applies `patch` in one write, only if the attempt is still active.
    /// Returns `None` when the attempt is missing or already completed.
    async fn update_active_attempt(
        &self,
        id: i64,
        patch: &AttemptPatch,
    ) -> Result<Option<Attempt>, AppError>;

    /// Flips an active attempt to completed in one write.
    /// Returns `None` when the attempt is missing or already completed.
    async fn complete_attempt(
        &self,
        id: i64,
        completion: &Completion,
    ) -> Result<Option<Attempt>, AppError>;

    /// Stores `score` on a completed attempt whose score is still null.
    /// Returns the stored record, which keeps an earlier score if one exists.
    async fn backfill_score(&self, id: i64, score: i32) -> Result<Option<Attempt>, AppError>;
}

/// Reorders `found` to follow `ids`, dropping ids that were not found.
pub(crate) fn order_by_ids(ids: &[i64], found: Vec<Question>) -> Vec<Question> {
    let by_id: std::collections::HashMap<i64, Question> =
        found.into_iter().map(|q| (q.id, q)).collect();
    ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
}
