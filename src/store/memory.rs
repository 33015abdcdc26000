// src/store/memory.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptPatch, Completion, NewAttempt},
        catalog::{ExamType, Subject, Topic},
        question::Question,
        test::{Test, TestFilter},
    },
    store::{Store, order_by_ids},
};

/// In-process store.
///
/// Attempts live in an append-only arena (`id == index + 1`) with a per-user
/// index. Every write takes the single write lock, so each trait call is one
/// atomic mutation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    exam_types: BTreeMap<i64, ExamType>,
    subjects: BTreeMap<i64, Subject>,
    topics: BTreeMap<i64, Topic>,
    questions: HashMap<i64, Question>,
    tests: BTreeMap<i64, Test>,
    attempts: Vec<Attempt>,
    attempts_by_user: HashMap<i64, Vec<usize>>,
}

impl Inner {
    fn slot(&self, id: i64) -> Option<usize> {
        let idx = usize::try_from(id).ok()?.checked_sub(1)?;
        (idx < self.attempts.len()).then_some(idx)
    }

    fn push_attempt(&mut self, mut attempt: Attempt) -> Attempt {
        let idx = self.attempts.len();
        attempt.id = idx as i64 + 1;
        self.attempts_by_user
            .entry(attempt.user_id)
            .or_default()
            .push(idx);
        self.attempts.push(attempt.clone());
        attempt
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, AppError> {
        self.inner
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, AppError> {
        self.inner
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    pub fn put_exam_type(&self, exam_type: ExamType) -> Result<(), AppError> {
        self.write()?.exam_types.insert(exam_type.id, exam_type);
        Ok(())
    }

    pub fn put_subject(&self, subject: Subject) -> Result<(), AppError> {
        self.write()?.subjects.insert(subject.id, subject);
        Ok(())
    }

    pub fn put_topic(&self, topic: Topic) -> Result<(), AppError> {
        self.write()?.topics.insert(topic.id, topic);
        Ok(())
    }

    pub fn put_question(&self, question: Question) -> Result<(), AppError> {
        self.write()?.questions.insert(question.id, question);
        Ok(())
    }

    pub fn put_test(&self, test: Test) -> Result<(), AppError> {
        self.write()?.tests.insert(test.id, test);
        Ok(())
    }

    /// Appends a prepared attempt record as-is (fixtures, imports).
    /// The id is reassigned by the arena.
    pub fn put_attempt(&self, attempt: Attempt) -> Result<Attempt, AppError> {
        Ok(self.write()?.push_attempt(attempt))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_exam_types(&self) -> Result<Vec<ExamType>, AppError> {
        Ok(self.read()?.exam_types.values().cloned().collect())
    }

    async fn get_exam_type(&self, id: i64) -> Result<Option<ExamType>, AppError> {
        Ok(self.read()?.exam_types.get(&id).cloned())
    }

    async fn list_subjects(&self, exam_type_id: Option<i64>) -> Result<Vec<Subject>, AppError> {
        Ok(self
            .read()?
            .subjects
            .values()
            .filter(|s| exam_type_id.is_none_or(|id| s.exam_type_id == id))
            .cloned()
            .collect())
    }

    async fn get_subject(&self, id: i64) -> Result<Option<Subject>, AppError> {
        Ok(self.read()?.subjects.get(&id).cloned())
    }

    async fn list_topics(&self, subject_id: Option<i64>) -> Result<Vec<Topic>, AppError> {
        Ok(self
            .read()?
            .topics
            .values()
            .filter(|t| subject_id.is_none_or(|id| t.subject_id == id))
            .cloned()
            .collect())
    }

    async fn list_tests(&self, filter: TestFilter) -> Result<Vec<Test>, AppError> {
        Ok(self
            .read()?
            .tests
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn get_test(&self, id: i64) -> Result<Option<Test>, AppError> {
        Ok(self.read()?.tests.get(&id).cloned())
    }

    async fn get_questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>, AppError> {
        let inner = self.read()?;
        let found = ids
            .iter()
            .filter_map(|id| inner.questions.get(id).cloned())
            .collect();
        Ok(order_by_ids(ids, found))
    }

    async fn insert_attempt(&self, new: NewAttempt) -> Result<Attempt, AppError> {
        let attempt = Attempt {
            id: 0,
            user_id: new.user_id,
            test_id: new.test_id,
            start_time: new.start_time,
            end_time: None,
            is_completed: false,
            answers: vec![None; new.total_questions as usize],
            marked_for_review: Default::default(),
            time_spent: 0,
            score: None,
        };
        Ok(self.write()?.push_attempt(attempt))
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        let inner = self.read()?;
        Ok(inner.slot(id).map(|idx| inner.attempts[idx].clone()))
    }

    async fn list_attempts(&self, user_id: i64) -> Result<Vec<Attempt>, AppError> {
        let inner = self.read()?;
        let mut attempts: Vec<Attempt> = inner
            .attempts_by_user
            .get(&user_id)
            .map(|slots| slots.iter().map(|&i| inner.attempts[i].clone()).collect())
            .unwrap_or_default();
        attempts.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(attempts)
    }

    async fn find_active_attempt(
        &self,
        user_id: i64,
        test_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        Ok(self
            .list_attempts(user_id)
            .await?
            .into_iter()
            .find(|a| a.test_id == test_id && a.is_active()))
    }

    async fn update_active_attempt(
        &self,
        id: i64,
        patch: &AttemptPatch,
    ) -> Result<Option<Attempt>, AppError> {
        let mut inner = self.write()?;
        let Some(idx) = inner.slot(id) else {
            return Ok(None);
        };
        let attempt = &mut inner.attempts[idx];
        if attempt.is_completed {
            return Ok(None);
        }
        patch.apply_to(attempt);
        Ok(Some(attempt.clone()))
    }

    async fn complete_attempt(
        &self,
        id: i64,
        completion: &Completion,
    ) -> Result<Option<Attempt>, AppError> {
        let mut inner = self.write()?;
        let Some(idx) = inner.slot(id) else {
            return Ok(None);
        };
        let attempt = &mut inner.attempts[idx];
        if attempt.is_completed {
            return Ok(None);
        }
        completion.apply_to(attempt);
        Ok(Some(attempt.clone()))
    }

    async fn backfill_score(&self, id: i64, score: i32) -> Result<Option<Attempt>, AppError> {
        let mut inner = self.write()?;
        let Some(idx) = inner.slot(id) else {
            return Ok(None);
        };
        let attempt = &mut inner.attempts[idx];
        if attempt.is_completed && attempt.score.is_none() {
            attempt.score = Some(score);
            if attempt.end_time.is_none() {
                attempt.end_time = Some(Utc::now());
            }
        }
        Ok(Some(attempt.clone()))
    }
}
