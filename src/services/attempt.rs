// src/services/attempt.rs

//! Attempt lifecycle: Active -> Completed.
//!
//! Every write to one attempt is serialized through a per-attempt async lock,
//! and every store write is conditional on the attempt still being active, so
//! a late autosave can never land on a finalized record.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    config::AttemptPolicy,
    error::AppError,
    models::{
        attempt::{Attempt, AttemptPatch, AttemptView, Completion, NewAttempt, SubmitAttemptRequest},
        identity::Identity,
        test::Test,
    },
    services::{
        catalog,
        sanitizer,
        scoring::{MarkingScheme, score_answers},
    },
    session::timer::remaining_secs,
    store::Store,
};

/// Lazily created async locks, one per key.
///
/// An entry lives only while someone holds or waits for it.
struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

/// Held lock of one key. Dropping it releases the lock and removes the table
/// entry when no other task is queued on it.
struct KeyedGuard<'a, K: Eq + Hash + Copy> {
    table: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Copy> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.table.release(self.key);
    }
}

impl<K: Eq + Hash + Copy> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock(&self, key: K) -> Result<KeyedGuard<'_, K>, AppError> {
        // Cloned under the table lock, so `release` sees every waiter.
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| AppError::Internal("attempt lock table poisoned".to_string()))?;
            locks.entry(key).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        Ok(KeyedGuard {
            table: self,
            key,
            guard: Some(guard),
        })
    }

    fn release(&self, key: K) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(&key);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Result of `start`.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub attempt: Attempt,
    /// `true` when an existing active attempt was handed back.
    pub resumed: bool,
}

pub struct AttemptService {
    store: Arc<dyn Store>,
    marking: MarkingScheme,
    policy: AttemptPolicy,
    attempt_locks: KeyedLocks<i64>,
    start_locks: KeyedLocks<(i64, i64)>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>, marking: MarkingScheme, policy: AttemptPolicy) -> Self {
        Self {
            store,
            marking,
            policy,
            attempt_locks: KeyedLocks::new(),
            start_locks: KeyedLocks::new(),
        }
    }

    /// Opens an attempt on `test_id` for the caller.
    ///
    /// With an active attempt already open on the same test, the configured
    /// `AttemptPolicy` decides between resuming it, rejecting, or opening another.
    pub async fn start(&self, identity: &Identity, test_id: i64) -> Result<StartOutcome, AppError> {
        let test = catalog::require_test(self.store.as_ref(), test_id).await?;
        test.check_integrity()?;

        let _guard = self.start_locks.lock((identity.user_id, test_id)).await?;

        if self.policy != AttemptPolicy::Allow {
            if let Some(existing) = self
                .store
                .find_active_attempt(identity.user_id, test_id)
                .await?
            {
                if self.policy == AttemptPolicy::Reject {
                    return Err(AppError::InvalidState(format!(
                        "Attempt {} on test {} is still in progress",
                        existing.id, test_id
                    )));
                }
                tracing::info!(
                    "Resuming attempt {} for user {} on test {}",
                    existing.id,
                    identity.user_id,
                    test_id
                );
                return Ok(StartOutcome {
                    attempt: existing,
                    resumed: true,
                });
            }
        }

        let attempt = self
            .store
            .insert_attempt(NewAttempt {
                user_id: identity.user_id,
                test_id,
                total_questions: test.total_questions,
                start_time: Utc::now(),
            })
            .await?;

        tracing::info!(
            "User {} started attempt {} on test {}",
            identity.user_id,
            attempt.id,
            test_id
        );

        Ok(StartOutcome {
            attempt,
            resumed: false,
        })
    }

    /// Autosave: replaces the supplied fields of an active attempt.
    pub async fn update(
        &self,
        identity: &Identity,
        attempt_id: i64,
        patch: AttemptPatch,
    ) -> Result<Attempt, AppError> {
        let _guard = self.attempt_locks.lock(attempt_id).await?;

        let attempt = self.owned_attempt(identity, attempt_id).await?;
        if attempt.is_completed {
            return Err(completed_error(attempt_id));
        }
        if patch.is_empty() {
            return Ok(attempt);
        }

        let test = self.test_of(&attempt).await?;
        validate_patch(&patch, &test)?;

        self.store
            .update_active_attempt(attempt_id, &patch)
            .await?
            .ok_or_else(|| completed_error(attempt_id))
    }

    /// Finalizes an attempt and scores it.
    ///
    /// Submitting an already completed attempt returns it unchanged.
    pub async fn submit(
        &self,
        identity: &Identity,
        attempt_id: i64,
        req: SubmitAttemptRequest,
    ) -> Result<Attempt, AppError> {
        self.submit_patch(identity, attempt_id, req.into_patch()).await
    }

    /// Like `submit`, but fields left out of `patch` keep the values stored
    /// at the moment the attempt is finalized.
    pub async fn submit_patch(
        &self,
        identity: &Identity,
        attempt_id: i64,
        patch: AttemptPatch,
    ) -> Result<Attempt, AppError> {
        let _guard = self.attempt_locks.lock(attempt_id).await?;

        let attempt = self.owned_attempt(identity, attempt_id).await?;
        if attempt.is_completed {
            tracing::debug!("Attempt {} already submitted, returning stored record", attempt_id);
            return Ok(attempt);
        }

        let test = self.test_of(&attempt).await?;
        let answers = patch.answers.unwrap_or(attempt.answers);
        validate_answers(&answers, &test)?;
        let marked_for_review = patch.marked_for_review.unwrap_or(attempt.marked_for_review);
        validate_marks(&marked_for_review, &test)?;

        let questions = catalog::questions_for_test(self.store.as_ref(), &test).await?;
        let breakdown = score_answers(&answers, &questions, self.marking);

        // Timeout submits may report a few seconds over budget.
        let time_spent = patch
            .time_spent
            .unwrap_or(attempt.time_spent)
            .min(test.time_budget_secs());

        let completion = Completion {
            answers,
            marked_for_review,
            time_spent,
            end_time: Utc::now(),
            score: breakdown.score,
        };

        match self.store.complete_attempt(attempt_id, &completion).await? {
            Some(done) => {
                tracing::info!(
                    "Attempt {} submitted: score {} ({} correct, {} incorrect, {} skipped)",
                    attempt_id,
                    breakdown.score,
                    breakdown.correct,
                    breakdown.incorrect,
                    breakdown.skipped
                );
                Ok(done)
            }
            // Completed through another path in the meantime.
            None => self
                .store
                .get_attempt(attempt_id)
                .await?
                .ok_or_else(|| not_found(attempt_id)),
        }
    }

    /// Current record, with a missing score backfilled for completed attempts.
    pub async fn get(&self, identity: &Identity, attempt_id: i64) -> Result<Attempt, AppError> {
        let attempt = self.owned_attempt(identity, attempt_id).await?;
        self.ensure_scored(attempt).await
    }

    /// Attempt joined with its test and questions.
    ///
    /// Questions carry the answer key only once the attempt is completed.
    pub async fn result(&self, identity: &Identity, attempt_id: i64) -> Result<AttemptView, AppError> {
        let attempt = self.get(identity, attempt_id).await?;
        let test = self.test_of(&attempt).await?;
        let questions = catalog::questions_for_test(self.store.as_ref(), &test).await?;

        let breakdown = attempt.is_completed.then(|| {
            let mut breakdown = score_answers(&attempt.answers, &questions, self.marking);
            // The stored score is authoritative even if the scheme changed since.
            if let Some(score) = attempt.score {
                breakdown.score = score;
            }
            breakdown
        });
        let remaining_seconds = attempt
            .is_active()
            .then(|| remaining_secs(test.time_budget_secs(), attempt.time_spent));

        Ok(AttemptView {
            status: attempt.status(),
            questions: sanitizer::questions_for_attempt(&attempt, questions),
            test_attempt: attempt,
            test,
            breakdown,
            remaining_seconds,
        })
    }

    /// All attempts of `user_id`, newest first.
    pub async fn list(&self, identity: &Identity, user_id: i64) -> Result<Vec<Attempt>, AppError> {
        identity.ensure_user(user_id)?;
        self.store.list_attempts(user_id).await
    }

    async fn ensure_scored(&self, attempt: Attempt) -> Result<Attempt, AppError> {
        if !attempt.is_completed || attempt.score.is_some() {
            return Ok(attempt);
        }

        let test = self.test_of(&attempt).await?;
        let questions = catalog::questions_for_test(self.store.as_ref(), &test).await?;
        let breakdown = score_answers(&attempt.answers, &questions, self.marking);

        tracing::info!("Backfilling score {} for attempt {}", breakdown.score, attempt.id);

        self.store
            .backfill_score(attempt.id, breakdown.score)
            .await?
            .ok_or_else(|| not_found(attempt.id))
    }

    async fn owned_attempt(&self, identity: &Identity, attempt_id: i64) -> Result<Attempt, AppError> {
        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| not_found(attempt_id))?;

        if attempt.user_id != identity.user_id {
            return Err(AppError::Forbidden(format!(
                "Test attempt {} belongs to another user",
                attempt_id
            )));
        }
        Ok(attempt)
    }

    /// Test of an existing attempt. A vanished test is a data error, not a 404.
    async fn test_of(&self, attempt: &Attempt) -> Result<Test, AppError> {
        let test = self
            .store
            .get_test(attempt.test_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "attempt {} references missing test {}",
                    attempt.id, attempt.test_id
                ))
            })?;
        test.check_integrity()?;
        Ok(test)
    }
}

fn not_found(attempt_id: i64) -> AppError {
    AppError::NotFound(format!("Test attempt {} not found", attempt_id))
}

fn completed_error(attempt_id: i64) -> AppError {
    AppError::InvalidState(format!(
        "Test attempt {} is already completed and cannot be modified",
        attempt_id
    ))
}

fn validate_answers(answers: &[Option<u32>], test: &Test) -> Result<(), AppError> {
    if answers.len() != test.total_questions as usize {
        return Err(AppError::Validation(format!(
            "answers must contain exactly {} entries, got {}",
            test.total_questions,
            answers.len()
        )));
    }
    Ok(())
}

fn validate_marks(marked: &BTreeSet<u32>, test: &Test) -> Result<(), AppError> {
    if let Some(bad) = marked.iter().find(|&&i| i >= test.total_questions) {
        return Err(AppError::Validation(format!(
            "markedForReview index {} is out of range 0..{}",
            bad, test.total_questions
        )));
    }
    Ok(())
}

fn validate_patch(patch: &AttemptPatch, test: &Test) -> Result<(), AppError> {
    if let Some(answers) = &patch.answers {
        validate_answers(answers, test)?;
    }

    if let Some(marked) = &patch.marked_for_review {
        validate_marks(marked, test)?;
    }

    if let Some(time_spent) = patch.time_spent {
        let budget = test.time_budget_secs();
        if time_spent > budget {
            return Err(AppError::Validation(format!(
                "timeSpent {}s exceeds the {}s time limit",
                time_spent, budget
            )));
        }
    }

    Ok(())
}
