// src/services/analytics.rs

//! Dashboard numbers, computed on demand from a user's attempt history.
//!
//! The `compute_*` functions are pure; the async wrappers load what they need
//! from the store and enforce that callers only read their own history.

use std::collections::{HashMap, HashSet};

use crate::{
    config::{DEFAULT_ANALYTICS_LIMIT, MAX_ANALYTICS_LIMIT},
    error::AppError,
    models::{
        analytics::{RecentActivity, SubjectPerformance, TopicPerformance, UserStats},
        attempt::Attempt,
        catalog::{Subject, Topic},
        identity::Identity,
        question::Question,
        test::{Test, TestFilter},
    },
    store::Store,
};

/// `limit` query parameter with default and upper bound applied.
pub fn effective_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_ANALYTICS_LIMIT)
        .min(MAX_ANALYTICS_LIMIT)
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    part * 100.0 / whole
}

fn completed(attempts: &[Attempt]) -> impl Iterator<Item = &Attempt> {
    attempts.iter().filter(|a| a.is_completed)
}

pub fn compute_user_stats(attempts: &[Attempt]) -> UserStats {
    let done: Vec<&Attempt> = completed(attempts).collect();
    if done.is_empty() {
        return UserStats::default();
    }

    let total_score: i64 = done.iter().map(|a| i64::from(a.score.unwrap_or(0))).sum();

    UserStats {
        tests_taken: done.len() as u32,
        avg_score: total_score as f64 / done.len() as f64,
        completion: percent(done.len() as f64, attempts.len() as f64),
    }
}

/// One entry per subject with at least one completed attempt, in `subjects` order.
///
/// `completion` is the subject's share of all completed attempts, not a
/// coverage ratio of the subject's tests.
pub fn compute_subject_performance(
    attempts: &[Attempt],
    tests: &HashMap<i64, Test>,
    subjects: &[Subject],
) -> Vec<SubjectPerformance> {
    #[derive(Default)]
    struct Acc {
        score: i64,
        questions: i64,
        attempts: u32,
    }

    let mut by_subject: HashMap<i64, Acc> = HashMap::new();
    let mut all_completed = 0u32;

    for attempt in completed(attempts) {
        all_completed += 1;
        let Some(subject_id) = tests.get(&attempt.test_id).and_then(|t| t.subject_id) else {
            continue;
        };
        let acc = by_subject.entry(subject_id).or_default();
        acc.score += i64::from(attempt.score.unwrap_or(0));
        acc.questions += attempt.answers.len() as i64;
        acc.attempts += 1;
    }

    subjects
        .iter()
        .filter_map(|subject| {
            let acc = by_subject.get(&subject.id)?;
            Some(SubjectPerformance {
                name: subject.name.clone(),
                icon: subject.icon.clone(),
                accuracy: percent(acc.score as f64, acc.questions as f64),
                completion: percent(f64::from(acc.attempts), f64::from(all_completed)),
            })
        })
        .collect()
}

/// Attributes answer `i` of every completed attempt to the topic of question `i`.
///
/// Only topics in `topics` are reported, in that order. Time per topic is the
/// attempt's time spread evenly over its questions, in whole minutes.
pub fn compute_topic_performance(
    attempts: &[Attempt],
    tests: &HashMap<i64, Test>,
    questions: &HashMap<i64, Question>,
    topics: &[Topic],
) -> Vec<TopicPerformance> {
    #[derive(Default)]
    struct Acc {
        correct: u32,
        total: u32,
        seconds: f64,
    }

    let wanted: HashSet<i64> = topics.iter().map(|t| t.id).collect();
    let mut by_topic: HashMap<i64, Acc> = HashMap::new();

    for attempt in completed(attempts) {
        let Some(test) = tests.get(&attempt.test_id) else {
            continue;
        };
        if test.question_ids.is_empty() {
            continue;
        }
        let per_question = f64::from(attempt.time_spent) / test.question_ids.len() as f64;

        for (i, question_id) in test.question_ids.iter().enumerate() {
            let Some(question) = questions.get(question_id) else {
                continue;
            };
            if !wanted.contains(&question.topic_id) {
                continue;
            }
            let acc = by_topic.entry(question.topic_id).or_default();
            acc.total += 1;
            acc.seconds += per_question;
            if attempt.answers.get(i).copied().flatten() == Some(question.correct_option) {
                acc.correct += 1;
            }
        }
    }

    topics
        .iter()
        .filter_map(|topic| {
            let acc = by_topic.get(&topic.id)?;
            Some(TopicPerformance {
                name: topic.name.clone(),
                correct: acc.correct,
                total: acc.total,
                percentage: percent(f64::from(acc.correct), f64::from(acc.total)),
                time_spent: (acc.seconds / 60.0).round() as u32,
            })
        })
        .collect()
}

/// The `limit` newest attempts joined with their test.
/// Expects `attempts` newest first, as the store returns them.
pub fn compute_recent_activity(
    attempts: &[Attempt],
    tests: &HashMap<i64, Test>,
    limit: usize,
) -> Vec<RecentActivity> {
    attempts
        .iter()
        .filter_map(|a| {
            tests.get(&a.test_id).map(|t| RecentActivity {
                attempt: a.clone(),
                test: t.clone(),
            })
        })
        .take(limit)
        .collect()
}

/// Catalog tests the user has never attempted, in catalog order.
pub fn compute_upcoming_tests(attempts: &[Attempt], catalog: Vec<Test>, limit: usize) -> Vec<Test> {
    let attempted: HashSet<i64> = attempts.iter().map(|a| a.test_id).collect();
    catalog
        .into_iter()
        .filter(|t| !attempted.contains(&t.id))
        .take(limit)
        .collect()
}

async fn history(store: &dyn Store, identity: &Identity, user_id: i64) -> Result<Vec<Attempt>, AppError> {
    identity.ensure_user(user_id)?;
    store.list_attempts(user_id).await
}

async fn tests_of(store: &dyn Store, attempts: &[Attempt]) -> Result<HashMap<i64, Test>, AppError> {
    let ids: HashSet<i64> = attempts.iter().map(|a| a.test_id).collect();
    let mut tests = HashMap::with_capacity(ids.len());
    for id in ids {
        // Attempts on a deleted test drop out of analytics.
        if let Some(test) = store.get_test(id).await? {
            tests.insert(id, test);
        }
    }
    Ok(tests)
}

pub async fn user_stats(store: &dyn Store, identity: &Identity, user_id: i64) -> Result<UserStats, AppError> {
    let attempts = history(store, identity, user_id).await?;
    Ok(compute_user_stats(&attempts))
}

pub async fn subject_performance(
    store: &dyn Store,
    identity: &Identity,
    user_id: i64,
) -> Result<Vec<SubjectPerformance>, AppError> {
    let attempts = history(store, identity, user_id).await?;
    let tests = tests_of(store, &attempts).await?;
    let subjects = store.list_subjects(None).await?;
    Ok(compute_subject_performance(&attempts, &tests, &subjects))
}

pub async fn topic_performance(
    store: &dyn Store,
    identity: &Identity,
    user_id: i64,
    subject_id: Option<i64>,
) -> Result<Vec<TopicPerformance>, AppError> {
    let attempts = history(store, identity, user_id).await?;
    let tests = tests_of(store, &attempts).await?;
    let topics = store.list_topics(subject_id).await?;

    let mut question_ids: Vec<i64> = tests
        .values()
        .flat_map(|t| t.question_ids.iter().copied())
        .collect();
    question_ids.sort_unstable();
    question_ids.dedup();

    let questions: HashMap<i64, Question> = store
        .get_questions_by_ids(&question_ids)
        .await?
        .into_iter()
        .map(|q| (q.id, q))
        .collect();

    Ok(compute_topic_performance(&attempts, &tests, &questions, &topics))
}

pub async fn recent_activity(
    store: &dyn Store,
    identity: &Identity,
    user_id: i64,
    limit: Option<usize>,
) -> Result<Vec<RecentActivity>, AppError> {
    let attempts = history(store, identity, user_id).await?;
    let tests = tests_of(store, &attempts).await?;
    Ok(compute_recent_activity(&attempts, &tests, effective_limit(limit)))
}

pub async fn upcoming_tests(
    store: &dyn Store,
    identity: &Identity,
    user_id: i64,
    limit: Option<usize>,
) -> Result<Vec<Test>, AppError> {
    let attempts = history(store, identity, user_id).await?;
    let catalog = store.list_tests(TestFilter::default()).await?;
    Ok(compute_upcoming_tests(&attempts, catalog, effective_limit(limit)))
}
