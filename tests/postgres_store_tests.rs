// tests/postgres_store_tests.rs
//
// Runs against a live database: `DATABASE_URL=... cargo test -- --ignored`.

use std::collections::BTreeSet;

use chrono::Utc;
use examprep::models::attempt::{AttemptPatch, Completion, NewAttempt};
use examprep::store::{PgStore, Store};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;

async fn connect() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    pool
}

/// Inserts a fresh exam type, subject, topic and four questions.
/// Returns the exam type id and the question ids.
async fn seed_questions(pool: &PgPool) -> (i64, Vec<i64>) {
    let exam_type_id: i64 =
        sqlx::query_scalar("INSERT INTO exam_types (name) VALUES ('Store test') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
    let subject_id: i64 = sqlx::query_scalar(
        "INSERT INTO subjects (name, exam_type_id) VALUES ('Physics', $1) RETURNING id",
    )
    .bind(exam_type_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let topic_id: i64 = sqlx::query_scalar(
        "INSERT INTO topics (name, subject_id) VALUES ('Kinematics', $1) RETURNING id",
    )
    .bind(subject_id)
    .fetch_one(pool)
    .await
    .unwrap();

    let mut question_ids = Vec::new();
    for i in 0..4 {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO questions (text, options, correct_option, topic_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(format!("Question {}", i + 1))
        .bind(Json(vec!["a", "b", "c", "d"]))
        .bind(i)
        .bind(topic_id)
        .fetch_one(pool)
        .await
        .unwrap();
        question_ids.push(id);
    }

    (exam_type_id, question_ids)
}

async fn insert_test(
    pool: &PgPool,
    exam_type_id: i64,
    question_ids: &[i64],
    total_questions: i32,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO tests (name, exam_type_id, duration, total_questions, question_ids)
        VALUES ('Store test paper', $1, 10, $2, $3)
        RETURNING id
        "#,
    )
    .bind(exam_type_id)
    .bind(total_questions)
    .bind(Json(question_ids))
    .fetch_one(pool)
    .await
}

async fn fresh_attempt(store: &PgStore, pool: &PgPool) -> (i64, Vec<i64>) {
    let (exam_type_id, question_ids) = seed_questions(pool).await;
    let test_id = insert_test(pool, exam_type_id, &question_ids, 4).await.unwrap();
    let attempt = store
        .insert_attempt(NewAttempt {
            user_id: 1,
            test_id,
            total_questions: 4,
            start_time: Utc::now(),
        })
        .await
        .unwrap();
    (attempt.id, question_ids)
}

fn completion(score: i32) -> Completion {
    Completion {
        answers: vec![Some(0), Some(1), None, None],
        marked_for_review: BTreeSet::from([3]),
        time_spent: 30,
        end_time: Utc::now(),
        score,
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn insert_prefills_and_questions_keep_test_order() {
    let pool = connect().await;
    let store = PgStore::new(pool.clone());
    let (attempt_id, question_ids) = fresh_attempt(&store, &pool).await;

    let attempt = store.get_attempt(attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.answers, vec![None; 4]);
    assert!(attempt.marked_for_review.is_empty());
    assert!(attempt.is_active());

    let reversed: Vec<i64> = question_ids.iter().rev().copied().collect();
    let questions = store.get_questions_by_ids(&reversed).await.unwrap();
    let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    assert_eq!(ids, reversed);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn writes_after_completion_are_refused() {
    let pool = connect().await;
    let store = PgStore::new(pool.clone());
    let (attempt_id, _) = fresh_attempt(&store, &pool).await;

    let done = store
        .complete_attempt(attempt_id, &completion(1))
        .await
        .unwrap()
        .unwrap();
    assert!(done.is_completed);
    assert!(done.end_time.is_some());
    assert_eq!(done.marked_for_review, BTreeSet::from([3]));

    let patch = AttemptPatch {
        answers: Some(vec![Some(1); 4]),
        ..Default::default()
    };
    assert_eq!(store.update_active_attempt(attempt_id, &patch).await.unwrap(), None);
    assert_eq!(store.complete_attempt(attempt_id, &completion(4)).await.unwrap(), None);
    assert_eq!(store.get_attempt(attempt_id).await.unwrap(), Some(done));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn backfill_never_overwrites() {
    let pool = connect().await;
    let store = PgStore::new(pool.clone());
    let (attempt_id, _) = fresh_attempt(&store, &pool).await;

    // Still active: left alone.
    let same = store.backfill_score(attempt_id, 3).await.unwrap().unwrap();
    assert_eq!(same.score, None);
    assert!(!same.is_completed);

    store.complete_attempt(attempt_id, &completion(2)).await.unwrap();
    let after = store.backfill_score(attempt_id, 3).await.unwrap().unwrap();
    assert_eq!(after.score, Some(2));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn partial_patch_keeps_other_fields_and_time_only_grows() {
    let pool = connect().await;
    let store = PgStore::new(pool.clone());
    let (attempt_id, _) = fresh_attempt(&store, &pool).await;

    let saved = store
        .update_active_attempt(
            attempt_id,
            &AttemptPatch {
                answers: Some(vec![Some(2), None, Some(1), None]),
                marked_for_review: Some(BTreeSet::from([0, 2])),
                time_spent: Some(120),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.time_spent, 120);

    let after = store
        .update_active_attempt(
            attempt_id,
            &AttemptPatch {
                time_spent: Some(60),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.answers, vec![Some(2), None, Some(1), None]);
    assert_eq!(after.marked_for_review, BTreeSet::from([0, 2]));
    assert_eq!(after.time_spent, 120);

    let marks_only = store
        .update_active_attempt(
            attempt_id,
            &AttemptPatch {
                marked_for_review: Some(BTreeSet::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(marks_only.answers, after.answers);
    assert!(marks_only.marked_for_review.is_empty());
    assert_eq!(marks_only.time_spent, 120);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn question_count_must_match_question_ids() {
    let pool = connect().await;
    let (exam_type_id, question_ids) = seed_questions(&pool).await;

    let err = insert_test(&pool, exam_type_id, &question_ids, 3)
        .await
        .unwrap_err();
    let code = err
        .as_database_error()
        .and_then(|e| e.code())
        .map(|c| c.into_owned());
    // check_violation
    assert_eq!(code.as_deref(), Some("23514"));

    assert!(insert_test(&pool, exam_type_id, &question_ids, 4).await.is_ok());
}
