// src/store/postgres.rs

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

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

/// PostgreSQL-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row of the 'questions' table.
#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    text: String,
    options: Json<Vec<String>>,
    correct_option: i32,
    explanation: String,
    topic_id: i64,
    difficulty_level: i32,
    diagram: Option<String>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            text: row.text,
            options: row.options.0,
            correct_option: non_negative(row.correct_option, "questions.correct_option")?,
            explanation: row.explanation,
            topic_id: row.topic_id,
            difficulty_level: row.difficulty_level,
            diagram: row.diagram,
        })
    }
}

/// Row of the 'tests' table.
#[derive(FromRow)]
struct TestRow {
    id: i64,
    name: String,
    description: String,
    exam_type_id: i64,
    subject_id: Option<i64>,
    duration: i32,
    total_questions: i32,
    question_ids: Json<Vec<i64>>,
}

impl TryFrom<TestRow> for Test {
    type Error = AppError;

    fn try_from(row: TestRow) -> Result<Self, Self::Error> {
        Ok(Test {
            id: row.id,
            name: row.name,
            description: row.description,
            exam_type_id: row.exam_type_id,
            subject_id: row.subject_id,
            duration: non_negative(row.duration, "tests.duration")?,
            total_questions: non_negative(row.total_questions, "tests.total_questions")?,
            question_ids: row.question_ids.0,
        })
    }
}

/// Row of the 'test_attempts' table.
#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    user_id: i64,
    test_id: i64,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    is_completed: bool,
    answers: Json<Vec<Option<u32>>>,
    marked_for_review: Json<BTreeSet<u32>>,
    time_spent: i32,
    score: Option<i32>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: row.id,
            user_id: row.user_id,
            test_id: row.test_id,
            start_time: row.start_time,
            end_time: row.end_time,
            is_completed: row.is_completed,
            answers: row.answers.0,
            marked_for_review: row.marked_for_review.0,
            time_spent: non_negative(row.time_spent, "test_attempts.time_spent")?,
            score: row.score,
        })
    }
}

fn non_negative(value: i32, column: &str) -> Result<u32, AppError> {
    u32::try_from(value)
        .map_err(|_| AppError::Internal(format!("negative value {} in {}", value, column)))
}

fn to_db_int(value: u32) -> Result<i32, AppError> {
    i32::try_from(value).map_err(|_| AppError::Validation(format!("value {} is too large", value)))
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl Store for PgStore {
    async fn list_exam_types(&self) -> Result<Vec<ExamType>, AppError> {
        let rows = sqlx::query_as::<_, ExamType>(
            "SELECT id, name, description, icon FROM exam_types ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_exam_type(&self, id: i64) -> Result<Option<ExamType>, AppError> {
        let row = sqlx::query_as::<_, ExamType>(
            "SELECT id, name, description, icon FROM exam_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_subjects(&self, exam_type_id: Option<i64>) -> Result<Vec<Subject>, AppError> {
        let rows = sqlx::query_as::<_, Subject>(
            r#"
            SELECT id, name, icon, exam_type_id
            FROM subjects
            WHERE ($1::BIGINT IS NULL OR exam_type_id = $1)
            ORDER BY id
            "#,
        )
        .bind(exam_type_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_subject(&self, id: i64) -> Result<Option<Subject>, AppError> {
        let row = sqlx::query_as::<_, Subject>(
            "SELECT id, name, icon, exam_type_id FROM subjects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_topics(&self, subject_id: Option<i64>) -> Result<Vec<Topic>, AppError> {
        let rows = sqlx::query_as::<_, Topic>(
            r#"
            SELECT id, name, subject_id
            FROM topics
            WHERE ($1::BIGINT IS NULL OR subject_id = $1)
            ORDER BY id
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_tests(&self, filter: TestFilter) -> Result<Vec<Test>, AppError> {
        let rows = sqlx::query_as::<_, TestRow>(
            r#"
            SELECT
                id, name, description, exam_type_id, subject_id,
                duration, total_questions, question_ids
            FROM tests
            WHERE ($1::BIGINT IS NULL OR exam_type_id = $1)
              AND ($2::BIGINT IS NULL OR subject_id = $2)
            ORDER BY id
            "#,
        )
        .bind(filter.exam_type_id)
        .bind(filter.subject_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn get_test(&self, id: i64) -> Result<Option<Test>, AppError> {
        let row = sqlx::query_as::<_, TestRow>(
            r#"
            SELECT
                id, name, description, exam_type_id, subject_id,
                duration, total_questions, question_ids
            FROM tests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Test::try_from).transpose()
    }

    async fn get_questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT
                id, text, options, correct_option, explanation,
                topic_id, difficulty_level, diagram
            FROM questions
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(order_by_ids(ids, convert_all(rows)?))
    }

    async fn insert_attempt(&self, new: NewAttempt) -> Result<Attempt, AppError> {
        let answers: Vec<Option<u32>> = vec![None; new.total_questions as usize];

        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO test_attempts (user_id, test_id, start_time, answers, marked_for_review, time_spent)
            VALUES ($1, $2, $3, $4, '[]'::JSONB, 0)
            RETURNING
                id, user_id, test_id, start_time, end_time, is_completed,
                answers, marked_for_review, time_spent, score
            "#,
        )
        .bind(new.user_id)
        .bind(new.test_id)
        .bind(new.start_time)
        .bind(Json(answers))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert test attempt: {:?}", e);
            AppError::from(e)
        })?;

        Attempt::try_from(row)
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT
                id, user_id, test_id, start_time, end_time, is_completed,
                answers, marked_for_review, time_spent, score
            FROM test_attempts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn list_attempts(&self, user_id: i64) -> Result<Vec<Attempt>, AppError> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT
                id, user_id, test_id, start_time, end_time, is_completed,
                answers, marked_for_review, time_spent, score
            FROM test_attempts
            WHERE user_id = $1
            ORDER BY start_time DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn find_active_attempt(
        &self,
        user_id: i64,
        test_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT
                id, user_id, test_id, start_time, end_time, is_completed,
                answers, marked_for_review, time_spent, score
            FROM test_attempts
            WHERE user_id = $1 AND test_id = $2 AND is_completed = FALSE
            ORDER BY start_time DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn update_active_attempt(
        &self,
        id: i64,
        patch: &AttemptPatch,
    ) -> Result<Option<Attempt>, AppError> {
        let time_spent = patch.time_spent.map(to_db_int).transpose()?;

        // Single conditional write: a completed row is never touched.
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE test_attempts SET
                answers = COALESCE($2, answers),
                marked_for_review = COALESCE($3, marked_for_review),
                time_spent = GREATEST(time_spent, COALESCE($4, time_spent))
            WHERE id = $1 AND is_completed = FALSE
            RETURNING
                id, user_id, test_id, start_time, end_time, is_completed,
                answers, marked_for_review, time_spent, score
            "#,
        )
        .bind(id)
        .bind(patch.answers.as_ref().map(Json))
        .bind(patch.marked_for_review.as_ref().map(Json))
        .bind(time_spent)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update test attempt {}: {:?}", id, e);
            AppError::from(e)
        })?;

        row.map(Attempt::try_from).transpose()
    }

    async fn complete_attempt(
        &self,
        id: i64,
        completion: &Completion,
    ) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE test_attempts SET
                answers = $2,
                marked_for_review = $3,
                time_spent = GREATEST(time_spent, $4),
                end_time = $5,
                is_completed = TRUE,
                score = $6
            WHERE id = $1 AND is_completed = FALSE
            RETURNING
                id, user_id, test_id, start_time, end_time, is_completed,
                answers, marked_for_review, time_spent, score
            "#,
        )
        .bind(id)
        .bind(Json(&completion.answers))
        .bind(Json(&completion.marked_for_review))
        .bind(to_db_int(completion.time_spent)?)
        .bind(completion.end_time)
        .bind(completion.score)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to complete test attempt {}: {:?}", id, e);
            AppError::from(e)
        })?;

        row.map(Attempt::try_from).transpose()
    }

    async fn backfill_score(&self, id: i64, score: i32) -> Result<Option<Attempt>, AppError> {
        let updated = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE test_attempts SET
                score = $2,
                end_time = COALESCE(end_time, NOW())
            WHERE id = $1 AND is_completed = TRUE AND score IS NULL
            RETURNING
                id, user_id, test_id, start_time, end_time, is_completed,
                answers, marked_for_review, time_spent, score
            "#,
        )
        .bind(id)
        .bind(score)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Attempt::try_from(row).map(Some),
            None => self.get_attempt(id).await,
        }
    }
}
