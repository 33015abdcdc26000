// src/services/catalog.rs

use crate::{
    error::AppError,
    models::{
        question::{PublicQuestion, Question},
        test::{Test, TestDetail},
    },
    services::sanitizer,
    store::Store,
};

/// Loads a test or fails with `NotFound`.
pub async fn require_test(store: &dyn Store, test_id: i64) -> Result<Test, AppError> {
    store
        .get_test(test_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Test {} not found", test_id)))
}

/// Test descriptor with exam type name, subject name and section breakdown.
pub async fn test_detail(store: &dyn Store, test_id: i64) -> Result<TestDetail, AppError> {
    let test = require_test(store, test_id).await?;

    let exam_type_name = store
        .get_exam_type(test.exam_type_id)
        .await?
        .map(|e| e.name);
    let subject_name = match test.subject_id {
        Some(id) => store.get_subject(id).await?.map(|s| s.name),
        None => None,
    };

    Ok(TestDetail::new(test, exam_type_name, subject_name))
}

/// Full ordered question list of `test`, answer key included.
///
/// Fails with `Internal` if the test breaks its size invariant or references
/// a question the bank does not have.
pub async fn questions_for_test(store: &dyn Store, test: &Test) -> Result<Vec<Question>, AppError> {
    test.check_integrity()?;

    let questions = store.get_questions_by_ids(&test.question_ids).await?;
    if questions.len() != test.question_ids.len() {
        tracing::error!(
            "Test {} references {} questions, only {} found",
            test.id,
            test.question_ids.len(),
            questions.len()
        );
        return Err(AppError::Internal(format!(
            "test {} references missing questions",
            test.id
        )));
    }

    Ok(questions)
}

/// Ordered question list for taking the test. Never carries the answer key.
pub async fn public_questions(
    store: &dyn Store,
    test_id: i64,
) -> Result<Vec<PublicQuestion>, AppError> {
    let test = require_test(store, test_id).await?;
    if test.question_ids.is_empty() {
        return Err(AppError::NotFound(format!(
            "No questions found for test {}",
            test_id
        )));
    }

    let questions = questions_for_test(store, &test).await?;
    Ok(sanitizer::sanitize_all(questions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{CatalogBuilder, demo_catalog};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_public_questions_keep_test_order() {
        let store = MemoryStore::new();
        let mut catalog = CatalogBuilder::new(&store);
        let exam = catalog.exam_type("JEE Main").unwrap();
        let subject = catalog.subject(exam, "Physics").unwrap();
        let topic = catalog.topic(subject, "Kinematics").unwrap();
        let q1 = catalog.question(topic, 0).unwrap();
        let q2 = catalog.question(topic, 1).unwrap();
        let test_id = catalog
            .test_with_questions(exam, Some(subject), 10, vec![q2, q1])
            .unwrap();

        let questions = public_questions(&store, test_id).await.unwrap();
        let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![q2, q1]);
    }

    #[tokio::test]
    async fn test_missing_question_is_internal() {
        let store = MemoryStore::new();
        let mut catalog = CatalogBuilder::new(&store);
        let exam = catalog.exam_type("NEET").unwrap();
        let test_id = catalog
            .test_with_questions(exam, None, 10, vec![999])
            .unwrap();

        let err = public_questions(&store, test_id).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_detail_names_subject() {
        let store = MemoryStore::new();
        let demo = demo_catalog(&store).unwrap();

        let detail = test_detail(&store, demo.physics_test).await.unwrap();
        assert_eq!(detail.exam_type_name, "JEE Main");
        assert_eq!(detail.subject_name, "Physics");
        assert_eq!(detail.sections[0].question_count, 10);

        let err = test_detail(&store, 4242).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
