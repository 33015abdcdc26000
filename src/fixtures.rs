// src/fixtures.rs

//! Catalog builder for tests and the in-memory demo mode.
//! Production data comes from the question bank, never from here.

use crate::{
    error::AppError,
    models::{
        catalog::{ExamType, Subject, Topic},
        question::Question,
        test::Test,
    },
    store::MemoryStore,
};

/// Answer key of the ten-question physics demo test.
pub const PHYSICS_KEYS: [u32; 10] = [2, 2, 2, 2, 0, 1, 1, 1, 1, 0];

/// Answer key of the five-question chemistry demo test.
pub const CHEMISTRY_KEYS: [u32; 5] = [0, 1, 2, 3, 0];

/// Inserts catalog records into a `MemoryStore`, handing out ids per table.
pub struct CatalogBuilder<'a> {
    store: &'a MemoryStore,
    next_exam_type: i64,
    next_subject: i64,
    next_topic: i64,
    next_question: i64,
    next_test: i64,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            next_exam_type: 1,
            next_subject: 1,
            next_topic: 1,
            next_question: 1,
            next_test: 1,
        }
    }

    pub fn exam_type(&mut self, name: &str) -> Result<i64, AppError> {
        let id = bump(&mut self.next_exam_type);
        self.store.put_exam_type(ExamType {
            id,
            name: name.to_string(),
            description: format!("{} mock examinations", name),
            icon: "exam".to_string(),
        })?;
        Ok(id)
    }

    pub fn subject(&mut self, exam_type_id: i64, name: &str) -> Result<i64, AppError> {
        let id = bump(&mut self.next_subject);
        self.store.put_subject(Subject {
            id,
            name: name.to_string(),
            icon: name.to_lowercase(),
            exam_type_id,
        })?;
        Ok(id)
    }

    pub fn topic(&mut self, subject_id: i64, name: &str) -> Result<i64, AppError> {
        let id = bump(&mut self.next_topic);
        self.store.put_topic(Topic {
            id,
            name: name.to_string(),
            subject_id,
        })?;
        Ok(id)
    }

    /// A four-option question whose correct answer is `correct_option`.
    pub fn question(&mut self, topic_id: i64, correct_option: u32) -> Result<i64, AppError> {
        let id = bump(&mut self.next_question);
        self.store.put_question(Question {
            id,
            text: format!("Question {}", id),
            options: ["A", "B", "C", "D"].iter().map(|o| format!("Option {}", o)).collect(),
            correct_option,
            explanation: format!("Option {} is correct.", correct_option),
            topic_id,
            difficulty_level: (id % 3 + 1) as i32,
            diagram: None,
        })?;
        Ok(id)
    }

    pub fn questions(&mut self, topic_id: i64, keys: &[u32]) -> Result<Vec<i64>, AppError> {
        keys.iter().map(|&k| self.question(topic_id, k)).collect()
    }

    pub fn test_with_questions(
        &mut self,
        exam_type_id: i64,
        subject_id: Option<i64>,
        duration: u32,
        question_ids: Vec<i64>,
    ) -> Result<i64, AppError> {
        let id = bump(&mut self.next_test);
        self.store.put_test(Test {
            id,
            name: format!("Mock Test {}", id),
            description: format!("{} question mock test", question_ids.len()),
            exam_type_id,
            subject_id,
            duration,
            total_questions: question_ids.len() as u32,
            question_ids,
        })?;
        Ok(id)
    }

    /// Creates one question per key under `topic_id` and a test over them.
    pub fn test(
        &mut self,
        exam_type_id: i64,
        subject_id: Option<i64>,
        topic_id: i64,
        duration: u32,
        keys: &[u32],
    ) -> Result<i64, AppError> {
        let ids = self.questions(topic_id, keys)?;
        self.test_with_questions(exam_type_id, subject_id, duration, ids)
    }
}

fn bump(counter: &mut i64) -> i64 {
    let id = *counter;
    *counter += 1;
    id
}

/// Ids of the demo catalog.
#[derive(Debug, Clone, Copy)]
pub struct DemoCatalog {
    pub exam_type: i64,
    pub physics: i64,
    pub chemistry: i64,
    pub newton_topic: i64,
    pub gravitation_topic: i64,
    pub bonding_topic: i64,
    /// 10 questions, 30 minutes, keys `PHYSICS_KEYS`; first five on Newton's laws.
    pub physics_test: i64,
    /// 5 questions, 15 minutes, keys `CHEMISTRY_KEYS`.
    pub chemistry_test: i64,
    /// 3 questions, 10 minutes, no subject.
    pub general_test: i64,
}

/// Small catalog: one exam type, two subjects, three tests.
pub fn demo_catalog(store: &MemoryStore) -> Result<DemoCatalog, AppError> {
    let mut b = CatalogBuilder::new(store);

    let exam_type = b.exam_type("JEE Main")?;
    let physics = b.subject(exam_type, "Physics")?;
    let chemistry = b.subject(exam_type, "Chemistry")?;
    let newton_topic = b.topic(physics, "Newton's Laws of Motion")?;
    let gravitation_topic = b.topic(physics, "Gravitation")?;
    let bonding_topic = b.topic(chemistry, "Chemical Bonding")?;

    let mut physics_questions = b.questions(newton_topic, &PHYSICS_KEYS[..5])?;
    physics_questions.extend(b.questions(gravitation_topic, &PHYSICS_KEYS[5..])?);
    let physics_test = b.test_with_questions(exam_type, Some(physics), 30, physics_questions)?;

    let chemistry_test = b.test(exam_type, Some(chemistry), bonding_topic, 15, &CHEMISTRY_KEYS)?;
    let general_test = b.test(exam_type, None, newton_topic, 10, &[1, 1, 1])?;

    Ok(DemoCatalog {
        exam_type,
        physics,
        chemistry,
        newton_topic,
        gravitation_topic,
        bonding_topic,
        physics_test,
        chemistry_test,
        general_test,
    })
}
