// src/models/catalog.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'exam_types' table (e.g. "JEE Main", "NEET").
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamType {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Icon identifier rendered by the client.
    pub icon: String,
}

/// Represents the 'subjects' table. Every subject belongs to one exam type.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub exam_type_id: i64,
}

/// Represents the 'topics' table. Questions reference a topic.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub subject_id: i64,
}

/// Query parameters for `GET /api/subjects`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectListParams {
    pub exam_type_id: Option<i64>,
}
