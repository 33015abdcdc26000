// src/models/analytics.rs

use serde::{Deserialize, Serialize};

use crate::models::{attempt::Attempt, test::Test};

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub tests_taken: u32,
    pub avg_score: f64,
    /// Completed attempts as a percentage of all attempts.
    pub completion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub name: String,
    pub icon: String,
    pub accuracy: f64,
    /// Share of the user's completed attempts that fall in this subject.
    pub completion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicPerformance {
    pub name: String,
    pub correct: u32,
    pub total: u32,
    pub percentage: f64,
    /// Minutes, apportioned evenly from attempt-level time.
    pub time_spent: u32,
}

/// An attempt joined with its test.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    #[serde(flatten)]
    pub attempt: Attempt,
    pub test: Test,
}

/// Query parameters for list-style analytics endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

/// Query parameters for `GET /api/users/{id}/topic-performance`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicParams {
    pub subject_id: Option<i64>,
}
