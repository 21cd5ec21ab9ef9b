// src/models/attempt.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use crate::models::question::AnswerValue;

/// Attempt lifecycle status.
///
/// in_progress -> graded           (submit, no subjective questions)
/// in_progress -> submitted -> graded  (submit, then manual grade pass)
///
/// Graded is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Graded,
}

/// Represents the 'exam_attempts' table in the database.
///
/// (exam_id, student_id, attempt_number) is unique; attempt numbers for a
/// given pair are 1-based and strictly increasing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub attempt_number: i32,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub submit_time: Option<chrono::DateTime<chrono::Utc>>,
    pub status: AttemptStatus,
    /// Per-question answers, keyed by question id. Mutated only while the
    /// attempt is in progress; last write wins per key.
    pub answers: Json<HashMap<i64, AnswerValue>>,
    /// Auto-graded points for objective questions, persisted at submit time
    /// so a later manual pass can add to them instead of discarding them.
    pub objective_score: Option<f64>,
    pub total_score: Option<f64>,
    pub is_passed: Option<bool>,
    pub auto_graded: Option<bool>,
    pub graded_by: Option<i64>,
    pub graded_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Attempt row joined with student identity for the teacher listing.
#[derive(Debug, Serialize, FromRow)]
pub struct AttemptWithStudent {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attempt: Attempt,
    pub student_username: String,
}

/// DTO for the incremental answer save.
#[derive(Debug, Deserialize)]
pub struct SaveAnswerRequest {
    pub question_id: i64,
    pub answer: AnswerValue,
}

/// DTO for the manual grading pass: per-question scores for the exam's
/// subjective questions.
#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub question_scores: HashMap<i64, f64>,
}
