// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Exam lifecycle status. Transitions are one-way:
/// draft -> published -> closed, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "exam_status", rename_all = "snake_case")]
pub enum ExamStatus {
    Draft,
    Published,
    Closed,
}

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub class_id: i64,
    pub course_id: Option<i64>,
    pub teacher_id: i64,
    pub total_points: f64,
    pub pass_score: f64,
    pub duration_minutes: i32,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    /// When true, correct answers are visible in results even before grading.
    pub show_answers_after: bool,
    /// Proctoring flags are recorded and echoed to clients; no enforcement
    /// logic exists server-side.
    pub require_webcam: bool,
    pub prevent_tab_switch: bool,
    pub max_attempts: i32,
    pub status: ExamStatus,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating an exam. Defaults mirror the platform conventions:
/// 100 total points, 60 to pass, a single attempt, no shuffling.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub class_id: i64,
    pub course_id: Option<i64>,
    #[validate(range(min = 0.0))]
    pub total_points: Option<f64>,
    #[validate(range(min = 0.0))]
    pub pass_score: Option<f64>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: i32,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub shuffle_questions: Option<bool>,
    pub shuffle_options: Option<bool>,
    pub show_answers_after: Option<bool>,
    pub require_webcam: Option<bool>,
    pub prevent_tab_switch: Option<bool>,
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: Option<i32>,
}

/// DTO for updating a draft exam. Fields are optional.
/// Rejected entirely once the exam leaves draft status.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub total_points: Option<f64>,
    #[validate(range(min = 0.0))]
    pub pass_score: Option<f64>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i32>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub shuffle_questions: Option<bool>,
    pub shuffle_options: Option<bool>,
    pub show_answers_after: Option<bool>,
    pub require_webcam: Option<bool>,
    pub prevent_tab_switch: Option<bool>,
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: Option<i32>,
}

/// Exam row joined with question/attempt counts for the teacher listing.
#[derive(Debug, Serialize, FromRow)]
pub struct ExamWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub exam: Exam,
    pub questions_count: i64,
    pub attempts_count: i64,
}
