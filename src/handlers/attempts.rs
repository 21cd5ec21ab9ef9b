// src/handlers/attempts.rs
//
// Student-side attempt scheduling: the categorized exam listing, admission
// into a timed attempt (window + retake cap), and incremental answer saves.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, prelude::FromRow};

use crate::{
    error::AppError,
    handlers::exams::{EXAM_COLUMNS, QUESTION_COLUMNS},
    models::{
        attempt::{Attempt, AttemptStatus, SaveAnswerRequest},
        exam::{Exam, ExamStatus},
        question::{PublicQuestion, Question, QuestionType},
    },
    utils::jwt::Claims,
};

/// Wall-clock bucket for the student exam listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExamBucket {
    Upcoming,
    Ongoing,
    Completed,
}

/// Buckets an exam for a student. A graded latest attempt or an elapsed
/// window means completed, and that check wins over the window checks, so
/// unattempted exams past their end_time land in completed too.
pub(crate) fn categorize(
    now: chrono::DateTime<chrono::Utc>,
    start_time: chrono::DateTime<chrono::Utc>,
    end_time: chrono::DateTime<chrono::Utc>,
    latest_attempt: Option<AttemptStatus>,
) -> ExamBucket {
    if latest_attempt == Some(AttemptStatus::Graded) || now > end_time {
        ExamBucket::Completed
    } else if now < start_time {
        ExamBucket::Upcoming
    } else {
        ExamBucket::Ongoing
    }
}

/// Summary of the student's most recent attempt, joined into the listing.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttemptSummary {
    pub exam_id: i64,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub total_score: Option<f64>,
    pub submit_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StudentExamEntry {
    #[serde(flatten)]
    pub exam: Exam,
    pub my_attempt: Option<AttemptSummary>,
}

#[derive(Debug, Deserialize)]
pub struct MyExamsQuery {
    pub class_id: Option<i64>,
}

/// Lists published exams in the student's active classes, partitioned into
/// upcoming / ongoing / completed.
pub async fn my_exams(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<MyExamsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let my_classes: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT class_id FROM class_members
        WHERE user_id = $1 AND role = 'student' AND status = 'active'
        "#,
    )
    .bind(student_id)
    .fetch_all(&pool)
    .await?;

    let class_ids: Vec<i64> = match filter.class_id {
        Some(id) => my_classes.into_iter().filter(|c| *c == id).collect(),
        None => my_classes,
    };

    if class_ids.is_empty() {
        return Ok(Json(json!({
            "success": true,
            "data": { "upcoming": [], "ongoing": [], "completed": [] }
        })));
    }

    let exams = sqlx::query_as::<_, Exam>(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams \
         WHERE class_id = ANY($1) AND status = 'published' \
         ORDER BY start_time ASC"
    ))
    .bind(&class_ids)
    .fetch_all(&pool)
    .await?;

    let exam_ids: Vec<i64> = exams.iter().map(|e| e.id).collect();

    // Latest attempt per exam for this student.
    let latest: Vec<AttemptSummary> = sqlx::query_as(
        r#"
        SELECT DISTINCT ON (exam_id)
            exam_id, attempt_number, status, total_score, submit_time
        FROM exam_attempts
        WHERE student_id = $1 AND exam_id = ANY($2)
        ORDER BY exam_id, attempt_number DESC
        "#,
    )
    .bind(student_id)
    .bind(&exam_ids)
    .fetch_all(&pool)
    .await?;

    let now = chrono::Utc::now();
    let mut upcoming = Vec::new();
    let mut ongoing = Vec::new();
    let mut completed = Vec::new();

    for exam in exams {
        let my_attempt = latest.iter().find(|a| a.exam_id == exam.id).cloned();
        let bucket = categorize(
            now,
            exam.start_time,
            exam.end_time,
            my_attempt.as_ref().map(|a| a.status),
        );
        let entry = StudentExamEntry { exam, my_attempt };
        match bucket {
            ExamBucket::Upcoming => upcoming.push(entry),
            ExamBucket::Ongoing => ongoing.push(entry),
            ExamBucket::Completed => completed.push(entry),
        }
    }

    Ok(Json(json!({
        "success": true,
        "data": {
            "upcoming": upcoming,
            "ongoing": ongoing,
            "completed": completed
        }
    })))
}

/// Applies the exam's shuffle flags: a uniform permutation of the question
/// sequence, and an independent uniform permutation of each option list.
pub(crate) fn shuffle_questions(
    questions: &mut Vec<Question>,
    shuffle_question_order: bool,
    shuffle_option_order: bool,
) {
    let mut rng = rand::thread_rng();

    if shuffle_question_order {
        questions.shuffle(&mut rng);
    }

    if shuffle_option_order {
        for question in questions.iter_mut() {
            question.options.0.shuffle(&mut rng);
        }
    }
}

/// Starts a new attempt for the caller.
///
/// Admission requires: exam published, now inside [start_time, end_time],
/// attempt cap not reached. The attempt number is the successor of the
/// caller's highest prior number; a unique constraint on
/// (exam_id, student_id, attempt_number) serializes concurrent starts, and
/// the loser gets a 409 telling it to retry.
///
/// The returned question payload never contains correct answers or
/// explanations.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let exam = sqlx::query_as::<_, Exam>(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1"
    ))
    .bind(exam_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    if exam.status != ExamStatus::Published {
        return Err(AppError::InvalidState("Exam is not open".to_string()));
    }

    let now = chrono::Utc::now();
    if now < exam.start_time {
        return Err(AppError::InvalidState(
            "Exam has not started yet".to_string(),
        ));
    }
    if now > exam.end_time {
        return Err(AppError::InvalidState("Exam has ended".to_string()));
    }

    let max_attempt: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(attempt_number), 0) FROM exam_attempts \
         WHERE exam_id = $1 AND student_id = $2",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_one(&pool)
    .await?;

    let attempt_number = max_attempt + 1;
    if attempt_number > exam.max_attempts {
        return Err(AppError::LimitExceeded(format!(
            "Maximum number of attempts reached ({})",
            exam.max_attempts
        )));
    }

    let mut questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM exam_questions \
         WHERE exam_id = $1 ORDER BY question_order ASC"
    ))
    .bind(exam_id)
    .fetch_all(&pool)
    .await?;

    shuffle_questions(&mut questions, exam.shuffle_questions, exam.shuffle_options);

    let attempt = sqlx::query_as::<_, Attempt>(
        r#"
        INSERT INTO exam_attempts (exam_id, student_id, attempt_number, start_time, status, answers)
        VALUES ($1, $2, $3, $4, 'in_progress', '{}'::jsonb)
        RETURNING id, exam_id, student_id, attempt_number, start_time, submit_time, status,
                  answers, objective_score, total_score, is_passed, auto_graded, graded_by, graded_at
        "#,
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(attempt_number)
    .bind(now)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            AppError::Conflict(
                "Another attempt was started concurrently; please retry".to_string(),
            )
        } else {
            tracing::error!("Failed to create attempt: {:?}", e);
            AppError::from(e)
        }
    })?;

    let public: Vec<PublicQuestion> = questions.into_iter().map(PublicQuestion::from).collect();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Exam started",
            "data": {
                "attempt": attempt,
                "questions": public
            }
        })),
    ))
}

/// Saves one answer into an in-progress attempt.
///
/// Last write wins per question id; re-saving overwrites, never duplicates.
/// The answer shape is validated against the question type before storage
/// and multi-choice selections are order-normalized.
pub async fn save_answer(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>(
        "SELECT id, exam_id, student_id, attempt_number, start_time, submit_time, status, \
                answers, objective_score, total_score, is_passed, auto_graded, graded_by, graded_at \
         FROM exam_attempts WHERE id = $1",
    )
    .bind(attempt_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.student_id != claims.user_id()? {
        return Err(AppError::PermissionDenied(
            "You do not own this attempt".to_string(),
        ));
    }

    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::InvalidState(
            "Answers can only be saved while the attempt is in progress".to_string(),
        ));
    }

    let question_type: Option<QuestionType> = sqlx::query_scalar(
        "SELECT question_type FROM exam_questions WHERE id = $1 AND exam_id = $2",
    )
    .bind(payload.question_id)
    .bind(attempt.exam_id)
    .fetch_optional(&pool)
    .await?;

    let question_type = question_type
        .ok_or(AppError::NotFound("Question not found in this exam".to_string()))?;

    if !payload.answer.matches_type(question_type) {
        return Err(AppError::BadRequest(format!(
            "Answer shape does not match question type {:?}",
            question_type
        )));
    }

    let normalized = payload.answer.normalized();

    // Single-key jsonb merge: concurrent saves for different questions are
    // commutative, re-saves of the same question overwrite.
    let mut patch = serde_json::Map::new();
    patch.insert(
        payload.question_id.to_string(),
        serde_json::to_value(&normalized)?,
    );

    sqlx::query("UPDATE exam_attempts SET answers = answers || $1::jsonb WHERE id = $2")
        .bind(serde_json::Value::Object(patch))
        .bind(attempt_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save answer: {:?}", e);
            AppError::from(e)
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Answer saved"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{AnswerValue, QuestionOption};
    use chrono::{Duration, Utc};
    use sqlx::types::Json as SqlJson;

    fn window(
        start_offset_min: i64,
        end_offset_min: i64,
    ) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
        let now = Utc::now();
        (
            now + Duration::minutes(start_offset_min),
            now + Duration::minutes(end_offset_min),
        )
    }

    #[test]
    fn graded_attempt_wins_over_open_window() {
        let (start, end) = window(-30, 30);
        let bucket = categorize(Utc::now(), start, end, Some(AttemptStatus::Graded));
        assert_eq!(bucket, ExamBucket::Completed);
    }

    #[test]
    fn elapsed_window_is_completed_even_without_attempt() {
        let (start, end) = window(-120, -60);
        assert_eq!(categorize(Utc::now(), start, end, None), ExamBucket::Completed);
    }

    #[test]
    fn future_window_is_upcoming() {
        let (start, end) = window(60, 120);
        assert_eq!(categorize(Utc::now(), start, end, None), ExamBucket::Upcoming);
    }

    #[test]
    fn open_window_is_ongoing_for_unfinished_attempts() {
        let (start, end) = window(-30, 30);
        assert_eq!(
            categorize(Utc::now(), start, end, Some(AttemptStatus::InProgress)),
            ExamBucket::Ongoing
        );
        assert_eq!(
            categorize(Utc::now(), start, end, Some(AttemptStatus::Submitted)),
            ExamBucket::Ongoing
        );
    }

    fn sample_question(id: i64, option_count: usize) -> Question {
        let options: Vec<QuestionOption> = (0..option_count)
            .map(|i| QuestionOption {
                id: format!("opt-{id}-{i}"),
                text: format!("Option {i}"),
            })
            .collect();
        Question {
            id,
            exam_id: 1,
            question_order: id as i32,
            question_type: QuestionType::SingleChoice,
            question_text: format!("Question {id}"),
            question_image: None,
            options: SqlJson(options),
            correct_answer: Some(SqlJson(AnswerValue::Choice {
                option_id: format!("opt-{id}-0"),
            })),
            answer_explanation: None,
            points: 10.0,
            difficulty: None,
            tags: SqlJson(vec![]),
            created_at: None,
        }
    }

    #[test]
    fn shuffle_preserves_question_and_option_sets() {
        let mut questions: Vec<Question> = (1..=8).map(|i| sample_question(i, 4)).collect();
        let original_ids: std::collections::HashSet<i64> =
            questions.iter().map(|q| q.id).collect();
        let original_options: std::collections::HashSet<String> = questions
            .iter()
            .flat_map(|q| q.options.0.iter().map(|o| o.id.clone()))
            .collect();

        shuffle_questions(&mut questions, true, true);

        let shuffled_ids: std::collections::HashSet<i64> =
            questions.iter().map(|q| q.id).collect();
        let shuffled_options: std::collections::HashSet<String> = questions
            .iter()
            .flat_map(|q| q.options.0.iter().map(|o| o.id.clone()))
            .collect();

        assert_eq!(original_ids, shuffled_ids);
        assert_eq!(original_options, shuffled_options);
        assert_eq!(questions.len(), 8);
    }

    #[test]
    fn shuffle_flags_off_keep_order() {
        let mut questions: Vec<Question> = (1..=5).map(|i| sample_question(i, 3)).collect();
        let before: Vec<i64> = questions.iter().map(|q| q.id).collect();

        shuffle_questions(&mut questions, false, false);

        let after: Vec<i64> = questions.iter().map(|q| q.id).collect();
        assert_eq!(before, after);
    }
}
