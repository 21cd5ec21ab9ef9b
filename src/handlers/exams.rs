// src/handlers/exams.rs
//
// Teacher-side exam definition management: create/configure a draft,
// attach questions, publish, close. Ownership is always checked against
// the class/exam teacher of record.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{AttemptStatus, AttemptWithStudent},
        exam::{CreateExamRequest, Exam, ExamStatus, ExamWithCounts, UpdateExamRequest},
        question::{AddQuestionsRequest, Question},
    },
    utils::{jwt::Claims, notify},
};

pub(crate) const EXAM_COLUMNS: &str = "\
    id, title, description, class_id, course_id, teacher_id, total_points, pass_score, \
    duration_minutes, start_time, end_time, shuffle_questions, shuffle_options, \
    show_answers_after, require_webcam, prevent_tab_switch, max_attempts, status, \
    created_at, updated_at";

pub(crate) const QUESTION_COLUMNS: &str = "\
    id, exam_id, question_order, question_type, question_text, question_image, \
    options, correct_answer, answer_explanation, points, difficulty, tags, created_at";

/// Fetches an exam and verifies the caller owns it.
pub(crate) async fn owned_exam(
    pool: &PgPool,
    exam_id: i64,
    teacher_id: i64,
) -> Result<Exam, AppError> {
    let exam = sqlx::query_as::<_, Exam>(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1"
    ))
    .bind(exam_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    if exam.teacher_id != teacher_id {
        return Err(AppError::PermissionDenied(
            "You do not own this exam".to_string(),
        ));
    }

    Ok(exam)
}

/// Creates an exam in draft status.
///
/// Fails with 403 unless the caller is the teacher of record for the class.
/// Unspecified fields fall back to platform defaults (100 points, 60 to
/// pass, 1 attempt, no shuffling).
pub async fn create_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.end_time <= payload.start_time {
        return Err(AppError::BadRequest(
            "end_time must be after start_time".to_string(),
        ));
    }

    let teacher_id = claims.user_id()?;

    let class_teacher: Option<i64> =
        sqlx::query_scalar("SELECT teacher_id FROM classes WHERE id = $1")
            .bind(payload.class_id)
            .fetch_optional(&pool)
            .await?;

    match class_teacher {
        Some(id) if id == teacher_id => {}
        _ => {
            return Err(AppError::PermissionDenied(
                "You are not the teacher of this class".to_string(),
            ));
        }
    }

    let exam = sqlx::query_as::<_, Exam>(&format!(
        r#"
        INSERT INTO exams
        (title, description, class_id, course_id, teacher_id, total_points, pass_score,
         duration_minutes, start_time, end_time, shuffle_questions, shuffle_options,
         show_answers_after, require_webcam, prevent_tab_switch, max_attempts, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, 'draft')
        RETURNING {EXAM_COLUMNS}
        "#
    ))
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.class_id)
    .bind(payload.course_id)
    .bind(teacher_id)
    .bind(payload.total_points.unwrap_or(100.0))
    .bind(payload.pass_score.unwrap_or(60.0))
    .bind(payload.duration_minutes)
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(payload.shuffle_questions.unwrap_or(false))
    .bind(payload.shuffle_options.unwrap_or(false))
    .bind(payload.show_answers_after.unwrap_or(false))
    .bind(payload.require_webcam.unwrap_or(false))
    .bind(payload.prevent_tab_switch.unwrap_or(false))
    .bind(payload.max_attempts.unwrap_or(1))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create exam: {:?}", e);
        AppError::from(e)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Exam created",
            "data": exam
        })),
    ))
}

/// Updates a draft exam's definition. Timing, duration and scoring become
/// immutable once the exam is published.
pub async fn update_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<UpdateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let exam = owned_exam(&pool, exam_id, claims.user_id()?).await?;

    if exam.status != ExamStatus::Draft {
        return Err(AppError::InvalidState(
            "Only draft exams can be modified".to_string(),
        ));
    }

    let new_start = payload.start_time.unwrap_or(exam.start_time);
    let new_end = payload.end_time.unwrap_or(exam.end_time);
    if new_end <= new_start {
        return Err(AppError::BadRequest(
            "end_time must be after start_time".to_string(),
        ));
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE exams SET ");
    let mut separated = builder.separated(", ");

    macro_rules! push_field {
        ($field:ident, $column:literal) => {
            if let Some(value) = payload.$field {
                separated.push(concat!($column, " = "));
                separated.push_bind_unseparated(value);
            }
        };
    }

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }
    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }
    push_field!(total_points, "total_points");
    push_field!(pass_score, "pass_score");
    push_field!(duration_minutes, "duration_minutes");
    push_field!(start_time, "start_time");
    push_field!(end_time, "end_time");
    push_field!(shuffle_questions, "shuffle_questions");
    push_field!(shuffle_options, "shuffle_options");
    push_field!(show_answers_after, "show_answers_after");
    push_field!(require_webcam, "require_webcam");
    push_field!(prevent_tab_switch, "prevent_tab_switch");
    push_field!(max_attempts, "max_attempts");

    separated.push("updated_at = NOW()");

    builder.push(" WHERE id = ");
    builder.push_bind(exam_id);
    builder.push(&format!(" RETURNING {EXAM_COLUMNS}"));

    let updated = builder
        .build_query_as::<Exam>()
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update exam: {:?}", e);
            AppError::from(e)
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Exam updated",
        "data": updated
    })))
}

/// Appends questions to a draft exam.
///
/// Order indexes default to a 1-based sequence continuing from the current
/// maximum. Option ids are assigned here, once, and never re-derived.
pub async fn add_questions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<AddQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exam = owned_exam(&pool, exam_id, claims.user_id()?).await?;

    if exam.status != ExamStatus::Draft {
        return Err(AppError::InvalidState(
            "Questions can only be added to draft exams".to_string(),
        ));
    }

    if payload.questions.is_empty() {
        return Err(AppError::BadRequest("No questions supplied".to_string()));
    }

    for question in &payload.questions {
        question.validate()?;
    }

    let max_order: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(question_order), 0) FROM exam_questions WHERE exam_id = $1",
    )
    .bind(exam_id)
    .fetch_one(&pool)
    .await?;

    let mut tx = pool.begin().await?;
    let mut inserted = Vec::with_capacity(payload.questions.len());

    for (index, question) in payload.questions.iter().enumerate() {
        let options = question.build_options();
        let correct_answer = question.build_correct_answer(&options)?;
        let order = question
            .question_order
            .unwrap_or(max_order + index as i32 + 1);

        let row = sqlx::query_as::<_, Question>(&format!(
            r#"
            INSERT INTO exam_questions
            (exam_id, question_order, question_type, question_text, question_image,
             options, correct_answer, answer_explanation, points, difficulty, tags)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {QUESTION_COLUMNS}
            "#
        ))
        .bind(exam_id)
        .bind(order)
        .bind(question.question_type)
        .bind(&question.question_text)
        .bind(&question.question_image)
        .bind(SqlJson(&options))
        .bind(correct_answer.map(SqlJson))
        .bind(&question.answer_explanation)
        .bind(question.points)
        .bind(&question.difficulty)
        .bind(SqlJson(&question.tags))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert question: {:?}", e);
            AppError::from(e)
        })?;

        inserted.push(row);
    }

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("Added {} questions", inserted.len()),
            "data": inserted
        })),
    ))
}

/// Publishes a draft exam and notifies every active student in the class.
///
/// Fails if the question set is empty or the exam already left draft.
pub async fn publish_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = owned_exam(&pool, exam_id, claims.user_id()?).await?;

    if exam.status != ExamStatus::Draft {
        return Err(AppError::InvalidState(
            "Only draft exams can be published".to_string(),
        ));
    }

    let question_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM exam_questions WHERE exam_id = $1")
            .bind(exam_id)
            .fetch_one(&pool)
            .await?;

    if question_count == 0 {
        return Err(AppError::InvalidState(
            "Add questions before publishing".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams SET status = 'published', updated_at = NOW() WHERE id = $1 \
         RETURNING {EXAM_COLUMNS}"
    ))
    .bind(exam_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to publish exam: {:?}", e);
        AppError::from(e)
    })?;

    let students: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT user_id FROM class_members
        WHERE class_id = $1 AND role = 'student' AND status = 'active'
        "#,
    )
    .bind(exam.class_id)
    .fetch_all(&pool)
    .await?;

    notify::notify_many(
        &pool,
        &students,
        "exam_upcoming",
        &format!("New exam: {}", updated.title),
        &format!("Starts at {}", updated.start_time.to_rfc3339()),
        Some(exam_id),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Exam published",
        "data": updated
    })))
}

/// Closes a published exam, hiding it from student listings.
pub async fn close_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = owned_exam(&pool, exam_id, claims.user_id()?).await?;

    if exam.status != ExamStatus::Published {
        return Err(AppError::InvalidState(
            "Only published exams can be closed".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams SET status = 'closed', updated_at = NOW() WHERE id = $1 \
         RETURNING {EXAM_COLUMNS}"
    ))
    .bind(exam_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Exam closed",
        "data": updated
    })))
}

#[derive(Debug, Deserialize)]
pub struct ExamListQuery {
    pub status: Option<ExamStatus>,
}

/// Lists a class's exams with question/attempt counts (teacher view).
pub async fn list_class_exams(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<i64>,
    Query(filter): Query<ExamListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.user_id()?;

    let class_teacher: Option<i64> =
        sqlx::query_scalar("SELECT teacher_id FROM classes WHERE id = $1")
            .bind(class_id)
            .fetch_optional(&pool)
            .await?;

    match class_teacher {
        Some(id) if id == teacher_id => {}
        Some(_) => {
            return Err(AppError::PermissionDenied(
                "You are not the teacher of this class".to_string(),
            ));
        }
        None => return Err(AppError::NotFound("Class not found".to_string())),
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {EXAM_COLUMNS},
            (SELECT COUNT(*) FROM exam_questions q WHERE q.exam_id = exams.id) AS questions_count,
            (SELECT COUNT(*) FROM exam_attempts a WHERE a.exam_id = exams.id) AS attempts_count
         FROM exams WHERE class_id = "
    ));
    builder.push_bind(class_id);

    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY created_at DESC");

    let exams = builder
        .build_query_as::<ExamWithCounts>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list class exams: {:?}", e);
            AppError::from(e)
        })?;

    Ok(Json(json!({
        "success": true,
        "data": exams
    })))
}

/// Full exam detail with questions, grading keys included (teacher view).
pub async fn exam_detail(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = owned_exam(&pool, exam_id, claims.user_id()?).await?;

    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM exam_questions \
         WHERE exam_id = $1 ORDER BY question_order ASC"
    ))
    .bind(exam_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "exam": exam,
            "questions": questions
        }
    })))
}

#[derive(Debug, Deserialize)]
pub struct AttemptListQuery {
    pub status: Option<AttemptStatus>,
}

/// Lists an exam's attempts with student identity (teacher view).
pub async fn list_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Query(filter): Query<AttemptListQuery>,
) -> Result<impl IntoResponse, AppError> {
    owned_exam(&pool, exam_id, claims.user_id()?).await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT a.id, a.exam_id, a.student_id, a.attempt_number, a.start_time, a.submit_time,
                a.status, a.answers, a.objective_score, a.total_score, a.is_passed,
                a.auto_graded, a.graded_by, a.graded_at,
                u.username AS student_username
         FROM exam_attempts a
         JOIN users u ON u.id = a.student_id
         WHERE a.exam_id = ",
    );
    builder.push_bind(exam_id);

    if let Some(status) = filter.status {
        builder.push(" AND a.status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY a.submit_time DESC NULLS LAST, a.start_time DESC");

    let attempts = builder
        .build_query_as::<AttemptWithStudent>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list attempts: {:?}", e);
            AppError::from(e)
        })?;

    Ok(Json(json!({
        "success": true,
        "data": attempts
    })))
}
