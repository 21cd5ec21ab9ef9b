// src/handlers/grading.rs
//
// Attempt finalization: objective auto-grading at submit time, the manual
// grading pass for subjective questions, and the student-facing result view.

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    handlers::exams::{EXAM_COLUMNS, QUESTION_COLUMNS},
    models::{
        attempt::{Attempt, AttemptStatus, GradeRequest},
        exam::Exam,
        question::{AnswerValue, PublicQuestion, Question},
    },
    utils::{jwt::Claims, notify},
};

const ATTEMPT_COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, start_time, submit_time, status, answers, \
    objective_score, total_score, is_passed, auto_graded, graded_by, graded_at";

/// Result of the objective auto-grading pass.
#[derive(Debug, PartialEq)]
pub(crate) struct AutoGrade {
    pub objective_score: f64,
    pub needs_manual: bool,
}

/// Scores every objective question by structural equality between the
/// normalized submitted answer and the stored key; the full point value is
/// awarded on match, nothing otherwise. Any subjective question flags the
/// attempt for a manual pass.
///
/// Pure over its inputs: re-running on the same answer map always yields
/// the same score.
pub(crate) fn auto_grade(
    questions: &[Question],
    answers: &HashMap<i64, AnswerValue>,
) -> AutoGrade {
    let mut objective_score = 0.0;
    let mut needs_manual = false;

    for question in questions {
        if !question.question_type.is_objective() {
            needs_manual = true;
            continue;
        }

        let Some(correct) = &question.correct_answer else {
            continue;
        };

        if let Some(submitted) = answers.get(&question.id) {
            let submitted = submitted.clone().normalized();
            let correct = correct.0.clone().normalized();
            if submitted == correct {
                objective_score += question.points;
            }
        }
    }

    AutoGrade {
        objective_score,
        needs_manual,
    }
}

/// Pass/fail decision. Scoring exactly pass_score counts as a pass.
pub(crate) fn is_passing(total_score: f64, pass_score: f64) -> bool {
    total_score >= pass_score
}

async fn fetch_attempt(pool: &PgPool, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts WHERE id = $1"
    ))
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?;
    Ok(attempt)
}

async fn fetch_exam(pool: &PgPool, exam_id: i64) -> Result<Exam, AppError> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1"))
        .bind(exam_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::from)
}

async fn fetch_questions(pool: &PgPool, exam_id: i64) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM exam_questions \
         WHERE exam_id = $1 ORDER BY question_order ASC"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await?;
    Ok(questions)
}

/// Submits an in-progress attempt.
///
/// Objective questions are auto-graded immediately. If nothing needs a
/// manual pass the attempt goes straight to graded with pass/fail decided
/// against the exam's pass_score (equality counts as a pass); otherwise it
/// parks in submitted with the objective score persisted for the grader.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    // Not-owned reads as not-found: students cannot probe other attempts.
    let attempt = fetch_attempt(&pool, attempt_id)
        .await?
        .filter(|a| a.student_id == student_id)
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::InvalidState(
            "Attempt has already been submitted".to_string(),
        ));
    }

    let exam = fetch_exam(&pool, attempt.exam_id).await?;
    let questions = fetch_questions(&pool, attempt.exam_id).await?;

    let grade = auto_grade(&questions, &attempt.answers.0);
    let now = chrono::Utc::now();

    let updated = if grade.needs_manual {
        sqlx::query_as::<_, Attempt>(&format!(
            r#"
            UPDATE exam_attempts
            SET submit_time = $1, status = 'submitted', auto_graded = FALSE,
                objective_score = $2
            WHERE id = $3
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(grade.objective_score)
        .bind(attempt_id)
        .fetch_one(&pool)
        .await?
    } else {
        let is_passed = is_passing(grade.objective_score, exam.pass_score);
        sqlx::query_as::<_, Attempt>(&format!(
            r#"
            UPDATE exam_attempts
            SET submit_time = $1, status = 'graded', auto_graded = TRUE,
                objective_score = $2, total_score = $2, is_passed = $3, graded_at = $1
            WHERE id = $4
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(grade.objective_score)
        .bind(is_passed)
        .bind(attempt_id)
        .fetch_one(&pool)
        .await?
    };

    let message = if grade.needs_manual {
        "Submitted; awaiting manual grading"
    } else {
        "Submitted and auto-graded"
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "data": updated
    })))
}

/// Manual grading pass for an exam's subjective questions.
///
/// Only the owning exam's teacher may grade, only submitted attempts are
/// gradable, and supplied scores must target subjective questions within
/// their point range. The final total adds the manual scores to the
/// objective score persisted at submit time.
pub async fn grade_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<GradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_attempt(&pool, attempt_id)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    let exam = fetch_exam(&pool, attempt.exam_id).await?;

    if exam.teacher_id != claims.user_id()? {
        return Err(AppError::PermissionDenied(
            "You do not own this attempt's exam".to_string(),
        ));
    }

    match attempt.status {
        AttemptStatus::Submitted => {}
        AttemptStatus::InProgress => {
            return Err(AppError::InvalidState(
                "Attempt has not been submitted yet".to_string(),
            ));
        }
        AttemptStatus::Graded => {
            return Err(AppError::InvalidState(
                "Attempt has already been graded".to_string(),
            ));
        }
    }

    let questions = fetch_questions(&pool, attempt.exam_id).await?;
    let subjective: HashMap<i64, f64> = questions
        .iter()
        .filter(|q| !q.question_type.is_objective())
        .map(|q| (q.id, q.points))
        .collect();

    for (question_id, score) in &payload.question_scores {
        let Some(max_points) = subjective.get(question_id) else {
            return Err(AppError::BadRequest(format!(
                "Question {} is not a subjective question of this exam",
                question_id
            )));
        };
        if *score < 0.0 || *score > *max_points {
            return Err(AppError::BadRequest(format!(
                "Score for question {} must be between 0 and {}",
                question_id, max_points
            )));
        }
    }

    let manual_total: f64 = payload.question_scores.values().sum();
    let total_score = attempt.objective_score.unwrap_or(0.0) + manual_total;
    let is_passed = is_passing(total_score, exam.pass_score);
    let now = chrono::Utc::now();

    let updated = sqlx::query_as::<_, Attempt>(&format!(
        r#"
        UPDATE exam_attempts
        SET status = 'graded', total_score = $1, is_passed = $2,
            graded_by = $3, graded_at = $4
        WHERE id = $5
        RETURNING {ATTEMPT_COLUMNS}
        "#
    ))
    .bind(total_score)
    .bind(is_passed)
    .bind(claims.user_id()?)
    .bind(now)
    .bind(attempt_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to grade attempt: {:?}", e);
        AppError::from(e)
    })?;

    notify::notify(
        &pool,
        attempt.student_id,
        "grade_released",
        "Exam graded",
        &format!("Your exam \"{}\" was graded: {}", exam.title, total_score),
        Some(attempt.exam_id),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Grading complete",
        "data": updated
    })))
}

/// Student-facing result view: the attempt joined with its exam and
/// questions. Correct answers and explanations are stripped unless the
/// exam reveals answers or the attempt is fully graded.
pub async fn get_result(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_attempt(&pool, attempt_id)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.student_id != claims.user_id()? {
        return Err(AppError::PermissionDenied(
            "You do not own this attempt".to_string(),
        ));
    }

    let exam = fetch_exam(&pool, attempt.exam_id).await?;
    let questions = fetch_questions(&pool, attempt.exam_id).await?;

    let reveal_answers = exam.show_answers_after || attempt.status == AttemptStatus::Graded;

    let questions_json = if reveal_answers {
        serde_json::to_value(&questions)?
    } else {
        let public: Vec<PublicQuestion> =
            questions.into_iter().map(PublicQuestion::from).collect();
        serde_json::to_value(&public)?
    };

    Ok(Json(json!({
        "success": true,
        "data": {
            "attempt": attempt,
            "exam": exam,
            "questions": questions_json
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{QuestionOption, QuestionType};
    use sqlx::types::Json as SqlJson;

    fn question(
        id: i64,
        question_type: QuestionType,
        points: f64,
        correct: Option<AnswerValue>,
    ) -> Question {
        Question {
            id,
            exam_id: 1,
            question_order: id as i32,
            question_type,
            question_text: format!("Q{id}"),
            question_image: None,
            options: SqlJson(vec![
                QuestionOption {
                    id: format!("q{id}-a"),
                    text: "A".into(),
                },
                QuestionOption {
                    id: format!("q{id}-b"),
                    text: "B".into(),
                },
            ]),
            correct_answer: correct.map(SqlJson),
            answer_explanation: None,
            points,
            difficulty: None,
            tags: SqlJson(vec![]),
            created_at: None,
        }
    }

    fn true_false(id: i64, points: f64, value: bool) -> Question {
        question(
            id,
            QuestionType::TrueFalse,
            points,
            Some(AnswerValue::Boolean { value }),
        )
    }

    #[test]
    fn two_correct_true_false_answers_score_full_marks() {
        let questions = vec![true_false(1, 50.0, true), true_false(2, 50.0, false)];
        let answers = HashMap::from([
            (1, AnswerValue::Boolean { value: true }),
            (2, AnswerValue::Boolean { value: false }),
        ]);

        let grade = auto_grade(&questions, &answers);
        assert_eq!(grade.objective_score, 100.0);
        assert!(!grade.needs_manual);
    }

    #[test]
    fn one_wrong_answer_scores_half_and_fails_a_sixty_point_bar() {
        let questions = vec![true_false(1, 50.0, true), true_false(2, 50.0, false)];
        let answers = HashMap::from([
            (1, AnswerValue::Boolean { value: true }),
            (2, AnswerValue::Boolean { value: true }),
        ]);

        let grade = auto_grade(&questions, &answers);
        assert_eq!(grade.objective_score, 50.0);
        assert!(!is_passing(grade.objective_score, 60.0));
    }

    #[test]
    fn scoring_exactly_the_pass_score_passes() {
        assert!(is_passing(60.0, 60.0));
        assert!(is_passing(60.5, 60.0));
        assert!(!is_passing(59.9, 60.0));
        assert!(is_passing(0.0, 0.0));
    }

    #[test]
    fn missing_answer_scores_nothing() {
        let questions = vec![true_false(1, 50.0, true)];
        let grade = auto_grade(&questions, &HashMap::new());
        assert_eq!(grade.objective_score, 0.0);
        assert!(!grade.needs_manual);
    }

    #[test]
    fn subjective_question_flags_manual_grading() {
        let questions = vec![
            true_false(1, 50.0, true),
            question(2, QuestionType::Essay, 50.0, None),
        ];
        let answers = HashMap::from([
            (1, AnswerValue::Boolean { value: true }),
            (
                2,
                AnswerValue::Text {
                    value: "an essay".into(),
                },
            ),
        ]);

        let grade = auto_grade(&questions, &answers);
        assert!(grade.needs_manual);
        assert_eq!(grade.objective_score, 50.0);
    }

    #[test]
    fn multiple_choice_matches_as_a_set() {
        let key = AnswerValue::Choices {
            option_ids: vec!["q1-a".into(), "q1-b".into()],
        };
        let questions = vec![question(
            1,
            QuestionType::MultipleChoice,
            10.0,
            Some(key),
        )];

        // Reversed click order still matches after normalization.
        let answers = HashMap::from([(
            1,
            AnswerValue::Choices {
                option_ids: vec!["q1-b".into(), "q1-a".into()],
            },
        )]);
        assert_eq!(auto_grade(&questions, &answers).objective_score, 10.0);

        // A partial selection does not.
        let partial = HashMap::from([(
            1,
            AnswerValue::Choices {
                option_ids: vec!["q1-a".into()],
            },
        )]);
        assert_eq!(auto_grade(&questions, &partial).objective_score, 0.0);
    }

    #[test]
    fn single_choice_requires_exact_option_id() {
        let questions = vec![question(
            1,
            QuestionType::SingleChoice,
            10.0,
            Some(AnswerValue::Choice {
                option_id: "q1-a".into(),
            }),
        )];

        let right = HashMap::from([(
            1,
            AnswerValue::Choice {
                option_id: "q1-a".into(),
            },
        )]);
        let wrong = HashMap::from([(
            1,
            AnswerValue::Choice {
                option_id: "q1-b".into(),
            },
        )]);

        assert_eq!(auto_grade(&questions, &right).objective_score, 10.0);
        assert_eq!(auto_grade(&questions, &wrong).objective_score, 0.0);
    }

    #[test]
    fn regrading_same_answers_is_deterministic() {
        let questions = vec![true_false(1, 30.0, true), true_false(2, 70.0, false)];
        let answers = HashMap::from([
            (1, AnswerValue::Boolean { value: true }),
            (2, AnswerValue::Boolean { value: false }),
        ]);

        let first = auto_grade(&questions, &answers);
        let second = auto_grade(&questions, &answers);
        assert_eq!(first, second);
    }
}
