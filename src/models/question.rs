// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::error::AppError;

/// Question type. Objective types are auto-graded by exact match;
/// subjective types require a manual grading pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "question_type", rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
}

impl QuestionType {
    pub fn is_objective(&self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::MultipleChoice | QuestionType::TrueFalse
        )
    }
}

/// One answer option. The id is generated once at question creation and is
/// the only thing answers and the correct-answer key ever reference, so
/// option shuffling never has to re-derive identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

/// A submitted or stored answer value, tagged by kind.
///
/// The kind must match the question type: `choice` for single_choice,
/// `choices` for multiple_choice, `boolean` for true_false, `text` for
/// short_answer/essay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerValue {
    Choice { option_id: String },
    Choices { option_ids: Vec<String> },
    Boolean { value: bool },
    Text { value: String },
}

impl AnswerValue {
    /// Order-normalizes the value so equality is structural: multi-choice
    /// selections compare as sets regardless of click order.
    pub fn normalized(mut self) -> Self {
        if let AnswerValue::Choices { option_ids } = &mut self {
            option_ids.sort();
            option_ids.dedup();
        }
        self
    }

    /// Whether this value's shape is acceptable for the given question type.
    pub fn matches_type(&self, question_type: QuestionType) -> bool {
        matches!(
            (self, question_type),
            (AnswerValue::Choice { .. }, QuestionType::SingleChoice)
                | (AnswerValue::Choices { .. }, QuestionType::MultipleChoice)
                | (AnswerValue::Boolean { .. }, QuestionType::TrueFalse)
                | (AnswerValue::Text { .. }, QuestionType::ShortAnswer)
                | (AnswerValue::Text { .. }, QuestionType::Essay)
        )
    }
}

/// Represents the 'exam_questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub exam_id: i64,
    /// 1-based position within the exam.
    pub question_order: i32,
    pub question_type: QuestionType,
    pub question_text: String,
    pub question_image: Option<String>,
    pub options: Json<Vec<QuestionOption>>,
    /// Grading key. None for subjective questions without a reference answer.
    pub correct_answer: Option<Json<AnswerValue>>,
    pub answer_explanation: Option<String>,
    pub points: f64,
    pub difficulty: Option<String>,
    pub tags: Json<Vec<String>>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to a student taking the exam.
/// Excludes the correct answer and the explanation.
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_order: i32,
    pub question_type: QuestionType,
    pub question_text: String,
    pub question_image: Option<String>,
    pub options: Vec<QuestionOption>,
    pub points: f64,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_order: q.question_order,
            question_type: q.question_type,
            question_text: q.question_text,
            question_image: q.question_image,
            options: q.options.0,
            points: q.points,
        }
    }
}

/// DTO for adding a question to a draft exam.
///
/// Choice options are supplied as plain texts; the correct selection is given
/// by index into that list. Stable option ids are assigned server-side.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 2000))]
    pub question_text: String,
    #[validate(length(max = 500))]
    pub question_image: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    /// Index of the correct option (single_choice).
    pub correct_option: Option<usize>,
    /// Indexes of the correct options (multiple_choice).
    pub correct_options: Option<Vec<usize>>,
    /// Correct value for true_false.
    pub correct_bool: Option<bool>,
    /// Reference answer for subjective questions (display only).
    #[validate(length(max = 5000))]
    pub reference_answer: Option<String>,
    #[validate(length(max = 5000))]
    pub answer_explanation: Option<String>,
    #[validate(range(min = 0.0, max = 1000.0))]
    pub points: f64,
    pub question_order: Option<i32>,
    #[validate(length(max = 50))]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateQuestionRequest {
    /// Materializes the stored option list, assigning a fresh stable id to
    /// each option.
    pub fn build_options(&self) -> Vec<QuestionOption> {
        self.options
            .iter()
            .map(|text| QuestionOption {
                id: uuid::Uuid::new_v4().to_string(),
                text: text.clone(),
            })
            .collect()
    }

    /// Builds the stored grading key against the materialized options.
    ///
    /// Objective types must fully specify their key; subjective types store
    /// the optional reference answer as text.
    pub fn build_correct_answer(
        &self,
        options: &[QuestionOption],
    ) -> Result<Option<AnswerValue>, AppError> {
        match self.question_type {
            QuestionType::SingleChoice => {
                if options.len() < 2 {
                    return Err(AppError::BadRequest(
                        "single_choice questions need at least 2 options".to_string(),
                    ));
                }
                let idx = self.correct_option.ok_or_else(|| {
                    AppError::BadRequest("correct_option is required for single_choice".to_string())
                })?;
                let option = options.get(idx).ok_or_else(|| {
                    AppError::BadRequest(format!("correct_option index {} out of range", idx))
                })?;
                Ok(Some(AnswerValue::Choice {
                    option_id: option.id.clone(),
                }))
            }
            QuestionType::MultipleChoice => {
                if options.len() < 2 {
                    return Err(AppError::BadRequest(
                        "multiple_choice questions need at least 2 options".to_string(),
                    ));
                }
                let idxs = self.correct_options.as_ref().ok_or_else(|| {
                    AppError::BadRequest(
                        "correct_options is required for multiple_choice".to_string(),
                    )
                })?;
                if idxs.is_empty() {
                    return Err(AppError::BadRequest(
                        "correct_options must not be empty".to_string(),
                    ));
                }
                let mut option_ids = Vec::with_capacity(idxs.len());
                for idx in idxs {
                    let option = options.get(*idx).ok_or_else(|| {
                        AppError::BadRequest(format!("correct_options index {} out of range", idx))
                    })?;
                    option_ids.push(option.id.clone());
                }
                Ok(Some(AnswerValue::Choices { option_ids }.normalized()))
            }
            QuestionType::TrueFalse => {
                let value = self.correct_bool.ok_or_else(|| {
                    AppError::BadRequest("correct_bool is required for true_false".to_string())
                })?;
                Ok(Some(AnswerValue::Boolean { value }))
            }
            QuestionType::ShortAnswer | QuestionType::Essay => Ok(self
                .reference_answer
                .as_ref()
                .map(|value| AnswerValue::Text {
                    value: value.clone(),
                })),
        }
    }
}

/// Wrapper for the bulk question-add request body.
#[derive(Debug, Deserialize)]
pub struct AddQuestionsRequest {
    pub questions: Vec<CreateQuestionRequest>,
}
