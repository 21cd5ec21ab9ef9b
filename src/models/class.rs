// src/models/class.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'classes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Class {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// The teacher of record. Only this user may create exams for the class.
    pub teacher_id: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a class.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// A class joined with the caller's membership info.
#[derive(Debug, Serialize, FromRow)]
pub struct MyClass {
    pub id: i64,
    pub name: String,
    pub teacher_id: i64,
    pub member_role: String,
    pub member_status: String,
}
