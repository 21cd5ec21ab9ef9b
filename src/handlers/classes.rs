// src/handlers/classes.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::class::{Class, CreateClassRequest, MyClass},
    utils::jwt::Claims,
};

/// Creates a class with the caller as its teacher of record.
pub async fn create_class(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if claims.role != "teacher" {
        return Err(AppError::PermissionDenied(
            "Only teachers can create classes".to_string(),
        ));
    }

    let class = sqlx::query_as::<_, Class>(
        r#"
        INSERT INTO classes (name, description, teacher_id)
        VALUES ($1, $2, $3)
        RETURNING id, name, description, teacher_id, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(claims.user_id()?)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create class: {:?}", e);
        AppError::from(e)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Class created",
            "data": class
        })),
    ))
}

/// Enrolls the caller as an active student member of a class.
pub async fn join_class(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM classes WHERE id = $1")
        .bind(class_id)
        .fetch_optional(&pool)
        .await?;

    if exists.is_none() {
        return Err(AppError::NotFound("Class not found".to_string()));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO class_members (class_id, user_id, role, status)
        VALUES ($1, $2, 'student', 'active')
        ON CONFLICT (class_id, user_id) DO NOTHING
        "#,
    )
    .bind(class_id)
    .bind(claims.user_id()?)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to join class: {:?}", e);
        AppError::from(e)
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Already a member of this class".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Joined class"
    })))
}

/// Lists the classes the caller belongs to (as member or as teacher).
pub async fn my_classes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let classes = sqlx::query_as::<_, MyClass>(
        r#"
        SELECT c.id, c.name, c.teacher_id, m.role AS member_role, m.status AS member_status
        FROM class_members m
        JOIN classes c ON c.id = m.class_id
        WHERE m.user_id = $1
        UNION ALL
        SELECT c.id, c.name, c.teacher_id, 'teacher' AS member_role, 'active' AS member_status
        FROM classes c
        WHERE c.teacher_id = $1
        ORDER BY id
        "#,
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list classes: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(json!({
        "success": true,
        "data": classes
    })))
}
