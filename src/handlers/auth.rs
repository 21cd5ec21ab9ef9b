// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{CreateUserRequest, LoginRequest, User},
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new user with role 'student' or 'teacher'.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password, role)
        VALUES ($1, $2, $3)
        RETURNING id, username, password, role, created_at
        "#,
    )
    .bind(&payload.username)
    .bind(&hashed_password)
    .bind(&payload.role)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Registered successfully",
            "data": user
        })),
    ))
}

/// Authenticates a user and returns a JWT token.
///
/// Verifies the username and password against the database.
/// If valid, signs a JWT token with the user's ID and role.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, role, created_at
        FROM users
        WHERE username = $1
        "#,
    )
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let user = user.ok_or(AppError::AuthError("User not found".to_string()))?;

    let is_valid = verify_password(&payload.password, &user.password)?;

    if !is_valid {
        return Err(AppError::AuthError("Invalid password".to_string()));
    }

    let token = sign_jwt(user.id, &user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "token": token,
            "type": "Bearer",
            "user_id": user.id,
            "role": user.role
        }
    })))
}
