// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempts, auth, classes, exams, grading},
    state::AppState,
    utils::jwt::{auth_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, classes, exams, attempts).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let class_routes = Router::new()
        .route("/", post(classes::create_class))
        .route("/my", get(classes::my_classes))
        .route("/{id}/join", post(classes::join_class))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Teacher-side exam management. Double middleware protection:
    // Auth first, then role check; ownership is verified per-handler.
    let teacher_exam_routes = Router::new()
        .route("/", post(exams::create_exam))
        .route("/{id}", put(exams::update_exam).get(exams::exam_detail))
        .route("/{id}/questions", post(exams::add_questions))
        .route("/{id}/publish", post(exams::publish_exam))
        .route("/{id}/close", post(exams::close_exam))
        .route("/{id}/attempts", get(exams::list_attempts))
        .route("/class/{class_id}", get(exams::list_class_exams))
        .layer(middleware::from_fn(teacher_middleware));

    let student_exam_routes = Router::new()
        .route("/my/list", get(attempts::my_exams))
        .route("/{id}/start", post(attempts::start_attempt));

    let exam_routes = teacher_exam_routes
        .merge(student_exam_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let teacher_attempt_routes = Router::new()
        .route("/{id}/grade", post(grading::grade_attempt))
        .layer(middleware::from_fn(teacher_middleware));

    let attempt_routes = Router::new()
        .route("/{id}/answer", post(attempts::save_answer))
        .route("/{id}/submit", post(grading::submit_attempt))
        .route("/{id}/result", get(grading::get_result))
        .merge(teacher_attempt_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/classes", class_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/attempts", attempt_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
