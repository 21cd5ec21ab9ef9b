// tests/grading_tests.rs
//
// Manual grading path: a mixed objective/subjective exam parks in
// submitted with the objective score persisted, then a teacher pass
// finalizes the total. Requires DATABASE_URL; tests skip otherwise.

use backend::{config::Config, routes, state::AppState};
use sqlx::postgres::PgPoolOptions;

async fn spawn_app() -> Option<String> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping integration test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "grading_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        server_addr: "127.0.0.1:0".to_string(),
    };

    let state = AppState { pool, config };
    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some(address)
}

async fn register_and_login(
    client: &reqwest::Client,
    address: &str,
    role: &str,
) -> (i64, String) {
    let username = format!("{}_{}", role, &uuid::Uuid::new_v4().to_string()[..8]);
    let password = "password123";

    let register = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": username,
            "password": password,
            "role": role
        }))
        .send()
        .await
        .expect("Register failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse register json");
    let user_id = register["data"]["id"].as_i64().expect("User id missing");

    let login = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": username,
            "password": password
        }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");
    let token = login["data"]["token"].as_str().expect("Token missing");

    (user_id, token.to_string())
}

#[tokio::test]
async fn subjective_exam_requires_manual_grading_pass() {
    let Some(address) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let (teacher_id, teacher_token) = register_and_login(&client, &address, "teacher").await;
    let (_other_id, other_teacher_token) =
        register_and_login(&client, &address, "teacher").await;
    let (_student_id, student_token) = register_and_login(&client, &address, "student").await;

    // Class with one enrolled student
    let class = client
        .post(format!("{}/api/classes/", address))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({"name": "Essay Writing"}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let class_id = class["data"]["id"].as_i64().unwrap();

    client
        .post(format!("{}/api/classes/{}/join", address, class_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();

    // Mixed exam: 40 points objective, 60 points essay, 50 to pass
    let now = chrono::Utc::now();
    let exam = client
        .post(format!("{}/api/exams/", address))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({
            "title": "Final Essay",
            "class_id": class_id,
            "duration_minutes": 90,
            "start_time": now - chrono::Duration::minutes(5),
            "end_time": now + chrono::Duration::hours(2),
            "pass_score": 50.0
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let exam_id = exam["data"]["id"].as_i64().unwrap();

    let added = client
        .post(format!("{}/api/exams/{}/questions", address, exam_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({
            "questions": [
                {
                    "question_type": "true_false",
                    "question_text": "Brevity is the soul of wit.",
                    "correct_bool": true,
                    "points": 40.0
                },
                {
                    "question_type": "essay",
                    "question_text": "Discuss.",
                    "reference_answer": "A structured argument.",
                    "points": 60.0
                }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let tf_id = added["data"][0]["id"].as_i64().unwrap();
    let essay_id = added["data"][1]["id"].as_i64().unwrap();

    client
        .post(format!("{}/api/exams/{}/publish", address, exam_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .send()
        .await
        .unwrap();

    // Student takes the exam
    let start = client
        .post(format!("{}/api/exams/{}/start", address, exam_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let attempt_id = start["data"]["attempt"]["id"].as_i64().unwrap();

    for (question_id, answer) in [
        (tf_id, serde_json::json!({"kind": "boolean", "value": true})),
        (
            essay_id,
            serde_json::json!({"kind": "text", "value": "Wit, briefly."}),
        ),
    ] {
        let saved = client
            .post(format!("{}/api/attempts/{}/answer", address, attempt_id))
            .header("Authorization", format!("Bearer {}", student_token))
            .json(&serde_json::json!({
                "question_id": question_id,
                "answer": answer
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(saved.status().as_u16(), 200);
    }

    // Grading before submit is rejected
    let premature = client
        .post(format!("{}/api/attempts/{}/grade", address, attempt_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({"question_scores": {(essay_id.to_string()): 50.0}}))
        .send()
        .await
        .unwrap();
    assert_eq!(premature.status().as_u16(), 400);

    // Submit parks the attempt with the objective score persisted
    let submit = client
        .post(format!("{}/api/attempts/{}/submit", address, attempt_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(submit["data"]["status"], "submitted");
    assert_eq!(submit["data"]["objective_score"], 40.0);
    assert_eq!(submit["data"]["auto_graded"], false);
    assert!(submit["data"]["total_score"].is_null());

    // Result before grading hides the keys (show_answers_after is false)
    let result = client
        .get(format!("{}/api/attempts/{}/result", address, attempt_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let hidden = result["data"]["questions"].as_array().unwrap();
    assert!(hidden.iter().all(|q| q.get("correct_answer").is_none()));

    // Students cannot grade (role middleware)
    let student_grade = client
        .post(format!("{}/api/attempts/{}/grade", address, attempt_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .json(&serde_json::json!({"question_scores": {(essay_id.to_string()): 60.0}}))
        .send()
        .await
        .unwrap();
    assert_eq!(student_grade.status().as_u16(), 403);

    // Neither can a teacher who does not own the exam
    let foreign_grade = client
        .post(format!("{}/api/attempts/{}/grade", address, attempt_id))
        .header("Authorization", format!("Bearer {}", other_teacher_token))
        .json(&serde_json::json!({"question_scores": {(essay_id.to_string()): 60.0}}))
        .send()
        .await
        .unwrap();
    assert_eq!(foreign_grade.status().as_u16(), 403);

    // Scores are range-checked and must target subjective questions
    let over_max = client
        .post(format!("{}/api/attempts/{}/grade", address, attempt_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({"question_scores": {(essay_id.to_string()): 70.0}}))
        .send()
        .await
        .unwrap();
    assert_eq!(over_max.status().as_u16(), 400);

    let wrong_target = client
        .post(format!("{}/api/attempts/{}/grade", address, attempt_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({"question_scores": {(tf_id.to_string()): 10.0}}))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_target.status().as_u16(), 400);

    // The real pass: 40 objective + 10 manual = 50, exactly the pass bar.
    // Equality counts as a pass.
    let graded = client
        .post(format!("{}/api/attempts/{}/grade", address, attempt_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({"question_scores": {(essay_id.to_string()): 10.0}}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(graded["data"]["status"], "graded");
    assert_eq!(graded["data"]["total_score"], 50.0);
    assert_eq!(graded["data"]["is_passed"], true);
    assert_eq!(graded["data"]["graded_by"].as_i64(), Some(teacher_id));

    // Grading is final
    let regrade = client
        .post(format!("{}/api/attempts/{}/grade", address, attempt_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({"question_scores": {(essay_id.to_string()): 0.0}}))
        .send()
        .await
        .unwrap();
    assert_eq!(regrade.status().as_u16(), 400);

    // Graded result reveals keys and the final score
    let final_result = client
        .get(format!("{}/api/attempts/{}/result", address, attempt_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(final_result["data"]["attempt"]["total_score"], 50.0);
    let revealed = final_result["data"]["questions"].as_array().unwrap();
    assert!(revealed.iter().any(|q| q.get("correct_answer").is_some()));
}

#[tokio::test]
async fn attempts_are_private_to_their_owner() {
    let Some(address) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let (_teacher_id, teacher_token) = register_and_login(&client, &address, "teacher").await;
    let (_s1_id, student_token) = register_and_login(&client, &address, "student").await;
    let (_s2_id, intruder_token) = register_and_login(&client, &address, "student").await;

    let class = client
        .post(format!("{}/api/classes/", address))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({"name": "Privacy"}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let class_id = class["data"]["id"].as_i64().unwrap();

    for token in [&student_token, &intruder_token] {
        client
            .post(format!("{}/api/classes/{}/join", address, class_id))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .unwrap();
    }

    let now = chrono::Utc::now();
    let exam = client
        .post(format!("{}/api/exams/", address))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({
            "title": "Private",
            "class_id": class_id,
            "duration_minutes": 30,
            "start_time": now - chrono::Duration::minutes(5),
            "end_time": now + chrono::Duration::hours(1)
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let exam_id = exam["data"]["id"].as_i64().unwrap();

    let added = client
        .post(format!("{}/api/exams/{}/questions", address, exam_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({
            "questions": [{
                "question_type": "true_false",
                "question_text": "Mine?",
                "correct_bool": true,
                "points": 100.0
            }]
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let question_id = added["data"][0]["id"].as_i64().unwrap();

    client
        .post(format!("{}/api/exams/{}/publish", address, exam_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .send()
        .await
        .unwrap();

    let start = client
        .post(format!("{}/api/exams/{}/start", address, exam_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let attempt_id = start["data"]["attempt"]["id"].as_i64().unwrap();

    // Another student cannot write into or read this attempt
    let foreign_save = client
        .post(format!("{}/api/attempts/{}/answer", address, attempt_id))
        .header("Authorization", format!("Bearer {}", intruder_token))
        .json(&serde_json::json!({
            "question_id": question_id,
            "answer": {"kind": "boolean", "value": false}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(foreign_save.status().as_u16(), 403);

    let foreign_result = client
        .get(format!("{}/api/attempts/{}/result", address, attempt_id))
        .header("Authorization", format!("Bearer {}", intruder_token))
        .send()
        .await
        .unwrap();
    assert_eq!(foreign_result.status().as_u16(), 403);

    // Submitting someone else's attempt reads as not-found
    let foreign_submit = client
        .post(format!("{}/api/attempts/{}/submit", address, attempt_id))
        .header("Authorization", format!("Bearer {}", intruder_token))
        .send()
        .await
        .unwrap();
    assert_eq!(foreign_submit.status().as_u16(), 404);

    // Without a token everything is unauthorized
    let anonymous = client
        .get(format!("{}/api/attempts/{}/result", address, attempt_id))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status().as_u16(), 401);
}

#[tokio::test]
async fn half_marks_below_the_pass_score_fail() {
    let Some(address) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let (_teacher_id, teacher_token) = register_and_login(&client, &address, "teacher").await;
    let (_student_id, student_token) = register_and_login(&client, &address, "student").await;

    let class = client
        .post(format!("{}/api/classes/", address))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({"name": "Boundary"}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let class_id = class["data"]["id"].as_i64().unwrap();

    client
        .post(format!("{}/api/classes/{}/join", address, class_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();

    // Two 50-point true/false questions, 60 to pass
    let now = chrono::Utc::now();
    let exam = client
        .post(format!("{}/api/exams/", address))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({
            "title": "Pass Boundary",
            "class_id": class_id,
            "duration_minutes": 30,
            "start_time": now - chrono::Duration::minutes(5),
            "end_time": now + chrono::Duration::hours(1),
            "pass_score": 60.0
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let exam_id = exam["data"]["id"].as_i64().unwrap();

    let added = client
        .post(format!("{}/api/exams/{}/questions", address, exam_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .json(&serde_json::json!({
            "questions": [
                {
                    "question_type": "true_false",
                    "question_text": "First.",
                    "correct_bool": true,
                    "points": 50.0
                },
                {
                    "question_type": "true_false",
                    "question_text": "Second.",
                    "correct_bool": false,
                    "points": 50.0
                }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let q1_id = added["data"][0]["id"].as_i64().unwrap();
    let q2_id = added["data"][1]["id"].as_i64().unwrap();

    client
        .post(format!("{}/api/exams/{}/publish", address, exam_id))
        .header("Authorization", format!("Bearer {}", teacher_token))
        .send()
        .await
        .unwrap();

    let start = client
        .post(format!("{}/api/exams/{}/start", address, exam_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let attempt_id = start["data"]["attempt"]["id"].as_i64().unwrap();

    // One right, one wrong: 50 points against a 60-point bar
    for (question_id, value) in [(q1_id, true), (q2_id, true)] {
        client
            .post(format!("{}/api/attempts/{}/answer", address, attempt_id))
            .header("Authorization", format!("Bearer {}", student_token))
            .json(&serde_json::json!({
                "question_id": question_id,
                "answer": {"kind": "boolean", "value": value}
            }))
            .send()
            .await
            .unwrap();
    }

    let submit = client
        .post(format!("{}/api/attempts/{}/submit", address, attempt_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(submit["data"]["status"], "graded");
    assert_eq!(submit["data"]["total_score"], 50.0);
    assert_eq!(submit["data"]["is_passed"], false);
}
