// tests/api_tests.rs

use std::sync::Arc;

use mocktest::{
    bank::StaticBank,
    cache::{LocalCache, MemoryCache},
    config::Config,
    models::question::{BankFile, BankPrompt, BankQuestion},
    routes,
    state::AppState,
    store::{MemoryStore, RemoteStore, Table, encode},
    utils::password::hash_password,
};
use serde_json::{Value, json};

const PASSWORD: &str = "password123";

fn bank_question(id: i64) -> BankQuestion {
    BankQuestion {
        id,
        assessment_type: "multiple-choice".to_string(),
        prompt: BankPrompt {
            question: format!("<p>Which clause filters rows? ({id})</p>"),
            answers: vec!["ORDER BY".to_string(), "WHERE".to_string(), "GROUP BY".to_string()],
            feedbacks: vec![String::new(), "Right".to_string(), String::new()],
            explanation: "WHERE filters rows before grouping.".to_string(),
            links: None,
        },
        correct_response: vec!["b".to_string()],
        section: "Filtering".to_string(),
    }
}

/// Helper function to spawn the app on a random port for testing.
/// Everything runs in memory: no database is needed.
async fn spawn_app() -> (String, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
    let bank = StaticBank::new()
        .with_set(
            "questions",
            BankFile {
                results: (1..=3).map(bank_question).collect(),
            },
        )
        .with_set(
            "questions1",
            BankFile {
                results: (3..=5).map(bank_question).collect(),
            },
        );

    let config = Config {
        rust_log: "error".to_string(),
        question_sets: vec!["questions".to_string(), "questions1".to_string()],
        ..Config::default()
    };

    let state = AppState::new(store.clone(), cache, Arc::new(bank), config);
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, store)
}

async fn seed_user(store: &MemoryStore, register_no: &str, password: Option<&str>, is_admin: bool) {
    let password = password.map(|p| hash_password(p).unwrap());
    let row = encode(
        Table::Users,
        &json!({
            "register_no": register_no,
            "password": password,
            "student_name": format!("Student {register_no}"),
            "is_admin": is_admin,
        }),
    )
    .unwrap();
    store.insert(Table::Users, row).await.unwrap();
}

/// Logged-in client state: bearer token plus identity claim.
struct Session {
    token: String,
    claim: Value,
}

async fn login(client: &reqwest::Client, address: &str, register_no: &str) -> Session {
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "register_no": register_no, "password": PASSWORD }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    Session {
        token: body["token"].as_str().unwrap().to_string(),
        claim: body["user"].clone(),
    }
}

fn authed(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: String,
    session: &Session,
) -> reqwest::RequestBuilder {
    client
        .request(method, url)
        .bearer_auth(&session.token)
        .header("x-auth-user", session.claim.to_string())
}

async fn post_json(
    client: &reqwest::Client,
    url: String,
    session: &Session,
    body: Value,
) -> (u16, Value) {
    let response = authed(client, reqwest::Method::POST, url, session)
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request");
    let status = response.status().as_u16();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

async fn get_json(client: &reqwest::Client, url: String, session: &Session) -> (u16, Value) {
    let response = authed(client, reqwest::Method::GET, url, session)
        .send()
        .await
        .expect("Failed to execute request");
    let status = response.status().as_u16();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_check_404() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn first_login_sets_password() {
    let (address, store) = spawn_app().await;
    seed_user(&store, "S100", None, false).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/lookup", address))
        .json(&json!({ "register_no": "S100" }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["step"], "create");

    // Too short
    let response = client
        .post(format!("{}/api/auth/password", address))
        .json(&json!({ "register_no": "S100", "password": "short", "confirm_password": "short" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Mismatch
    let response = client
        .post(format!("{}/api/auth/password", address))
        .json(&json!({ "register_no": "S100", "password": PASSWORD, "confirm_password": "password124" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .post(format!("{}/api/auth/password", address))
        .json(&json!({ "register_no": "S100", "password": PASSWORD, "confirm_password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "Bearer");
    assert_eq!(body["user"]["register_no"], "S100");

    let response = client
        .post(format!("{}/api/auth/lookup", address))
        .json(&json!({ "register_no": "S100" }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["step"], "login");

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "register_no": "S100", "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    login(&client, &address, "S100").await;
}

#[tokio::test]
async fn guard_redirects_unauthenticated_and_non_admin() {
    let (address, store) = spawn_app().await;
    seed_user(&store, "S200", Some(PASSWORD), false).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/exams/mock", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["redirect"], "/login");

    let session = login(&client, &address, "S200").await;
    let (status, body) = get_json(&client, format!("{}/api/admin/results", address), &session).await;
    assert_eq!(status, 403);
    assert_eq!(body["redirect"], "/home");

    // A client that claims to be an admin is still refused.
    let mut forged = Session {
        token: session.token.clone(),
        claim: session.claim.clone(),
    };
    forged.claim["isAdmin"] = json!(true);
    let (status, _) = get_json(&client, format!("{}/api/admin/results", address), &forged).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn me_returns_server_claim_and_logout_ends_session() {
    let (address, store) = spawn_app().await;
    seed_user(&store, "S300", Some(PASSWORD), false).await;
    let client = reqwest::Client::new();
    let mut session = login(&client, &address, "S300").await;
    session.claim["student_name"] = json!("Someone Else");

    let response = authed(&client, reqwest::Method::GET, format!("{}/api/auth/me", address), &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let echoed: Value = serde_json::from_str(
        response.headers()["x-auth-user"].to_str().unwrap(),
    )
    .unwrap();
    assert_eq!(echoed["student_name"], "Student S300");

    let response = authed(&client, reqwest::Method::POST, format!("{}/api/auth/logout", address), &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let (status, _) = get_json(&client, format!("{}/api/auth/me", address), &session).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn mock_exam_flow_from_start_to_review() {
    let (address, store) = spawn_app().await;
    seed_user(&store, "S400", Some(PASSWORD), false).await;
    seed_user(&store, "S401", Some(PASSWORD), false).await;
    seed_user(&store, "A400", Some(PASSWORD), true).await;
    let client = reqwest::Client::new();
    let student = login(&client, &address, "S400").await;
    let exams = format!("{}/api/exams/mock", address);

    let (status, view) = post_json(&client, format!("{exams}/start"), &student, json!({})).await;
    assert_eq!(status, 201);
    assert_eq!(view["phase"], "in-progress");
    // Five unique questions across both sets; the exam is shortened.
    assert_eq!(view["total_questions"], 5);
    assert_eq!(view["remaining_seconds"], 5400);
    assert!(!view.to_string().contains("isCorrect"));

    // Answer the first two correctly, the third wrongly, skip the rest.
    for pick in ["b", "b", "a"] {
        post_json(&client, format!("{exams}/select"), &student, json!({ "answer_id": pick })).await;
        let (_, view) = post_json(&client, format!("{exams}/save"), &student, json!({})).await;
        assert!(view["report"].is_null());
    }

    // Selected but never saved.
    post_json(&client, format!("{exams}/select"), &student, json!({ "answer_id": "b" })).await;

    let (status, result) = post_json(&client, format!("{exams}/submit"), &student, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(result["phase"], "complete");
    assert_eq!(result["save_status"]["status"], "saved");
    assert_eq!(result["report"]["total_correct"], 2);
    assert_eq!(result["report"]["percentage"], 40);
    let attempt_id = result["attempt_id"].as_str().unwrap().to_string();

    // A second submit does not write another row.
    let (_, again) = post_json(&client, format!("{exams}/submit"), &student, json!({})).await;
    assert_eq!(again["save_status"]["status"], "already-saved");

    let (status, history) = get_json(&client, format!("{}/api/history", address), &student).await;
    assert_eq!(status, 200);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], attempt_id.as_str());
    assert_eq!(history[0]["test_type"], "mock");
    assert!(history[0].get("questions_snapshot").is_none());

    let (status, review) =
        get_json(&client, format!("{}/api/reviews/{}", address, attempt_id), &student).await;
    assert_eq!(status, 200);
    assert_eq!(review["phase"], "review");
    assert_eq!(review["current_index"], 0);
    assert_eq!(review["report"]["total_correct"], 2);
    assert_eq!(review["question"]["answeredCorrectly"], true);

    // Another student cannot open it; an admin can.
    let other = login(&client, &address, "S401").await;
    let (status, _) =
        get_json(&client, format!("{}/api/reviews/{}", address, attempt_id), &other).await;
    assert_eq!(status, 404);

    let admin = login(&client, &address, "A400").await;
    let (status, _) =
        get_json(&client, format!("{}/api/reviews/{}", address, attempt_id), &admin).await;
    assert_eq!(status, 200);

    let (status, results) = get_json(
        &client,
        format!("{}/api/admin/results?test_type=mock", address),
        &admin,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(results.as_array().unwrap().len(), 1);

    let (_, results) = get_json(
        &client,
        format!("{}/api/admin/results?test_type=practice", address),
        &admin,
    )
    .await;
    assert!(results.as_array().unwrap().is_empty());

    // Entering review on the live attempt freezes it.
    let (status, view) = post_json(&client, format!("{exams}/review"), &student, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(view["phase"], "review");
    let (_, view) = post_json(&client, format!("{exams}/select"), &student, json!({ "answer_id": "c" })).await;
    assert_eq!(view["selection"], json!(["b"]));
}

#[tokio::test]
async fn practice_sets_and_unknown_exams() {
    let (address, store) = spawn_app().await;
    seed_user(&store, "S500", Some(PASSWORD), false).await;
    let client = reqwest::Client::new();
    let student = login(&client, &address, "S500").await;

    let (_, sets) = get_json(&client, format!("{}/api/exams/sets", address), &student).await;
    let names: Vec<&str> = sets
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Oracle SQL Mock Test", "Practice Set 1", "Practice Set 2"]);

    let (status, _) = get_json(&client, format!("{}/api/exams/nope", address), &student).await;
    assert_eq!(status, 404);

    let practice = format!("{}/api/exams/questions1", address);
    let (status, view) = post_json(&client, format!("{practice}/start"), &student, json!({})).await;
    assert_eq!(status, 201);
    assert_eq!(view["test_name"], "Practice Set 2");
    assert!(view["remaining_seconds"].is_null());
    assert_eq!(view["question"]["id"], 3);

    // Starting again while running is refused.
    let (status, _) = post_json(&client, format!("{practice}/start"), &student, json!({})).await;
    assert_eq!(status, 409);

    let (_, view) = post_json(&client, format!("{practice}/navigate"), &student, json!({ "index": 2 })).await;
    assert_eq!(view["current_index"], 2);
    let (_, view) = post_json(&client, format!("{practice}/navigate"), &student, json!({ "index": 9 })).await;
    assert_eq!(view["current_index"], 2);

    let (_, result) = post_json(&client, format!("{practice}/submit"), &student, json!({})).await;
    assert_eq!(result["save_status"]["status"], "saved");
    let attempt_id = result["attempt_id"].as_str().unwrap();

    // Practice attempts keep their snapshot, so they can be reviewed too.
    let (status, review) =
        get_json(&client, format!("{}/api/reviews/{}", address, attempt_id), &student).await;
    assert_eq!(status, 200);
    assert_eq!(review["report"]["total_correct"], 0);
}

#[tokio::test]
async fn suspended_attempt_resumes_where_it_left_off() {
    let (address, store) = spawn_app().await;
    seed_user(&store, "S600", Some(PASSWORD), false).await;
    let client = reqwest::Client::new();
    let student = login(&client, &address, "S600").await;
    let exams = format!("{}/api/exams/mock", address);

    let (_, started) = post_json(&client, format!("{exams}/start"), &student, json!({})).await;
    post_json(&client, format!("{exams}/select"), &student, json!({ "answer_id": "b" })).await;
    post_json(&client, format!("{exams}/save"), &student, json!({})).await;

    let response = authed(&client, reqwest::Method::POST, format!("{exams}/suspend"), &student)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let (status, resumed) = post_json(&client, format!("{exams}/resume"), &student, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(resumed["phase"], "in-progress");
    assert_eq!(resumed["attempt_id"], started["attempt_id"]);
    assert_eq!(resumed["current_index"], 1);
    assert_eq!(resumed["saved"], json!([0]));
}

#[tokio::test]
async fn profile_stats_count_attempts_and_best_score() {
    let (address, store) = spawn_app().await;
    seed_user(&store, "S700", Some(PASSWORD), false).await;
    seed_user(&store, "S701", Some(PASSWORD), false).await;
    let client = reqwest::Client::new();
    let student = login(&client, &address, "S700").await;
    let set1 = format!("{}/api/exams/questions", address);
    let set2 = format!("{}/api/exams/questions1", address);

    // Practice Set 1 twice: one of three right, then nothing answered.
    post_json(&client, format!("{set1}/start"), &student, json!({})).await;
    post_json(&client, format!("{set1}/select"), &student, json!({ "answer_id": "b" })).await;
    post_json(&client, format!("{set1}/save"), &student, json!({})).await;
    let (_, result) = post_json(&client, format!("{set1}/submit"), &student, json!({})).await;
    assert_eq!(result["report"]["percentage"], 33);
    post_json(&client, format!("{set1}/start"), &student, json!({})).await;
    post_json(&client, format!("{set1}/submit"), &student, json!({})).await;

    post_json(&client, format!("{set2}/start"), &student, json!({})).await;
    post_json(&client, format!("{set2}/submit"), &student, json!({})).await;

    // Someone else's attempt does not count.
    let other = login(&client, &address, "S701").await;
    post_json(&client, format!("{set2}/start"), &other, json!({})).await;
    post_json(&client, format!("{set2}/submit"), &other, json!({})).await;

    let (status, stats) =
        get_json(&client, format!("{}/api/profile/stats", address), &student).await;
    assert_eq!(status, 200);
    assert_eq!(
        stats,
        json!([
            { "key": "mock", "name": "Oracle SQL Mock Test", "attempts": 0, "best_percentage": null },
            { "key": "questions", "name": "Practice Set 1", "attempts": 2, "best_percentage": 33 },
            { "key": "questions1", "name": "Practice Set 2", "attempts": 1, "best_percentage": 0 },
        ])
    );

    let response = client
        .get(format!("{}/api/profile/stats", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}
