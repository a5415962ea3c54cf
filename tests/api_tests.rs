// tests/api_tests.rs

use assessment_engine::{
    config::{Config, CostTable},
    models::question::{ChapterKey, QuestionRecord},
    routes,
    state::AppState,
    stores::Stores,
    utils::jwt::sign_jwt,
};

const TEST_SECRET: &str = "test_secret_for_integration_tests";

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL plus the state handle so tests can seed stores.
async fn spawn_app() -> (String, AppState) {
    let config = Config {
        // The in-memory stores never touch a database.
        database_url: "postgres://unused".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        costs: CostTable::default(),
    };

    let state = AppState::new(config, Stores::in_memory());
    let app = routes::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, state)
}

fn bearer(user_id: i64, role: &str) -> String {
    let token = sign_jwt(user_id, role, TEST_SECRET, 600).unwrap();
    format!("Bearer {}", token)
}

fn chapter() -> ChapterKey {
    ChapterKey {
        board: "cbse".into(),
        class_level: "10".into(),
        stream: "science".into(),
        subject_name: "physics".into(),
        chapter_id: "optics".into(),
    }
}

/// Seeds a bank where option 0 is always correct.
async fn seed_bank(state: &AppState, n: usize) {
    let bank: Vec<QuestionRecord> = (0..n)
        .map(|i| QuestionRecord {
            question: format!("Question {}", i),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: 0,
            explanation: Some(format!("Option A is correct for question {}", i)),
        })
        .collect();
    state.stores.content.put_bank(&chapter(), bank).await.unwrap();
}

fn start_body(proctored: bool, confirm: bool) -> serde_json::Value {
    serde_json::json!({
        "board": "cbse",
        "class_level": "10",
        "stream": "science",
        "subject_name": "physics",
        "chapter_id": "optics",
        "proctored": proctored,
        "confirm": confirm,
    })
}

async fn answer(
    client: &reqwest::Client,
    address: &str,
    auth: &str,
    q_index: usize,
    option_index: usize,
) -> serde_json::Value {
    client
        .post(format!("{}/api/sessions/optics/answer", address))
        .header("Authorization", auth)
        .json(&serde_json::json!({
            "question_index": q_index,
            "option_index": option_index,
        }))
        .send()
        .await
        .expect("Failed to submit answer")
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let (address, _state) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/wallet", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn missing_bank_is_coming_soon() {
    let (address, _state) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", bearer(1, "user"))
        .json(&start_body(false, false))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "coming_soon");
}

#[tokio::test]
async fn full_session_flow_grades_attempted_questions_only() {
    let (address, state) = spawn_app().await;
    seed_bank(&state, 40).await;
    let client = reqwest::Client::new();
    let auth = bearer(1, "user");

    // Start straight into answering.
    let start: serde_json::Value = client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(false, false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(start["status"], "started");
    assert_eq!(start["view"]["phase"], "Active");
    assert_eq!(start["view"]["total_questions"], 40);
    assert_eq!(start["view"]["questions"].as_array().unwrap().len(), 10);

    // Answer questions 0-29: option 0 (correct) on even, 1 (wrong) on odd.
    for i in 0..30 {
        let outcome = answer(&client, &address, &auth, i, if i % 2 == 0 { 0 } else { 1 }).await;
        assert_eq!(outcome["accepted"], true);
    }

    // Re-answering is a silent no-op.
    let outcome = answer(&client, &address, &auth, 0, 3).await;
    assert_eq!(outcome["accepted"], false);
    assert_eq!(outcome["attempted_count"], 30);

    // A few heartbeats while active.
    for _ in 0..5 {
        client
            .post(format!("{}/api/sessions/optics/heartbeat", address))
            .header("Authorization", &auth)
            .send()
            .await
            .unwrap();
    }

    // Submission prompt surfaces attempted vs. total.
    let prompt: serde_json::Value = client
        .post(format!("{}/api/sessions/optics/submit", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prompt["attempted_count"], 30);
    assert_eq!(prompt["total_questions"], 40);

    let submit: serde_json::Value = client
        .post(format!("{}/api/sessions/optics/confirm", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let result = &submit["result"];
    assert_eq!(result["total_questions"], 30);
    assert_eq!(result["correct_count"], 15);
    assert_eq!(result["wrong_count"], 15);
    assert_eq!(result["omr_data"].as_array().unwrap().len(), 30);
    assert_eq!(result["wrong_questions"].as_array().unwrap().len(), 15);
    // Indices are remapped into the dense 0..30 range.
    for entry in result["omr_data"].as_array().unwrap() {
        assert!(entry["q_index"].as_u64().unwrap() < 30);
    }
    assert_eq!(submit["forced"], false);

    // The attempt shows up in history.
    let history: serde_json::Value = client
        .get(format!("{}/api/results", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["subject"], "physics");
}

#[tokio::test]
async fn reentry_prompts_resume_and_restores_answers() {
    let (address, state) = spawn_app().await;
    seed_bank(&state, 40).await;
    let client = reqwest::Client::new();
    let auth = bearer(1, "user");

    client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(false, false))
        .send()
        .await
        .unwrap();
    for i in 0..3 {
        answer(&client, &address, &auth, i, 2).await;
    }

    // Re-entry surfaces the prompt with the stored counts, repeatably.
    for _ in 0..2 {
        let reentry: serde_json::Value = client
            .post(format!("{}/api/sessions/start", address))
            .header("Authorization", &auth)
            .json(&start_body(false, false))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reentry["status"], "resume_prompt");
        assert_eq!(reentry["attempted_count"], 3);
    }

    let resumed: serde_json::Value = client
        .post(format!("{}/api/sessions/optics/resume", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resumed["phase"], "Active");
    assert_eq!(resumed["attempted_count"], 3);
}

#[tokio::test]
async fn restart_clears_the_stored_attempt() {
    let (address, state) = spawn_app().await;
    seed_bank(&state, 40).await;
    let client = reqwest::Client::new();
    let auth = bearer(1, "user");

    client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(false, false))
        .send()
        .await
        .unwrap();
    for i in 0..5 {
        answer(&client, &address, &auth, i, 1).await;
    }

    let restarted: serde_json::Value = client
        .post(format!("{}/api/sessions/optics/restart", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(restarted["attempted_count"], 0);

    // No prompt on the next entry: the key was deleted outright.
    let reentry: serde_json::Value = client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(false, false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reentry["status"], "started");
}

#[tokio::test]
async fn premium_start_respects_the_credit_gate() {
    let (address, state) = spawn_app().await;
    seed_bank(&state, 40).await;
    let client = reqwest::Client::new();
    let auth = bearer(1, "user");
    let admin = bearer(99, "admin");

    // Balance 5 < cost 10: rejected, balance untouched.
    client
        .post(format!("{}/api/admin/wallets/1/credit", address))
        .header("Authorization", &admin)
        .json(&serde_json::json!({ "amount": 5 }))
        .send()
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(true, false))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 402);

    let wallet: serde_json::Value = client
        .get(format!("{}/api/wallet", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(wallet["balance"], 5);

    // Funded but unconfirmed: the gate asks for confirmation first.
    client
        .post(format!("{}/api/admin/wallets/1/credit", address))
        .header("Authorization", &admin)
        .json(&serde_json::json!({ "amount" : 20 }))
        .send()
        .await
        .unwrap();

    let pending: serde_json::Value = client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(true, false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending["status"], "payment_required");
    assert_eq!(pending["cost"], 10);

    // Confirmed: charged exactly the configured cost.
    let started: serde_json::Value = client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(true, true))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(started["status"], "started");
    assert_eq!(started["view"]["proctored"], true);

    let wallet: serde_json::Value = client
        .get(format!("{}/api/wallet", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(wallet["balance"], 15);
}

#[tokio::test]
async fn focus_loss_force_submits_a_proctored_attempt() {
    let (address, state) = spawn_app().await;
    seed_bank(&state, 40).await;
    let client = reqwest::Client::new();
    let auth = bearer(1, "user");

    state.stores.ledger.credit(1, 100).await.unwrap();
    client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(true, true))
        .send()
        .await
        .unwrap();

    // 12 of 30 answered when the window loses focus.
    for i in 0..12 {
        answer(&client, &address, &auth, i, 0).await;
    }

    let violation: serde_json::Value = client
        .post(format!("{}/api/sessions/optics/violation", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(violation["notice"].as_str().unwrap().contains("lost focus"));
    let submission = &violation["submission"];
    assert_eq!(submission["forced"], true);
    assert_eq!(submission["result"]["total_questions"], 12);

    // One-shot: reporting again is a no-op.
    let repeat: serde_json::Value = client
        .post(format!("{}/api/sessions/optics/violation", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(repeat["ignored"], true);
}

#[tokio::test]
async fn analysis_unlock_charges_once_then_serves_cached() {
    let (address, state) = spawn_app().await;
    seed_bank(&state, 30).await;
    let client = reqwest::Client::new();
    let auth = bearer(1, "user");

    state.stores.ledger.credit(1, 100).await.unwrap();

    client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(false, false))
        .send()
        .await
        .unwrap();
    for i in 0..30 {
        answer(&client, &address, &auth, i, if i < 20 { 0 } else { 2 }).await;
    }
    client
        .post(format!("{}/api/sessions/optics/submit", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    let submit: serde_json::Value = client
        .post(format!("{}/api/sessions/optics/confirm", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let result_id = submit["result"]["id"].as_str().unwrap().to_string();

    // First unlock: flat base cost for a non-subscriber.
    let unlocked: serde_json::Value = client
        .post(format!("{}/api/results/{}/analysis", address, result_id))
        .header("Authorization", &auth)
        .json(&serde_json::json!({ "confirm": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unlocked["charged"], 10);
    assert_eq!(unlocked["cached"], false);
    assert!(unlocked["report"].as_str().unwrap().contains("20 correct"));

    // Second unlock: cached, free, balance unchanged.
    let cached: serde_json::Value = client
        .post(format!("{}/api/results/{}/analysis", address, result_id))
        .header("Authorization", &auth)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cached["charged"], 0);
    assert_eq!(cached["cached"], true);

    let wallet = state.stores.ledger.wallet(1).await.unwrap();
    assert_eq!(wallet.balance, 90);

    // Narration of the unlocked report is its own gated action.
    let narration: serde_json::Value = client
        .post(format!("{}/api/results/{}/narration", address, result_id))
        .header("Authorization", &auth)
        .json(&serde_json::json!({ "confirm": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(narration["charged"], 3);
    assert!(narration["narration_text"].as_str().is_some());
}

#[tokio::test]
async fn highest_satisfied_prize_rule_is_applied() {
    let (address, state) = spawn_app().await;
    seed_bank(&state, 30).await;
    let client = reqwest::Client::new();
    let auth = bearer(1, "user");
    let admin = bearer(99, "admin");

    for (min_percentage, amount) in [(50.0, 10), (80.0, 50)] {
        let response = client
            .post(format!("{}/api/admin/prize-rules", address))
            .header("Authorization", &admin)
            .json(&serde_json::json!({
                "category": "physics",
                "min_questions": 10,
                "min_percentage": min_percentage,
                "reward_type": "COINS",
                "amount": amount,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
    }

    client
        .post(format!("{}/api/sessions/start", address))
        .header("Authorization", &auth)
        .json(&start_body(false, false))
        .send()
        .await
        .unwrap();
    // Perfect run: 100% satisfies both rules; only the 80% one pays out.
    for i in 0..30 {
        answer(&client, &address, &auth, i, 0).await;
    }
    client
        .post(format!("{}/api/sessions/optics/submit", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    let submit: serde_json::Value = client
        .post(format!("{}/api/sessions/optics/confirm", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(submit["reward"]["reward_type"], "COINS");
    assert_eq!(submit["reward"]["amount"], 50);

    let wallet = state.stores.ledger.wallet(1).await.unwrap();
    assert_eq!(wallet.balance, 50);
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let (address, _state) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/admin/wallets/1/credit", address))
        .header("Authorization", bearer(1, "user"))
        .json(&serde_json::json!({ "amount": 5 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn cost_table_is_served_to_external_surfaces() {
    let (address, _state) = spawn_app().await;
    let client = reqwest::Client::new();

    let costs: serde_json::Value = client
        .get(format!("{}/api/wallet/costs", address))
        .header("Authorization", bearer(1, "user"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(costs["premium_test_start"], 10);
    assert_eq!(costs["profile_edit"], 2);
    assert_eq!(costs["display_name_change"], 5);
}
