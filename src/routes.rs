// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, results, session, wallet},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (sessions, results, wallet, admin).
/// * Applies global middleware (Trace, CORS) and the JWT auth layer.
/// * Injects global state.
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

    let session_routes = Router::new()
        .route("/start", post(session::start_session))
        .route("/{chapter_id}", get(session::view_session))
        .route("/{chapter_id}/resume", post(session::resume_session))
        .route("/{chapter_id}/restart", post(session::restart_session))
        .route("/{chapter_id}/answer", post(session::submit_answer))
        .route("/{chapter_id}/batch/next", post(session::next_batch))
        .route("/{chapter_id}/batch/prev", post(session::prev_batch))
        .route("/{chapter_id}/heartbeat", post(session::heartbeat))
        .route("/{chapter_id}/submit", post(session::request_submit))
        .route("/{chapter_id}/submit/cancel", post(session::cancel_submit))
        .route("/{chapter_id}/confirm", post(session::confirm_submit))
        .route("/{chapter_id}/violation", post(session::report_violation));

    let result_routes = Router::new()
        .route("/", get(results::list_results))
        .route("/{id}", get(results::get_result))
        .route("/{id}/reopen", post(results::reopen_result))
        .route("/{id}/analysis", post(results::unlock_analysis))
        .route("/{id}/narration", post(results::narrate_analysis));

    let wallet_routes = Router::new()
        .route("/", get(wallet::get_wallet))
        .route("/auto-deduct", post(wallet::set_auto_deduct))
        .route("/costs", get(wallet::get_costs));

    let admin_routes = Router::new()
        .route("/questions", post(admin::upload_questions))
        .route(
            "/prize-rules",
            get(admin::list_prize_rules).post(admin::create_prize_rule),
        )
        .route("/wallets/{user_id}/credit", post(admin::credit_wallet))
        .route("/sync/flush", post(admin::flush_sync))
        // Double middleware protection: Auth first (outer), then Admin check
        .layer(middleware::from_fn(admin_middleware));

    Router::new()
        .nest("/api/sessions", session_routes)
        .nest("/api/results", result_routes)
        .nest("/api/wallet", wallet_routes)
        .nest("/api/admin", admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
