// src/routes.rs

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, exam, history},
    state::AppState,
    utils::guard::{IDENTITY_HEADER, admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, exams, history and profile, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store, exam hub, config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];
    let identity = HeaderName::from_static(IDENTITY_HEADER);

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, identity.clone()])
        .expose_headers([identity]);

    let auth_routes = Router::new()
        .route("/lookup", post(auth::lookup))
        .route("/password", post(auth::create_password))
        .route("/login", post(auth::login))
        // Protected auth routes
        .merge(
            Router::new()
                .route("/logout", post(auth::logout))
                .route("/me", get(auth::me))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        );

    let exam_routes = Router::new()
        .route("/sets", get(exam::list_sets))
        .route("/{kind}", get(exam::get_session))
        .route("/{kind}/start", post(exam::start))
        .route("/{kind}/select", post(exam::select))
        .route("/{kind}/save", post(exam::save))
        .route("/{kind}/clear", post(exam::clear))
        .route("/{kind}/navigate", post(exam::navigate))
        .route("/{kind}/next", post(exam::next))
        .route("/{kind}/previous", post(exam::previous))
        .route("/{kind}/submit", post(exam::submit))
        .route("/{kind}/review", post(exam::review))
        .route("/{kind}/retry-save", post(exam::retry_save))
        .route("/{kind}/suspend", post(exam::suspend))
        .route("/{kind}/resume", post(exam::resume))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let record_routes = Router::new()
        .route("/api/history", get(history::list_history))
        .route("/api/reviews/{id}", get(history::get_review))
        .route("/api/profile/stats", get(history::profile_stats))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // The admin guard resolves the session itself, so no separate auth layer.
    let admin_routes = Router::new()
        .route("/results", get(admin::list_results))
        .route("/users", post(admin::create_student))
        .layer(middleware::from_fn_with_state(state.clone(), admin_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/admin", admin_routes)
        .merge(record_routes)
        // Global Middleware (trace outermost, then CORS)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
