use axum::{
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use talkto_core::AppState;

pub mod error;
pub mod middleware;
pub mod routes;

pub fn build_router() -> Router<AppState> {
    let cors = build_cors_layer();
    Router::new()
        // Health
        .route("/health", get(health))
        // Timeline reads
        .route("/api/chat/history", get(routes::timeline::history))
        .route("/api/chat/jump", get(routes::timeline::jump))
        .route("/api/chat/search", get(routes::timeline::search))
        // Read state
        .route(
            "/api/chat/last-read",
            get(routes::read_state::get_last_read).post(routes::read_state::mark_read),
        )
        // Messages
        .route("/api/chat/send", post(routes::messages::send_message))
        .route(
            "/api/chat/messages/{message_id}",
            patch(routes::messages::edit_message).delete(routes::messages::delete_message),
        )
        .route(
            "/api/chat/messages/{message_id}/revisions",
            get(routes::messages::message_revisions),
        )
        // Presence
        .route("/api/chat/typing", post(routes::typing::typing))
        // Middleware layers
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "talkto" })),
    )
}
