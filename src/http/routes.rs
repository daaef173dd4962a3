use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Conversation control
        .route("/conversations/start", post(handlers::start_conversation))
        .route(
            "/conversations/stop/:conversation_id",
            post(handlers::stop_conversation),
        )
        // Conversation queries
        .route(
            "/conversations/:conversation_id/status",
            get(handlers::get_conversation_status),
        )
        .route(
            "/conversations/:conversation_id/transcript",
            get(handlers::get_conversation_transcript),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
