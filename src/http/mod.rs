//! HTTP API server for external control
//!
//! This module provides a REST API for controlling conversation sessions:
//! - POST /conversations/start - Start a new conversation
//! - POST /conversations/stop/:id - Stop a conversation
//! - GET /conversations/:id/status - Query session status
//! - GET /conversations/:id/transcript - Get committed transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
