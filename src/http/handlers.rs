use super::state::AppState;
use crate::audio::{DeviceCaptureBackend, DevicePlaybackSink};
use crate::session::{ConversationSession, SessionConfig, SessionStats, TranscriptTurn};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    /// Optional conversation ID (if not provided, generate UUID)
    pub conversation_id: Option<String>,

    /// Override the configured system instruction for this conversation
    pub system_instruction: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartConversationResponse {
    pub conversation_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopConversationResponse {
    pub conversation_id: String,
    pub status: String,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /conversations/start
/// Start a new conversation session
pub async fn start_conversation(
    State(state): State<AppState>,
    Json(req): Json<StartConversationRequest>,
) -> impl IntoResponse {
    // Generate or use provided conversation ID
    let conversation_id = req
        .conversation_id
        .unwrap_or_else(|| format!("conversation-{}", uuid::Uuid::new_v4()));

    info!("Starting conversation: {}", conversation_id);

    // Check if already running
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&conversation_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Conversation {} is already running", conversation_id),
                }),
            )
                .into_response();
        }
    }

    let audio = &state.config.audio;
    let agent = &state.config.agent;

    let recording_path = if audio.record_sessions {
        Some(PathBuf::from(&audio.recordings_path).join(format!("{}.wav", conversation_id)))
    } else {
        None
    };

    let config = SessionConfig {
        conversation_id: conversation_id.clone(),
        capture_sample_rate: audio.capture_sample_rate,
        playback_sample_rate: audio.playback_sample_rate,
        system_instruction: req
            .system_instruction
            .unwrap_or_else(|| agent.system_instruction.clone()),
        transcribe_input: agent.transcribe_input,
        transcribe_output: agent.transcribe_output,
        recording_path,
    };

    let capture = Box::new(DeviceCaptureBackend::new(audio.capture_sample_rate));
    let sink = Box::new(DevicePlaybackSink::new(audio.playback_sample_rate));

    let session = Arc::new(ConversationSession::new(
        config,
        Arc::clone(&state.channel),
        capture,
        sink,
    ));

    // Start the session
    if let Err(e) = session.start().await {
        error!("Failed to start conversation: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to start conversation: {}", e),
            }),
        )
            .into_response();
    }

    // Store session
    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(conversation_id.clone(), session);
    }

    info!("Conversation started successfully: {}", conversation_id);

    (
        StatusCode::OK,
        Json(StartConversationResponse {
            conversation_id: conversation_id.clone(),
            status: "connecting".to_string(),
            message: format!("Conversation {} started", conversation_id),
        }),
    )
        .into_response()
}

/// POST /conversations/stop/:conversation_id
/// Stop a running conversation
pub async fn stop_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping conversation: {}", conversation_id);

    // Find and remove session
    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&conversation_id)
    };

    match session {
        Some(session) => {
            let stats = session.stop().await;

            info!("Conversation stopped successfully: {}", conversation_id);

            (
                StatusCode::OK,
                Json(StopConversationResponse {
                    conversation_id: conversation_id.clone(),
                    status: "stopped".to_string(),
                    message: "Conversation stopped".to_string(),
                    stats,
                }),
            )
                .into_response()
        }
        None => {
            error!("Conversation {} not found", conversation_id);
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Conversation {} not found", conversation_id),
                }),
            )
                .into_response()
        }
    }
}

/// GET /conversations/:conversation_id/status
/// Get status of a conversation session
pub async fn get_conversation_status(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&conversation_id) {
        Some(session) => {
            let stats = session.stats().await;
            (StatusCode::OK, Json(stats)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Conversation {} not found", conversation_id),
            }),
        )
            .into_response(),
    }
}

/// GET /conversations/:conversation_id/transcript
/// Get the transcript committed so far
pub async fn get_conversation_transcript(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&conversation_id) {
        Some(session) => {
            let transcript: Vec<TranscriptTurn> = session.transcript().await;
            (StatusCode::OK, Json(transcript)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Conversation {} not found", conversation_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
