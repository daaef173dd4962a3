// Wire-contract tests for the agent event envelope.
//
// These pin the JSON shapes the agent service sends so a payload change
// shows up as a test failure here rather than as silently dropped events.

use base64::Engine;
use voxlive::channel::{AgentEventMessage, SessionOpenMessage};
use voxlive::ResponseModality;

#[test]
fn test_parse_ready_event() {
    let event: AgentEventMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
    assert!(matches!(event, AgentEventMessage::Ready));
}

#[test]
fn test_parse_sparse_update() {
    // An update with no fields set is legal and deserializes to defaults.
    let event: AgentEventMessage = serde_json::from_str(r#"{"type":"update"}"#).unwrap();

    match event {
        AgentEventMessage::Update(update) => {
            assert!(update.input_transcript.is_none());
            assert!(update.output_transcript.is_none());
            assert!(!update.turn_complete);
            assert!(!update.interrupted);
            assert!(update.audio.is_none());
        }
        other => panic!("expected update, got {:?}", other),
    }
}

#[test]
fn test_parse_full_update() {
    let json = r#"{
        "type": "update",
        "input_transcript": "hello",
        "output_transcript": "hi there",
        "turn_complete": true,
        "audio": {"data": "AAAA", "mime_type": "audio/pcm;rate=24000"}
    }"#;

    let event: AgentEventMessage = serde_json::from_str(json).unwrap();

    match event {
        AgentEventMessage::Update(update) => {
            assert_eq!(update.input_transcript.as_deref(), Some("hello"));
            assert_eq!(update.output_transcript.as_deref(), Some("hi there"));
            assert!(update.turn_complete);

            let audio = update.audio.unwrap();
            assert_eq!(audio.mime_type, "audio/pcm;rate=24000");
            let pcm = base64::engine::general_purpose::STANDARD
                .decode(&audio.data)
                .unwrap();
            assert_eq!(pcm.len(), 3);
        }
        other => panic!("expected update, got {:?}", other),
    }
}

#[test]
fn test_parse_interruption_flag() {
    let event: AgentEventMessage =
        serde_json::from_str(r#"{"type":"update","interrupted":true}"#).unwrap();

    match event {
        AgentEventMessage::Update(update) => assert!(update.interrupted),
        other => panic!("expected update, got {:?}", other),
    }
}

#[test]
fn test_parse_error_and_closed_events() {
    let event: AgentEventMessage =
        serde_json::from_str(r#"{"type":"error","message":"model overloaded"}"#).unwrap();
    match event {
        AgentEventMessage::Error { message } => assert_eq!(message, "model overloaded"),
        other => panic!("expected error, got {:?}", other),
    }

    let event: AgentEventMessage = serde_json::from_str(r#"{"type":"closed"}"#).unwrap();
    assert!(matches!(event, AgentEventMessage::Closed));
}

#[test]
fn test_session_open_serializes_modality_snake_case() {
    let open = SessionOpenMessage {
        conversation_id: "conversation-1".into(),
        response_modality: ResponseModality::Audio,
        transcribe_input: true,
        transcribe_output: true,
        system_instruction: "be brief".into(),
        capture_sample_rate: 16000,
        playback_sample_rate: 24000,
        timestamp: "2026-01-01T00:00:00Z".into(),
    };

    let json = serde_json::to_value(&open).unwrap();
    assert_eq!(json["response_modality"], "audio");
    assert_eq!(json["capture_sample_rate"], 16000);
    assert_eq!(json["playback_sample_rate"], 24000);
}
