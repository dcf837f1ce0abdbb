//! Gemini Live API WebSocket message types.
//!
//! All messages are JSON objects with exactly one top-level key naming the
//! message kind. The server may deliver them in text or binary frames.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server):
//! - setup - First message on every connection
//! - realtimeInput - Streaming audio input
//! - clientContent - A complete text turn (the greeting)
//!
//! Server messages (received from server):
//! - setupComplete - Setup accepted, connection usable
//! - serverContent - Model audio, transcriptions, turn boundaries
//! - sessionResumptionUpdate - New resumption handle
//! - goAway - Connection will be terminated soon
//! - usageMetadata - Token accounting

use base64::prelude::*;
use serde::{Deserialize, Serialize};

/// Mime type prefix for raw PCM audio parts.
pub const PCM_MIME_PREFIX: &str = "audio/pcm";

// =============================================================================
// Client Messages
// =============================================================================

/// Messages sent from the gateway to the Live API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session setup
    Setup(Setup),
    /// Streaming input
    RealtimeInput(RealtimeInput),
    /// Conversation turns appended to the history
    ClientContent(ClientContent),
}

impl ClientMessage {
    /// Create a realtime audio input message from raw PCM.
    pub fn audio(pcm: &[u8], sample_rate: u32) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: Some(Blob {
                mime_type: format!("{PCM_MIME_PREFIX};rate={sample_rate}"),
                data: BASE64_STANDARD.encode(pcm),
            }),
        })
    }

    /// Create a single user text turn that asks the model to respond.
    pub fn text(text: impl Into<String>) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::text(text)],
            turn_complete: true,
        })
    }
}

/// Setup payload; sent once as the first message of a connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model name
    pub model: String,

    /// Generation parameters
    pub generation_config: GenerationConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window_compression: Option<ContextWindowCompression>,

    /// Always present so the server issues resumption handles
    pub session_resumption: SessionResumptionConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Empty marker object enabling a transcription stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AudioTranscriptionConfig {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindowCompression {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_tokens: Option<u64>,

    pub sliding_window: SlidingWindow,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlidingWindow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumptionConfig {
    /// Handle from a previous connection; absent for a fresh session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,

    /// The model starts generating once this is set
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
}

// =============================================================================
// Shared Content Types
// =============================================================================

/// A turn's content: an ordered list of parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user-role content holding a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

/// Inline binary payload, base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

impl Blob {
    /// Whether this blob carries raw PCM audio.
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with(PCM_MIME_PREFIX)
    }

    /// Sample rate from the `rate=` mime parameter, falling back to `default`.
    pub fn sample_rate(&self, default: u32) -> u32 {
        self.mime_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse::<u32>().ok())
            .filter(|rate| *rate > 0)
            .unwrap_or(default)
    }

    /// Decode the base64 payload.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.data)
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// A message received from the Live API.
///
/// Each field corresponds to one message kind; normally exactly one is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_resumption_update: Option<SessionResumptionUpdate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go_away: Option<GoAway>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl ServerMessage {
    /// Parse a server message from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,

    #[serde(default)]
    pub turn_complete: bool,

    #[serde(default)]
    pub interrupted: bool,

    #[serde(default)]
    pub generation_complete: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumptionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_handle: Option<String>,

    #[serde(default)]
    pub resumable: bool,
}

impl SessionResumptionUpdate {
    /// The handle to store, if this update carries a usable one.
    pub fn usable_handle(&self) -> Option<&str> {
        match (&self.new_handle, self.resumable) {
            (Some(handle), true) if !handle.is_empty() => Some(handle.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    /// Remaining time as a protobuf duration string, e.g. "10s"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_left: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u64>,

    #[serde(default)]
    pub response_token_count: Option<u64>,

    #[serde(default)]
    pub total_token_count: Option<u64>,
}
