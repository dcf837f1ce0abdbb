//! Base traits and types for the Live conversational backend.
//!
//! The session layer never touches a socket directly. It asks a
//! [`LiveConnector`] for a fresh [`LiveConnection`] every time it needs one,
//! handing over the immutable [`LiveSessionConfig`] plus the most recent
//! resumption handle, and then pumps audio in and [`ServerMessage`]s out.
//!
//! # Audio Format
//!
//! Input audio is PCM 16-bit signed little-endian mono at 16kHz. Output audio
//! arrives as PCM 16-bit at the rate announced by each part's mime type
//! (24kHz for the native-audio models).

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::messages::ServerMessage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the Live backend.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The backend rejected or never acknowledged the setup message
    #[error("Setup failed: {0}")]
    SetupFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The backend closed the connection abnormally
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
}

/// Result type for Live backend operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Context window compression policy sent with every setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ContextCompression {
    /// Let the backend end the session when the context fills up
    Disabled,
    /// Drop the oldest turns once the context reaches `trigger_tokens`
    SlidingWindow {
        #[serde(default)]
        trigger_tokens: Option<u64>,
        #[serde(default)]
        target_tokens: Option<u64>,
    },
}

impl Default for ContextCompression {
    fn default() -> Self {
        ContextCompression::SlidingWindow {
            trigger_tokens: None,
            target_tokens: None,
        }
    }
}

/// Per-call configuration supplied on every connection attempt.
///
/// Immutable for the lifetime of a logical session: every reconnect sends
/// exactly the same setup, only the resumption handle changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSessionConfig {
    /// Model identifier (e.g., "gemini-live-2.5-flash-native-audio")
    pub model: String,

    /// Prebuilt voice name (e.g., "Puck")
    pub voice: String,

    /// System instruction text
    #[serde(default)]
    pub system_instruction: Option<String>,

    /// Ask the backend to transcribe caller speech
    #[serde(default)]
    pub transcribe_input: bool,

    /// Ask the backend to transcribe its own speech
    #[serde(default)]
    pub transcribe_output: bool,

    /// Context window compression policy
    #[serde(default)]
    pub context_compression: ContextCompression,

    /// Sample rate of the PCM sent to the backend
    pub input_sample_rate: u32,

    /// Text turn sent once after the first successful connection, never on
    /// a resume
    #[serde(default)]
    pub greeting: Option<String>,
}

impl Default for LiveSessionConfig {
    fn default() -> Self {
        Self {
            model: super::config::DEFAULT_LIVE_MODEL.to_string(),
            voice: super::config::DEFAULT_VOICE.to_string(),
            system_instruction: Some(super::config::DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            transcribe_input: true,
            transcribe_output: true,
            context_compression: ContextCompression::default(),
            input_sample_rate: crate::core::audio::BACKEND_INPUT_SAMPLE_RATE,
            greeting: None,
        }
    }
}

// =============================================================================
// Connection Traits
// =============================================================================

/// One physical connection to the backend.
///
/// `next_message` must be cancel-safe: the session loop races it against
/// outgoing audio and cancellation in a `select!`.
#[async_trait]
pub trait LiveConnection: Send {
    /// Send one chunk of PCM audio.
    async fn send_audio(&mut self, pcm: Bytes) -> LiveResult<()>;

    /// Send a complete user text turn.
    async fn send_text(&mut self, text: &str) -> LiveResult<()>;

    /// Wait for the next backend message.
    ///
    /// Returns `None` when the backend closed the connection cleanly.
    async fn next_message(&mut self) -> Option<LiveResult<ServerMessage>>;

    /// Close the connection.
    async fn close(&mut self) -> LiveResult<()>;
}

/// Boxed connection trait object.
pub type BoxedLiveConnection = Box<dyn LiveConnection>;

/// Opens connections to the backend.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Open a connection and complete the setup handshake.
    ///
    /// `resumption_handle` continues a previous conversation when present.
    async fn connect(
        &self,
        config: &LiveSessionConfig,
        resumption_handle: Option<&str>,
    ) -> LiveResult<BoxedLiveConnection>;
}
