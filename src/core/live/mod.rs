//! Live conversational backend.
//!
//! This module talks to the Gemini Live API: a bidirectional WebSocket that
//! accepts streaming PCM audio and answers with synthesized speech,
//! transcriptions and turn boundaries.
//!
//! # Architecture
//!
//! - [`LiveConnector`] opens one physical connection per call to `connect`
//! - [`LiveConnection`] moves audio up and [`ServerMessage`]s down
//! - [`GeminiLiveConnector`] is the production implementation
//!
//! Reconnection, resumption handles and event normalization live one layer
//! up in [`crate::core::session`].
//!
//! # Example
//!
//! ```rust,ignore
//! use livecall_gateway::core::live::{
//!     GeminiLiveConfig, GeminiLiveConnector, LiveConnector, LiveEndpoint, LiveSessionConfig,
//! };
//!
//! let connector = GeminiLiveConnector::new(GeminiLiveConfig::new(LiveEndpoint::AiStudio {
//!     api_key: "...".to_string(),
//! }));
//! let mut connection = connector.connect(&LiveSessionConfig::default(), None).await?;
//! connection.send_audio(pcm_16k).await?;
//! while let Some(message) = connection.next_message().await {
//!     println!("{:?}", message?);
//! }
//! ```

mod base;
mod client;
mod config;
pub mod messages;

pub use base::{
    BoxedLiveConnection, ContextCompression, LiveConnection, LiveConnector, LiveError, LiveResult,
    LiveSessionConfig,
};
pub use client::{GeminiLiveConnection, GeminiLiveConnector};
pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_LIVE_MODEL, DEFAULT_SYSTEM_INSTRUCTION,
    DEFAULT_VERTEX_LOCATION, DEFAULT_VOICE, GEMINI_LIVE_URL, GeminiLiveConfig, LiveEndpoint,
    VERTEX_LIVE_PATH,
};
pub use messages::ServerMessage;
