//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and TwiML call answering
//! - `media_stream` - Twilio Media Streams WebSocket bridged to Gemini Live

pub mod api;
pub mod media_stream;

pub use media_stream::media_stream_handler;
