//! Telephony media stream WebSocket handlers
//!
//! One socket carries one phone call using the Twilio Media Streams
//! protocol.
//!
//! # Protocol
//!
//! ## Twilio → Server
//!
//! - **connected**: Socket handshake
//! - **start**: Stream metadata; opens the call's session
//! - **media**: Base64 mu-law 8kHz caller audio
//! - **mark**: Playback reached a mark we sent
//! - **dtmf**: Key press
//! - **stop**: Call ended; the session is torn down
//!
//! ## Server → Twilio
//!
//! - **media**: Base64 mu-law 8kHz assistant audio, 20 ms per frame
//! - **mark**: `turn-<n>` after each completed assistant turn

mod handler;
mod inbound;
pub mod messages;

pub use handler::media_stream_handler;
