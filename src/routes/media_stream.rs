//! Media stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media stream WebSocket router
///
/// # Endpoints
///
/// - `GET /media-stream` - WebSocket upgrade for Twilio Media Streams
/// - `GET /ws` - Alias for the same handler
///
/// # Protocol
///
/// Twilio sends JSON text frames tagged by `event`:
/// 1. `connected`, then `start` carrying the `streamSid`
/// 2. `media` frames with base64 mu-law 8kHz audio
/// 3. `stop` when the call ends
///
/// The server replies with `media` frames in the same encoding and a `mark`
/// after each completed model turn.
pub fn create_media_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .route("/ws", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
