use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub active_sessions: usize,
}

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        active_sessions: state.sessions.active_sessions(),
    })
}

/// Answer an incoming call with TwiML that connects it to the media stream.
///
/// The stream URL comes from `public_url` when configured, otherwise from
/// the request's `Host` header.
pub async fn twiml(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());

    let Some(url) = state.config.media_stream_url(host) else {
        warn!("Cannot build media stream URL: no PUBLIC_URL and no Host header");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "media stream URL unavailable",
        )
            .into_response();
    };

    info!(%url, "Answering call with media stream");
    (
        [(header::CONTENT_TYPE, "application/xml")],
        render_twiml(&url),
    )
        .into_response()
}

fn render_twiml(stream_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response><Connect><Stream url=\"{}\"/></Connect></Response>",
        escape_attribute(stream_url)
    )
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
