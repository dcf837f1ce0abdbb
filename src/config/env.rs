//! Environment variable loading.
//!
//! Reads every setting from the process environment, falling back to the
//! documented defaults. Empty values count as unset.

use std::env;
use std::str::FromStr;

use super::ServerConfig;
use crate::core::live::{
    DEFAULT_LIVE_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VERTEX_LOCATION, DEFAULT_VOICE,
};

pub(super) const DEFAULT_HOST: &str = "0.0.0.0";
pub(super) const DEFAULT_PORT: u16 = 5000;
pub(super) const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;
pub(super) const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_500;
pub(super) const DEFAULT_LIVENESS_TICK_MS: u64 = 1_000;
pub(super) const DEFAULT_INBOUND_CHUNK_BYTES: usize = 3_200;

/// Non-empty value of the first variable that is set.
pub(super) fn env_string(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Parse a variable, using `default` when unset.
pub(super) fn env_parse<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(&[key]) {
        Some(value) => value
            .parse::<T>()
            .map_err(|e| format!("Invalid value for {key}: {value:?} ({e})").into()),
        None => Ok(default),
    }
}

/// Parse a boolean flag: true/false, 1/0, yes/no, on/off.
pub(super) fn env_bool(key: &str, default: bool) -> Result<bool, Box<dyn std::error::Error>> {
    match env_string(&[key]) {
        Some(value) => parse_bool(&value)
            .ok_or_else(|| format!("Invalid boolean for {key}: {value:?}").into()),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Build a configuration from environment variables and defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    Ok(ServerConfig {
        host: env_string(&["HOST"]).unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env_parse("PORT", DEFAULT_PORT)?,
        public_url: env_string(&["PUBLIC_URL"]),

        gemini_api_key: env_string(&["GOOGLE_API_KEY"]),
        gcp_project_id: env_string(&["GOOGLE_CLOUD_PROJECT", "GCP_PROJECT_ID"]),
        vertex_location: env_string(&["VERTEX_LOCATION"])
            .unwrap_or_else(|| DEFAULT_VERTEX_LOCATION.to_string()),
        google_access_token: env_string(&["GOOGLE_ACCESS_TOKEN"]),
        gemini_ws_url: env_string(&["GEMINI_WS_URL"]),

        live_model: env_string(&["GEMINI_MODEL", "VERTEX_LIVE_MODEL"])
            .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
        voice: env_string(&["GEMINI_VOICE"]).unwrap_or_else(|| DEFAULT_VOICE.to_string()),
        system_instruction: env_string(&["SYSTEM_INSTRUCTION"])
            .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        greeting: env_string(&["GREETING"]),
        transcribe_input: env_bool("GEMINI_TRANSCRIBE_INPUT", true)?,
        transcribe_output: env_bool("GEMINI_TRANSCRIBE_OUTPUT", true)?,
        context_compression: env_bool("GEMINI_CONTEXT_COMPRESSION", true)?,

        ready_timeout_ms: env_parse("SESSION_READY_TIMEOUT_MS", DEFAULT_READY_TIMEOUT_MS)?,
        reconnect_delay_ms: env_parse("SESSION_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS)?,
        liveness_tick_ms: env_parse("SESSION_LIVENESS_TICK_MS", DEFAULT_LIVENESS_TICK_MS)?,
        reconnect_on_go_away: env_bool("SESSION_RECONNECT_ON_GO_AWAY", false)?,

        inbound_chunk_bytes: env_parse("INBOUND_CHUNK_BYTES", DEFAULT_INBOUND_CHUNK_BYTES)?,
    })
}
