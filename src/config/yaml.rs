use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5000
///   public_url: "https://voice.example.com"
///
/// gemini:
///   api_key: "your-api-key"
///   # or, for Vertex AI:
///   project_id: "my-project"
///   location: "us-central1"
///   access_token: "ya29...."
///   model: "gemini-live-2.5-flash-native-audio"
///   voice: "Puck"
///   system_instruction: "You are a helpful phone assistant."
///   greeting: "Greet the caller warmly."
///   transcribe_input: true
///   transcribe_output: true
///   context_compression: true
///
/// session:
///   ready_timeout_ms: 10000
///   reconnect_delay_ms: 1500
///   liveness_tick_ms: 1000
///   reconnect_on_go_away: false
///   inbound_chunk_bytes: 3200
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub gemini: Option<GeminiYaml>,
    pub session: Option<SessionYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_url: Option<String>,
}

/// Gemini Live configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeminiYaml {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub location: Option<String>,
    pub access_token: Option<String>,
    pub ws_url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
    pub greeting: Option<String>,
    pub transcribe_input: Option<bool>,
    pub transcribe_output: Option<bool>,
    pub context_compression: Option<bool>,
}

/// Session timing and relay configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub ready_timeout_ms: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
    pub liveness_tick_ms: Option<u64>,
    pub reconnect_on_go_away: Option<bool>,
    pub inbound_chunk_bytes: Option<usize>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
