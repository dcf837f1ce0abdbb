//! Configuration module for the LiveCall gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use livecall_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::live::{
    ContextCompression, GeminiLiveConfig, LiveEndpoint, LiveSessionConfig,
};
use crate::core::session::SessionSettings;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    // Server
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL used in TwiML (e.g. https://voice.example.com)
    pub public_url: Option<String>,

    // Gemini Live credentials
    pub gemini_api_key: Option<String>,
    pub gcp_project_id: Option<String>,
    pub vertex_location: String,
    pub google_access_token: Option<String>,
    pub gemini_ws_url: Option<String>,

    // Gemini Live session
    pub live_model: String,
    pub voice: String,
    pub system_instruction: String,
    pub greeting: Option<String>,
    pub transcribe_input: bool,
    pub transcribe_output: bool,
    pub context_compression: bool,

    // Session timing
    pub ready_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub liveness_tick_ms: u64,
    pub reconnect_on_go_away: bool,

    // Relay
    pub inbound_chunk_bytes: usize,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "<redacted>");
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_url", &self.public_url)
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("gcp_project_id", &self.gcp_project_id)
            .field("vertex_location", &self.vertex_location)
            .field("google_access_token", &redact(&self.google_access_token))
            .field("gemini_ws_url", &self.gemini_ws_url)
            .field("live_model", &self.live_model)
            .field("voice", &self.voice)
            .field("greeting", &self.greeting)
            .field("transcribe_input", &self.transcribe_input)
            .field("transcribe_output", &self.transcribe_output)
            .field("context_compression", &self.context_compression)
            .field("ready_timeout_ms", &self.ready_timeout_ms)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("liveness_tick_ms", &self.liveness_tick_ms)
            .field("reconnect_on_go_away", &self.reconnect_on_go_away)
            .field("inbound_chunk_bytes", &self.inbound_chunk_bytes)
            .finish()
    }
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.gemini_api_key {
            key.zeroize();
        }
        if let Some(ref mut token) = self.google_access_token {
            token.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (with defaults)
    ///
    /// The .env file, if any, is loaded in main.rs before this is called.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Which Live API deployment the credentials point at.
    ///
    /// An API key selects Google AI Studio; otherwise a project id plus
    /// access token selects Vertex AI.
    pub fn live_endpoint(&self) -> Result<LiveEndpoint, String> {
        if let Some(api_key) = self.gemini_api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(LiveEndpoint::AiStudio {
                api_key: api_key.clone(),
            });
        }

        match (&self.gcp_project_id, &self.google_access_token) {
            (Some(project_id), Some(access_token))
                if !project_id.is_empty() && !access_token.is_empty() =>
            {
                Ok(LiveEndpoint::VertexAi {
                    project_id: project_id.clone(),
                    location: self.vertex_location.clone(),
                    access_token: access_token.clone(),
                })
            }
            _ => Err("Gemini credentials missing: set GOOGLE_API_KEY, or GOOGLE_CLOUD_PROJECT \
                 together with GOOGLE_ACCESS_TOKEN"
                .to_string()),
        }
    }

    /// Connector settings for the Live API.
    pub fn gemini_live_config(&self) -> Result<GeminiLiveConfig, String> {
        let mut config = GeminiLiveConfig::new(self.live_endpoint()?);
        config.url_override = self.gemini_ws_url.clone();
        Ok(config)
    }

    /// Per-call setup sent on every connection attempt.
    pub fn live_session_config(&self) -> LiveSessionConfig {
        LiveSessionConfig {
            model: self.live_model.clone(),
            voice: self.voice.clone(),
            system_instruction: Some(self.system_instruction.clone())
                .filter(|text| !text.trim().is_empty()),
            greeting: self
                .greeting
                .clone()
                .filter(|text| !text.trim().is_empty()),
            transcribe_input: self.transcribe_input,
            transcribe_output: self.transcribe_output,
            context_compression: if self.context_compression {
                ContextCompression::default()
            } else {
                ContextCompression::Disabled
            },
            ..LiveSessionConfig::default()
        }
    }

    /// Session timing policy.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            liveness_tick: Duration::from_millis(self.liveness_tick_ms),
            reconnect_on_go_away: self.reconnect_on_go_away,
        }
    }

    /// WebSocket URL Twilio should stream to.
    ///
    /// Uses `public_url` when configured, otherwise the request's Host header.
    pub fn media_stream_url(&self, request_host: Option<&str>) -> Option<String> {
        let base = match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", request_host?),
        };

        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("wss://") || base.starts_with("ws://") {
            base
        } else {
            format!("wss://{base}")
        };

        Some(format!("{ws_base}/media-stream"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            public_url: None,
            gemini_api_key: Some("test-key".to_string()),
            gcp_project_id: None,
            vertex_location: "us-central1".to_string(),
            google_access_token: None,
            gemini_ws_url: None,
            live_model: "gemini-live-2.5-flash-native-audio".to_string(),
            voice: "Puck".to_string(),
            system_instruction: "Be helpful.".to_string(),
            greeting: None,
            transcribe_input: true,
            transcribe_output: true,
            context_compression: true,
            ready_timeout_ms: 10_000,
            reconnect_delay_ms: 1_500,
            liveness_tick_ms: 1_000,
            reconnect_on_go_away: false,
            inbound_chunk_bytes: 3200,
        }
    }

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for key in [
                "HOST",
                "PORT",
                "PUBLIC_URL",
                "GOOGLE_API_KEY",
                "GOOGLE_CLOUD_PROJECT",
                "GCP_PROJECT_ID",
                "VERTEX_LOCATION",
                "GOOGLE_ACCESS_TOKEN",
                "GEMINI_WS_URL",
                "GEMINI_MODEL",
                "VERTEX_LIVE_MODEL",
                "GEMINI_VOICE",
                "SYSTEM_INSTRUCTION",
                "GREETING",
                "GEMINI_TRANSCRIBE_INPUT",
                "GEMINI_TRANSCRIBE_OUTPUT",
                "GEMINI_CONTEXT_COMPRESSION",
                "SESSION_READY_TIMEOUT_MS",
                "SESSION_RECONNECT_DELAY_MS",
                "SESSION_LIVENESS_TICK_MS",
                "SESSION_RECONNECT_ON_GO_AWAY",
                "INBOUND_CHUNK_BYTES",
            ] {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_address() {
        assert_eq!(test_config().address(), "127.0.0.1:5000");
    }

    #[test]
    fn test_live_endpoint_prefers_api_key() {
        let mut config = test_config();
        config.gcp_project_id = Some("proj".to_string());
        config.google_access_token = Some("token".to_string());
        assert!(matches!(
            config.live_endpoint().unwrap(),
            LiveEndpoint::AiStudio { .. }
        ));
    }

    #[test]
    fn test_live_endpoint_vertex() {
        let mut config = test_config();
        config.gemini_api_key = None;
        config.gcp_project_id = Some("proj".to_string());
        config.google_access_token = Some("token".to_string());
        config.vertex_location = "europe-west4".to_string();

        match config.live_endpoint().unwrap() {
            LiveEndpoint::VertexAi {
                project_id,
                location,
                ..
            } => {
                assert_eq!(project_id, "proj");
                assert_eq!(location, "europe-west4");
            }
            other => panic!("unexpected endpoint {other:?}"),
        }
    }

    #[test]
    fn test_live_endpoint_missing_credentials() {
        let mut config = test_config();
        config.gemini_api_key = None;
        config.gcp_project_id = Some("proj".to_string());
        assert!(config.live_endpoint().is_err());
    }

    #[test]
    fn test_live_session_config_mapping() {
        let mut config = test_config();
        config.context_compression = false;
        config.transcribe_output = false;
        config.system_instruction = "  ".to_string();

        let session = config.live_session_config();
        assert_eq!(session.voice, "Puck");
        assert_eq!(session.context_compression, ContextCompression::Disabled);
        assert!(!session.transcribe_output);
        assert!(session.system_instruction.is_none());
        assert_eq!(session.input_sample_rate, 16000);
        assert!(session.greeting.is_none());
    }

    #[test]
    fn test_live_session_config_greeting() {
        let mut config = test_config();
        config.greeting = Some("Greet the caller warmly.".to_string());
        assert_eq!(
            config.live_session_config().greeting.as_deref(),
            Some("Greet the caller warmly.")
        );

        config.greeting = Some("   ".to_string());
        assert!(config.live_session_config().greeting.is_none());
    }

    #[test]
    fn test_session_settings_mapping() {
        let mut config = test_config();
        config.reconnect_on_go_away = true;
        let settings = config.session_settings();
        assert_eq!(settings.ready_timeout, Duration::from_secs(10));
        assert_eq!(settings.reconnect_delay, Duration::from_millis(1500));
        assert!(settings.reconnect_on_go_away);
    }

    #[test]
    fn test_media_stream_url() {
        let mut config = test_config();
        assert_eq!(
            config.media_stream_url(Some("abc.ngrok.app")).as_deref(),
            Some("wss://abc.ngrok.app/media-stream")
        );
        assert_eq!(config.media_stream_url(None), None);

        config.public_url = Some("https://voice.example.com/".to_string());
        assert_eq!(
            config.media_stream_url(Some("ignored")).as_deref(),
            Some("wss://voice.example.com/media-stream")
        );

        config.public_url = Some("http://localhost:5000".to_string());
        assert_eq!(
            config.media_stream_url(None).as_deref(),
            Some("ws://localhost:5000/media-stream")
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", test_config());
        assert!(!debug.contains("test-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();
        unsafe {
            env::set_var("GOOGLE_API_KEY", "env-key");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.gemini_api_key.as_deref(), Some("env-key"));
        assert_eq!(config.vertex_location, "us-central1");
        assert_eq!(config.live_model, "gemini-live-2.5-flash-native-audio");
        assert_eq!(config.voice, "Puck");
        assert!(config.transcribe_input);
        assert!(config.context_compression);
        assert_eq!(config.ready_timeout_ms, 10_000);
        assert_eq!(config.reconnect_delay_ms, 1_500);
        assert_eq!(config.liveness_tick_ms, 1_000);
        assert!(!config.reconnect_on_go_away);
        assert_eq!(config.inbound_chunk_bytes, 3200);
        assert!(config.greeting.is_none());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_credentials() {
        cleanup_env_vars();
        let result = ServerConfig::from_env();
        assert!(result.is_err());
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_vertex_aliases() {
        cleanup_env_vars();
        unsafe {
            env::set_var("GCP_PROJECT_ID", "alias-project");
            env::set_var("GOOGLE_ACCESS_TOKEN", "ya29.token");
            env::set_var("VERTEX_LIVE_MODEL", "gemini-2.0-flash-live-preview-04-09");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.gcp_project_id.as_deref(), Some("alias-project"));
        assert_eq!(config.live_model, "gemini-2.0-flash-live-preview-04-09");
        assert!(matches!(
            config.live_endpoint().unwrap(),
            LiveEndpoint::VertexAi { .. }
        ));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        cleanup_env_vars();
        unsafe {
            env::set_var("GOOGLE_API_KEY", "env-key");
            env::set_var("PORT", "not-a-port");
        }
        assert!(ServerConfig::from_env().is_err());
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_url: "https://voice.example.com"

gemini:
  api_key: "yaml-key"
  voice: "Kore"
  greeting: "Say hello."
  transcribe_output: false

session:
  reconnect_delay_ms: 500
  reconnect_on_go_away: true
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("GOOGLE_API_KEY", "env-key");
            env::set_var("SESSION_READY_TIMEOUT_MS", "4000");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.gemini_api_key.as_deref(), Some("yaml-key"));
        // YAML value
        assert_eq!(config.port, 8080);
        assert_eq!(config.voice, "Kore");
        assert!(!config.transcribe_output);
        assert_eq!(config.reconnect_delay_ms, 500);
        assert!(config.reconnect_on_go_away);
        assert_eq!(config.greeting.as_deref(), Some("Say hello."));
        // ENV value survives where YAML is silent
        assert_eq!(config.ready_timeout_ms, 4000);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();
        let result = ServerConfig::from_file(&PathBuf::from("/nonexistent/config.yaml"));
        assert!(result.is_err());
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_zero_timing() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            "gemini:\n  api_key: \"k\"\nsession:\n  liveness_tick_ms: 0\n",
        )
        .unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(result.is_err());

        cleanup_env_vars();
    }
}
