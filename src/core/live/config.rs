//! Gemini Live API endpoint configuration.
//!
//! Two deployments speak the same protocol:
//! - Google AI Studio, authenticated with an API key query parameter
//! - Vertex AI, authenticated with an OAuth bearer token and a regional host

use std::fmt;
use std::time::Duration;

/// Google AI Studio Live API WebSocket endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Vertex AI Live API WebSocket path (appended to the regional host).
pub const VERTEX_LIVE_PATH: &str =
    "/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent";

/// Default Live model.
pub const DEFAULT_LIVE_MODEL: &str = "gemini-live-2.5-flash-native-audio";

/// Default prebuilt voice.
pub const DEFAULT_VOICE: &str = "Puck";

/// Default Vertex AI region.
pub const DEFAULT_VERTEX_LOCATION: &str = "us-central1";

/// Time allowed for the WebSocket handshake plus `setupComplete`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default system instruction for phone conversations.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly, helpful voice assistant \
answering a phone call. Keep your answers short and conversational, speak naturally, and \
ask a clarifying question when the caller's request is ambiguous.";

// =============================================================================
// Endpoint
// =============================================================================

/// Which Live API deployment to talk to, with its credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum LiveEndpoint {
    /// Google AI Studio (API key)
    AiStudio { api_key: String },
    /// Vertex AI (project, region, OAuth access token)
    VertexAi {
        project_id: String,
        location: String,
        access_token: String,
    },
}

impl fmt::Debug for LiveEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AiStudio { .. } => f
                .debug_struct("AiStudio")
                .field("api_key", &"<redacted>")
                .finish(),
            Self::VertexAi {
                project_id,
                location,
                ..
            } => f
                .debug_struct("VertexAi")
                .field("project_id", project_id)
                .field("location", location)
                .field("access_token", &"<redacted>")
                .finish(),
        }
    }
}

impl LiveEndpoint {
    /// Short provider label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AiStudio { .. } => "ai-studio",
            Self::VertexAi { .. } => "vertex-ai",
        }
    }

    /// WebSocket URL including any credentials carried in the query.
    pub fn websocket_url(&self) -> String {
        match self {
            Self::AiStudio { api_key } => format!("{GEMINI_LIVE_URL}?key={api_key}"),
            Self::VertexAi { location, .. } => {
                format!("wss://{location}-aiplatform.googleapis.com{VERTEX_LIVE_PATH}")
            }
        }
    }

    /// Bearer token for the `Authorization` header, if this endpoint uses one.
    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Self::AiStudio { .. } => None,
            Self::VertexAi { access_token, .. } => Some(access_token),
        }
    }

    /// Fully qualified model resource name.
    ///
    /// Names that already contain a `/` are passed through untouched.
    pub fn model_path(&self, model: &str) -> String {
        if model.contains('/') {
            return model.to_string();
        }
        match self {
            Self::AiStudio { .. } => format!("models/{model}"),
            Self::VertexAi {
                project_id,
                location,
                ..
            } => format!("projects/{project_id}/locations/{location}/publishers/google/models/{model}"),
        }
    }
}

// =============================================================================
// Connector Configuration
// =============================================================================

/// Connection-level settings for [`super::GeminiLiveConnector`].
#[derive(Debug, Clone)]
pub struct GeminiLiveConfig {
    /// Deployment and credentials
    pub endpoint: LiveEndpoint,

    /// Replaces the endpoint URL (local mock servers, proxies)
    pub url_override: Option<String>,

    /// Handshake plus setup deadline
    pub connect_timeout: Duration,
}

impl GeminiLiveConfig {
    pub fn new(endpoint: LiveEndpoint) -> Self {
        Self {
            endpoint,
            url_override: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// The URL actually dialled.
    pub fn websocket_url(&self) -> String {
        self.url_override
            .clone()
            .unwrap_or_else(|| self.endpoint.websocket_url())
    }
}
