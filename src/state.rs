use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::live::{GeminiLiveConnector, LiveConnector};
use crate::core::session::SessionManager;

/// Shared application state handed to every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Build state backed by the Gemini Live connector described by `config`.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, String> {
        let connector = GeminiLiveConnector::new(config.gemini_live_config()?);
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Build state around an arbitrary connector.
    pub fn with_connector(config: ServerConfig, connector: Arc<dyn LiveConnector>) -> Arc<Self> {
        let sessions = SessionManager::new(
            connector,
            config.live_session_config(),
            config.session_settings(),
        );
        Arc::new(Self {
            config,
            sessions: Arc::new(sessions),
        })
    }
}
