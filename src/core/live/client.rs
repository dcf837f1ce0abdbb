//! Gemini Live WebSocket client.
//!
//! [`GeminiLiveConnector`] dials the Live API, sends the setup message and
//! waits for `setupComplete` before handing back a [`GeminiLiveConnection`].
//! Reconnection is not handled here; the session layer owns that policy.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use http::header::AUTHORIZATION;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::base::{
    BoxedLiveConnection, ContextCompression, LiveConnection, LiveConnector, LiveError, LiveResult,
    LiveSessionConfig,
};
use super::config::GeminiLiveConfig;
use super::messages::{
    AudioTranscriptionConfig, ClientMessage, Content, ContextWindowCompression, GenerationConfig,
    PrebuiltVoiceConfig, ServerMessage, SessionResumptionConfig, Setup, SlidingWindow,
    SpeechConfig, VoiceConfig,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Connector
// =============================================================================

/// Opens authenticated connections to the Gemini Live API.
#[derive(Debug, Clone)]
pub struct GeminiLiveConnector {
    config: GeminiLiveConfig,
}

impl GeminiLiveConnector {
    pub fn new(config: GeminiLiveConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeminiLiveConfig {
        &self.config
    }

    /// Build the setup message for one connection attempt.
    pub fn build_setup(&self, session: &LiveSessionConfig, resumption_handle: Option<&str>) -> Setup {
        let transcription = |enabled: bool| enabled.then(AudioTranscriptionConfig::default);

        let context_window_compression = match &session.context_compression {
            ContextCompression::Disabled => None,
            ContextCompression::SlidingWindow {
                trigger_tokens,
                target_tokens,
            } => Some(ContextWindowCompression {
                trigger_tokens: *trigger_tokens,
                sliding_window: SlidingWindow {
                    target_tokens: *target_tokens,
                },
            }),
        };

        Setup {
            model: self.config.endpoint.model_path(&session.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: session.voice.clone(),
                        },
                    },
                }),
            },
            system_instruction: session
                .system_instruction
                .as_deref()
                .filter(|text| !text.trim().is_empty())
                .map(Content::text),
            input_audio_transcription: transcription(session.transcribe_input),
            output_audio_transcription: transcription(session.transcribe_output),
            context_window_compression,
            session_resumption: SessionResumptionConfig {
                handle: resumption_handle.map(str::to_string),
            },
        }
    }

    async fn open_socket(&self) -> LiveResult<WsStream> {
        let mut request = self
            .config
            .websocket_url()
            .into_client_request()
            .map_err(|e| LiveError::InvalidConfiguration(e.to_string()))?;

        if let Some(token) = self.config.endpoint.bearer_token() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| LiveError::InvalidConfiguration(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_handshake_error)?;
        Ok(ws_stream)
    }

    async fn handshake(
        &self,
        session: &LiveSessionConfig,
        resumption_handle: Option<&str>,
    ) -> LiveResult<GeminiLiveConnection> {
        let mut ws = self.open_socket().await?;

        let setup = ClientMessage::Setup(self.build_setup(session, resumption_handle));
        let json = serde_json::to_string(&setup)
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;
        ws.send(Message::Text(json.into()))
            .await
            .map_err(|e| LiveError::WebSocketError(e.to_string()))?;

        let mut connection = GeminiLiveConnection {
            ws,
            input_sample_rate: session.input_sample_rate,
        };

        // setupComplete is the first message a healthy server sends.
        loop {
            let next = connection.next_message().await;
            match next {
                Some(Ok(message)) if message.setup_complete.is_some() => return Ok(connection),
                Some(Ok(_)) => {
                    tracing::debug!("Ignoring message received before setupComplete");
                }
                Some(Err(e)) => return Err(LiveError::SetupFailed(e.to_string())),
                None => {
                    return Err(LiveError::SetupFailed(
                        "connection closed before setupComplete".to_string(),
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(
        &self,
        config: &LiveSessionConfig,
        resumption_handle: Option<&str>,
    ) -> LiveResult<BoxedLiveConnection> {
        let connection = tokio::time::timeout(
            self.config.connect_timeout,
            self.handshake(config, resumption_handle),
        )
        .await
        .map_err(|_| {
            LiveError::Timeout(format!(
                "no setupComplete within {:?}",
                self.config.connect_timeout
            ))
        })??;

        tracing::info!(
            provider = self.config.endpoint.label(),
            model = %config.model,
            resumed = resumption_handle.is_some(),
            "Connected to Gemini Live API"
        );
        Ok(Box::new(connection))
    }
}

fn map_handshake_error(err: tungstenite::Error) -> LiveError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            LiveError::AuthenticationFailed(format!("HTTP {}", response.status()))
        }
        other => LiveError::ConnectionFailed(other.to_string()),
    }
}

// =============================================================================
// Connection
// =============================================================================

/// One established Live API connection.
pub struct GeminiLiveConnection {
    ws: WsStream,
    input_sample_rate: u32,
}

impl GeminiLiveConnection {
    async fn send_message(&mut self, message: &ClientMessage) -> LiveResult<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;
        self.ws
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| LiveError::WebSocketError(e.to_string()))
    }

    fn parse(text: &str) -> Option<ServerMessage> {
        match ServerMessage::from_json(text) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!("Failed to parse Live server message: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl LiveConnection for GeminiLiveConnection {
    async fn send_audio(&mut self, pcm: Bytes) -> LiveResult<()> {
        let message = ClientMessage::audio(&pcm, self.input_sample_rate);
        self.send_message(&message).await
    }

    async fn send_text(&mut self, text: &str) -> LiveResult<()> {
        self.send_message(&ClientMessage::text(text)).await
    }

    async fn next_message(&mut self) -> Option<LiveResult<ServerMessage>> {
        // Every await below is a fresh `next()`, so dropping this future never
        // loses a frame that was already read.
        loop {
            let frame = match self.ws.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(LiveError::WebSocketError(e.to_string()))),
            };

            match frame {
                Message::Text(text) => {
                    if let Some(message) = Self::parse(text.as_str()) {
                        return Some(Ok(message));
                    }
                }
                Message::Binary(data) => match std::str::from_utf8(&data) {
                    Ok(text) => {
                        if let Some(message) = Self::parse(text) {
                            return Some(Ok(message));
                        }
                    }
                    Err(e) => tracing::warn!("Dropping non-UTF-8 binary frame: {}", e),
                },
                Message::Close(frame) => {
                    return match frame {
                        Some(frame) if !matches!(frame.code, CloseCode::Normal | CloseCode::Away) => {
                            Some(Err(LiveError::ConnectionClosed(format!(
                                "{}: {}",
                                u16::from(frame.code),
                                frame.reason.as_str()
                            ))))
                        }
                        _ => {
                            tracing::info!("Live API closed the connection");
                            None
                        }
                    };
                }
                // tungstenite answers pings on the next write
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> LiveResult<()> {
        self.ws
            .close(None)
            .await
            .map_err(|e| LiveError::WebSocketError(e.to_string()))
    }
}
