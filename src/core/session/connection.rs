//! Background connection loop, one per session.
//!
//! ```text
//! CONNECTING ──ok──▶ CONNECTED ──error──▶ ERROR_BACKOFF ──delay──▶ CONNECTING
//!     │  ▲               │
//!     │  └──clean close──┘
//!     └──error──▶ ERROR_BACKOFF
//!
//! any state ──cancel──▶ CANCELLED (terminal)
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::SessionSettings;
use super::call::{ActiveLink, CallSession};
use super::event::NormalizedEvent;
use crate::core::audio::BACKEND_OUTPUT_SAMPLE_RATE;
use crate::core::live::messages::{ServerContent, Transcription};
use crate::core::live::{BoxedLiveConnection, LiveConnector, LiveSessionConfig, ServerMessage};

/// Pending outbound audio per connection.
const AUDIO_CHANNEL_CAPACITY: usize = 64;

/// Upper bound on a graceful close of a connection the loop is leaving.
const CLOSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

enum LoopState {
    Connecting,
    Connected {
        connection: BoxedLiveConnection,
        audio_rx: mpsc::Receiver<Bytes>,
    },
    ErrorBackoff,
    Cancelled(Option<BoxedLiveConnection>),
}

/// What the loop should do after handling one backend message.
#[derive(Debug, PartialEq, Eq)]
enum MessageOutcome {
    Continue,
    Reconnect,
}

/// Owns every physical connection of one [`CallSession`].
pub(crate) struct ConnectionLoop {
    session: Arc<CallSession>,
    connector: Arc<dyn LiveConnector>,
    config: Arc<LiveSessionConfig>,
    settings: SessionSettings,
    link_tx: watch::Sender<Option<ActiveLink>>,
    events_tx: mpsc::UnboundedSender<NormalizedEvent>,
    send_failures: mpsc::UnboundedReceiver<u64>,
    ready_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    resumption_handle: Option<String>,
    generation: u64,
}

impl ConnectionLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session: Arc<CallSession>,
        connector: Arc<dyn LiveConnector>,
        config: Arc<LiveSessionConfig>,
        settings: SessionSettings,
        link_tx: watch::Sender<Option<ActiveLink>>,
        events_tx: mpsc::UnboundedSender<NormalizedEvent>,
        send_failures: mpsc::UnboundedReceiver<u64>,
        ready_tx: watch::Sender<bool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            connector,
            config,
            settings,
            link_tx,
            events_tx,
            send_failures,
            ready_tx,
            cancel,
            resumption_handle: None,
            generation: 0,
        }
    }

    /// Drive the state machine until cancelled.
    pub(crate) async fn run(mut self) {
        let mut state = LoopState::Connecting;
        loop {
            state = match state {
                LoopState::Connecting => self.connect().await,
                LoopState::Connected {
                    connection,
                    audio_rx,
                } => self.pump(connection, audio_rx).await,
                LoopState::ErrorBackoff => self.backoff().await,
                LoopState::Cancelled(connection) => {
                    self.shutdown(connection).await;
                    break;
                }
            };
        }
    }

    async fn connect(&mut self) -> LoopState {
        let cancel = self.cancel.clone();
        tracing::debug!(
            resuming = self.resumption_handle.is_some(),
            "Connecting to Live backend"
        );

        let attempt = self
            .connector
            .connect(&self.config, self.resumption_handle.as_deref());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return LoopState::Cancelled(None),
            result = attempt => result,
        };

        match result {
            Ok(mut connection) => {
                let first = !*self.ready_tx.borrow();
                if first && let Some(greeting) = self.config.greeting.as_deref() {
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return LoopState::Cancelled(Some(connection)),
                        sent = connection.send_text(greeting) => sent,
                    };
                    if let Err(e) = sent {
                        tracing::warn!(
                            "Failed to send greeting: {}, retrying in {:?}",
                            e,
                            self.settings.reconnect_delay
                        );
                        return match self.close_bounded(&mut connection).await {
                            Some(cancelled) => cancelled,
                            None => LoopState::ErrorBackoff,
                        };
                    }
                    tracing::debug!("Greeting sent");
                }

                self.generation += 1;
                let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
                self.link_tx.send_replace(Some(ActiveLink {
                    generation: self.generation,
                    audio_tx,
                }));

                if first {
                    self.ready_tx.send_replace(true);
                    tracing::info!("Session ready");
                } else {
                    tracing::info!(generation = self.generation, "Session reconnected");
                }

                LoopState::Connected {
                    connection,
                    audio_rx,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Live connection failed: {}, retrying in {:?}",
                    e,
                    self.settings.reconnect_delay
                );
                LoopState::ErrorBackoff
            }
        }
    }

    async fn pump(
        &mut self,
        mut connection: BoxedLiveConnection,
        mut audio_rx: mpsc::Receiver<Bytes>,
    ) -> LoopState {
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return LoopState::Cancelled(Some(connection)),

                Some(generation) = self.send_failures.recv() => {
                    if generation == self.generation {
                        tracing::warn!(generation, "Audio forward failed, dropping connection");
                        self.clear_link();
                        return match self.close_bounded(&mut connection).await {
                            Some(cancelled) => cancelled,
                            None => LoopState::ErrorBackoff,
                        };
                    }
                }

                Some(pcm) = audio_rx.recv() => {
                    if let Err(e) = connection.send_audio(pcm).await {
                        tracing::warn!("Failed to send audio to Live backend: {}", e);
                        self.clear_link();
                        return LoopState::ErrorBackoff;
                    }
                }

                message = connection.next_message() => match message {
                    Some(Ok(message)) => {
                        if self.handle_message(message) == MessageOutcome::Reconnect {
                            self.clear_link();
                            return match self.close_bounded(&mut connection).await {
                                Some(cancelled) => cancelled,
                                None => LoopState::Connecting,
                            };
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            "Live session error: {}, reconnecting in {:?}",
                            e,
                            self.settings.reconnect_delay
                        );
                        self.clear_link();
                        return LoopState::ErrorBackoff;
                    }
                    None => {
                        tracing::info!("Live connection closed, reconnecting");
                        self.clear_link();
                        return LoopState::Connecting;
                    }
                },
            }
        }
    }

    async fn backoff(&mut self) -> LoopState {
        self.clear_link();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => LoopState::Cancelled(None),
            _ = tokio::time::sleep(self.settings.reconnect_delay) => LoopState::Connecting,
        }
    }

    async fn shutdown(&mut self, connection: Option<BoxedLiveConnection>) {
        self.clear_link();
        if let Some(mut connection) = connection {
            close_with_timeout(&mut connection).await;
        }
        self.session.mark_closed();
        tracing::info!("Connection loop ended");
    }

    /// Close a connection the loop is moving away from.
    ///
    /// Returns `Some(Cancelled)` when cancellation wins the race; the
    /// connection is then dropped without waiting any further.
    async fn close_bounded(&self, connection: &mut BoxedLiveConnection) -> Option<LoopState> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Some(LoopState::Cancelled(None)),
            _ = close_with_timeout(connection) => None,
        }
    }

    fn clear_link(&self) {
        self.link_tx.send_if_modified(|link| link.take().is_some());
    }

    fn handle_message(&mut self, message: ServerMessage) -> MessageOutcome {
        let mut outcome = MessageOutcome::Continue;

        if let Some(update) = message.session_resumption_update
            && let Some(handle) = update.usable_handle()
        {
            tracing::debug!("Stored new resumption handle");
            self.resumption_handle = Some(handle.to_string());
        }

        if let Some(go_away) = message.go_away {
            tracing::warn!(
                time_left = go_away.time_left.as_deref().unwrap_or("unknown"),
                "Live backend sent GoAway"
            );
            if self.settings.reconnect_on_go_away {
                outcome = MessageOutcome::Reconnect;
            }
        }

        if let Some(content) = message.server_content {
            for event in normalize(content) {
                self.emit(event);
            }
        }

        outcome
    }

    fn emit(&self, event: NormalizedEvent) {
        if self.session.is_closed() {
            return;
        }
        let _ = self.events_tx.send(event);
    }
}

async fn close_with_timeout(connection: &mut BoxedLiveConnection) {
    match tokio::time::timeout(CLOSE_TIMEOUT, connection.close()).await {
        Ok(Err(e)) => tracing::debug!("Error closing Live connection: {}", e),
        Err(_) => tracing::debug!("Timed out closing Live connection"),
        Ok(Ok(())) => {}
    }
}

/// Turn one `serverContent` into events: audio parts first, then the turn
/// boundary, then transcriptions.
pub(crate) fn normalize(content: ServerContent) -> Vec<NormalizedEvent> {
    let mut events = Vec::new();

    if let Some(turn) = content.model_turn {
        for blob in turn.parts.into_iter().filter_map(|part| part.inline_data) {
            if !blob.is_audio() {
                continue;
            }
            match blob.decode() {
                Ok(data) => events.push(NormalizedEvent::AudioChunk {
                    data: Bytes::from(data),
                    sample_rate: blob.sample_rate(BACKEND_OUTPUT_SAMPLE_RATE),
                }),
                Err(e) => events.push(NormalizedEvent::Error(format!(
                    "undecodable audio part: {e}"
                ))),
            }
        }
    }

    if content.turn_complete {
        events.push(NormalizedEvent::TurnComplete);
    }

    let text = |t: Option<Transcription>| {
        t.and_then(|t| t.text).filter(|text| !text.is_empty())
    };
    if let Some(text) = text(content.input_transcription) {
        events.push(NormalizedEvent::InputTranscription(text));
    }
    if let Some(text) = text(content.output_transcription) {
        events.push(NormalizedEvent::OutputTranscription(text));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::live::messages::ServerMessage;
    use crate::core::live::{LiveConnection, LiveResult};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Accepts everything and never produces a message.
    struct QuietConnection;

    #[async_trait]
    impl LiveConnection for QuietConnection {
        async fn send_audio(&mut self, _pcm: Bytes) -> LiveResult<()> {
            Ok(())
        }

        async fn send_text(&mut self, _text: &str) -> LiveResult<()> {
            Ok(())
        }

        async fn next_message(&mut self) -> Option<LiveResult<ServerMessage>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> LiveResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct QuietConnector {
        attempts: Mutex<Vec<Instant>>,
    }

    impl QuietConnector {
        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LiveConnector for QuietConnector {
        async fn connect(
            &self,
            _config: &LiveSessionConfig,
            _resumption_handle: Option<&str>,
        ) -> LiveResult<BoxedLiveConnection> {
            self.attempts.lock().unwrap().push(Instant::now());
            Ok(Box::new(QuietConnection))
        }
    }

    struct RunningLoop {
        connector: Arc<QuietConnector>,
        link: watch::Receiver<Option<ActiveLink>>,
        failures: mpsc::UnboundedSender<u64>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn_loop() -> RunningLoop {
        let connector = Arc::new(QuietConnector::default());
        let (link_tx, link_rx) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let (ready_tx, _) = watch::channel(false);
        let cancel = CancellationToken::new();

        let session = Arc::new(CallSession::new(
            "MZ-loop".to_string(),
            link_rx.clone(),
            events_rx,
            failures_tx.clone(),
            Duration::from_secs(1),
        ));
        let connection_loop = ConnectionLoop::new(
            session,
            connector.clone(),
            Arc::new(LiveSessionConfig::default()),
            SessionSettings::default(),
            link_tx,
            events_tx,
            failures_rx,
            ready_tx,
            cancel.clone(),
        );

        RunningLoop {
            connector,
            link: link_rx,
            failures: failures_tx,
            cancel,
            task: tokio::spawn(connection_loop.run()),
        }
    }

    fn current_generation(link: &watch::Receiver<Option<ActiveLink>>) -> Option<u64> {
        link.borrow().as_ref().map(|link| link.generation)
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_for_current_generation_backs_off() {
        let mut running = spawn_loop();
        running.link.wait_for(Option::is_some).await.unwrap();
        assert_eq!(current_generation(&running.link), Some(1));

        // A failure reported against an older connection changes nothing
        running.failures.send(0).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(running.connector.attempts().len(), 1);
        assert_eq!(current_generation(&running.link), Some(1));

        running.failures.send(1).unwrap();
        running.link.wait_for(Option::is_none).await.unwrap();
        let dropped_at = Instant::now();

        running
            .link
            .wait_for(|link| link.as_ref().is_some_and(|link| link.generation == 2))
            .await
            .unwrap();
        let attempts = running.connector.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1] - dropped_at >= Duration::from_millis(1500));

        running.cancel.cancel();
        running.task.await.unwrap();
        assert_eq!(current_generation(&running.link), None);
    }

    fn content(json: &str) -> ServerContent {
        ServerMessage::from_json(json)
            .unwrap()
            .server_content
            .unwrap()
    }

    #[test]
    fn test_normalize_order() {
        let events = normalize(content(
            r#"{"serverContent": {
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQI="}},
                    {"text": "thinking"},
                    {"inlineData": {"mimeType": "audio/pcm", "data": "AwQ="}}
                ]},
                "turnComplete": true,
                "inputTranscription": {"text": "hello"},
                "outputTranscription": {"text": "hi there"}
            }}"#,
        ));

        assert_eq!(
            events,
            vec![
                NormalizedEvent::AudioChunk {
                    data: Bytes::from_static(&[1, 2]),
                    sample_rate: 24000
                },
                NormalizedEvent::AudioChunk {
                    data: Bytes::from_static(&[3, 4]),
                    sample_rate: 24000
                },
                NormalizedEvent::TurnComplete,
                NormalizedEvent::InputTranscription("hello".to_string()),
                NormalizedEvent::OutputTranscription("hi there".to_string()),
            ]
        );
    }

    #[test]
    fn test_normalize_bad_audio_becomes_error_event() {
        let events = normalize(content(
            r#"{"serverContent": {"modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "!!"}}
            ]}}}"#,
        ));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], NormalizedEvent::Error(_)));
    }

    #[test]
    fn test_normalize_skips_empty_transcriptions() {
        let events = normalize(content(
            r#"{"serverContent": {"inputTranscription": {"text": ""}, "interrupted": true}}"#,
        ));
        assert!(events.is_empty());
    }

    #[test]
    fn test_normalize_honours_16k_mime_rate() {
        let events = normalize(content(
            r#"{"serverContent": {"modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm;rate=16000", "data": "AAA="}}
            ]}}}"#,
        ));
        assert_eq!(
            events,
            vec![NormalizedEvent::AudioChunk {
                data: Bytes::from_static(&[0, 0]),
                sample_rate: 16000
            }]
        );
    }
}
