//! WebSocket mock server for the Gemini Live API
//!
//! Accepts a `setup` message, answers `setupComplete` plus a resumption
//! handle, then echoes every `realtimeInput` audio blob back as model audio
//! followed by `turnComplete`. Text turns are recorded but not answered.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// How the mock behaves on each connection
#[derive(Clone, Debug, Default)]
pub struct GeminiMockBehavior {
    /// Close normally after echoing this many audio messages
    pub close_after_audio: Option<u64>,
    /// Deliver server messages as binary frames instead of text
    pub binary_frames: bool,
    /// Never answer the setup message
    pub withhold_setup_complete: bool,
}

/// Shared server state
#[derive(Default)]
pub struct GeminiMockState {
    pub behavior: GeminiMockBehavior,
    pub connection_count: AtomicU64,
    pub audio_messages: AtomicU64,
    setups: Mutex<Vec<Value>>,
    text_turns: Mutex<Vec<(u64, String)>>,
}

impl GeminiMockState {
    /// Every `setup` payload received, in connection order.
    pub fn setups(&self) -> Vec<Value> {
        self.setups.lock().unwrap().clone()
    }

    /// Every `clientContent` text as (connection number, text).
    pub fn text_turns(&self) -> Vec<(u64, String)> {
        self.text_turns.lock().unwrap().clone()
    }
}

/// A running mock server
pub struct GeminiMock {
    pub addr: SocketAddr,
    pub state: Arc<GeminiMockState>,
    task: JoinHandle<()>,
}

impl GeminiMock {
    pub async fn start(behavior: GeminiMockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(GeminiMockState {
            behavior,
            ..Default::default()
        });

        let server_state = state.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = server_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        eprintln!("Gemini mock connection error: {}", e);
                    }
                });
            }
        });

        Self { addr, state, task }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws/live", self.addr)
    }

    pub fn connections(&self) -> u64 {
        self.state.connection_count.load(Ordering::SeqCst)
    }

    pub fn audio_messages(&self) -> u64 {
        self.state.audio_messages.load(Ordering::SeqCst)
    }
}

impl Drop for GeminiMock {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<GeminiMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let conn_id = state.connection_count.fetch_add(1, Ordering::SeqCst) + 1;
    let behavior = state.behavior.clone();
    let frame = |value: Value| {
        let text = value.to_string();
        if behavior.binary_frames {
            Message::Binary(text.into_bytes().into())
        } else {
            Message::Text(text.into())
        }
    };

    // The first message must be setup
    let Some(first) = read.next().await else {
        return Ok(());
    };
    let first: Value = match first? {
        Message::Text(text) => serde_json::from_str(text.as_str())?,
        other => return Err(format!("expected setup text frame, got {other:?}").into()),
    };
    let Some(setup) = first.get("setup") else {
        write
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "setup required".into(),
            })))
            .await?;
        return Ok(());
    };
    state.setups.lock().unwrap().push(setup.clone());

    if behavior.withhold_setup_complete {
        while read.next().await.is_some() {}
        return Ok(());
    }

    write.send(frame(json!({"setupComplete": {}}))).await?;
    write
        .send(frame(json!({
            "sessionResumptionUpdate": {
                "newHandle": format!("handle-{conn_id}"),
                "resumable": true
            }
        })))
        .await?;

    let mut echoed = 0u64;
    while let Some(msg) = read.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let value: Value = serde_json::from_str(text.as_str())?;
        if let Some(text) = value
            .pointer("/clientContent/turns/0/parts/0/text")
            .and_then(Value::as_str)
        {
            state
                .text_turns
                .lock()
                .unwrap()
                .push((conn_id, text.to_string()));
            continue;
        }
        let Some(audio) = value.pointer("/realtimeInput/audio") else {
            continue;
        };
        state.audio_messages.fetch_add(1, Ordering::SeqCst);

        write
            .send(frame(json!({
                "serverContent": {
                    "modelTurn": {"parts": [{"inlineData": {
                        "mimeType": "audio/pcm;rate=24000",
                        "data": audio["data"]
                    }}]}
                }
            })))
            .await?;
        write
            .send(frame(json!({
                "serverContent": {
                    "turnComplete": true,
                    "outputTranscription": {"text": "echo"}
                }
            })))
            .await?;

        echoed += 1;
        if behavior.close_after_audio == Some(echoed) {
            write
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "rotating".into(),
                })))
                .await?;
            break;
        }
    }

    Ok(())
}
