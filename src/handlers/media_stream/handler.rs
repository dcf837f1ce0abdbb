//! Media stream WebSocket handler
//!
//! Bridges one Twilio Media Streams socket to one [`CallSession`]: caller
//! audio is decoded and forwarded, backend events are encoded and sent back.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::audio::{self, TELEPHONY_SAMPLE_RATE};
use crate::core::session::{CallSession, NormalizedEvent};
use crate::state::AppState;

use super::inbound::InboundAggregator;
use super::messages::{MAX_FRAME_SIZE, MediaStreamIncoming, MediaStreamOutgoing, StartMetadata};

/// Optimized channel buffer size for audio workloads
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Duration of each outbound media frame
const OUTBOUND_FRAME_MS: u32 = 20;

/// Routes for the socket sender task
#[derive(Debug)]
pub(super) enum MediaStreamRoute {
    Outgoing(MediaStreamOutgoing),
    Close,
}

/// State of the call carried by this socket
struct ActiveCall {
    stream_sid: String,
    session: Arc<CallSession>,
    inbound: InboundAggregator,
    forward_task: JoinHandle<()>,
}

/// Media stream WebSocket handler
///
/// Upgrades the HTTP connection to a WebSocket speaking the Twilio Media
/// Streams protocol.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    debug!("Media stream WebSocket upgrade requested");

    ws.max_frame_size(MAX_FRAME_SIZE)
        .max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_media_socket(socket, state))
}

/// Handle the media stream WebSocket connection
async fn handle_media_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("Media stream connected");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MediaStreamRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MediaStreamRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MediaStreamRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let mut call: Option<ActiveCall> = None;

    while let Some(msg_result) = receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Media stream WebSocket error: {}", e);
                break;
            }
        };

        let continue_processing = match msg {
            Message::Text(text) => match serde_json::from_str::<MediaStreamIncoming>(&text) {
                Ok(incoming) => {
                    handle_incoming(incoming, &mut call, &message_tx, &app_state).await
                }
                Err(e) => {
                    warn!("Ignoring malformed media stream frame: {}", e);
                    true
                }
            },
            Message::Binary(data) => {
                debug!("Ignoring binary frame: {} bytes", data.len());
                true
            }
            Message::Ping(_) | Message::Pong(_) => true,
            Message::Close(_) => {
                info!("Media stream close received");
                false
            }
        };

        if !continue_processing {
            break;
        }
    }

    // Cleanup
    if let Some(call) = call {
        call.forward_task.abort();
        app_state.sessions.end_session(&call.stream_sid).await;
    }
    let _ = message_tx.send(MediaStreamRoute::Close).await;
    drop(message_tx);
    let _ = sender_task.await;

    info!("Media stream terminated");
}

/// Handle one parsed Media Streams event. Returns false to close the socket.
async fn handle_incoming(
    incoming: MediaStreamIncoming,
    call: &mut Option<ActiveCall>,
    message_tx: &mpsc::Sender<MediaStreamRoute>,
    app_state: &Arc<AppState>,
) -> bool {
    match incoming {
        MediaStreamIncoming::Connected { protocol, version } => {
            debug!(?protocol, ?version, "Media stream handshake");
            true
        }
        MediaStreamIncoming::Start { stream_sid, start } => {
            let stream_sid = stream_sid.unwrap_or_else(|| start.stream_sid.clone());
            if let Some(existing) = call.as_ref() {
                warn!(
                    call_id = %existing.stream_sid,
                    new_call_id = %stream_sid,
                    "Ignoring second start on the same socket"
                );
                return true;
            }
            match start_call(stream_sid, &start, message_tx, app_state).await {
                Some(active) => {
                    *call = Some(active);
                    true
                }
                None => false,
            }
        }
        MediaStreamIncoming::Media { stream_sid, media } => {
            let Some(active) = call.as_mut() else {
                debug!("Media before start, dropping");
                return true;
            };
            if active.stream_sid != stream_sid {
                debug!(call_id = %active.stream_sid, other = %stream_sid, "Media for another stream, dropping");
                return true;
            }
            forward_media(active, &media.payload).await
        }
        MediaStreamIncoming::Mark { stream_sid, mark } => {
            debug!(call_id = %stream_sid, mark = %mark.name, "Playback reached mark");
            true
        }
        MediaStreamIncoming::Dtmf { stream_sid, dtmf } => {
            info!(call_id = %stream_sid, digit = %dtmf.digit, "DTMF received");
            true
        }
        MediaStreamIncoming::Stop { stream_sid, .. } => {
            info!(call_id = %stream_sid, "Media stream stopped");
            if let Some(active) = call.take() {
                if active.inbound.pending() > 0 {
                    debug!(bytes = active.inbound.pending(), "Discarding partial inbound chunk");
                }
                active.forward_task.abort();
                app_state.sessions.end_session(&active.stream_sid).await;
            }
            false
        }
    }
}

/// Open (or join) the session for a new stream and start relaying its output.
async fn start_call(
    stream_sid: String,
    start: &StartMetadata,
    message_tx: &mpsc::Sender<MediaStreamRoute>,
    app_state: &Arc<AppState>,
) -> Option<ActiveCall> {
    info!(
        call_id = %stream_sid,
        call_sid = start.call_sid.as_deref().unwrap_or("unknown"),
        "Media stream started"
    );

    if let Some(format) = &start.media_format
        && format.sample_rate.is_some_and(|rate| rate != TELEPHONY_SAMPLE_RATE)
    {
        warn!(call_id = %stream_sid, ?format, "Unexpected media format, assuming 8kHz mu-law");
    }

    let session = match app_state.sessions.get_or_create(&stream_sid).await {
        Ok(session) => session,
        Err(e) => {
            error!(call_id = %stream_sid, "Failed to start session: {}", e);
            return None;
        }
    };

    let forward_task = tokio::spawn(forward_events(
        session.clone(),
        stream_sid.clone(),
        message_tx.clone(),
    ));

    Some(ActiveCall {
        stream_sid,
        session,
        inbound: InboundAggregator::new(app_state.config.inbound_chunk_bytes),
        forward_task,
    })
}

/// Decode one media payload and forward any complete chunks.
async fn forward_media(active: &mut ActiveCall, payload: &str) -> bool {
    let pcm = match audio::decode_inbound(payload) {
        Ok(pcm) => pcm,
        Err(e) => {
            warn!(call_id = %active.stream_sid, "Dropping undecodable media frame: {}", e);
            return true;
        }
    };

    let chunks = match active.inbound.push(&pcm) {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!(call_id = %active.stream_sid, "Failed to chunk inbound audio: {}", e);
            return true;
        }
    };

    for chunk in chunks {
        if let Err(e) = active.session.send_audio(chunk).await {
            warn!(call_id = %active.stream_sid, "Session no longer accepts audio: {}", e);
            return false;
        }
    }
    true
}

/// Relay session events to the caller until the session closes.
pub(super) async fn forward_events(
    session: Arc<CallSession>,
    stream_sid: String,
    message_tx: mpsc::Sender<MediaStreamRoute>,
) {
    let events = session.receive();
    futures::pin_mut!(events);
    let mut turns: u64 = 0;

    while let Some(event) = events.next().await {
        match event {
            NormalizedEvent::AudioChunk { data, sample_rate } => {
                for message in encode_audio(&stream_sid, &data, sample_rate) {
                    if message_tx
                        .send(MediaStreamRoute::Outgoing(message))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            NormalizedEvent::TurnComplete => {
                turns += 1;
                debug!(call_id = %stream_sid, turn = turns, "Turn complete");
                let mark = MediaStreamOutgoing::mark(&stream_sid, format!("turn-{turns}"));
                if message_tx.send(MediaStreamRoute::Outgoing(mark)).await.is_err() {
                    return;
                }
            }
            NormalizedEvent::InputTranscription(text) => {
                info!(call_id = %stream_sid, role = "caller", %text, "Transcription");
            }
            NormalizedEvent::OutputTranscription(text) => {
                info!(call_id = %stream_sid, role = "assistant", %text, "Transcription");
            }
            NormalizedEvent::Error(message) => {
                warn!(call_id = %stream_sid, "Backend event error: {}", message);
            }
        }
    }

    debug!(call_id = %stream_sid, "Event relay finished");
}

/// Split backend PCM into 20 ms frames and encode each for the caller.
pub(super) fn encode_audio(
    stream_sid: &str,
    pcm: &Bytes,
    sample_rate: u32,
) -> Vec<MediaStreamOutgoing> {
    let frame_bytes = audio::pcm_bytes_for_duration(sample_rate, OUTBOUND_FRAME_MS);
    let frames = match audio::chunk(pcm, frame_bytes) {
        Ok(frames) => frames,
        Err(e) => {
            warn!(call_id = %stream_sid, "Failed to frame outbound audio: {}", e);
            return Vec::new();
        }
    };

    frames
        .into_iter()
        .filter_map(|frame| match audio::encode_outbound(frame, sample_rate) {
            Ok(payload) => Some(MediaStreamOutgoing::media(stream_sid, payload)),
            Err(e) => {
                warn!(call_id = %stream_sid, "Dropping outbound frame: {}", e);
                None
            }
        })
        .collect()
}
