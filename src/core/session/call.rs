use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::{Mutex, mpsc, watch};

use super::event::NormalizedEvent;
use super::{SessionError, SessionResult};

/// Handle to the connection the loop is currently pumping.
///
/// Published by the connection loop only; `generation` identifies which
/// physical connection a send failure belongs to.
#[derive(Debug, Clone)]
pub(crate) struct ActiveLink {
    pub(crate) generation: u64,
    pub(crate) audio_tx: mpsc::Sender<Bytes>,
}

/// Logical conversation for one call.
///
/// Survives any number of backend reconnects. Audio goes in through
/// [`send_audio`](Self::send_audio); normalized backend output comes out of
/// [`receive`](Self::receive).
pub struct CallSession {
    id: String,
    link: watch::Receiver<Option<ActiveLink>>,
    closed: AtomicBool,
    // Unbounded: the loop must never block on a slow relay.
    events: Mutex<mpsc::UnboundedReceiver<NormalizedEvent>>,
    send_failures: mpsc::UnboundedSender<u64>,
    liveness_tick: Duration,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl CallSession {
    pub(crate) fn new(
        id: String,
        link: watch::Receiver<Option<ActiveLink>>,
        events: mpsc::UnboundedReceiver<NormalizedEvent>,
        send_failures: mpsc::UnboundedSender<u64>,
        liveness_tick: Duration,
    ) -> Self {
        Self {
            id,
            link,
            closed: AtomicBool::new(false),
            events: Mutex::new(events),
            send_failures,
            liveness_tick,
        }
    }

    /// Call/stream identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the session has been closed. Never reverts once set.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether a backend connection is currently published.
    pub fn is_connected(&self) -> bool {
        !self.is_closed() && self.link.borrow().is_some()
    }

    /// Set `closed`. Returns true only for the call that flipped it.
    pub(crate) fn mark_closed(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            tracing::info!(call_id = %self.id, "Session closed");
        }
        first
    }

    /// Forward caller PCM (16 kHz) to the active backend connection.
    ///
    /// Audio arriving while no connection is up is dropped. A failed forward
    /// is reported to the connection loop and otherwise swallowed.
    pub async fn send_audio(&self, pcm: Bytes) -> SessionResult<()> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id.clone()));
        }

        let link = self.link.borrow().clone();
        let Some(link) = link else {
            tracing::debug!(call_id = %self.id, bytes = pcm.len(), "No active connection, dropping audio");
            return Ok(());
        };

        if link.audio_tx.send(pcm).await.is_err() {
            tracing::debug!(
                call_id = %self.id,
                generation = link.generation,
                "Active connection went away, dropping audio"
            );
            let _ = self.send_failures.send(link.generation);
        }
        Ok(())
    }

    /// Stream of normalized events, ending once the session is closed.
    ///
    /// Waits for at most one liveness tick between `closed` checks, so a
    /// consumer notices teardown even when the backend is silent.
    pub fn receive(&self) -> impl Stream<Item = NormalizedEvent> + Send + '_ {
        stream! {
            let mut events = self.events.lock().await;
            while !self.is_closed() {
                match tokio::time::timeout(self.liveness_tick, events.recv()).await {
                    Ok(Some(event)) => {
                        if self.is_closed() {
                            break;
                        }
                        yield event;
                    }
                    Ok(None) => break,
                    Err(_) => continue,
                }
            }
        }
    }
}
