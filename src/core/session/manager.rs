use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::call::CallSession;
use super::connection::ConnectionLoop;
use super::{SessionError, SessionResult, SessionSettings};
use crate::core::live::{LiveConnector, LiveSessionConfig};

/// Registry entry: everything belonging to one call id, created and removed
/// together.
struct SessionSlot {
    session: Arc<CallSession>,
    ready: watch::Receiver<bool>,
    task: TaskHandle,
}

/// Handle to a spawned connection loop.
struct TaskHandle {
    cancel: CancellationToken,
    // The loop task holds the sender; the channel closes when it exits.
    finished: watch::Receiver<()>,
}

impl TaskHandle {
    /// Cancel the loop and wait until it has fully exited.
    async fn terminate(&self) {
        self.cancel.cancel();
        let mut finished = self.finished.clone();
        while finished.changed().await.is_ok() {}
    }
}

enum Lookup {
    Live(Arc<SessionSlot>),
    Stale(Arc<SessionSlot>),
    Created(Arc<SessionSlot>),
}

/// Registry of call sessions keyed by call/stream id.
pub struct SessionManager {
    connector: Arc<dyn LiveConnector>,
    config: Arc<LiveSessionConfig>,
    settings: SessionSettings,
    sessions: DashMap<String, Arc<SessionSlot>>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn LiveConnector>,
        config: LiveSessionConfig,
        settings: SessionSettings,
    ) -> Self {
        Self {
            connector,
            config: Arc::new(config),
            settings,
            sessions: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Number of registered sessions.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Whether a session is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Return the live session for `id`, creating it if needed.
    ///
    /// Concurrent callers for the same id share one session and one loop.
    /// Waits until the first backend connection succeeds; on timeout the
    /// session is torn down and [`SessionError::ReadinessTimeout`] returned.
    pub async fn get_or_create(&self, id: &str) -> SessionResult<Arc<CallSession>> {
        loop {
            // The entry guard must be released before any await.
            let lookup = match self.sessions.entry(id.to_string()) {
                Entry::Occupied(entry) => {
                    let slot = entry.get().clone();
                    if slot.session.is_closed() {
                        Lookup::Stale(slot)
                    } else {
                        Lookup::Live(slot)
                    }
                }
                Entry::Vacant(entry) => {
                    let slot = self.spawn_session(id);
                    entry.insert(slot.clone());
                    Lookup::Created(slot)
                }
            };

            match lookup {
                Lookup::Live(slot) => return self.await_ready(id, &slot, false).await,
                Lookup::Created(slot) => return self.await_ready(id, &slot, true).await,
                Lookup::Stale(slot) => {
                    tracing::info!(call_id = %id, "Replacing closed session");
                    self.teardown(id, &slot).await;
                }
            }
        }
    }

    /// End the session for `id`. No-op when absent.
    pub async fn end_session(&self, id: &str) {
        let Some(slot) = self.sessions.get(id).map(|entry| entry.value().clone()) else {
            tracing::debug!(call_id = %id, "end_session: no such session");
            return;
        };

        tracing::info!(call_id = %id, "Ending session");
        self.teardown(id, &slot).await;
    }

    /// End every registered session.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Ending all sessions");
        }
        futures::future::join_all(ids.iter().map(|id| self.end_session(id))).await;
    }

    fn spawn_session(&self, id: &str) -> Arc<SessionSlot> {
        let (link_tx, link_rx) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = watch::channel(());
        let cancel = CancellationToken::new();

        let session = Arc::new(CallSession::new(
            id.to_string(),
            link_rx,
            events_rx,
            failures_tx,
            self.settings.liveness_tick,
        ));

        let connection_loop = ConnectionLoop::new(
            session.clone(),
            self.connector.clone(),
            self.config.clone(),
            self.settings,
            link_tx,
            events_tx,
            failures_rx,
            ready_tx,
            cancel.clone(),
        );

        tokio::spawn(
            async move {
                let _finished = finished_tx;
                connection_loop.run().await;
            }
            .instrument(tracing::info_span!("connection_loop", call_id = %id)),
        );

        tracing::info!(call_id = %id, "Session created");

        Arc::new(SessionSlot {
            session,
            ready: ready_rx,
            task: TaskHandle {
                cancel,
                finished: finished_rx,
            },
        })
    }

    async fn await_ready(
        &self,
        id: &str,
        slot: &Arc<SessionSlot>,
        created: bool,
    ) -> SessionResult<Arc<CallSession>> {
        let mut ready = slot.ready.clone();
        let timeout = self.settings.ready_timeout;

        let outcome = tokio::time::timeout(timeout, ready.wait_for(|ready| *ready))
            .await
            .map(|result| result.is_ok());

        match outcome {
            Ok(true) => Ok(slot.session.clone()),
            // The loop exited before connecting: torn down concurrently.
            Ok(false) => Err(SessionError::Closed(id.to_string())),
            Err(_) => {
                if created {
                    tracing::error!(call_id = %id, "Session not ready within {:?}", timeout);
                    self.teardown(id, slot).await;
                }
                Err(SessionError::ReadinessTimeout {
                    id: id.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Cancel, wait for the loop, mark closed, then drop the registry entry
    /// if it still belongs to this slot.
    async fn teardown(&self, id: &str, slot: &Arc<SessionSlot>) {
        slot.task.terminate().await;
        slot.session.mark_closed();
        self.sessions
            .remove_if(id, |_, current| Arc::ptr_eq(current, slot));
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for entry in self.sessions.iter() {
            entry.value().task.cancel.cancel();
        }
    }
}
