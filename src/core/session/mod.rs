//! Per-call sessions with the Live backend.
//!
//! A call owns one logical [`CallSession`] for its whole lifetime, while the
//! physical backend connection underneath may be replaced any number of
//! times. The background connection loop reconnects after errors, carries
//! the newest resumption handle into every attempt, and turns backend
//! messages into [`NormalizedEvent`]s on the session's queue.
//!
//! [`SessionManager`] is the registry the relay talks to: it creates sessions
//! single-flight per call id, waits for the first successful connection, and
//! tears everything down on `end_session`.

mod call;
mod connection;
mod event;
mod manager;

use std::time::Duration;

use thiserror::Error;

pub use call::CallSession;
pub use event::NormalizedEvent;
pub use manager::SessionManager;

/// Default readiness deadline for `get_or_create`.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default fixed delay between a failed connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1500);

/// Default interval at which `receive` re-checks the closed flag.
pub const DEFAULT_LIVENESS_TICK: Duration = Duration::from_secs(1);

// =============================================================================
// Error Types
// =============================================================================

/// Errors surfaced by the session layer.
///
/// Backend failures never appear here: the connection loop absorbs them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session has been closed
    #[error("Session {0} is closed")]
    Closed(String),

    /// No backend connection was established in time
    #[error("Session {id} was not ready within {timeout:?}")]
    ReadinessTimeout { id: String, timeout: Duration },
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Settings
// =============================================================================

/// Timing policy shared by every session a manager creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// How long `get_or_create` waits for the first connection
    pub ready_timeout: Duration,

    /// Fixed backoff after a failed or broken connection
    pub reconnect_delay: Duration,

    /// Upper bound on how long `receive` waits before re-checking `closed`
    pub liveness_tick: Duration,

    /// Reconnect immediately when the backend announces a GoAway
    pub reconnect_on_go_away: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            liveness_tick: DEFAULT_LIVENESS_TICK,
            reconnect_on_go_away: false,
        }
    }
}
