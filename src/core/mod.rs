pub mod audio;
pub mod live;
pub mod session;

pub use audio::{AudioError, AudioResult};
pub use live::{
    GeminiLiveConfig, GeminiLiveConnector, LiveConnection, LiveConnector, LiveEndpoint, LiveError,
    LiveResult, LiveSessionConfig,
};
pub use session::{CallSession, NormalizedEvent, SessionError, SessionManager, SessionSettings};
