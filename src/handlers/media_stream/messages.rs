//! Twilio Media Streams message types
//!
//! Every frame is a JSON text message tagged by `event`. Inbound media is
//! base64 G.711 mu-law at 8kHz mono; outbound media uses the same encoding.

use serde::{Deserialize, Serialize};

/// Maximum accepted size of one inbound text frame (64 KB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

// =============================================================================
// Incoming Messages (Twilio -> Server)
// =============================================================================

/// Incoming Media Streams events
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamIncoming {
    /// First frame on a new socket
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },

    /// Stream metadata; the call starts here
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StartMetadata,
    },

    /// One chunk of caller audio
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },

    /// A previously sent mark finished playing
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },

    /// Caller pressed a key
    Dtmf {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        dtmf: DtmfPayload,
    },

    /// The call ended
    Stop {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        #[serde(default)]
        stop: Option<StopMetadata>,
    },
}

impl MediaStreamIncoming {
    /// Event name for logs.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Mark { .. } => "mark",
            Self::Dtmf { .. } => "dtmf",
            Self::Stop { .. } => "stop",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
    #[serde(default)]
    pub custom_parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DtmfPayload {
    #[serde(default)]
    pub track: Option<String>,
    pub digit: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopMetadata {
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
}

// =============================================================================
// Outgoing Messages (Server -> Twilio)
// =============================================================================

/// Outgoing Media Streams events
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamOutgoing {
    /// Audio for the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutgoingMedia,
    },

    /// Ask Twilio to report back when playback reaches this point
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutgoingMark,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutgoingMedia {
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutgoingMark {
    pub name: String,
}

impl MediaStreamOutgoing {
    pub fn media(stream_sid: &str, payload: String) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutgoingMedia { payload },
        }
    }

    pub fn mark(stream_sid: &str, name: String) -> Self {
        Self::Mark {
            stream_sid: stream_sid.to_string(),
            mark: OutgoingMark { name },
        }
    }
}
