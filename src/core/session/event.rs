use bytes::Bytes;

/// Backend output, normalized for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// Synthesized speech as 16-bit PCM at `sample_rate`
    AudioChunk { data: Bytes, sample_rate: u32 },
    /// The model finished its turn
    TurnComplete,
    /// Transcription of caller speech
    InputTranscription(String),
    /// Transcription of model speech
    OutputTranscription(String),
    /// A backend payload could not be turned into an event
    Error(String),
}

impl NormalizedEvent {
    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AudioChunk { .. } => "audio_chunk",
            Self::TurnComplete => "turn_complete",
            Self::InputTranscription(_) => "input_transcription",
            Self::OutputTranscription(_) => "output_transcription",
            Self::Error(_) => "error",
        }
    }
}
