use bytes::{Bytes, BytesMut};

use crate::core::audio::{self, AudioResult};

/// Collects decoded caller PCM and releases it in fixed-size pieces.
///
/// Twilio delivers 20 ms frames; the backend is fed larger chunks to keep the
/// message rate down.
#[derive(Debug)]
pub(super) struct InboundAggregator {
    buffer: BytesMut,
    chunk_bytes: usize,
}

impl InboundAggregator {
    pub(super) fn new(chunk_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(chunk_bytes * 2),
            chunk_bytes,
        }
    }

    /// Append PCM and return every complete chunk now available.
    pub(super) fn push(&mut self, pcm: &[u8]) -> AudioResult<Vec<Bytes>> {
        self.buffer.extend_from_slice(pcm);
        if self.buffer.len() < self.chunk_bytes {
            return Ok(Vec::new());
        }

        let ready = self.buffer.len() - self.buffer.len() % self.chunk_bytes;
        let full = self.buffer.split_to(ready).freeze();
        Ok(audio::chunk(&full, self.chunk_bytes)?
            .into_iter()
            .map(|piece| full.slice_ref(piece))
            .collect())
    }

    /// Bytes held back waiting for a full chunk.
    pub(super) fn pending(&self) -> usize {
        self.buffer.len()
    }
}
