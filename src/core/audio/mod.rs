//! Audio transcoding between the telephony leg and the Live backend.
//!
//! The telephony side speaks base64 mu-law at 8kHz; the backend consumes
//! PCM 16-bit signed little-endian mono at 16kHz and produces PCM at 24kHz.
//! Everything in this module is a pure function over byte slices, so it can
//! be called from any task without coordination.
//!
//! # Pipeline
//!
//! ```text
//! inbound:  base64 -> mu-law 8k -> PCM16 8k -> PCM16 16k   (decode_inbound)
//! outbound: PCM16 Nk -> PCM16 8k -> mu-law 8k -> base64     (encode_outbound)
//! ```
//!
//! # Example
//!
//! ```rust
//! use livecall_gateway::core::audio::{chunk, decode_inbound};
//! use base64::prelude::*;
//!
//! let payload = BASE64_STANDARD.encode([0xFFu8; 160]);
//! let pcm = decode_inbound(&payload).unwrap();
//! assert_eq!(pcm.len(), 640);
//!
//! let frames = chunk(&pcm, 320).unwrap();
//! assert_eq!(frames.len(), 2);
//! ```

mod g711;

use base64::prelude::*;
use thiserror::Error;

pub use g711::{linear_to_ulaw, ulaw_to_linear};

/// Sample rate of the telephony media stream (G.711).
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Sample rate the Live backend expects for input audio.
pub const BACKEND_INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate the Live backend uses for output audio unless the part says otherwise.
pub const BACKEND_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Bytes per PCM16 sample.
const PCM_SAMPLE_WIDTH: usize = 2;

/// Errors produced by the audio pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    /// Inbound payload was not valid base64
    #[error("Base64 decode failed: {0}")]
    Base64Decode(String),

    /// PCM16 buffers must hold whole samples
    #[error("PCM buffer has odd length {0}")]
    OddPcmLength(usize),

    /// Chunk size must be positive
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Sample rates must be positive
    #[error("Invalid sample rate conversion {from} -> {to}")]
    InvalidSampleRate { from: u32, to: u32 },
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Decode mu-law bytes to PCM16 little-endian. Output is twice the input length.
pub fn mulaw_to_pcm(mulaw: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(mulaw.len() * PCM_SAMPLE_WIDTH);
    for &byte in mulaw {
        pcm.extend_from_slice(&ulaw_to_linear(byte).to_le_bytes());
    }
    pcm
}

/// Encode PCM16 little-endian to mu-law. Output is half the input length.
pub fn pcm_to_mulaw(pcm: &[u8]) -> AudioResult<Vec<u8>> {
    if pcm.len() % PCM_SAMPLE_WIDTH != 0 {
        return Err(AudioError::OddPcmLength(pcm.len()));
    }

    Ok(pcm
        .chunks_exact(PCM_SAMPLE_WIDTH)
        .map(|s| linear_to_ulaw(i16::from_le_bytes([s[0], s[1]])))
        .collect())
}

/// Rate-convert mono PCM16 with linear interpolation.
///
/// Returns the input unchanged when `from_rate == to_rate`. Otherwise the
/// output holds `floor(n * to_rate / from_rate)` samples. Interpolation uses
/// integer arithmetic so identical inputs always give identical outputs.
pub fn resample(pcm: &[u8], from_rate: u32, to_rate: u32) -> AudioResult<Vec<u8>> {
    if from_rate == to_rate {
        return Ok(pcm.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::InvalidSampleRate {
            from: from_rate,
            to: to_rate,
        });
    }
    if pcm.len() % PCM_SAMPLE_WIDTH != 0 {
        return Err(AudioError::OddPcmLength(pcm.len()));
    }

    let samples: Vec<i16> = pcm
        .chunks_exact(PCM_SAMPLE_WIDTH)
        .map(|s| i16::from_le_bytes([s[0], s[1]]))
        .collect();
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let from = from_rate as u64;
    let to = to_rate as u64;
    let out_len = (samples.len() as u64 * to / from) as usize;
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len * PCM_SAMPLE_WIDTH);
    for i in 0..out_len as u64 {
        let position = i * from;
        let idx = ((position / to) as usize).min(last);
        let frac = (position % to) as i64;

        let a = samples[idx] as i64;
        let b = samples[(idx + 1).min(last)] as i64;
        let value = a + (b - a) * frac / to as i64;

        out.extend_from_slice(&(value as i16).to_le_bytes());
    }

    Ok(out)
}

/// Turn a telephony media payload into backend-ready PCM16 at 16kHz.
///
/// An empty payload yields empty output.
pub fn decode_inbound(payload: &str) -> AudioResult<Vec<u8>> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    let mulaw = BASE64_STANDARD
        .decode(payload)
        .map_err(|e| AudioError::Base64Decode(e.to_string()))?;
    let pcm_8k = mulaw_to_pcm(&mulaw);

    resample(&pcm_8k, TELEPHONY_SAMPLE_RATE, BACKEND_INPUT_SAMPLE_RATE)
}

/// Turn backend PCM16 at `source_rate` into a telephony media payload.
pub fn encode_outbound(pcm: &[u8], source_rate: u32) -> AudioResult<String> {
    let pcm_8k = resample(pcm, source_rate, TELEPHONY_SAMPLE_RATE)?;
    let mulaw = pcm_to_mulaw(&pcm_8k)?;

    Ok(BASE64_STANDARD.encode(mulaw))
}

/// Split `data` into `size`-byte pieces in order. The last piece may be shorter.
pub fn chunk(data: &[u8], size: usize) -> AudioResult<Vec<&[u8]>> {
    if size == 0 {
        return Err(AudioError::InvalidChunkSize(size));
    }

    Ok(data.chunks(size).collect())
}

/// Bytes of PCM16 mono covering `ms` milliseconds at `sample_rate`.
#[inline]
pub fn pcm_bytes_for_duration(sample_rate: u32, ms: u32) -> usize {
    (sample_rate as usize * ms as usize / 1000) * PCM_SAMPLE_WIDTH
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_from_samples(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples_from_pcm(pcm: &[u8]) -> Vec<i16> {
        pcm.chunks_exact(2)
            .map(|s| i16::from_le_bytes([s[0], s[1]]))
            .collect()
    }

    #[test]
    fn test_decode_inbound_silence_frame() {
        let payload = BASE64_STANDARD.encode([0xFFu8; 160]);
        let pcm = decode_inbound(&payload).unwrap();
        assert_eq!(pcm.len(), 640);
        assert!(pcm.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_inbound_empty_payload() {
        assert_eq!(decode_inbound("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_inbound_malformed_base64() {
        let result = decode_inbound("not base64!!");
        assert!(matches!(result, Err(AudioError::Base64Decode(_))));
    }

    #[test]
    fn test_chunk_lengths() {
        let data = vec![0u8; 1000];
        let pieces = chunk(&data, 320).unwrap();
        let lengths: Vec<usize> = pieces.iter().map(|p| p.len()).collect();
        assert_eq!(lengths, vec![320, 320, 320, 40]);
    }

    #[test]
    fn test_chunk_reconstructs_input() {
        let data: Vec<u8> = (0..=255u8).cycle().take(777).collect();
        for size in [1usize, 7, 160, 320, 776, 777, 1000] {
            let pieces = chunk(&data, size).unwrap();
            assert_eq!(pieces.concat(), data);
            let (last, rest) = pieces.split_last().unwrap();
            assert!(last.len() <= size);
            assert!(rest.iter().all(|p| p.len() == size));
        }
    }

    #[test]
    fn test_chunk_zero_size_is_error() {
        assert_eq!(chunk(&[1, 2, 3], 0), Err(AudioError::InvalidChunkSize(0)));
    }

    #[test]
    fn test_chunk_empty_input() {
        assert!(chunk(&[], 320).unwrap().is_empty());
    }

    #[test]
    fn test_resample_identity() {
        let pcm = pcm_from_samples(&[1, -2, 300, -32768, 32767]);
        for rate in [8000, 16000, 24000] {
            assert_eq!(resample(&pcm, rate, rate).unwrap(), pcm);
        }
    }

    #[test]
    fn test_resample_upsample_doubles_length() {
        let pcm = pcm_from_samples(&[0, 100, 200, 300]);
        let out = resample(&pcm, 8000, 16000).unwrap();
        assert_eq!(samples_from_pcm(&out), vec![0, 50, 100, 150, 200, 250, 300, 300]);
    }

    #[test]
    fn test_resample_downsample_lengths() {
        let pcm = vec![0u8; 480 * 2];
        assert_eq!(resample(&pcm, 24000, 8000).unwrap().len(), 160 * 2);
        assert_eq!(resample(&pcm, 16000, 8000).unwrap().len(), 240 * 2);
    }

    #[test]
    fn test_resample_is_deterministic() {
        let pcm = pcm_from_samples(&[5, -1000, 2000, 7, -7, 12345, -12345]);
        let a = resample(&pcm, 24000, 8000).unwrap();
        let b = resample(&pcm, 24000, 8000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_resample_rejects_bad_input() {
        assert_eq!(
            resample(&[0, 0], 0, 8000),
            Err(AudioError::InvalidSampleRate { from: 0, to: 8000 })
        );
        assert_eq!(resample(&[0, 0, 0], 8000, 16000), Err(AudioError::OddPcmLength(3)));
    }

    #[test]
    fn test_mulaw_round_trip_preserves_length() {
        let mulaw: Vec<u8> = (0..=255u8).collect();
        let pcm = mulaw_to_pcm(&mulaw);
        assert_eq!(pcm.len(), mulaw.len() * 2);

        let back = pcm_to_mulaw(&pcm).unwrap();
        assert_eq!(back.len(), mulaw.len());

        // Quantization error is bounded: decoded values agree exactly.
        for (orig, round) in mulaw.iter().zip(back.iter()) {
            assert_eq!(ulaw_to_linear(*orig), ulaw_to_linear(*round));
        }
    }

    #[test]
    fn test_pcm_to_mulaw_quantization_is_bounded() {
        let samples: Vec<i16> = (-32768i32..=32767).step_by(97).map(|s| s as i16).collect();
        let pcm = pcm_from_samples(&samples);
        let decoded = samples_from_pcm(&mulaw_to_pcm(&pcm_to_mulaw(&pcm).unwrap()));

        for (orig, approx) in samples.iter().zip(decoded.iter()) {
            let err = (*orig as i32 - *approx as i32).abs();
            // Segment 7 step is 1024; allow for clipping at the extremes.
            assert!(err <= 1024, "sample {orig} decoded as {approx}");
        }
    }

    #[test]
    fn test_pcm_to_mulaw_odd_length() {
        assert_eq!(pcm_to_mulaw(&[0, 0, 0]), Err(AudioError::OddPcmLength(3)));
    }

    #[test]
    fn test_encode_outbound_from_backend_rate() {
        // 20ms at 24kHz -> 160 mu-law bytes at 8kHz
        let pcm = vec![0u8; pcm_bytes_for_duration(24000, 20)];
        let payload = encode_outbound(&pcm, 24000).unwrap();
        let mulaw = BASE64_STANDARD.decode(payload).unwrap();
        assert_eq!(mulaw.len(), 160);
        assert!(mulaw.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_encode_then_decode_shape() {
        let pcm = vec![0u8; pcm_bytes_for_duration(16000, 20)];
        let payload = encode_outbound(&pcm, 16000).unwrap();
        assert_eq!(decode_inbound(&payload).unwrap().len(), pcm.len());
    }

    #[test]
    fn test_pcm_bytes_for_duration() {
        assert_eq!(pcm_bytes_for_duration(16000, 100), 3200);
        assert_eq!(pcm_bytes_for_duration(8000, 20), 320);
        assert_eq!(pcm_bytes_for_duration(24000, 20), 960);
    }
}
