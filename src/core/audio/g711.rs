//! G.711 mu-law companding.
//!
//! Sample-level conversions between 8-bit mu-law and 16-bit signed linear
//! PCM, following the classic Sun/CCITT tables used by telephony stacks.
//! A silent mu-law byte (`0xFF`) expands to linear `0`.

/// Bias added before segment search (0x84 >> 2 in the 14-bit domain).
const ULAW_BIAS: i16 = 0x21;

/// Largest 14-bit magnitude before clipping.
const ULAW_CLIP: i16 = 8159;

/// Upper bounds of the eight mu-law segments in the 14-bit domain.
const SEGMENT_END: [i16; 8] = [0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF];

/// Expand one mu-law byte to a linear PCM sample.
#[inline]
pub fn ulaw_to_linear(ulaw: u8) -> i16 {
    let u = !ulaw;
    let mut t = (((u & 0x0F) as i32) << 3) + 0x84;
    t <<= (u & 0x70) >> 4;

    if u & 0x80 != 0 {
        (0x84 - t) as i16
    } else {
        (t - 0x84) as i16
    }
}

/// Compress one linear PCM sample to a mu-law byte.
#[inline]
pub fn linear_to_ulaw(sample: i16) -> u8 {
    // Work in the 14-bit domain.
    let mut pcm = sample >> 2;
    let mask: u8 = if pcm < 0 {
        pcm = -pcm;
        0x7F
    } else {
        0xFF
    };

    if pcm > ULAW_CLIP {
        pcm = ULAW_CLIP;
    }
    pcm += ULAW_BIAS;

    match SEGMENT_END.iter().position(|&end| pcm <= end) {
        Some(seg) => {
            let uval = ((seg as u8) << 4) | (((pcm >> (seg + 1)) & 0x0F) as u8);
            uval ^ mask
        }
        None => 0x7F ^ mask,
    }
}
