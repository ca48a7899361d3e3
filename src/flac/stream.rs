//! Shared plumbing between `FlacDecoder` and `FlacEncoder`: the
//! per-frame size record handed back to the caller, and PCM-to-MD5
//! byte packing (little-endian, sample width = STREAMINFO bits per
//! sample), grounded on `bae-core`'s `md-5 = "0.10"` dependency.

use md5::Md5;
use md5::Digest;

/// One encoded or decoded frame's size, in the order frames occur in
/// the stream. An external SEEKTABLE builder can fold these into seek
/// points; this crate does not build one itself (Non-goal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    pub byte_size: u64,
    pub pcm_frame_count: u32,
}

/// Packs interleaved samples into the little-endian byte sequence the
/// STREAMINFO MD5 covers: `ceil(bits_per_sample / 8)` bytes per sample.
pub(crate) fn pack_pcm_for_md5(samples: &[i32], bits_per_sample: u8) -> Vec<u8> {
    let byte_width = (bits_per_sample as usize).div_ceil(8);
    let mut bytes = Vec::with_capacity(samples.len() * byte_width);
    for &sample in samples {
        let value = sample as i64;
        for b in 0..byte_width {
            bytes.push(((value >> (8 * b)) & 0xFF) as u8);
        }
    }
    bytes
}

pub(crate) fn update_md5(hasher: &mut Md5, samples: &[i32], bits_per_sample: u8) {
    hasher.update(pack_pcm_for_md5(samples, bits_per_sample));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_16_bit_samples_little_endian() {
        let bytes = pack_pcm_for_md5(&[0x0102, -1], 16);
        assert_eq!(bytes, vec![0x02, 0x01, 0xFF, 0xFF]);
    }
}
