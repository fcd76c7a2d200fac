//! PCM sample processing
//!
//! Raw capture buffers hold little-endian 16-bit samples. Gain is a plain left
//! shift with wraparound, matching fixed-point gain on the device.

use heapless::Vec;

use crate::config::{BYTES_PER_SAMPLE, SAMPLES_PER_BUFFER};

/// Shift every little-endian 16-bit sample left by `gain` bits, in place.
///
/// Overflow wraps. A trailing odd byte is left untouched.
pub fn apply_gain(pcm: &mut [u8], gain: u8) {
    if gain == 0 {
        return;
    }
    for sample in pcm.chunks_exact_mut(BYTES_PER_SAMPLE) {
        let raw = u16::from_le_bytes([sample[0], sample[1]]);
        let boosted = raw.checked_shl(u32::from(gain)).unwrap_or(0);
        sample.copy_from_slice(&boosted.to_le_bytes());
    }
}

/// Decode little-endian byte pairs into signed linear-16 samples
pub fn decode_linear16(pcm: &[u8]) -> impl Iterator<Item = i16> + '_ {
    pcm.chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
}

/// Encode samples as little-endian bytes into `out`. Returns bytes written.
///
/// Stops early if `out` is too short.
pub fn encode_linear16(samples: &[i16], out: &mut [u8]) -> usize {
    let mut written = 0;
    for (sample, dst) in samples.iter().zip(out.chunks_exact_mut(BYTES_PER_SAMPLE)) {
        dst.copy_from_slice(&sample.to_le_bytes());
        written += BYTES_PER_SAMPLE;
    }
    written
}

/// One capture buffer converted to linear-16 samples
pub struct Linear16Frame {
    samples: Vec<i16, SAMPLES_PER_BUFFER>,
}

impl Linear16Frame {
    pub fn from_pcm(pcm: &[u8]) -> Self {
        let mut samples = Vec::new();
        for sample in decode_linear16(pcm) {
            if samples.push(sample).is_err() {
                break;
            }
        }
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_of_two_quadruples_samples() {
        let mut pcm = [0x01, 0x00, 0x02, 0x00];
        apply_gain(&mut pcm, 2);
        let frame = Linear16Frame::from_pcm(&pcm);
        assert_eq!(frame.samples(), &[4, 8]);
    }

    #[test]
    fn gain_wraps_instead_of_clamping() {
        // 0x4001 << 2 = 0x10004 -> 0x0004
        let mut pcm = [0x01, 0x40];
        apply_gain(&mut pcm, 2);
        assert_eq!(pcm, [0x04, 0x00]);

        // 0x3000 << 2 = 0xC000 -> negative as i16
        let mut pcm = [0x00, 0x30];
        apply_gain(&mut pcm, 2);
        assert_eq!(decode_linear16(&pcm).next(), Some(-16384));
    }

    #[test]
    fn gain_then_decode_matches_shifted_raw_samples() {
        let raw: [u16; 6] = [0, 1, 0x7fff, 0x8000, 0xffff, 0x1234];
        let mut pcm = [0u8; 12];
        for (value, dst) in raw.iter().zip(pcm.chunks_exact_mut(2)) {
            dst.copy_from_slice(&value.to_le_bytes());
        }

        apply_gain(&mut pcm, 2);
        let frame = Linear16Frame::from_pcm(&pcm);
        let mut wire = [0u8; 12];
        let n = encode_linear16(frame.samples(), &mut wire);
        assert_eq!(n, 12);

        for (value, decoded) in raw.iter().zip(decode_linear16(&wire)) {
            assert_eq!(decoded as u16, value.wrapping_shl(2));
        }
    }

    #[test]
    fn odd_trailing_byte_is_ignored() {
        let mut pcm = [0x01, 0x00, 0x7f];
        apply_gain(&mut pcm, 1);
        assert_eq!(pcm, [0x02, 0x00, 0x7f]);
        assert_eq!(Linear16Frame::from_pcm(&pcm).len(), 1);
    }

    #[test]
    fn gain_of_sixteen_or_more_silences() {
        let mut pcm = [0xff, 0xff];
        apply_gain(&mut pcm, 16);
        assert_eq!(pcm, [0, 0]);
    }

    #[test]
    fn encode_stops_at_output_capacity() {
        let mut out = [0u8; 3];
        assert_eq!(encode_linear16(&[1, 2], &mut out), 2);
        assert_eq!(&out[..2], &[1, 0]);
    }
}
