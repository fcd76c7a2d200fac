//! Audio peripheral interface

use embassy_time::Duration;

use crate::config::{BITS_PER_SAMPLE, SAMPLE_RATE};
use crate::error::Result;

/// Channel layout of the captured stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelMode {
    Mono,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub mode: ChannelMode,
}

impl AudioFormat {
    /// 16 kHz, 16-bit, mono
    pub const fn standard() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            bits_per_sample: BITS_PER_SAMPLE,
            mode: ChannelMode::Mono,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::standard()
    }
}

/// Source of raw little-endian PCM
#[allow(async_fn_in_trait)]
pub trait AudioSource {
    /// Apply the sample format. Called once at startup; failure is fatal.
    async fn configure(&mut self, format: AudioFormat) -> Result<()>;

    /// Fill up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns the number of bytes written. Zero means nothing arrived in time.
    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}
