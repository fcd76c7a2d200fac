//! Audio capture task
//!
//! Producer side of the pipeline. Fills the current pool slot from the audio
//! peripheral, applies gain, publishes the slot to the handoff and advances.

use embassy_futures::yield_now;
use embassy_time::Duration;

use crate::audio::AudioSource;
use crate::buffer::ReadyBuffer;
use crate::config::{Timings, VOLUME_GAIN};
use crate::context::SystemContext;
use crate::error::Error;
use crate::pcm::apply_gain;

/// Result of one capture iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureOutcome {
    Published(ReadyBuffer),
    /// The read returned no bytes within the timeout
    Empty,
    Failed(Error),
}

pub struct CaptureTask<'a, A> {
    ctx: &'a SystemContext,
    audio: A,
    gain: u8,
    read_timeout: Duration,
}

impl<'a, A: AudioSource> CaptureTask<'a, A> {
    pub fn new(ctx: &'a SystemContext, audio: A, timings: &Timings) -> Self {
        Self {
            ctx,
            audio,
            gain: VOLUME_GAIN,
            read_timeout: timings.audio_read_timeout,
        }
    }

    pub fn with_gain(mut self, gain: u8) -> Self {
        self.gain = gain;
        self
    }

    pub async fn run(&mut self) -> ! {
        info!("Capture task started");
        loop {
            self.ctx.power.wait_on().await;

            if !self.ctx.recording.is_ready() {
                self.ctx.recording.set_active(false);
                self.ctx.recording.capture_gate().wait_open().await;
                continue;
            }

            self.step().await;
        }
    }

    /// Read one buffer into the current slot and publish it
    pub async fn step(&mut self) -> CaptureOutcome {
        let slot = self.ctx.pool.acquire_write_slot();
        let mut buffer = self.ctx.pool.slot(slot).lock().await;

        let read = self
            .audio
            .read(buffer.spare_mut(), self.read_timeout)
            .await;

        let len = match read {
            Ok(0) => {
                buffer.set_len(0);
                drop(buffer);
                self.ctx.recording.set_active(false);
                warn!("Record failed: no samples");
                yield_now().await;
                return CaptureOutcome::Empty;
            }
            Err(e) => {
                buffer.set_len(0);
                drop(buffer);
                self.ctx.recording.set_active(false);
                warn!("Record failed: {}", e);
                yield_now().await;
                return CaptureOutcome::Failed(e);
            }
            Ok(len) => len,
        };

        buffer.set_len(len);
        apply_gain(buffer.as_mut_slice(), self.gain);
        self.ctx.recording.set_active(true);

        let ready = self.ctx.handoff.publish(slot, buffer.len());
        buffer.stamp(ready.generation);
        drop(buffer);

        self.ctx.pool.advance();
        trace!("Recorded {} bytes into slot {}", ready.len, slot.index());
        CaptureOutcome::Published(ready)
    }
}
