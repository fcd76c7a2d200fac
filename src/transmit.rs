//! Audio transmit task
//!
//! Consumer side of the pipeline. Takes the buffer the handoff points at,
//! converts it to linear-16 and sends it over the message channel as one or
//! more binary frames.
//!
//! While either connection is down the entry is left in place. It is not
//! retried: the next publish replaces it.

use crate::buffer::ReadyBuffer;
use crate::config::{TransmitPolicy, BUFFER_SIZE};
use crate::connectivity::{MessageChannel, Shared};
use crate::context::SystemContext;
use crate::error::Error;
use crate::pcm::{encode_linear16, Linear16Frame};

/// Result of one transmit iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitOutcome {
    /// Nothing published
    Idle,
    LinkDown,
    ChannelDown,
    /// The entry was replaced or its slot reused before it could be read
    Stale,
    Sent {
        frames: usize,
        bytes: usize,
    },
    /// The buffer is dropped, not retried
    Failed(Error),
}

pub struct TransmitTask<'a, C> {
    ctx: &'a SystemContext,
    channel: &'a Shared<C>,
    policy: TransmitPolicy,
    scratch: [u8; BUFFER_SIZE],
}

impl<'a, C: MessageChannel> TransmitTask<'a, C> {
    pub fn new(ctx: &'a SystemContext, channel: &'a Shared<C>, policy: TransmitPolicy) -> Self {
        Self {
            ctx,
            channel,
            policy,
            scratch: [0; BUFFER_SIZE],
        }
    }

    pub async fn run(&mut self) -> ! {
        info!("Transmit task started ({:?})", self.policy);
        loop {
            self.ctx.power.wait_on().await;
            self.ctx.recording.transmit_gate().wait_open().await;

            let ready = self.ctx.handoff.wait_ready().await;
            // Power or recording may have stopped while parked on the handoff
            if !self.ctx.power.is_on() || !self.ctx.recording.transmit_gate().is_open() {
                continue;
            }

            match self.step().await {
                TransmitOutcome::LinkDown | TransmitOutcome::ChannelDown => {
                    // Nothing to do until capture replaces the entry
                    self.ctx.handoff.wait_newer(ready).await;
                }
                _ => {}
            }
        }
    }

    /// Send the buffer currently in the handoff, if any
    pub async fn step(&mut self) -> TransmitOutcome {
        let Some(ready) = self.ctx.handoff.peek() else {
            return TransmitOutcome::Idle;
        };

        if !self.ctx.link.is_connected() {
            warn!("Wi-Fi signal lost, buffer not sent");
            return TransmitOutcome::LinkDown;
        }
        if !self.ctx.channel.is_connected() {
            warn!("WebSocket disconnected, buffer not sent");
            return TransmitOutcome::ChannelDown;
        }

        let Some(frame) = self.take_frame(ready).await else {
            trace!("Slot {} (gen {}) superseded", ready.slot.index(), ready.generation);
            return TransmitOutcome::Stale;
        };

        let mut channel = self.channel.lock().await;
        let mut frames = 0;
        for chunk in self.policy.frames(frame.samples()) {
            let n = encode_linear16(chunk, &mut self.scratch);
            if let Err(e) = channel.send_binary(&self.scratch[..n]).await {
                drop(channel);
                warn!("Send failed after {} frame(s): {}", frames, e);
                self.ctx.handoff.complete(ready);
                return TransmitOutcome::Failed(e);
            }
            frames += 1;
        }
        drop(channel);

        if !self.ctx.handoff.complete(ready) {
            trace!("Newer buffer published during send");
        }

        TransmitOutcome::Sent {
            frames,
            bytes: frame.len() * 2,
        }
    }

    /// Copy the published slot out and clear it, if it still holds `ready`
    async fn take_frame(&self, ready: ReadyBuffer) -> Option<Linear16Frame> {
        let mut buffer = self.ctx.pool.slot(ready.slot).lock().await;
        if buffer.generation() != ready.generation || !self.ctx.handoff.is_current(ready) {
            return None;
        }
        let len = ready.len.min(buffer.len());
        let frame = Linear16Frame::from_pcm(&buffer.as_slice()[..len]);
        buffer.clear();
        Some(frame)
    }
}
