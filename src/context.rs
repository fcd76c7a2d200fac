//! Shared system context
//!
//! Everything the tasks coordinate through lives in one [`SystemContext`],
//! normally a `static`. Each field has a fixed set of writers:
//!
//! | field       | written by                                             |
//! |-------------|--------------------------------------------------------|
//! | `power`     | gesture router, monitor idle timeout                   |
//! | `recording` | gesture router (`ready`), capture (`active`)           |
//! | `activity`  | gesture router, monitor, power-on                      |
//! | `link`      | link supervisor                                        |
//! | `channel`   | channel supervisor                                     |
//! | `pool`      | capture (write slot), transmit (clears read), power-on |
//! | `handoff`   | capture (publish), transmit (complete), power-on       |

use crate::activity::ActivityClock;
use crate::buffer::{BufferPool, Handoff};
use crate::connectivity::ConnectionStatus;
use crate::power::PowerStateMachine;
use crate::recording::RecordingStateMachine;
use crate::types::PowerState;

pub struct SystemContext {
    pub power: PowerStateMachine,
    pub recording: RecordingStateMachine,
    pub activity: ActivityClock,
    pub link: ConnectionStatus,
    pub channel: ConnectionStatus,
    pub pool: BufferPool,
    pub handoff: Handoff,
}

impl SystemContext {
    pub const fn new() -> Self {
        Self {
            power: PowerStateMachine::new(PowerState::Off),
            recording: RecordingStateMachine::new(),
            activity: ActivityClock::new(),
            link: ConnectionStatus::new(),
            channel: ConnectionStatus::new(),
            pool: BufferPool::new(),
            handoff: Handoff::new(),
        }
    }

    /// Volatile defaults for a new power-on session.
    ///
    /// Connection state is observed, not reset; the supervisors correct it
    /// on their next tick.
    pub fn reset_session(&self) {
        self.recording.reset();
        self.handoff.clear();
        self.pool.reset();
        self.activity.touch();
    }
}

impl Default for SystemContext {
    fn default() -> Self {
        Self::new()
    }
}
