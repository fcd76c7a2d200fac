//! Recording state machine
//!
//! `ready` is the user's intent (toggled by double-click). `active` is what
//! capture actually observes: it goes true only after a successful read while
//! ready, and false on any failed read or when ready drops.

use portable_atomic::{AtomicBool, Ordering};

use crate::gate::Gate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordingChange {
    Started,
    Stopped,
}

pub struct RecordingStateMachine {
    ready: AtomicBool,
    active: AtomicBool,
    capture: Gate,
    transmit: Gate,
}

impl RecordingStateMachine {
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            active: AtomicBool::new(false),
            capture: Gate::new(false),
            transmit: Gate::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Written by the capture task only
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Flip `ready` and gate capture/transmit to match
    pub fn toggle(&self) -> RecordingChange {
        if self.is_ready() {
            self.stop();
            RecordingChange::Stopped
        } else {
            self.start();
            RecordingChange::Started
        }
    }

    pub fn start(&self) {
        self.ready.store(true, Ordering::Release);
        self.capture.open();
        self.transmit.open();
        info!("Recording ready: capture and transmit resumed");
    }

    pub fn stop(&self) {
        self.ready.store(false, Ordering::Release);
        self.active.store(false, Ordering::Release);
        self.capture.close();
        self.transmit.close();
        info!("Recording stopped: capture and transmit suspended");
    }

    /// Back to the power-on defaults without logging
    pub fn reset(&self) {
        self.ready.store(false, Ordering::Release);
        self.active.store(false, Ordering::Release);
        self.capture.close();
        self.transmit.close();
    }

    pub fn capture_gate(&self) -> &Gate {
        &self.capture
    }

    pub fn transmit_gate(&self) -> &Gate {
        &self.transmit
    }
}

impl Default for RecordingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_with_gates_closed() {
        let recording = RecordingStateMachine::new();
        assert!(!recording.is_ready());
        assert!(!recording.is_active());
        assert!(!recording.capture_gate().is_open());
        assert!(!recording.transmit_gate().is_open());
    }

    #[test]
    fn toggle_opens_then_closes_both_gates() {
        let recording = RecordingStateMachine::new();
        assert_eq!(recording.toggle(), RecordingChange::Started);
        assert!(recording.capture_gate().is_open());
        assert!(recording.transmit_gate().is_open());

        recording.set_active(true);
        assert_eq!(recording.toggle(), RecordingChange::Stopped);
        assert!(!recording.is_ready());
        assert!(!recording.is_active());
        assert!(!recording.capture_gate().is_open());
        assert!(!recording.transmit_gate().is_open());
    }

    #[test]
    fn toggle_ignores_active_flag() {
        let recording = RecordingStateMachine::new();
        // Capture never succeeded, ready is still what toggles
        recording.start();
        assert!(!recording.is_active());
        assert_eq!(recording.toggle(), RecordingChange::Stopped);
    }
}
