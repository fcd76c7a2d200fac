//! Inter-task communication channels
//!
//! This module defines the Embassy channels used for communication
//! between tasks in the Voicecast firmware.

use crate::config::GESTURE_QUEUE_DEPTH;
use crate::types::GestureEvent;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Gestures from the button scanner to the gesture router
/// Buffer size: 4 (a double-click plus its surrounding edges)
pub static GESTURE_CHANNEL: Channel<CriticalSectionRawMutex, GestureEvent, GESTURE_QUEUE_DEPTH> =
    Channel::new();
