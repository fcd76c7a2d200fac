//! Voicecast - battery-powered audio streaming firmware
//!
//! Captures microphone audio, streams it as linear-16 PCM over a WebSocket to
//! a remote collector, and takes all user input from a single button.
//!
//! ## Architecture
//! - **Multi-core**: capture on core 1, everything else on core 0
//! - **Async**: Embassy executors, tasks park on gates instead of polling
//! - **Handoff**: lock-free single-slot mailbox between capture and transmit
//! - **Board-independent core**: peripherals sit behind traits; the Pico W
//!   adapters live in [`hardware`] (feature `rp2040`)

#![cfg_attr(not(test), no_std)]

// Must come first so the log macros are visible to every module
mod fmt;

pub mod activity;
pub mod audio;
pub mod battery;
pub mod buffer;
pub mod button;
pub mod capture;
pub mod channels;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod error;
pub mod gate;
pub mod indicators;
pub mod monitor;
pub mod pcm;
pub mod power;
pub mod recording;
pub mod router;
pub mod supervisor;
pub mod transmit;
pub mod types;

#[cfg(feature = "rp2040")]
pub mod hardware;

pub use error::{Error, Result};
