//! Error types for Voicecast.
//!
//! Only [`Error::AudioInit`] is fatal, and only at startup. Everything else is
//! reported by the task that hit it and retried on its next iteration.

/// Failures reported by the external collaborators and the tasks driving them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The audio peripheral rejected its configuration.
    #[error("audio peripheral failed to initialize")]
    AudioInit,

    /// A read from the audio peripheral failed.
    #[error("audio read failed")]
    AudioRead,

    /// A read did not complete within its bounded wait.
    #[error("audio read timed out")]
    AudioTimeout,

    /// Joining the network link failed.
    #[error("network link connect failed")]
    LinkConnect,

    /// Opening the message channel failed.
    #[error("message channel connect failed")]
    ChannelConnect,

    /// The message channel is not open.
    #[error("message channel closed")]
    ChannelClosed,

    /// Writing a frame to the message channel failed.
    #[error("send failed")]
    Send,

    /// The battery ADC read failed.
    #[error("battery read failed")]
    BatteryRead,
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
