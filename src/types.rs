//! Common types and data structures used across the Voicecast firmware
//!
//! This module contains shared enums and small value types that are used
//! by multiple tasks.

/// System power state. Survives a soft reset, see [`crate::power::PowerBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    Off,
    On,
}

impl PowerState {
    pub const fn as_u8(self) -> u8 {
        match self {
            PowerState::Off => 0,
            PowerState::On => 1,
        }
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => PowerState::On,
            _ => PowerState::Off,
        }
    }
}

/// State of one supervised connection (network link or message channel)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub const fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Which of the two supervised connections a supervisor owns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionKind {
    Link,
    Channel,
}

impl ConnectionKind {
    pub const fn name(self) -> &'static str {
        match self {
            ConnectionKind::Link => "Wi-Fi",
            ConnectionKind::Channel => "WebSocket",
        }
    }
}

/// Semantically classified button interaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gesture {
    /// Debounced press edge (button down)
    Pressed,
    Clicked,
    DoubleClicked,
    LongPressed,
}

/// Gesture plus the physical pin level when it was classified
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GestureEvent {
    pub gesture: Gesture,
    /// true if the button was held down
    pub pressed: bool,
}

impl GestureEvent {
    pub const fn new(gesture: Gesture, pressed: bool) -> Self {
        Self { gesture, pressed }
    }
}

/// Events reported by the message channel client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelEvent {
    Opened,
    Closed,
    Ping,
    Pong,
}

/// Application version information
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AppVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl AppVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }
}

/// Decimal version component; anything unparsable reads as 0
const fn version_part(text: &str) -> u8 {
    let bytes = text.as_bytes();
    let mut value: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        if !digit.is_ascii_digit() {
            return 0;
        }
        value = value * 10 + (digit - b'0') as u32;
        if value > u8::MAX as u32 {
            return 0;
        }
        i += 1;
    }
    value as u8
}

/// Current application version, from the package manifest
pub const APP_VERSION: AppVersion = AppVersion::new(
    version_part(env!("CARGO_PKG_VERSION_MAJOR")),
    version_part(env!("CARGO_PKG_VERSION_MINOR")),
    version_part(env!("CARGO_PKG_VERSION_PATCH")),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_comes_from_the_manifest() {
        let expected = std::format!(
            "{}.{}.{}",
            APP_VERSION.major, APP_VERSION.minor, APP_VERSION.patch
        );
        assert_eq!(expected, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn version_parts_parse_decimal() {
        assert_eq!(version_part("0"), 0);
        assert_eq!(version_part("42"), 42);
        assert_eq!(version_part("255"), 255);
        assert_eq!(version_part("256"), 0);
        assert_eq!(version_part("1a"), 0);
    }
}
