//! Firmware configuration for Voicecast
//! Raspberry Pi Pico W with an analog microphone, one button and two status LEDs

use embassy_time::Duration;

// ===================================================================
// Audio Capture
// ===================================================================

pub const SAMPLE_RATE: u32 = 16_000;
pub const BITS_PER_SAMPLE: u8 = 16;
pub const BYTES_PER_SAMPLE: usize = (BITS_PER_SAMPLE / 8) as usize;
pub const VOLUME_GAIN: u8 = 2; // Left shift applied to every sample

pub const NUM_BUFFERS: usize = 3;
pub const BUFFER_SIZE: usize = 2048; // Bytes per capture buffer
pub const SAMPLES_PER_BUFFER: usize = BUFFER_SIZE / BYTES_PER_SAMPLE;

pub const AUDIO_READ_TIMEOUT_MS: u64 = 500;

// ===================================================================
// Transmission
// ===================================================================

pub const TRANSMIT_CHUNK_SAMPLES: usize = 1024; // Used by TransmitPolicy::Chunked
pub const WS_FRAME_OVERHEAD: usize = 14; // Max client frame header (with mask)
pub const WS_FRAME_BUFFER_SIZE: usize = BUFFER_SIZE + WS_FRAME_OVERHEAD + 64;

// ===================================================================
// Connectivity Supervision
// ===================================================================

pub const CONNECT_MAX_ATTEMPTS: u32 = 30;
pub const CONNECT_RETRY_INTERVAL_MS: u64 = 500;
pub const SUPERVISION_TICK_MS: u64 = 1000;

// ===================================================================
// Power Management
// ===================================================================

pub const BOOT_GRACE_MS: u64 = 2500; // Button must be held this long at boot
pub const OFF_SETTLE_MS: u64 = 2000;
pub const ON_SETTLE_MS: u64 = 2500;
pub const BAD_WAKE_SETTLE_MS: u64 = 500;
pub const IDLE_POWER_OFF_SECS: u64 = 60;
pub const MONITOR_TICK_MS: u64 = 1000;

// Status LED patterns
pub const BLINK_ON_MS: u64 = 1000;
pub const BLINK_OFF_MS: u64 = 1000;
pub const BLINK_REPEAT: u8 = 3;
pub const DISTRESS_PAUSE_MS: u64 = 2000;
pub const RECORDING_PAUSE_MS: u64 = 5000;

// ===================================================================
// Button Configuration
// ===================================================================

pub const BUTTON_DEBOUNCE_MS: u64 = 20; // Button debounce time
pub const BUTTON_SCAN_RATE_HZ: u64 = 100; // Button scan frequency
pub const CLICK_MAX_MS: u64 = 200; // Longest press still counted as a click
pub const DOUBLE_CLICK_WINDOW_MS: u64 = 400; // Release-to-release window
pub const LONG_PRESS_MS: u64 = 1000;
pub const GESTURE_QUEUE_DEPTH: usize = 4;

// ===================================================================
// Battery Sensing
// ===================================================================

pub const ADC_REFERENCE_MV: u32 = 3300;
pub const ADC_FULL_SCALE: u32 = 4095; // 12-bit ADC
pub const BATTERY_MIN_MV: u32 = 0;
pub const BATTERY_MAX_MV: u32 = 3300;

// ===================================================================
// Network (overridable at build time)
// ===================================================================

pub const WIFI_SSID: &str = env_or(option_env!("VOICECAST_WIFI_SSID"), "voicecast");
pub const WIFI_PASSWORD: &str = env_or(option_env!("VOICECAST_WIFI_PASSWORD"), "voicecast");
pub const COLLECTOR_HOST: &str = env_or(option_env!("VOICECAST_HOST"), "192.168.1.10");
pub const COLLECTOR_PORT: u16 = parse_port(option_env!("VOICECAST_PORT"), 8080);
pub const COLLECTOR_PATH: &str = env_or(option_env!("VOICECAST_PATH"), "/ws/v1/stream");

// ===================================================================
// GPIO Pin Assignments - Raspberry Pi Pico W
// ===================================================================

pub const BUTTON_PIN: u8 = 15; // Active low, internal pull-up
pub const HEALTH_LED_PIN: u8 = 16; // Link/channel health
pub const RECORDING_LED_PIN: u8 = 17; // Recording activity
pub const MIC_ADC_PIN: u8 = 26; // ADC0
pub const BATTERY_ADC_PIN: u8 = 28; // ADC2 through a 1:1 divider

// CYW43 firmware is flashed separately:
//   probe-rs download 43439A0.bin --binary-format bin --chip RP2040 --base-address 0x10100000
//   probe-rs download 43439A0_clm.bin --binary-format bin --chip RP2040 --base-address 0x10140000
pub const CYW43_FW_ADDR: usize = 0x1010_0000;
pub const CYW43_FW_LEN: usize = 230_321;
pub const CYW43_CLM_ADDR: usize = 0x1014_0000;
pub const CYW43_CLM_LEN: usize = 4_752;

// Power state survives soft reset in this watchdog scratch register
pub const POWER_SCRATCH_INDEX: usize = 0;
pub const POWER_SCRATCH_MAGIC: u32 = 0x5643_0000; // "VC" in the upper half

const fn env_or(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => default,
    }
}

const fn parse_port(value: Option<&'static str>, default: u16) -> u16 {
    let bytes = match value {
        Some(v) => v.as_bytes(),
        None => return default,
    };
    if bytes.is_empty() {
        return default;
    }
    let mut port: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b < b'0' || b > b'9' {
            return default;
        }
        port = port * 10 + (b - b'0') as u32;
        if port > u16::MAX as u32 {
            return default;
        }
        i += 1;
    }
    port as u16
}

// ===================================================================
// Runtime Settings
// ===================================================================

/// How a captured buffer is split into WebSocket frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitPolicy {
    /// One binary frame per captured buffer
    WholeFrame,
    /// Frames of at most `samples` linear-16 samples
    Chunked { samples: usize },
}

impl TransmitPolicy {
    pub const fn chunked() -> Self {
        TransmitPolicy::Chunked {
            samples: TRANSMIT_CHUNK_SAMPLES,
        }
    }

    /// Split `samples` into the frames this policy sends
    pub fn frames<'a>(&self, samples: &'a [i16]) -> core::slice::Chunks<'a, i16> {
        let size = match *self {
            TransmitPolicy::WholeFrame => samples.len(),
            TransmitPolicy::Chunked { samples: chunk } => chunk,
        };
        samples.chunks(size.max(1))
    }
}

impl Default for TransmitPolicy {
    fn default() -> Self {
        TransmitPolicy::WholeFrame
    }
}

/// Delays and limits used by the tasks
///
/// Defaults come from the constants above; tests shrink them.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub audio_read_timeout: Duration,
    pub connect_max_attempts: u32,
    pub connect_retry_interval: Duration,
    pub supervision_tick: Duration,
    pub boot_grace: Duration,
    pub off_settle: Duration,
    pub on_settle: Duration,
    pub bad_wake_settle: Duration,
    pub idle_power_off: Duration,
    pub monitor_tick: Duration,
    pub blink_on: Duration,
    pub blink_off: Duration,
    pub blink_repeat: u8,
    pub distress_pause: Duration,
    pub recording_pause: Duration,
}

impl Timings {
    pub const fn standard() -> Self {
        Self {
            audio_read_timeout: Duration::from_millis(AUDIO_READ_TIMEOUT_MS),
            connect_max_attempts: CONNECT_MAX_ATTEMPTS,
            connect_retry_interval: Duration::from_millis(CONNECT_RETRY_INTERVAL_MS),
            supervision_tick: Duration::from_millis(SUPERVISION_TICK_MS),
            boot_grace: Duration::from_millis(BOOT_GRACE_MS),
            off_settle: Duration::from_millis(OFF_SETTLE_MS),
            on_settle: Duration::from_millis(ON_SETTLE_MS),
            bad_wake_settle: Duration::from_millis(BAD_WAKE_SETTLE_MS),
            idle_power_off: Duration::from_secs(IDLE_POWER_OFF_SECS),
            monitor_tick: Duration::from_millis(MONITOR_TICK_MS),
            blink_on: Duration::from_millis(BLINK_ON_MS),
            blink_off: Duration::from_millis(BLINK_OFF_MS),
            blink_repeat: BLINK_REPEAT,
            distress_pause: Duration::from_millis(DISTRESS_PAUSE_MS),
            recording_pause: Duration::from_millis(RECORDING_PAUSE_MS),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_parsing_falls_back_on_garbage() {
        assert_eq!(parse_port(Some("9000"), 8080), 9000);
        assert_eq!(parse_port(Some(""), 8080), 8080);
        assert_eq!(parse_port(Some("80a"), 8080), 8080);
        assert_eq!(parse_port(Some("70000"), 8080), 8080);
        assert_eq!(parse_port(None, 8080), 8080);
    }

    #[test]
    fn chunked_policy_splits_on_sample_boundaries() {
        let samples = [0i16; 2500];
        let sizes: heapless::Vec<usize, 4> = TransmitPolicy::chunked()
            .frames(&samples)
            .map(|c| c.len())
            .collect();
        assert_eq!(sizes.as_slice(), &[1024, 1024, 452]);

        let whole: heapless::Vec<usize, 4> = TransmitPolicy::WholeFrame
            .frames(&samples)
            .map(|c| c.len())
            .collect();
        assert_eq!(whole.as_slice(), &[2500]);
    }

    #[test]
    fn whole_frame_on_empty_input_yields_nothing() {
        assert_eq!(TransmitPolicy::WholeFrame.frames(&[]).count(), 0);
    }
}
