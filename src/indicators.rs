//! Status LED control
//!
//! Two LEDs: health (link/channel distress, battery later) and recording.
//! Both the monitor and power transitions drive them, so they sit behind
//! an async mutex that is taken per edge.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Indicator {
    Health,
    Recording,
}

pub struct StatusIndicators<P> {
    health: P,
    recording: P,
}

pub type SharedIndicators<P> = Mutex<CriticalSectionRawMutex, StatusIndicators<P>>;

impl<P: OutputPin> StatusIndicators<P> {
    pub fn new(health: P, recording: P) -> Self {
        Self { health, recording }
    }

    pub fn set(&mut self, which: Indicator, lit: bool) {
        let pin = match which {
            Indicator::Health => &mut self.health,
            Indicator::Recording => &mut self.recording,
        };
        // GPIO writes cannot fail on the board; a failing mock only loses a blink
        let _ = if lit { pin.set_high() } else { pin.set_low() };
    }

    pub fn health(&self) -> &P {
        &self.health
    }

    pub fn recording(&self) -> &P {
        &self.recording
    }

    /// Recording dark, health lit
    pub fn off_pattern(&mut self) {
        self.set(Indicator::Recording, false);
        self.set(Indicator::Health, true);
    }

    /// Health dark while the connections come up
    pub fn connecting_pattern(&mut self) {
        self.set(Indicator::Health, false);
    }
}

/// Blink `times` times, then hold dark for `pause`
pub async fn blink<P: OutputPin>(
    indicators: &SharedIndicators<P>,
    which: Indicator,
    times: u8,
    on: Duration,
    off: Duration,
    pause: Duration,
) {
    for _ in 0..times {
        indicators.lock().await.set(which, true);
        Timer::after(on).await;
        indicators.lock().await.set(which, false);
        Timer::after(off).await;
    }
    indicators.lock().await.set(which, false);
    Timer::after(pause).await;
}
