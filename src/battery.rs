//! Battery sensing
//!
//! The battery sits behind a divider on an ADC input. The raw 12-bit reading
//! is scaled against the 3.3 V reference.

use core::future::Future;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use fixed::types::U16F16;
use portable_atomic::{AtomicBool, Ordering};

use crate::config::{ADC_FULL_SCALE, ADC_REFERENCE_MV, BATTERY_MAX_MV, BATTERY_MIN_MV};
use crate::error::Result;

#[allow(async_fn_in_trait)]
pub trait BatterySensor {
    /// One raw ADC conversion, 0..=4095
    async fn read_raw(&mut self) -> Result<u16>;
}

/// Hands a battery conversion to whoever currently owns a shared ADC.
///
/// The capture loop keeps the ADC busy back to back and an async mutex is not
/// fair, so a reader on another core may never win the lock. The reader posts
/// a request instead; the owner serves it between buffers while it still holds
/// the ADC, and an idle ADC is read directly.
pub struct BatteryMailbox {
    requested: AtomicBool,
    reading: Signal<CriticalSectionRawMutex, Result<u16>>,
}

impl BatteryMailbox {
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            reading: Signal::new(),
        }
    }

    /// Owner side: true once per posted request
    pub fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }

    /// Owner side: answer the request taken with [`Self::take_request`]
    pub fn deliver(&self, reading: Result<u16>) {
        self.reading.signal(reading);
    }

    /// Reader side: post a request and race it against `direct`, a read that
    /// first has to acquire the ADC
    pub async fn read_with<F>(&self, direct: F) -> Result<u16>
    where
        F: Future<Output = Result<u16>>,
    {
        self.reading.reset();
        self.requested.store(true, Ordering::Release);
        let reading = match select(self.reading.wait(), direct).await {
            Either::First(reading) | Either::Second(reading) => reading,
        };
        self.requested.store(false, Ordering::Release);
        reading
    }
}

impl Default for BatteryMailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// One processed battery reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryReading {
    pub raw: u16,
    pub millivolts: u32,
    pub percent: u8,
    /// Indicator brightness, 0..=255
    pub duty: u8,
}

impl BatteryReading {
    pub fn from_raw(raw: u16) -> Self {
        let volts = voltage(raw);
        let percent = percentage(volts);
        Self {
            raw,
            millivolts: (volts * U16F16::from_num(1000u16)).to_num::<u32>(),
            percent,
            duty: duty_cycle(percent),
        }
    }
}

/// raw × 3.3 / 4095
pub fn voltage(raw: u16) -> U16F16 {
    let raw = U16F16::from_num(u32::from(raw).min(ADC_FULL_SCALE));
    let reference = U16F16::from_num(ADC_REFERENCE_MV) / U16F16::from_num(1000u16);
    raw * reference / U16F16::from_num(ADC_FULL_SCALE)
}

/// Linear map of the battery range onto 0..=100, clamped
pub fn percentage(volts: U16F16) -> u8 {
    let min = U16F16::from_num(BATTERY_MIN_MV) / U16F16::from_num(1000u16);
    let max = U16F16::from_num(BATTERY_MAX_MV) / U16F16::from_num(1000u16);
    if volts <= min {
        return 0;
    }
    if volts >= max {
        return 100;
    }
    let pct = (volts - min) * U16F16::from_num(100u8) / (max - min);
    pct.round().to_num::<u32>().min(100) as u8
}

pub fn duty_cycle(percent: u8) -> u8 {
    (u32::from(percent.min(100)) * 255 / 100) as u8
}
