//! Power state machine and power transitions
//!
//! [`PowerStateMachine`] is the ON/OFF flag every task consults, plus a gate
//! that parks tasks while OFF and wakes all of them on ON.
//!
//! [`PowerControl`] performs the full transitions: persistence, indicator
//! patterns, session reset and the settle delay that keeps the button release
//! from being read as a new gesture.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use embedded_hal::digital::{InputPin, OutputPin};
use portable_atomic::{AtomicU8, Ordering};

use crate::config::Timings;
use crate::context::SystemContext;
use crate::gate::Gate;
use crate::indicators::SharedIndicators;
use crate::types::PowerState;

// ===================================================================
// State Machine
// ===================================================================

pub struct PowerStateMachine {
    state: AtomicU8,
    on: Gate,
}

impl PowerStateMachine {
    pub const fn new(initial: PowerState) -> Self {
        Self {
            state: AtomicU8::new(initial.as_u8()),
            on: Gate::new(matches!(initial, PowerState::On)),
        }
    }

    pub fn state(&self) -> PowerState {
        PowerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_on(&self) -> bool {
        self.state() == PowerState::On
    }

    /// Returns true if the state changed
    pub fn set(&self, state: PowerState) -> bool {
        let previous = self.state.swap(state.as_u8(), Ordering::AcqRel);
        match state {
            PowerState::On => self.on.open(),
            PowerState::Off => self.on.close(),
        };
        previous != state.as_u8()
    }

    /// Suspend until the system is ON
    pub async fn wait_on(&self) {
        self.on.wait_open().await
    }
}

impl Default for PowerStateMachine {
    fn default() -> Self {
        Self::new(PowerState::Off)
    }
}

// ===================================================================
// Persistence / Low Power
// ===================================================================

/// Where the power state lives across a soft reset
#[allow(async_fn_in_trait)]
pub trait PowerBackend {
    /// The persisted state, if a valid one exists
    fn load(&mut self) -> Option<PowerState>;

    fn persist(&mut self, state: PowerState);

    /// Called at the end of a power-off transition
    async fn enter_low_power(&mut self) {}
}

/// Backend that keeps the state in RAM only
pub struct VolatilePowerStore {
    state: Option<PowerState>,
}

impl VolatilePowerStore {
    pub const fn new() -> Self {
        Self { state: None }
    }
}

impl Default for VolatilePowerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerBackend for VolatilePowerStore {
    fn load(&mut self) -> Option<PowerState> {
        self.state
    }

    fn persist(&mut self, state: PowerState) {
        self.state = Some(state);
    }
}

// ===================================================================
// Transitions
// ===================================================================

pub struct PowerControl<'a, B, P> {
    ctx: &'a SystemContext,
    backend: &'a Mutex<CriticalSectionRawMutex, B>,
    indicators: &'a SharedIndicators<P>,
    timings: Timings,
}

impl<'a, B: PowerBackend, P: OutputPin> PowerControl<'a, B, P> {
    pub fn new(
        ctx: &'a SystemContext,
        backend: &'a Mutex<CriticalSectionRawMutex, B>,
        indicators: &'a SharedIndicators<P>,
        timings: Timings,
    ) -> Self {
        Self {
            ctx,
            backend,
            indicators,
            timings,
        }
    }

    /// Wait out the boot grace window, then sample the button
    pub async fn boot_with<I: InputPin>(&self, button: &mut I) -> PowerState {
        Timer::after(self.timings.boot_grace).await;
        // Active low; a read error counts as released
        let held = button.is_low().unwrap_or(false);
        self.boot(held).await
    }

    /// Decide the boot state from the button level after the grace window.
    ///
    /// Held powers on, unless the persisted state says the reset happened
    /// while already on. Anything else is a bad wake-up and stays off.
    pub async fn boot(&self, held: bool) -> PowerState {
        let persisted = self.backend.lock().await.load();
        let was_on = persisted == Some(PowerState::On);
        if was_on {
            debug!("Soft reset while powered on");
        }

        if held && !was_on {
            info!("Button pressed on boot");
            self.power_on().await;
            PowerState::On
        } else {
            warn!("Bad wake-up, staying off");
            self.power_off(self.timings.bad_wake_settle).await;
            PowerState::Off
        }
    }

    /// Long-press handler
    pub async fn toggle(&self) -> PowerState {
        if self.ctx.power.is_on() {
            self.power_off(self.timings.off_settle).await;
            PowerState::Off
        } else {
            self.power_on().await;
            PowerState::On
        }
    }

    pub async fn power_on(&self) {
        info!("System ON");
        self.backend.lock().await.persist(PowerState::On);
        self.ctx.reset_session();
        self.indicators.lock().await.connecting_pattern();
        self.ctx.power.set(PowerState::On);
        Timer::after(self.timings.on_settle).await;
        self.ctx.activity.touch();
    }

    pub async fn power_off(&self, settle: Duration) {
        info!("System OFF");
        self.ctx.power.set(PowerState::Off);
        self.ctx.recording.reset();
        self.indicators.lock().await.off_pattern();

        let mut backend = self.backend.lock().await;
        backend.persist(PowerState::Off);
        Timer::after(settle).await;
        backend.enter_low_power().await;
    }
}
