//! System activity monitor
//!
//! Once per tick while ON: sample the battery, drive both status LEDs, feed
//! the activity clock while recording, and power down after a stretch of
//! inactivity.
//!
//! The LED patterns block the monitor for their duration. A recording blink
//! cycle replaces the tick delay.

use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::OutputPin;

use crate::battery::{BatteryReading, BatterySensor};
use crate::config::Timings;
use crate::context::SystemContext;
use crate::indicators::{blink, Indicator, SharedIndicators};
use crate::power::{PowerBackend, PowerControl};

/// State sampled at the start of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub link_up: bool,
    pub channel_up: bool,
    pub recording_active: bool,
    pub idle: Duration,
}

impl MonitorSnapshot {
    pub fn capture(ctx: &SystemContext, now: Instant) -> Self {
        Self {
            link_up: ctx.link.is_connected(),
            channel_up: ctx.channel.is_connected(),
            recording_active: ctx.recording.is_active(),
            idle: ctx.activity.idle_for(now),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HealthPattern {
    /// Link or channel down: blink, pause
    Distress,
    /// All up: dark
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordingPattern {
    Blink,
    Solid,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MonitorPlan {
    pub health: HealthPattern,
    pub recording: RecordingPattern,
    pub touch_activity: bool,
    pub power_off: bool,
}

/// Decide what this tick shows and does
pub fn plan(snapshot: &MonitorSnapshot, idle_limit: Duration) -> MonitorPlan {
    let health = if snapshot.link_up && snapshot.channel_up {
        HealthPattern::Steady
    } else {
        HealthPattern::Distress
    };

    if snapshot.recording_active {
        return MonitorPlan {
            health,
            recording: RecordingPattern::Blink,
            touch_activity: true,
            power_off: false,
        };
    }

    MonitorPlan {
        health,
        recording: if snapshot.channel_up {
            RecordingPattern::Solid
        } else {
            RecordingPattern::Dark
        },
        touch_activity: false,
        power_off: snapshot.idle >= idle_limit,
    }
}

pub struct MonitorTask<'a, S, B, P> {
    ctx: &'a SystemContext,
    battery: S,
    indicators: &'a SharedIndicators<P>,
    power: PowerControl<'a, B, P>,
    timings: Timings,
}

impl<'a, S, B, P> MonitorTask<'a, S, B, P>
where
    S: BatterySensor,
    B: PowerBackend,
    P: OutputPin,
{
    pub fn new(
        ctx: &'a SystemContext,
        battery: S,
        indicators: &'a SharedIndicators<P>,
        power: PowerControl<'a, B, P>,
        timings: Timings,
    ) -> Self {
        Self {
            ctx,
            battery,
            indicators,
            power,
            timings,
        }
    }

    pub async fn run(&mut self) -> ! {
        info!("System monitor started");
        loop {
            self.ctx.power.wait_on().await;
            let plan = self.tick().await;
            if plan.recording != RecordingPattern::Blink {
                Timer::after(self.timings.monitor_tick).await;
            }
        }
    }

    pub async fn tick(&mut self) -> MonitorPlan {
        match self.battery.read_raw().await {
            Ok(raw) => {
                let reading = BatteryReading::from_raw(raw);
                debug!(
                    "Battery: {} mV, {}%, duty {}",
                    reading.millivolts, reading.percent, reading.duty
                );
            }
            Err(e) => warn!("Battery read failed: {}", e),
        }

        let snapshot = MonitorSnapshot::capture(self.ctx, Instant::now());
        let mut plan = plan(&snapshot, self.timings.idle_power_off);

        if plan.touch_activity {
            self.ctx.activity.touch();
        }

        self.show_health(plan.health).await;
        self.show_recording(plan.recording).await;

        // The patterns block for seconds; a gesture or a new recording in
        // that window cancels the power-off
        if plan.power_off {
            plan.power_off = !self.ctx.recording.is_active()
                && self.ctx.activity.idle_for(Instant::now()) >= self.timings.idle_power_off;
        }

        if plan.power_off && self.ctx.power.is_on() {
            info!(
                "Inactivity for more than {} seconds",
                self.timings.idle_power_off.as_secs()
            );
            self.power.power_off(self.timings.off_settle).await;
        }

        plan
    }

    async fn show_health(&self, pattern: HealthPattern) {
        match pattern {
            HealthPattern::Distress => {
                let t = &self.timings;
                blink(
                    self.indicators,
                    Indicator::Health,
                    t.blink_repeat,
                    t.blink_on,
                    t.blink_off,
                    t.distress_pause,
                )
                .await;
                self.indicators.lock().await.set(Indicator::Recording, false);
            }
            // TODO: drive the health LED with the battery duty cycle once it
            // is wired to a PWM slice
            HealthPattern::Steady => self.indicators.lock().await.set(Indicator::Health, false),
        }
    }

    async fn show_recording(&self, pattern: RecordingPattern) {
        match pattern {
            RecordingPattern::Blink => {
                let t = &self.timings;
                blink(
                    self.indicators,
                    Indicator::Recording,
                    t.blink_repeat,
                    t.blink_on,
                    t.blink_off,
                    t.recording_pause,
                )
                .await;
            }
            RecordingPattern::Solid => self.indicators.lock().await.set(Indicator::Recording, true),
            RecordingPattern::Dark => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_secs(60);

    fn snapshot(link_up: bool, channel_up: bool, recording_active: bool, idle: u64) -> MonitorSnapshot {
        MonitorSnapshot {
            link_up,
            channel_up,
            recording_active,
            idle: Duration::from_secs(idle),
        }
    }

    #[test]
    fn any_connection_down_is_distress() {
        assert_eq!(plan(&snapshot(false, true, false, 0), LIMIT).health, HealthPattern::Distress);
        assert_eq!(plan(&snapshot(true, false, false, 0), LIMIT).health, HealthPattern::Distress);
        assert_eq!(plan(&snapshot(true, true, false, 0), LIMIT).health, HealthPattern::Steady);
    }

    #[test]
    fn recording_blinks_and_counts_as_activity() {
        let p = plan(&snapshot(true, true, true, 600), LIMIT);
        assert_eq!(p.recording, RecordingPattern::Blink);
        assert!(p.touch_activity);
        assert!(!p.power_off);
    }

    #[test]
    fn idle_limit_powers_off_only_when_reached() {
        assert!(!plan(&snapshot(true, true, false, 59), LIMIT).power_off);
        let p = plan(&snapshot(true, true, false, 60), LIMIT);
        assert!(p.power_off);
        assert_eq!(p.recording, RecordingPattern::Solid);
        assert_eq!(plan(&snapshot(true, false, false, 0), LIMIT).recording, RecordingPattern::Dark);
    }
}
