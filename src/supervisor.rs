//! Application supervisor and monitoring
//!
//! This module provides the startup banner and a periodic status
//! heartbeat for the running firmware.

use crate::config;
use crate::context::SystemContext;
use crate::types::APP_VERSION;
use embassy_time::{Duration, Timer};

const HEARTBEAT_TICK_SECS: u32 = 10;
const STATUS_INTERVAL_SECS: u32 = 60;

/// Application supervisor responsible for monitoring and lifecycle management
pub struct AppSupervisor<'a> {
    ctx: &'a SystemContext,
    uptime_seconds: u32,
    last_heartbeat: u32,
}

impl<'a> AppSupervisor<'a> {
    pub fn new(ctx: &'a SystemContext) -> Self {
        Self {
            ctx,
            uptime_seconds: 0,
            last_heartbeat: 0,
        }
    }

    /// Print application startup banner
    pub fn print_startup_banner(&self) {
        info!("========================================");
        info!(
            "Voicecast v{}.{}.{}",
            APP_VERSION.major, APP_VERSION.minor, APP_VERSION.patch
        );
        info!("Battery-powered audio streaming");
        info!("========================================");
        info!("Hardware: RP2040 (Raspberry Pi Pico W)");
        info!(
            "Audio: {} Hz, {}-bit mono, gain <<{}",
            config::SAMPLE_RATE,
            config::BITS_PER_SAMPLE,
            config::VOLUME_GAIN
        );
        info!(
            "Buffers: {} x {} bytes",
            config::NUM_BUFFERS,
            config::BUFFER_SIZE
        );
        info!(
            "Collector: ws://{}:{}{}",
            config::COLLECTOR_HOST,
            config::COLLECTOR_PORT,
            config::COLLECTOR_PATH
        );
        info!("========================================");
    }

    /// Run the main supervisor loop
    pub async fn run(&mut self) -> ! {
        info!("Application supervisor started");

        loop {
            Timer::after(Duration::from_secs(HEARTBEAT_TICK_SECS as u64)).await;
            self.advance(HEARTBEAT_TICK_SECS);
        }
    }

    /// Account for `seconds` of uptime. Returns true if a status line was due.
    pub fn advance(&mut self, seconds: u32) -> bool {
        self.uptime_seconds += seconds;
        if self.uptime_seconds - self.last_heartbeat >= STATUS_INTERVAL_SECS {
            self.print_status();
            self.last_heartbeat = self.uptime_seconds;
            return true;
        }
        false
    }

    /// Print current application status
    fn print_status(&self) {
        let minutes = self.uptime_seconds / 60;
        let hours = minutes / 60;
        let remaining_minutes = minutes % 60;

        if hours > 0 {
            info!("Status: Uptime {}h{}m", hours, remaining_minutes);
        } else {
            info!("Status: Uptime {}m", minutes);
        }

        let ctx = self.ctx;
        info!(
            "Power: {:?}, Wi-Fi: {:?}, WebSocket: {:?}",
            ctx.power.state(),
            ctx.link.state(),
            ctx.channel.state()
        );
        info!(
            "Recording: ready={} active={}, dropped buffers: {}",
            ctx.recording.is_ready(),
            ctx.recording.is_active(),
            ctx.handoff.dropped()
        );
    }

    /// Get current uptime in seconds
    pub fn uptime(&self) -> u32 {
        self.uptime_seconds
    }
}
