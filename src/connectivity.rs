//! Connectivity supervision
//!
//! One supervisor per connection (network link, message channel). Each
//! supervision tick, while powered on and not connected, it runs a bounded
//! burst of connect attempts at a fixed interval. An exhausted burst leaves the
//! connection DISCONNECTED and the next tick starts a fresh one.
//!
//! The supervisor is the only writer of its [`ConnectionStatus`]. Everything
//! else reads it.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Timer;
use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::config::Timings;
use crate::error::Result;
use crate::power::PowerStateMachine;
use crate::types::{ChannelEvent, ConnectionKind, ConnectionState};

// ===================================================================
// Collaborator Interfaces
// ===================================================================

/// Something that can be connected and polled: the network link or the channel
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// One connect attempt
    async fn connect(&mut self) -> Result<()>;

    /// Current observed state, without blocking
    fn is_connected(&mut self) -> bool;

    /// Next pending event, if any. Must not wait for one.
    async fn poll_event(&mut self) -> Option<ChannelEvent> {
        None
    }
}

/// Bidirectional message channel to the collector
#[allow(async_fn_in_trait)]
pub trait MessageChannel: Connector {
    /// Send one binary frame
    async fn send_binary(&mut self, payload: &[u8]) -> Result<()>;
}

/// A connector shared between its supervisor and its users
pub type Shared<C> = Mutex<CriticalSectionRawMutex, C>;

// ===================================================================
// Connection Status
// ===================================================================

pub struct ConnectionStatus {
    state: AtomicU8,
    attempt: AtomicU32,
    failures: AtomicU32,
    ever_connected: AtomicBool,
}

impl ConnectionStatus {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            attempt: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            ever_connected: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Attempt number within the current (or last) burst
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Relaxed)
    }

    /// Failed attempts since boot
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn has_connected(&self) -> bool {
        self.ever_connected.load(Ordering::Relaxed)
    }

    pub fn mark_connected(&self) {
        self.ever_connected.store(true, Ordering::Relaxed);
        self.state
            .store(ConnectionState::Connected.as_u8(), Ordering::Release);
    }

    /// Returns true if this was a CONNECTED → DISCONNECTED transition
    pub fn mark_disconnected(&self) -> bool {
        let previous = self
            .state
            .swap(ConnectionState::Disconnected.as_u8(), Ordering::AcqRel);
        ConnectionState::from_u8(previous) == ConnectionState::Connected
    }

    fn begin_burst(&self) {
        self.attempt.store(0, Ordering::Relaxed);
        self.state
            .store(ConnectionState::Connecting.as_u8(), Ordering::Release);
    }

    fn record_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ===================================================================
// Supervisor
// ===================================================================

/// What one supervision tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    /// Already connected
    Healthy,
    /// Prerequisite connection is down, nothing attempted
    Waiting,
    Connected { attempts: u32 },
    /// Every attempt in the burst failed
    Exhausted,
    /// Power went off before or during the burst
    PoweredOff,
}

pub struct ConnectivitySupervisor<'a, C> {
    kind: ConnectionKind,
    connector: &'a Shared<C>,
    status: &'a ConnectionStatus,
    requires: Option<&'a ConnectionStatus>,
    power: &'a PowerStateMachine,
    timings: Timings,
}

impl<'a, C: Connector> ConnectivitySupervisor<'a, C> {
    pub fn new(
        kind: ConnectionKind,
        connector: &'a Shared<C>,
        status: &'a ConnectionStatus,
        power: &'a PowerStateMachine,
        timings: Timings,
    ) -> Self {
        Self {
            kind,
            connector,
            status,
            requires: None,
            power,
            timings,
        }
    }

    /// Only attempt connections while `prerequisite` is connected
    pub fn requires(mut self, prerequisite: &'a ConnectionStatus) -> Self {
        self.requires = Some(prerequisite);
        self
    }

    pub async fn run(&mut self) -> ! {
        info!("{} supervisor started", self.kind.name());
        loop {
            self.power.wait_on().await;
            self.tick().await;
            Timer::after(self.timings.supervision_tick).await;
        }
    }

    pub async fn tick(&mut self) -> TickOutcome {
        if !self.power.is_on() {
            return TickOutcome::PoweredOff;
        }

        let up = {
            let mut connector = self.connector.lock().await;
            while let Some(event) = connector.poll_event().await {
                self.on_event(event);
            }
            connector.is_connected()
        };

        if up {
            if !self.status.is_connected() {
                self.status.mark_connected();
                info!("{} connected", self.kind.name());
            }
            return TickOutcome::Healthy;
        }

        if self.status.mark_disconnected() {
            warn!("{} connection lost", self.kind.name());
        }

        if !self.prerequisite_up() {
            return TickOutcome::Waiting;
        }

        self.burst().await
    }

    fn prerequisite_up(&self) -> bool {
        self.requires.map_or(true, |status| status.is_connected())
    }

    fn on_event(&self, event: ChannelEvent) {
        let name = self.kind.name();
        match event {
            ChannelEvent::Opened => {
                info!("{}: connection opened", name);
                self.status.mark_connected();
            }
            ChannelEvent::Closed => {
                info!("{}: connection closed", name);
                self.status.mark_disconnected();
            }
            ChannelEvent::Ping => debug!("{}: got a ping", name),
            ChannelEvent::Pong => debug!("{}: got a pong", name),
        }
    }

    async fn burst(&mut self) -> TickOutcome {
        let name = self.kind.name();
        let max_attempts = self.timings.connect_max_attempts;
        let reconnecting = self.status.has_connected();

        if reconnecting {
            info!("{} disconnected, trying to reconnect", name);
        } else {
            info!("Trying to connect to {}", name);
        }

        self.status.begin_burst();

        for attempt in 1..=max_attempts {
            if !self.power.is_on() {
                self.status.mark_disconnected();
                debug!("{}: power off, abandoning burst", name);
                return TickOutcome::PoweredOff;
            }
            if !self.prerequisite_up() {
                self.status.mark_disconnected();
                return TickOutcome::Waiting;
            }

            self.status.record_attempt(attempt);
            let result = self.connector.lock().await.connect().await;
            match result {
                Ok(()) => {
                    self.status.mark_connected();
                    info!("{} connected after {} attempt(s)", name, attempt);
                    return TickOutcome::Connected { attempts: attempt };
                }
                Err(e) => {
                    self.status.record_failure();
                    trace!("{} attempt {}/{}: {}", name, attempt, max_attempts, e);
                }
            }

            if attempt < max_attempts {
                Timer::after(self.timings.connect_retry_interval).await;
            }
        }

        self.status.mark_disconnected();
        if reconnecting {
            warn!("Failed to reconnect to {} after {} attempts", name, max_attempts);
        } else {
            warn!("Failed to connect to {} after {} attempts", name, max_attempts);
        }
        TickOutcome::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::PowerState;
    use embassy_futures::block_on;
    use embassy_time::Duration;

    struct FlakyConnector {
        attempts: u32,
        succeed_on: Option<u32>,
        up: bool,
        events: heapless::Deque<ChannelEvent, 4>,
    }

    impl FlakyConnector {
        fn new(succeed_on: Option<u32>) -> Self {
            Self {
                attempts: 0,
                succeed_on,
                up: false,
                events: heapless::Deque::new(),
            }
        }
    }

    impl Connector for FlakyConnector {
        async fn connect(&mut self) -> Result<()> {
            self.attempts += 1;
            if Some(self.attempts) == self.succeed_on {
                self.up = true;
                Ok(())
            } else {
                Err(Error::LinkConnect)
            }
        }

        fn is_connected(&mut self) -> bool {
            self.up
        }

        async fn poll_event(&mut self) -> Option<ChannelEvent> {
            self.events.pop_front()
        }
    }

    fn fast() -> Timings {
        Timings {
            connect_retry_interval: Duration::from_ticks(0),
            supervision_tick: Duration::from_ticks(0),
            ..Timings::standard()
        }
    }

    #[test]
    fn attempts_are_spaced_by_the_retry_interval() {
        let power = PowerStateMachine::new(PowerState::On);
        let status = ConnectionStatus::new();
        let link = Mutex::new(FlakyConnector::new(Some(3)));
        let timings = Timings {
            connect_retry_interval: Duration::from_millis(2),
            ..fast()
        };
        let mut supervisor =
            ConnectivitySupervisor::new(ConnectionKind::Link, &link, &status, &power, timings);

        let started = embassy_time::Instant::now();
        assert_eq!(
            block_on(supervisor.tick()),
            TickOutcome::Connected { attempts: 3 }
        );
        assert!(started.elapsed() >= Duration::from_millis(4));
    }

    #[test]
    fn succeeds_mid_burst() {
        let power = PowerStateMachine::new(PowerState::On);
        let status = ConnectionStatus::new();
        let link = Mutex::new(FlakyConnector::new(Some(4)));
        let mut supervisor =
            ConnectivitySupervisor::new(ConnectionKind::Link, &link, &status, &power, fast());

        assert_eq!(
            block_on(supervisor.tick()),
            TickOutcome::Connected { attempts: 4 }
        );
        assert!(status.is_connected());
        assert!(status.has_connected());
        assert_eq!(status.failures(), 3);
        assert_eq!(block_on(supervisor.tick()), TickOutcome::Healthy);
    }

    #[test]
    fn observed_loss_goes_back_to_disconnected() {
        let power = PowerStateMachine::new(PowerState::On);
        let status = ConnectionStatus::new();
        let link = Mutex::new(FlakyConnector::new(Some(1)));
        let mut supervisor =
            ConnectivitySupervisor::new(ConnectionKind::Link, &link, &status, &power, fast());

        block_on(supervisor.tick());
        assert!(status.is_connected());

        // Drops, and the reconnect burst never succeeds
        block_on(link.lock()).up = false;
        assert_eq!(block_on(supervisor.tick()), TickOutcome::Exhausted);
        assert_eq!(status.state(), ConnectionState::Disconnected);
        assert!(status.has_connected());
    }

    #[test]
    fn channel_waits_for_link() {
        let power = PowerStateMachine::new(PowerState::On);
        let link_status = ConnectionStatus::new();
        let status = ConnectionStatus::new();
        let channel = Mutex::new(FlakyConnector::new(Some(1)));
        let mut supervisor = ConnectivitySupervisor::new(
            ConnectionKind::Channel,
            &channel,
            &status,
            &power,
            fast(),
        )
        .requires(&link_status);

        assert_eq!(block_on(supervisor.tick()), TickOutcome::Waiting);
        assert_eq!(block_on(channel.lock()).attempts, 0);

        link_status.mark_connected();
        assert_eq!(
            block_on(supervisor.tick()),
            TickOutcome::Connected { attempts: 1 }
        );
    }

    #[test]
    fn no_attempts_while_powered_off() {
        let power = PowerStateMachine::new(PowerState::Off);
        let status = ConnectionStatus::new();
        let link = Mutex::new(FlakyConnector::new(None));
        let mut supervisor =
            ConnectivitySupervisor::new(ConnectionKind::Link, &link, &status, &power, fast());

        assert_eq!(block_on(supervisor.tick()), TickOutcome::PoweredOff);
        assert_eq!(block_on(link.lock()).attempts, 0);
    }

    #[test]
    fn close_event_marks_channel_down() {
        let power = PowerStateMachine::new(PowerState::On);
        let status = ConnectionStatus::new();
        let mut connector = FlakyConnector::new(None);
        connector.up = true;
        let channel = Mutex::new(connector);
        let mut supervisor = ConnectivitySupervisor::new(
            ConnectionKind::Channel,
            &channel,
            &status,
            &power,
            Timings {
                connect_max_attempts: 1,
                ..fast()
            },
        );
        assert_eq!(block_on(supervisor.tick()), TickOutcome::Healthy);

        {
            let mut connector = block_on(channel.lock());
            connector.up = false;
            let _ = connector.events.push_back(ChannelEvent::Ping);
            let _ = connector.events.push_back(ChannelEvent::Closed);
        }
        assert_eq!(block_on(supervisor.tick()), TickOutcome::Exhausted);
        assert!(!status.is_connected());
        assert!(block_on(channel.lock()).events.is_empty());
    }
}
