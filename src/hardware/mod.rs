//! Hardware abstraction and initialization
//!
//! Raspberry Pi Pico W adapters for the core traits, the board pin map, and
//! the executor tasks that run the pipeline on it.

pub mod net;

use embassy_executor::{SpawnError, Spawner};
use embassy_rp::adc::{self, Adc, Channel as AdcChannel};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::{CORE1, DMA_CH1, PIO0};
use embassy_rp::pio;
use embassy_rp::watchdog::Watchdog;
use embassy_rp::{Peri, Peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration};
use static_cell::StaticCell;

use crate::audio::{AudioFormat, AudioSource};
use crate::battery::{BatteryMailbox, BatterySensor};
use crate::button::run_button_scanner;
use crate::capture::CaptureTask;
use crate::channels::GESTURE_CHANNEL;
use crate::config::{self, Timings, TransmitPolicy, SAMPLES_PER_BUFFER};
use crate::connectivity::{ConnectivitySupervisor, Shared};
use crate::context::SystemContext;
use crate::error::{Error, Result};
use crate::indicators::{SharedIndicators, StatusIndicators};
use crate::monitor::MonitorTask;
use crate::power::{PowerBackend, PowerControl};
use crate::router::ButtonGestureRouter;
use crate::supervisor::AppSupervisor;
use crate::transmit::TransmitTask;
use crate::types::{ConnectionKind, PowerState};

use self::net::{RadioPeripherals, WebSocketChannel, WifiLink};

bind_interrupts!(pub struct Irqs {
    ADC_IRQ_FIFO => adc::InterruptHandler;
    PIO0_IRQ_0 => pio::InterruptHandler<PIO0>;
});

/// Shared state for every task on both cores
pub static SYSTEM: SystemContext = SystemContext::new();

pub type Led = Output<'static>;
pub type SharedAdc = Mutex<CriticalSectionRawMutex, AdcBus>;
pub type PowerStore = Mutex<CriticalSectionRawMutex, WatchdogPowerStore>;

static ADC: StaticCell<SharedAdc> = StaticCell::new();
static BATTERY_MAILBOX: BatteryMailbox = BatteryMailbox::new();
static INDICATORS: StaticCell<SharedIndicators<Led>> = StaticCell::new();
static POWER_STORE: StaticCell<PowerStore> = StaticCell::new();
static LINK: StaticCell<Shared<WifiLink>> = StaticCell::new();
static CHANNEL: StaticCell<Shared<WebSocketChannel>> = StaticCell::new();

// ADC runs from the 48 MHz USB PLL and needs 96 cycles per conversion
const ADC_CLOCK_HZ: u32 = 48_000_000;
const ADC_MIN_CYCLES: u32 = 96;

// ===================================================================
// Board Bring-up
// ===================================================================

/// Core 0 side of the board
pub struct Board {
    pub button: Input<'static>,
    pub battery: AdcBattery,
    pub indicators: &'static SharedIndicators<Led>,
    pub power_store: &'static PowerStore,
    pub radio: RadioPeripherals,
}

/// Split the peripherals into the core 0 board, the core 1 microphone, and core 1 itself
pub fn init_board(p: Peripherals) -> (Board, AdcMicrophone, Peri<'static, CORE1>) {
    info!(
        "Pins: button GPIO{}, health LED GPIO{}, recording LED GPIO{}, mic GPIO{}, battery GPIO{}",
        config::BUTTON_PIN,
        config::HEALTH_LED_PIN,
        config::RECORDING_LED_PIN,
        config::MIC_ADC_PIN,
        config::BATTERY_ADC_PIN
    );

    let adc = ADC.init(Mutex::new(AdcBus {
        adc: Adc::new(p.ADC, Irqs, adc::Config::default()),
        battery: AdcChannel::new_pin(p.PIN_28, Pull::None),
    }));

    let microphone = AdcMicrophone::new(
        adc,
        AdcChannel::new_pin(p.PIN_26, Pull::None),
        p.DMA_CH1,
    );
    let battery = AdcBattery::new(adc);

    // Health lit, recording dark: the "off" pattern until boot decides
    let indicators = INDICATORS.init(Mutex::new(StatusIndicators::new(
        Output::new(p.PIN_16, Level::High),
        Output::new(p.PIN_17, Level::Low),
    )));

    let power_store = POWER_STORE.init(Mutex::new(WatchdogPowerStore::new(Watchdog::new(
        p.WATCHDOG,
    ))));

    let board = Board {
        button: Input::new(p.PIN_15, Pull::Up),
        battery,
        indicators,
        power_store,
        radio: RadioPeripherals {
            pwr: p.PIN_23,
            cs: p.PIN_25,
            dio: p.PIN_24,
            clk: p.PIN_29,
            pio: p.PIO0,
            dma: p.DMA_CH0,
        },
    };

    (board, microphone, p.CORE1)
}

/// Boot decision, network bring-up and every core 0 task
pub async fn init_hardware_tasks_core0(spawner: &Spawner, board: Board) -> Result<(), SpawnError> {
    let Board {
        mut button,
        battery,
        indicators,
        power_store,
        radio,
    } = board;

    let timings = Timings::standard();
    let power = PowerControl::new(&SYSTEM, power_store, indicators, timings);
    let state = power.boot_with(&mut button).await;
    info!("Core 0: boot decided {:?}", state);

    let (link, channel) = net::start(spawner, radio).await?;
    let link: &'static Shared<WifiLink> = LINK.init(Mutex::new(link));
    let channel: &'static Shared<WebSocketChannel> = CHANNEL.init(Mutex::new(channel));

    spawner.spawn(button_task(button))?;
    spawner.spawn(router_task(indicators, power_store))?;
    spawner.spawn(monitor_task(battery, indicators, power_store))?;
    spawner.spawn(link_supervisor_task(link))?;
    spawner.spawn(channel_supervisor_task(channel))?;
    spawner.spawn(transmit_task(channel))?;

    Ok(())
}

/// Capture runs alone on core 1
pub fn init_hardware_tasks_core1(spawner: &Spawner, microphone: AdcMicrophone) -> Result<(), SpawnError> {
    info!("Core 1: starting capture");
    spawner.spawn(capture_task(microphone))
}

// ===================================================================
// Shared ADC
// ===================================================================

/// The ADC and the battery input; the microphone channel stays with capture
pub struct AdcBus {
    adc: Adc<'static, adc::Async>,
    battery: AdcChannel<'static>,
}

impl AdcBus {
    async fn read_battery(&mut self) -> Result<u16> {
        self.adc
            .read(&mut self.battery)
            .await
            .map_err(|_| Error::BatteryRead)
    }
}

// ===================================================================
// Microphone (ADC0 with DMA)
// ===================================================================

pub struct AdcMicrophone {
    adc: &'static SharedAdc,
    channel: AdcChannel<'static>,
    dma: Peri<'static, DMA_CH1>,
    div: u16,
    samples: [u16; SAMPLES_PER_BUFFER],
}

impl AdcMicrophone {
    pub fn new(adc: &'static SharedAdc, channel: AdcChannel<'static>, dma: Peri<'static, DMA_CH1>) -> Self {
        Self {
            adc,
            channel,
            dma,
            div: 0,
            samples: [0; SAMPLES_PER_BUFFER],
        }
    }
}

/// 12-bit unsigned conversion to signed 16-bit around mid-scale
fn centre(raw: u16) -> i16 {
    ((raw & 0x0fff) as i16 - 2048) << 4
}

impl AudioSource for AdcMicrophone {
    async fn configure(&mut self, format: AudioFormat) -> Result<()> {
        if format.bits_per_sample != 16 || format.sample_rate == 0 {
            return Err(Error::AudioInit);
        }
        let cycles = ADC_CLOCK_HZ / format.sample_rate;
        if cycles < ADC_MIN_CYCLES || cycles > u32::from(u16::MAX) + 1 {
            return Err(Error::AudioInit);
        }
        self.div = (cycles - 1) as u16;
        info!(
            "Microphone: ADC0 at {} Hz (div {})",
            format.sample_rate, self.div
        );
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.div == 0 {
            return Err(Error::AudioInit);
        }
        let count = (buf.len() / 2).min(self.samples.len());
        if count == 0 {
            return Ok(0);
        }

        let samples = &mut self.samples[..count];
        let result = {
            let mut bus = self.adc.lock().await;
            let result = with_timeout(
                timeout,
                bus.adc
                    .read_many(&mut self.channel, samples, self.div, self.dma.reborrow()),
            )
            .await;
            // Capture re-locks right away, so a pending battery read is served here
            if BATTERY_MAILBOX.take_request() {
                BATTERY_MAILBOX.deliver(bus.read_battery().await);
            }
            result
        };

        match result {
            Err(_) => return Err(Error::AudioTimeout),
            Ok(Err(_)) => return Err(Error::AudioRead),
            Ok(Ok(())) => {}
        }

        for (raw, out) in samples.iter().zip(buf.chunks_exact_mut(2)) {
            out.copy_from_slice(&centre(*raw).to_le_bytes());
        }
        Ok(count * 2)
    }
}

// ===================================================================
// Battery (ADC2)
// ===================================================================

pub struct AdcBattery {
    adc: &'static SharedAdc,
}

impl AdcBattery {
    pub fn new(adc: &'static SharedAdc) -> Self {
        Self { adc }
    }
}

impl BatterySensor for AdcBattery {
    async fn read_raw(&mut self) -> Result<u16> {
        let adc = self.adc;
        BATTERY_MAILBOX
            .read_with(async move { adc.lock().await.read_battery().await })
            .await
    }
}

// ===================================================================
// Power State Persistence
// ===================================================================

/// Power state kept in a watchdog scratch register, which survives soft reset
pub struct WatchdogPowerStore {
    watchdog: Watchdog,
}

impl WatchdogPowerStore {
    pub fn new(watchdog: Watchdog) -> Self {
        Self { watchdog }
    }
}

impl PowerBackend for WatchdogPowerStore {
    fn load(&mut self) -> Option<PowerState> {
        let word = self.watchdog.get_scratch(config::POWER_SCRATCH_INDEX);
        if word & 0xffff_0000 != config::POWER_SCRATCH_MAGIC {
            return None;
        }
        Some(PowerState::from_u8((word & 0xff) as u8))
    }

    fn persist(&mut self, state: PowerState) {
        self.watchdog.set_scratch(
            config::POWER_SCRATCH_INDEX,
            config::POWER_SCRATCH_MAGIC | u32::from(state.as_u8()),
        );
    }
}

// ===================================================================
// Executor Tasks
// ===================================================================

#[embassy_executor::task]
async fn capture_task(mut microphone: AdcMicrophone) -> ! {
    if let Err(e) = microphone.configure(AudioFormat::standard()).await {
        error!("ERROR: Failed to initialize audio: {}", e);
        core::panic!("audio peripheral failed to initialize");
    }
    CaptureTask::new(&SYSTEM, microphone, &Timings::standard())
        .run()
        .await
}

#[embassy_executor::task]
async fn transmit_task(channel: &'static Shared<WebSocketChannel>) -> ! {
    TransmitTask::new(&SYSTEM, channel, TransmitPolicy::default())
        .run()
        .await
}

#[embassy_executor::task]
async fn link_supervisor_task(link: &'static Shared<WifiLink>) -> ! {
    ConnectivitySupervisor::new(
        ConnectionKind::Link,
        link,
        &SYSTEM.link,
        &SYSTEM.power,
        Timings::standard(),
    )
    .run()
    .await
}

#[embassy_executor::task]
async fn channel_supervisor_task(channel: &'static Shared<WebSocketChannel>) -> ! {
    ConnectivitySupervisor::new(
        ConnectionKind::Channel,
        channel,
        &SYSTEM.channel,
        &SYSTEM.power,
        Timings::standard(),
    )
    .requires(&SYSTEM.link)
    .run()
    .await
}

#[embassy_executor::task]
async fn monitor_task(
    battery: AdcBattery,
    indicators: &'static SharedIndicators<Led>,
    power_store: &'static PowerStore,
) -> ! {
    let timings = Timings::standard();
    let power = PowerControl::new(&SYSTEM, power_store, indicators, timings);
    MonitorTask::new(&SYSTEM, battery, indicators, power, timings)
        .run()
        .await
}

#[embassy_executor::task]
async fn router_task(
    indicators: &'static SharedIndicators<Led>,
    power_store: &'static PowerStore,
) -> ! {
    let power = PowerControl::new(&SYSTEM, power_store, indicators, Timings::standard());
    ButtonGestureRouter::new(&SYSTEM, power)
        .run(GESTURE_CHANNEL.receiver())
        .await
}

#[embassy_executor::task]
async fn button_task(button: Input<'static>) -> ! {
    run_button_scanner(button, GESTURE_CHANNEL.sender()).await
}

/// Status heartbeat, run by the binary's main task
pub async fn run_supervisor() -> ! {
    AppSupervisor::new(&SYSTEM).run().await
}

#[embassy_executor::task]
pub(crate) async fn cyw43_task(runner: net::RadioRunner) -> ! {
    runner.run().await
}

#[embassy_executor::task]
pub(crate) async fn net_task(mut runner: net::NetRunner) -> ! {
    runner.run().await
}

// Keep the 16 kHz ADC divider in range of the hardware minimum
const _: () = assert!(ADC_CLOCK_HZ / config::SAMPLE_RATE >= ADC_MIN_CYCLES);
