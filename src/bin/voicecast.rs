//! Voicecast - Raspberry Pi Pico W firmware
//!
//! - Core 0: boot decision, Wi-Fi/WebSocket supervision, transmit, monitor,
//!   button and gesture routing, status heartbeat
//! - Core 1: audio capture

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::{Executor, Spawner};
use embassy_rp::multicore::{spawn_core1, Stack};
use panic_halt as _;
use defmt_rtt as _;
use static_cell::StaticCell;

use voicecast::hardware::{self, Board};
use voicecast::supervisor::AppSupervisor;

// Multicore setup
static mut CORE1_STACK: Stack<16384> = Stack::new();
static EXECUTOR0: StaticCell<Executor> = StaticCell::new();
static EXECUTOR1: StaticCell<Executor> = StaticCell::new();

#[cortex_m_rt::entry]
fn main() -> ! {
    let p = embassy_rp::init(Default::default());

    AppSupervisor::new(&hardware::SYSTEM).print_startup_banner();

    let (board, microphone, core1) = hardware::init_board(p);

    // Spawn core 1 for audio capture
    spawn_core1(
        core1,
        unsafe { &mut *core::ptr::addr_of_mut!(CORE1_STACK) },
        move || {
            let executor1 = EXECUTOR1.init(Executor::new());
            executor1.run(|spawner| {
                unwrap!(hardware::init_hardware_tasks_core1(&spawner, microphone));
            });
        },
    );

    // Run core 0 for networking, control and supervision
    let executor0 = EXECUTOR0.init(Executor::new());
    executor0.run(|spawner| {
        unwrap!(spawner.spawn(core0_main_task(spawner, board)));
    });
}

/// Core 0 main task: boot, spawn the rest, then supervise
#[embassy_executor::task]
async fn core0_main_task(spawner: Spawner, board: Board) {
    info!("Core 0: starting");

    match hardware::init_hardware_tasks_core0(&spawner, board).await {
        Ok(()) => info!("Core 0: Voicecast initialized successfully"),
        Err(e) => {
            error!("Core 0: Failed to spawn tasks: {:?}", e);
            core::panic!("Task initialization failed");
        }
    }

    hardware::run_supervisor().await
}
