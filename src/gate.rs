//! Pausable-task gate
//!
//! A [`Gate`] is the "idle until told to run" contract between tasks. Tasks
//! park on [`Gate::wait_open`]; opening the gate wakes every parked task at
//! once. Power gating and the capture/transmit suspend/resume both use it.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::MultiWakerRegistration;
use portable_atomic::{AtomicBool, Ordering};

/// Number of tasks that can park on one gate before spurious wakeups start
pub const GATE_WAITERS: usize = 8;

pub struct Gate {
    open: AtomicBool,
    waiters: Mutex<CriticalSectionRawMutex, RefCell<MultiWakerRegistration<GATE_WAITERS>>>,
}

impl Gate {
    pub const fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
            waiters: Mutex::new(RefCell::new(MultiWakerRegistration::new())),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Open the gate and wake all parked tasks. Returns true if it was closed.
    pub fn open(&self) -> bool {
        self.waiters.lock(|waiters| {
            let was_open = self.open.swap(true, Ordering::AcqRel);
            if !was_open {
                waiters.borrow_mut().wake();
            }
            !was_open
        })
    }

    /// Close the gate. Returns true if it was open.
    pub fn close(&self) -> bool {
        self.waiters
            .lock(|_| self.open.swap(false, Ordering::AcqRel))
    }

    /// Suspend until the gate is open. Returns immediately if it already is.
    pub async fn wait_open(&self) {
        poll_fn(|cx| {
            // Check and register under the same lock as `open` so a wake
            // between the two cannot be lost.
            self.waiters.lock(|waiters| {
                if self.open.load(Ordering::Acquire) {
                    Poll::Ready(())
                } else {
                    waiters.borrow_mut().register(cx.waker());
                    Poll::Pending
                }
            })
        })
        .await
    }
}
