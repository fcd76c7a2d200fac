//! Button scanning and gesture detection
//!
//! One active-low button is sampled at [`BUTTON_SCAN_RATE_HZ`], debounced,
//! and classified into gestures that are queued for the gesture router.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::InputPin;
use heapless::Vec;

use crate::config::*;
use crate::types::{Gesture, GestureEvent};

fn elapsed(since: Instant, now: Instant) -> Duration {
    now.checked_duration_since(since)
        .unwrap_or(Duration::from_ticks(0))
}

// ===================================================================
// Button Debouncing State
// ===================================================================

struct Debouncer {
    current: bool,
    raw: bool,
    last_change: Instant,
}

impl Debouncer {
    fn new(now: Instant) -> Self {
        Self {
            current: false,
            raw: false,
            last_change: now,
        }
    }

    /// Feed one raw sample. Returns true when the debounced level changes.
    fn update(&mut self, raw_state: bool, now: Instant) -> bool {
        if raw_state != self.raw {
            self.raw = raw_state;
            self.last_change = now;
        }

        if elapsed(self.last_change, now) >= Duration::from_millis(BUTTON_DEBOUNCE_MS) {
            let changed = self.current != self.raw;
            self.current = self.raw;
            changed
        } else {
            false
        }
    }

    fn is_pressed(&self) -> bool {
        self.current
    }
}

// ===================================================================
// Gesture Classification
// ===================================================================

/// Gestures produced by one sample; at most an expired click plus an edge
pub type Gestures = Vec<GestureEvent, 2>;

pub struct GestureDetector {
    debouncer: Debouncer,
    pressed_at: Option<Instant>,
    long_press_fired: bool,
    // Release time of a click that may still become a double-click
    pending_click: Option<Instant>,
}

impl GestureDetector {
    pub fn new(now: Instant) -> Self {
        Self {
            debouncer: Debouncer::new(now),
            pressed_at: None,
            long_press_fired: false,
            pending_click: None,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.debouncer.is_pressed()
    }

    /// Feed one raw sample (`true` = held) taken at `now`
    pub fn update(&mut self, pressed_raw: bool, now: Instant) -> Gestures {
        let mut out = Gestures::new();
        let window = Duration::from_millis(DOUBLE_CLICK_WINDOW_MS);

        // A lone click is only reported once the double-click window closes
        if let Some(first) = self.pending_click {
            if elapsed(first, now) > window {
                self.pending_click = None;
                let _ = out.push(GestureEvent::new(Gesture::Clicked, self.is_pressed()));
            }
        }

        if self.debouncer.update(pressed_raw, now) {
            if self.debouncer.is_pressed() {
                self.pressed_at = Some(now);
                self.long_press_fired = false;
                let _ = out.push(GestureEvent::new(Gesture::Pressed, true));
            } else {
                self.on_release(now, window, &mut out);
            }
            return out;
        }

        if let (true, Some(pressed_at)) = (self.is_pressed(), self.pressed_at) {
            if !self.long_press_fired
                && elapsed(pressed_at, now) >= Duration::from_millis(LONG_PRESS_MS)
            {
                self.long_press_fired = true;
                self.pending_click = None;
                let _ = out.push(GestureEvent::new(Gesture::LongPressed, true));
            }
        }

        out
    }

    fn on_release(&mut self, now: Instant, window: Duration, out: &mut Gestures) {
        let Some(pressed_at) = self.pressed_at.take() else {
            return;
        };
        if self.long_press_fired {
            return;
        }

        if elapsed(pressed_at, now) > Duration::from_millis(CLICK_MAX_MS) {
            // Too slow for a click, too short for a long press
            self.pending_click = None;
            return;
        }

        match self.pending_click.take() {
            Some(first) if elapsed(first, now) <= window => {
                let _ = out.push(GestureEvent::new(Gesture::DoubleClicked, false));
            }
            _ => self.pending_click = Some(now),
        }
    }
}

// ===================================================================
// Button Task Implementation
// ===================================================================

pub type GestureSender<'a> =
    Sender<'a, CriticalSectionRawMutex, GestureEvent, GESTURE_QUEUE_DEPTH>;

/// Sample `pin` forever and queue every gesture
pub async fn run_button_scanner<I: InputPin>(mut pin: I, sender: GestureSender<'_>) -> ! {
    info!("Button task started");

    let mut detector = GestureDetector::new(Instant::now());
    let scan_interval = Duration::from_millis(1000 / BUTTON_SCAN_RATE_HZ);

    loop {
        // Active low with pull-up
        let raw = pin.is_low().unwrap_or(false);

        for event in detector.update(raw, Instant::now()) {
            debug!("Button {:?} (pressed: {})", event.gesture, event.pressed);
            if sender.try_send(event).is_err() {
                debug!("Gesture queue full, dropping {:?}", event.gesture);
            }
        }

        Timer::after(scan_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the detector at 10 ms steps through (level, duration_ms) phases
    fn play(phases: &[(bool, u64)]) -> std::vec::Vec<Gesture> {
        let mut detector = GestureDetector::new(Instant::from_millis(0));
        let mut gestures = std::vec::Vec::new();
        let mut t = 0;
        for &(level, duration) in phases {
            let end = t + duration;
            while t < end {
                t += 10;
                for event in detector.update(level, Instant::from_millis(t)) {
                    gestures.push(event.gesture);
                }
            }
        }
        gestures
    }

    #[test]
    fn short_press_is_a_click_after_the_window() {
        let gestures = play(&[(false, 50), (true, 100), (false, 600)]);
        assert_eq!(gestures, [Gesture::Pressed, Gesture::Clicked]);
    }

    #[test]
    fn two_quick_presses_are_one_double_click() {
        let gestures = play(&[
            (false, 50),
            (true, 100),
            (false, 100),
            (true, 100),
            (false, 600),
        ]);
        assert_eq!(
            gestures,
            [Gesture::Pressed, Gesture::Pressed, Gesture::DoubleClicked]
        );
    }

    #[test]
    fn slow_second_press_gives_two_clicks() {
        let gestures = play(&[
            (false, 50),
            (true, 100),
            (false, 500),
            (true, 100),
            (false, 600),
        ]);
        assert_eq!(
            gestures,
            [
                Gesture::Pressed,
                Gesture::Clicked,
                Gesture::Pressed,
                Gesture::Clicked
            ]
        );
    }

    #[test]
    fn long_hold_fires_long_press_once() {
        let gestures = play(&[(false, 50), (true, 3000), (false, 600)]);
        assert_eq!(gestures, [Gesture::Pressed, Gesture::LongPressed]);
    }

    #[test]
    fn bounce_shorter_than_debounce_is_ignored() {
        let gestures = play(&[(false, 50), (true, 10), (false, 600)]);
        assert!(gestures.is_empty());
    }

    #[test]
    fn medium_press_is_neither_click_nor_long_press() {
        let gestures = play(&[(false, 50), (true, 500), (false, 600)]);
        assert_eq!(gestures, [Gesture::Pressed]);
    }
}
