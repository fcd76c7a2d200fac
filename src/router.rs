//! Button gesture router
//!
//! Maps gestures to power and recording actions. Every gesture counts as
//! user activity.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embedded_hal::digital::OutputPin;

use crate::config::GESTURE_QUEUE_DEPTH;
use crate::context::SystemContext;
use crate::power::{PowerBackend, PowerControl};
use crate::recording::RecordingChange;
use crate::types::{Gesture, GestureEvent, PowerState};

/// What a gesture did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouterAction {
    /// Logged only
    None,
    Recording(RecordingChange),
    Power(PowerState),
}

pub type GestureReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, GestureEvent, GESTURE_QUEUE_DEPTH>;

pub struct ButtonGestureRouter<'a, B, P> {
    ctx: &'a SystemContext,
    power: PowerControl<'a, B, P>,
}

impl<'a, B: PowerBackend, P: OutputPin> ButtonGestureRouter<'a, B, P> {
    pub fn new(ctx: &'a SystemContext, power: PowerControl<'a, B, P>) -> Self {
        Self { ctx, power }
    }

    pub async fn run(&mut self, gestures: GestureReceiver<'_>) -> ! {
        info!("Gesture router started");
        loop {
            let event = gestures.receive().await;
            if let RouterAction::Power(_) = self.handle(event).await {
                // Anything queued during the settle delay is the release of
                // the long press, not a new gesture
                let mut discarded = 0;
                while gestures.try_receive().is_ok() {
                    discarded += 1;
                }
                if discarded > 0 {
                    debug!("Discarded {} gesture(s) queued during power transition", discarded);
                }
            }
        }
    }

    pub async fn handle(&mut self, event: GestureEvent) -> RouterAction {
        self.ctx.activity.touch();
        info!(
            "Control button: {:?}; pressed: {}",
            event.gesture, event.pressed
        );

        match event.gesture {
            Gesture::Pressed | Gesture::Clicked => RouterAction::None,
            Gesture::DoubleClicked => {
                if self.ctx.power.is_on() {
                    RouterAction::Recording(self.ctx.recording.toggle())
                } else {
                    debug!("Double-click ignored while off");
                    RouterAction::None
                }
            }
            Gesture::LongPressed => RouterAction::Power(self.power.toggle().await),
        }
    }
}
