//! Thinking watchdog: masks perceived latency after a user utterance.
//!
//! If the agent has not shown any sign of responding within the delay, one
//! nudge is injected. Never more than one per utterance, and the first
//! agent-activity signal cancels the pending timer outright.

use crate::timer::{TimerKey, TimerRegistry};
use crate::watchdog::WatchdogEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long the agent may stay silent after an utterance before a nudge.
pub const THINKING_DELAY: Duration = Duration::from_millis(1_500);

struct Shared {
    timers: TimerRegistry,
    events: mpsc::UnboundedSender<WatchdogEvent>,
    delay: Duration,
    responded: AtomicBool,
    nudge_sent: AtomicBool,
}

/// Per-utterance response timer.
#[derive(Clone)]
pub struct ThinkingWatchdog {
    shared: Arc<Shared>,
}

impl ThinkingWatchdog {
    pub fn new(
        timers: TimerRegistry,
        events: mpsc::UnboundedSender<WatchdogEvent>,
        delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                timers,
                events,
                delay,
                responded: AtomicBool::new(true),
                nudge_sent: AtomicBool::new(false),
            }),
        }
    }

    /// The user finished an utterance: clear both flags and start the
    /// response timer. Re-arming for a new utterance replaces any timer
    /// still pending from the previous one.
    pub fn on_utterance_complete(&self) {
        let shared = &self.shared;
        shared.responded.store(false, Ordering::SeqCst);
        shared.nudge_sent.store(false, Ordering::SeqCst);

        let events = shared.events.clone();
        shared.timers.arm(TimerKey::Thinking, shared.delay, move || {
            let _ = events.send(WatchdogEvent::ThinkingNudge);
        });
    }

    /// First sign of agent activity cancels the pending timer. Idempotent;
    /// later signals within the same utterance are no-ops.
    pub fn on_agent_activity(&self) {
        if !self.shared.responded.swap(true, Ordering::SeqCst) {
            self.shared.timers.cancel_key(TimerKey::Thinking);
        }
    }

    /// Consulted when the timer event arrives: whether a nudge should
    /// actually be injected. Latches `nudge_sent` so a second consult for
    /// the same utterance returns false.
    pub fn take_nudge(&self) -> bool {
        let shared = &self.shared;
        if shared.responded.load(Ordering::SeqCst) {
            return false;
        }
        !shared.nudge_sent.swap(true, Ordering::SeqCst)
    }
}
