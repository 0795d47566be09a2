//! Two-stage inactivity watchdog.
//!
//! Decides when a silent user should be proactively checked on and then
//! gracefully let go. User-originated activity resets the whole sequence,
//! including a goodbye already in flight, right up until the forced
//! disconnect itself; agent activity only counts before the warning has
//! fired, so the agent saying its own goodbye cannot postpone it.

use crate::timer::{TimerKey, TimerRegistry};
use crate::watchdog::WatchdogEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Silence tolerated before the agent is asked to check in.
pub const WARNING_DELAY: Duration = Duration::from_millis(30_000);
/// Further silence, measured from the warning, before the goodbye.
pub const FINAL_DELAY: Duration = Duration::from_millis(15_000);
/// Bounded wait for the agent to actually say the goodbye.
pub const GOODBYE_GRACE: Duration = Duration::from_millis(5_000);

struct Shared {
    timers: TimerRegistry,
    events: mpsc::UnboundedSender<WatchdogEvent>,
    warning_delay: Duration,
    final_delay: Duration,
    goodbye_grace: Duration,
    warning_shown: AtomicBool,
}

/// Watches for user silence on a connected session.
///
/// Cheap to clone; clones share flags and timers so the controller's event
/// pump and the public API see the same watchdog.
#[derive(Clone)]
pub struct InactivityWatchdog {
    shared: Arc<Shared>,
}

impl InactivityWatchdog {
    pub fn new(
        timers: TimerRegistry,
        events: mpsc::UnboundedSender<WatchdogEvent>,
        warning_delay: Duration,
        final_delay: Duration,
        goodbye_grace: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                timers,
                events,
                warning_delay,
                final_delay,
                goodbye_grace,
                warning_shown: AtomicBool::new(false),
            }),
        }
    }

    /// Notes activity from either party: cancels any pending warning, final
    /// timeout, or goodbye grace, and restarts the warning window.
    pub fn reset(&self) {
        let shared = &self.shared;
        shared.timers.cancel_key(TimerKey::InactivityFinal);
        shared.timers.cancel_key(TimerKey::GoodbyeGrace);
        shared.warning_shown.store(false, Ordering::SeqCst);

        let events = shared.events.clone();
        shared.timers.arm(
            TimerKey::InactivityWarning,
            shared.warning_delay,
            move || {
                let _ = events.send(WatchdogEvent::InactivityWarning);
            },
        );
    }

    /// Notes agent speech or content. Outside a check-in/goodbye sequence
    /// this is ordinary activity; once the warning has fired, the agent
    /// reading the check-in or goodbye out loud must not postpone its own
    /// deadline, so the sequence timers are left alone.
    pub fn on_agent_activity(&self) {
        if !self.shared.warning_shown.load(Ordering::SeqCst) {
            self.reset();
        }
    }

    /// Called once the warning has been injected: latches `warning_shown`
    /// and starts the countdown to the goodbye.
    pub fn arm_final(&self) {
        let shared = &self.shared;
        shared.warning_shown.store(true, Ordering::SeqCst);
        debug!("inactivity warning shown, arming final timeout");

        let events = shared.events.clone();
        shared
            .timers
            .arm(TimerKey::InactivityFinal, shared.final_delay, move || {
                let _ = events.send(WatchdogEvent::InactivityFinal);
            });
    }

    /// Called once the goodbye instruction has been injected: bounds how
    /// long the agent gets to speak before the forced disconnect.
    pub fn arm_goodbye_grace(&self) {
        let shared = &self.shared;
        let events = shared.events.clone();
        shared
            .timers
            .arm(TimerKey::GoodbyeGrace, shared.goodbye_grace, move || {
                let _ = events.send(WatchdogEvent::GoodbyeElapsed);
            });
    }

    /// One-shot observability flag: whether the current silence stretch got
    /// as far as the injected warning.
    pub fn warning_shown(&self) -> bool {
        self.shared.warning_shown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn watchdog() -> (InactivityWatchdog, UnboundedReceiver<WatchdogEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dog = InactivityWatchdog::new(
            TimerRegistry::new(),
            tx,
            Duration::from_millis(30_000),
            Duration::from_millis(15_000),
            Duration::from_millis(5_000),
        );
        (dog, rx)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_fires_after_silence() {
        let (dog, mut rx) = watchdog();
        dog.reset();

        settle().await;
        tokio::time::advance(Duration::from_millis(30_000)).await;
        settle().await;
        assert_eq!(rx.try_recv().ok(), Some(WatchdogEvent::InactivityWarning));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_defers_warning() {
        let (dog, mut rx) = watchdog();
        dog.reset();

        settle().await;
        tokio::time::advance(Duration::from_millis(29_999)).await;
        settle().await;
        dog.reset();

        // The original deadline passes without a warning.
        settle().await;
        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        settle().await;
        tokio::time::advance(Duration::from_millis(29_999)).await;
        settle().await;
        assert_eq!(rx.try_recv().ok(), Some(WatchdogEvent::InactivityWarning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_goodbye_in_flight() {
        let (dog, mut rx) = watchdog();
        dog.arm_final();
        dog.arm_goodbye_grace();
        assert!(dog.warning_shown());

        dog.reset();
        assert!(!dog.warning_shown());

        settle().await;
        tokio::time::advance(Duration::from_millis(20_000)).await;
        settle().await;
        // Neither the final timeout nor the grace fired; only the fresh
        // warning is pending (30s away, so nothing yet).
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_activity_resets_only_before_warning() {
        let (dog, mut rx) = watchdog();
        dog.reset();

        // Plain conversation: agent speech pushes the window out.
        settle().await;
        tokio::time::advance(Duration::from_millis(20_000)).await;
        settle().await;
        dog.on_agent_activity();
        settle().await;
        tokio::time::advance(Duration::from_millis(20_000)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        // Once the warning fired, the agent speaking the check-in must not
        // postpone the final timeout.
        settle().await;
        tokio::time::advance(Duration::from_millis(10_000)).await;
        settle().await;
        assert_eq!(rx.try_recv().ok(), Some(WatchdogEvent::InactivityWarning));
        dog.arm_final();
        dog.on_agent_activity();

        settle().await;
        tokio::time::advance(Duration::from_millis(15_000)).await;
        settle().await;
        assert_eq!(rx.try_recv().ok(), Some(WatchdogEvent::InactivityFinal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_elapses_into_forced_disconnect_event() {
        let (dog, mut rx) = watchdog();
        dog.arm_goodbye_grace();

        settle().await;
        tokio::time::advance(Duration::from_millis(5_000)).await;
        settle().await;
        assert_eq!(rx.try_recv().ok(), Some(WatchdogEvent::GoodbyeElapsed));
    }
}
