//! Liveness watchdogs for a connected session.
//!
//! Both watchdogs arm timers through the shared [`TimerRegistry`](crate::timer::TimerRegistry)
//! and never touch session state themselves: every firing is delivered to
//! the controller mailbox as a [`WatchdogEvent`], and the controller decides
//! what to inject or tear down.

pub mod inactivity;
pub mod thinking;

pub use inactivity::InactivityWatchdog;
pub use thinking::ThinkingWatchdog;

/// What a watchdog timer firing means to the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// The user has been silent long enough to warrant a check-in.
    InactivityWarning,
    /// The check-in went unanswered; time to say goodbye.
    InactivityFinal,
    /// The goodbye grace window elapsed; force the disconnect.
    GoodbyeElapsed,
    /// The agent has not started responding to the last utterance.
    ThinkingNudge,
}
