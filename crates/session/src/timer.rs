//! Central registry for the orchestrator's named one-shot timers.
//!
//! Every delayed action in the session (inactivity warning, goodbye grace,
//! thinking nudge) is armed through this registry so cancellation discipline
//! lives in one place. Cancellation is enforced two ways: the timer task is
//! aborted, and an epoch counter is checked after the sleep. The epoch check
//! matters because a task that already woke cannot be pulled back out of the
//! ready queue; it must observe that it is stale and do nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Identifies one timer slot. At most one timer per key is ever pending;
/// re-arming a key replaces the previous timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    InactivityWarning,
    InactivityFinal,
    GoodbyeGrace,
    Thinking,
}

/// Handle to a single armed timer, usable with [`TimerRegistry::cancel`].
#[derive(Debug)]
pub struct TimerHandle {
    key: TimerKey,
    cancelled: Arc<AtomicBool>,
}

struct ActiveTimer {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    epoch: AtomicU64,
    active: Mutex<HashMap<TimerKey, ActiveTimer>>,
}

/// Creates and cancels named delayed callbacks.
///
/// Cheap to clone; all clones share the same timer set and epoch, so a
/// `cancel_all` through any clone kills timers armed through every clone.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    inner: Arc<Inner>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `key` to run `f` after `delay`, replacing any pending timer for
    /// the same key.
    ///
    /// The callback runs on a spawned task and must not block; orchestrator
    /// callbacks only push an event into the controller mailbox.
    pub fn arm<F>(&self, key: TimerKey, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = self.inner.clone();
        let epoch = inner.epoch.load(Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if flag.load(Ordering::SeqCst) || inner.epoch.load(Ordering::SeqCst) != epoch {
                trace!(?key, "stale timer woke after cancellation");
                return;
            }
            lock_active(&inner).remove(&key);
            f();
        });

        let mut active = lock_active(&self.inner);
        if let Some(previous) = active.insert(
            key,
            ActiveTimer {
                cancelled: cancelled.clone(),
                task,
            },
        ) {
            previous.cancelled.store(true, Ordering::SeqCst);
            previous.task.abort();
        }

        TimerHandle { key, cancelled }
    }

    /// Cancels the timer behind `handle` if it is still the pending timer
    /// for its key. A handle whose key was since re-armed cancels nothing.
    pub fn cancel(&self, handle: &TimerHandle) {
        handle.cancelled.store(true, Ordering::SeqCst);
        let mut active = lock_active(&self.inner);
        let matches = active
            .get(&handle.key)
            .is_some_and(|t| Arc::ptr_eq(&t.cancelled, &handle.cancelled));
        if matches {
            if let Some(timer) = active.remove(&handle.key) {
                timer.task.abort();
            }
        }
    }

    /// Cancels whatever timer is pending for `key`, if any.
    pub fn cancel_key(&self, key: TimerKey) {
        let mut active = lock_active(&self.inner);
        if let Some(timer) = active.remove(&key) {
            timer.cancelled.store(true, Ordering::SeqCst);
            timer.task.abort();
        }
    }

    /// Cancels every pending timer and bumps the epoch.
    ///
    /// No callback armed before this call will run afterwards, including one
    /// whose task already woke and is waiting to be scheduled.
    pub fn cancel_all(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let mut active = lock_active(&self.inner);
        for (_, timer) in active.drain() {
            timer.cancelled.store(true, Ordering::SeqCst);
            timer.task.abort();
        }
    }

    /// Whether a timer is currently pending for `key`.
    pub fn is_armed(&self, key: TimerKey) -> bool {
        lock_active(&self.inner).contains_key(&key)
    }
}

// A poisoned lock only means a timer task panicked mid-update; the map is
// still usable, so recover the guard instead of propagating the panic.
fn lock_active(inner: &Inner) -> MutexGuard<'_, HashMap<TimerKey, ActiveTimer>> {
    inner.active.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counter() -> (Arc<AtomicU32>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let hit = count.clone();
        (count, move || {
            hit.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let registry = TimerRegistry::new();
        let (count, f) = counter();
        registry.arm(TimerKey::Thinking, Duration::from_millis(100), f);

        settle().await;
        tokio::time::advance(Duration::from_millis(99)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        settle().await;
        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!registry.is_armed(TimerKey::Thinking));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending_timer() {
        let registry = TimerRegistry::new();
        let (first, f1) = counter();
        let (second, f2) = counter();

        registry.arm(TimerKey::InactivityWarning, Duration::from_millis(50), f1);
        registry.arm(TimerKey::InactivityWarning, Duration::from_millis(50), f2);

        settle().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_by_handle() {
        let registry = TimerRegistry::new();
        let (count, f) = counter();
        let handle = registry.arm(TimerKey::GoodbyeGrace, Duration::from_millis(50), f);
        registry.cancel(&handle);

        settle().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!registry.is_armed(TimerKey::GoodbyeGrace));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_handle_does_not_cancel_replacement() {
        let registry = TimerRegistry::new();
        let (first, f1) = counter();
        let (second, f2) = counter();

        let stale = registry.arm(TimerKey::Thinking, Duration::from_millis(50), f1);
        registry.arm(TimerKey::Thinking, Duration::from_millis(50), f2);
        registry.cancel(&stale);

        settle().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_beats_already_due_timer() {
        let registry = TimerRegistry::new();
        let (count, f) = counter();
        // Already due when armed: the callback is queued for execution the
        // moment its task is first polled.
        registry.arm(TimerKey::InactivityFinal, Duration::ZERO, f);
        registry.cancel_all();

        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callback_armed_before_cancel_all_runs_after_it() {
        let registry = TimerRegistry::new();
        let (count, f) = counter();
        registry.arm(TimerKey::InactivityFinal, Duration::from_millis(10), f);
        registry.cancel_all();

        settle().await;
        tokio::time::advance(Duration::from_millis(50)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_works_again_after_cancel_all() {
        let registry = TimerRegistry::new();
        let (count, f) = counter();
        registry.cancel_all();
        registry.arm(TimerKey::Thinking, Duration::from_millis(10), f);

        settle().await;
        tokio::time::advance(Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
