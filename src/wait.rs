//! Wait queue and the calling-context hooks used while a reader is blocked.
//!
//! The queue does not own any task structures. A blocked caller registers
//! itself by bumping the waiter count, then sleeps through its own
//! [`WaitContext`] until the queue epoch moves. Waking is a single atomic
//! increment, so it is safe from a timer callback that must not block.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Hooks into the execution context that is waiting.
///
/// In a kernel this maps onto the current task: `relax` yields to the
/// scheduler and `signal_pending` reports a pending signal. Hosted callers
/// usually yield the thread and check a cancellation flag.
pub trait WaitContext {
    /// Returns `true` if the caller has been asked to abandon the wait.
    fn signal_pending(&self) -> bool;

    /// Gives up the CPU for a while before the condition is checked again.
    fn relax(&self);
}

/// A context that is never interrupted and busy-waits with spin hints.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinWait;

impl WaitContext for SpinWait {
    fn signal_pending(&self) -> bool {
        false
    }

    fn relax(&self) {
        for _ in 0..100 {
            core::hint::spin_loop();
        }
    }
}

/// Set of contexts blocked until some condition turns true.
pub struct WaitQueue {
    /// Number of waiters currently inside `wait_until`.
    waiters: AtomicUsize,
    /// Bumped by every `notify_all`.
    epoch: AtomicU64,
}

impl WaitQueue {
    /// Create a new wait queue.
    pub const fn new() -> Self {
        Self {
            waiters: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    /// Wait until `condition` returns `true` or the context is interrupted.
    ///
    /// The condition is re-evaluated after every wake-up, since a wake is only
    /// a hint. It is also evaluated after the epoch is sampled, so a
    /// notification racing with the check is never lost.
    ///
    /// Returns `true` if the condition was satisfied, `false` if the wait
    /// was interrupted before that happened.
    pub fn wait_until<F>(&self, mut condition: F, ctx: &dyn WaitContext) -> bool
    where
        F: FnMut() -> bool,
    {
        if condition() {
            return true;
        }

        self.waiters.fetch_add(1, Ordering::AcqRel);

        let satisfied = 'wait: loop {
            let seen = self.epoch.load(Ordering::Acquire);

            if condition() {
                break true;
            }

            while self.epoch.load(Ordering::Acquire) == seen {
                if ctx.signal_pending() {
                    break 'wait false;
                }
                ctx.relax();
            }
        };

        self.waiters.fetch_sub(1, Ordering::AcqRel);
        satisfied
    }

    /// Wake all waiters. Never blocks.
    ///
    /// Returns the number of waiters that were registered at the time.
    pub fn notify_all(&self) -> usize {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.waiters.load(Ordering::Acquire)
    }

    /// Number of contexts currently waiting.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaitQueue")
            .field("waiters", &self.waiters())
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct CountdownCtx {
        remaining: Cell<usize>,
    }

    impl WaitContext for CountdownCtx {
        fn signal_pending(&self) -> bool {
            self.remaining.get() == 0
        }

        fn relax(&self) {
            self.remaining.set(self.remaining.get() - 1);
        }
    }

    #[test]
    fn test_wait_condition_already_true() {
        let queue = WaitQueue::new();
        assert!(queue.wait_until(|| true, &SpinWait));
        assert_eq!(queue.waiters(), 0);
    }

    #[test]
    fn test_wait_interrupted() {
        let queue = WaitQueue::new();
        let ctx = CountdownCtx {
            remaining: Cell::new(3),
        };

        assert!(!queue.wait_until(|| false, &ctx));
        assert_eq!(queue.waiters(), 0);
    }

    #[test]
    fn test_notify_without_waiters() {
        let queue = WaitQueue::new();
        assert_eq!(queue.notify_all(), 0);
    }

    #[test]
    fn test_condition_rechecked_each_round() {
        let queue = WaitQueue::new();
        let calls = Cell::new(0);

        // The second evaluation (after the epoch sample) succeeds.
        let ok = queue.wait_until(
            || {
                calls.set(calls.get() + 1);
                calls.get() >= 2
            },
            &SpinWait,
        );

        assert!(ok);
        assert_eq!(calls.get(), 2);
    }
}
