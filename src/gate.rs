//! Single-slot readiness flag shared by the event source and all readers.
//!
//! The flag holds exactly one bit: an event is pending or it is not. Setting
//! it while already set is a plain overwrite, so a burst of firings with no
//! reader in between collapses into one pending event.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::wait::{WaitContext, WaitQueue};

const IDLE: u32 = 0;
const PENDING: u32 = 1;

/// Outcome of a consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consume {
    /// The caller moved the flag from pending to idle and owns this event.
    Consumed,
    /// Non-blocking attempt found nothing pending.
    WouldBlock,
    /// A blocking wait was abandoned before an event could be taken.
    Interrupted,
}

/// Readiness flag plus the set of readers waiting on it.
pub struct ReadinessGate {
    flag: AtomicU32,
    waiters: WaitQueue,
}

impl ReadinessGate {
    /// Creates a gate. `pending` selects the initial flag value.
    pub const fn new(pending: bool) -> Self {
        Self {
            flag: AtomicU32::new(if pending { PENDING } else { IDLE }),
            waiters: WaitQueue::new(),
        }
    }

    /// Marks an event as pending and wakes every waiter.
    ///
    /// Safe from contexts that must not block. Returns `true` if an event
    /// was already pending, i.e. this one coalesced into it.
    pub fn signal(&self) -> bool {
        let prev = self.flag.swap(PENDING, Ordering::AcqRel);
        self.waiters.notify_all();
        prev == PENDING
    }

    /// Takes the pending event if there is one, without blocking.
    #[inline]
    pub fn try_consume(&self) -> bool {
        self.flag
            .compare_exchange(PENDING, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Takes the pending event, waiting for one if necessary.
    ///
    /// Returns [`Consume::Consumed`] once this caller wins the race to clear
    /// the flag, or [`Consume::Interrupted`] if `ctx` reports a pending
    /// signal first. An interrupted call leaves the flag untouched.
    pub fn consume_blocking(&self, ctx: &dyn WaitContext) -> Consume {
        if self.waiters.wait_until(|| self.try_consume(), ctx) {
            Consume::Consumed
        } else {
            Consume::Interrupted
        }
    }

    /// Non-blocking or blocking consume, selected by `nonblock`.
    pub fn consume(&self, nonblock: bool, ctx: &dyn WaitContext) -> Consume {
        if nonblock {
            if self.try_consume() {
                Consume::Consumed
            } else {
                Consume::WouldBlock
            }
        } else {
            self.consume_blocking(ctx)
        }
    }

    /// Whether an event is pending right now.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.flag.load(Ordering::Acquire) == PENDING
    }

    /// Number of readers blocked in [`consume_blocking`](Self::consume_blocking).
    pub fn waiter_count(&self) -> usize {
        self.waiters.waiters()
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl core::fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("pending", &self.is_pending())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::SpinWait;

    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    struct Cancellable {
        cancel: AtomicBool,
    }

    impl WaitContext for Cancellable {
        fn signal_pending(&self) -> bool {
            self.cancel.load(Ordering::Acquire)
        }

        fn relax(&self) {
            thread::yield_now();
        }
    }

    #[test]
    fn test_gate_starts_pre_armed() {
        let gate = ReadinessGate::default();
        assert!(gate.is_pending());
        assert!(gate.try_consume());
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_signals_coalesce() {
        let gate = ReadinessGate::new(false);

        assert!(!gate.signal());
        assert!(gate.signal());
        assert!(gate.signal());

        assert!(gate.try_consume());
        assert!(!gate.try_consume());
    }

    #[test]
    fn test_nonblocking_leaves_flag_alone() {
        let gate = ReadinessGate::new(false);
        assert_eq!(gate.consume(true, &SpinWait), Consume::WouldBlock);
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_blocking_returns_pending_event_immediately() {
        let gate = ReadinessGate::new(true);
        assert_eq!(gate.consume_blocking(&SpinWait), Consume::Consumed);
        assert_eq!(gate.waiter_count(), 0);
    }

    #[test]
    fn test_blocking_waits_for_signal() {
        let gate = Arc::new(ReadinessGate::new(false));

        let reader = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.consume_blocking(&SpinWait))
        };

        while gate.waiter_count() == 0 {
            thread::yield_now();
        }
        gate.signal();

        assert_eq!(reader.join().unwrap(), Consume::Consumed);
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_blocking_interrupted_without_consuming() {
        let gate = Arc::new(ReadinessGate::new(false));
        let ctx = Arc::new(Cancellable {
            cancel: AtomicBool::new(false),
        });

        let reader = {
            let gate = Arc::clone(&gate);
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || gate.consume_blocking(&*ctx))
        };

        while gate.waiter_count() == 0 {
            thread::yield_now();
        }
        ctx.cancel.store(true, Ordering::Release);

        assert_eq!(reader.join().unwrap(), Consume::Interrupted);
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_one_event_one_winner() {
        let gate = Arc::new(ReadinessGate::new(false));
        let ctxs: std::vec::Vec<_> = (0..3)
            .map(|_| {
                Arc::new(Cancellable {
                    cancel: AtomicBool::new(false),
                })
            })
            .collect();

        let readers: std::vec::Vec<_> = ctxs
            .iter()
            .map(|ctx| {
                let gate = Arc::clone(&gate);
                let ctx = Arc::clone(ctx);
                thread::spawn(move || gate.consume_blocking(&*ctx))
            })
            .collect();

        while gate.waiter_count() < 3 {
            thread::yield_now();
        }
        gate.signal();

        // Let the winner finish, then release the others.
        thread::sleep(Duration::from_millis(50));
        for ctx in &ctxs {
            ctx.cancel.store(true, Ordering::Release);
        }

        let consumed = readers
            .into_iter()
            .map(|r| r.join().unwrap())
            .filter(|c| *c == Consume::Consumed)
            .count();
        assert_eq!(consumed, 1);
        assert!(!gate.is_pending());
    }
}
