//! Timer facility used to drive the event source.
//!
//! [`TimerHost`] is what the event source needs from its environment.
//! [`TimerQueue`] is a host implementation on top of `timer_list`: the owner
//! of the queue advances time by calling [`TimerQueue::check_events`], for
//! example from a periodic tick handler.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;
use timer_list::{TimeValue, TimerEvent, TimerList};

/// Callback run when a timer expires. Receives the current time.
pub type TimerCallback = Box<dyn FnOnce(TimeValue) + Send + 'static>;

/// Handle returned by [`TimerHost::arm`], used to cancel the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerToken(pub usize);

/// One-shot timers supplied by the host.
///
/// Callbacks may run in a context where blocking is forbidden and may run
/// concurrently with any other code.
pub trait TimerHost: Send + Sync {
    /// Current time.
    fn now(&self) -> TimeValue;

    /// Runs `callback` once at or after `deadline`.
    fn arm(&self, deadline: TimeValue, callback: TimerCallback) -> TimerToken;

    /// Drops the timer if it has not been picked for execution yet.
    fn cancel(&self, token: TimerToken);
}

struct QueuedTimer {
    token: TimerToken,
    callback: TimerCallback,
}

impl TimerEvent for QueuedTimer {
    fn callback(self, now: TimeValue) {
        (self.callback)(now)
    }
}

/// A deadline-ordered timer list with a host-driven clock.
pub struct TimerQueue {
    timer_list: Mutex<TimerList<QueuedTimer>>,
    next_token: AtomicUsize,
    /// Last time passed to `check_events`, in nanoseconds.
    now_ns: AtomicU64,
}

impl TimerQueue {
    /// Constructs a new instance of `TimerQueue` with an empty timer list.
    pub fn new() -> Self {
        Self {
            timer_list: Mutex::new(TimerList::new()),
            next_token: AtomicUsize::new(1),
            now_ns: AtomicU64::new(0),
        }
    }

    /// Advances the clock to `now` and runs every timer that has expired.
    ///
    /// Callbacks run without the list lock held, so they are free to arm
    /// new timers.
    ///
    /// # Returns
    /// The number of callbacks that ran.
    pub fn check_events(&self, now: TimeValue) -> usize {
        let now_ns = u64::try_from(now.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.fetch_max(now_ns, Ordering::AcqRel);

        let mut fired = 0;
        loop {
            let expired = self.timer_list.lock().expire_one(now);
            match expired {
                Some((deadline, event)) => {
                    trace!("timer {:?} expired (deadline {:?})", event.token, deadline);
                    event.callback(now);
                    fired += 1;
                }
                None => break,
            }
        }
        fired
    }

    /// Deadline of the earliest armed timer, if any.
    pub fn next_deadline(&self) -> Option<TimeValue> {
        self.timer_list.lock().next_deadline()
    }

    /// Whether no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.timer_list.lock().is_empty()
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHost for TimerQueue {
    fn now(&self) -> TimeValue {
        TimeValue::from_nanos(self.now_ns.load(Ordering::Acquire))
    }

    fn arm(&self, deadline: TimeValue, callback: TimerCallback) -> TimerToken {
        let token = TimerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.timer_list
            .lock()
            .set(deadline, QueuedTimer { token, callback });
        token
    }

    fn cancel(&self, token: TimerToken) {
        self.timer_list.lock().cancel(|event| event.token == token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::time::Duration;

    #[test]
    fn test_timer_fires_at_deadline() {
        let timers = TimerQueue::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        timers.arm(
            Duration::from_secs(5),
            Box::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(timers.check_events(Duration::from_secs(4)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert_eq!(timers.check_events(Duration::from_secs(5)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(timers.is_empty());
        assert_eq!(timers.now(), Duration::from_secs(5));
    }

    #[test]
    fn test_timer_cancel() {
        let timers = TimerQueue::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let token = timers.arm(
            Duration::from_secs(1),
            Box::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        timers.cancel(token);

        assert_eq!(timers.check_events(Duration::from_secs(10)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_can_rearm() {
        let timers = Arc::new(TimerQueue::new());

        let t = Arc::clone(&timers);
        timers.arm(
            Duration::from_secs(1),
            Box::new(move |now| {
                t.arm(now + Duration::from_secs(1), Box::new(|_| {}));
            }),
        );

        assert_eq!(timers.check_events(Duration::from_secs(1)), 1);
        assert_eq!(timers.next_deadline(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        let timers = TimerQueue::new();
        timers.check_events(Duration::from_secs(3));
        timers.check_events(Duration::from_secs(1));
        assert_eq!(timers.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_clock_saturates_past_u64_nanos() {
        let timers = TimerQueue::new();
        timers.check_events(Duration::MAX);
        assert_eq!(timers.now(), Duration::from_nanos(u64::MAX));

        timers.check_events(Duration::from_secs(1));
        assert_eq!(timers.now(), Duration::from_nanos(u64::MAX));
    }
}
