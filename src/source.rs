//! Periodic event source.
//!
//! Each firing sets the readiness flag, re-arms the timer for `now + period`,
//! wakes every blocked reader and tells the registered client, if any.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::time::Duration;

use axerrno::{ax_err, AxResult};
use spin::Mutex;
use timer_list::TimeValue;

use crate::gate::ReadinessGate;
use crate::lifecycle::{SourceLifecycle, SourceState};
use crate::notify::{ClientNotifier, ClientRegistration};
use crate::stats::DeviceStats;
use crate::timer::{TimerHost, TimerToken};

/// State shared between the source handle and its timer callbacks.
struct Shared {
    period: Duration,
    gate: Arc<ReadinessGate>,
    client: Arc<ClientRegistration>,
    notifier: Arc<dyn ClientNotifier>,
    stats: Arc<DeviceStats>,
    timers: Arc<dyn TimerHost>,
    lifecycle: SourceLifecycle,
    /// Token of the most recently armed timer.
    token: Mutex<Option<TimerToken>>,
}

impl Shared {
    fn schedule(self: &Arc<Self>, now: TimeValue) {
        let this = Arc::clone(self);
        let token = self
            .timers
            .arm(now + self.period, Box::new(move |now| this.on_fire(now)));
        *self.token.lock() = Some(token);
    }

    fn on_fire(self: &Arc<Self>, now: TimeValue) {
        if !self.lifecycle.try_begin_fire() {
            trace!("event source disarmed, dropping firing at {:?}", now);
            return;
        }

        trace!("event source fired at {:?}", now);
        self.schedule(now);

        let coalesced = self.gate.signal();
        self.stats.record_fire(coalesced);

        if let Some(client) = self.client.get() {
            if let Err(err) = self.notifier.notify(client) {
                warn!("failed to notify client {:?}: {:?}", client, err);
            }
        }

        self.lifecycle.end_fire();
    }
}

/// Periodic timer feeding a [`ReadinessGate`].
pub struct EventSource {
    shared: Arc<Shared>,
}

impl EventSource {
    /// Creates a disarmed source that fires every `period`.
    pub fn new(
        period: Duration,
        gate: Arc<ReadinessGate>,
        client: Arc<ClientRegistration>,
        notifier: Arc<dyn ClientNotifier>,
        stats: Arc<DeviceStats>,
        timers: Arc<dyn TimerHost>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                period,
                gate,
                client,
                notifier,
                stats,
                timers,
                lifecycle: SourceLifecycle::new(),
                token: Mutex::new(None),
            }),
        }
    }

    /// Arms the timer. The gate is set right away so the first read does not
    /// wait a whole period.
    ///
    /// # Errors
    ///
    /// `BadState` if the source is already armed, `InvalidInput` for a zero
    /// period.
    pub fn start(&self) -> AxResult {
        if self.shared.period.is_zero() {
            return ax_err!(InvalidInput, "event source period must be non-zero");
        }
        if !self.shared.lifecycle.arm() {
            return ax_err!(BadState, "event source already armed");
        }

        self.shared.gate.signal();
        self.shared.schedule(self.shared.timers.now());
        debug!("event source armed, period {:?}", self.shared.period);
        Ok(())
    }

    /// Disarms the timer.
    ///
    /// After this returns no firing will run: callbacks already in progress
    /// are waited for, and the last armed timer is cancelled. Calling it on a
    /// source that is not armed does nothing.
    pub fn stop(&self) {
        if !self.shared.lifecycle.begin_disarm() {
            return;
        }

        self.shared.lifecycle.wait_idle();
        if let Some(token) = self.shared.token.lock().take() {
            self.shared.timers.cancel(token);
        }
        self.shared.lifecycle.complete_disarm();
        debug!("event source disarmed");
    }

    /// Whether firings are currently delivered.
    pub fn is_armed(&self) -> bool {
        self.shared.lifecycle.state() == SourceState::Armed
    }

    /// The firing period.
    pub fn period(&self) -> Duration {
        self.shared.period
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl core::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventSource")
            .field("period", &self.shared.period)
            .field("lifecycle", &self.shared.lifecycle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ClientId, NullNotifier, SignalFlags};
    use crate::timer::TimerQueue;

    const PERIOD: Duration = Duration::from_secs(5);

    struct Fixture {
        gate: Arc<ReadinessGate>,
        client: Arc<ClientRegistration>,
        stats: Arc<DeviceStats>,
        timers: Arc<TimerQueue>,
    }

    fn fixture(notifier: Arc<dyn ClientNotifier>) -> (Fixture, EventSource) {
        let fx = Fixture {
            gate: Arc::new(ReadinessGate::new(false)),
            client: Arc::new(ClientRegistration::new()),
            stats: Arc::new(DeviceStats::new()),
            timers: Arc::new(TimerQueue::new()),
        };
        let source = EventSource::new(
            PERIOD,
            Arc::clone(&fx.gate),
            Arc::clone(&fx.client),
            notifier,
            Arc::clone(&fx.stats),
            fx.timers.clone(),
        );
        (fx, source)
    }

    #[test]
    fn test_start_pre_arms_gate() {
        let (fx, source) = fixture(Arc::new(NullNotifier));
        source.start().unwrap();

        assert!(source.is_armed());
        assert!(fx.gate.is_pending());
        assert_eq!(fx.timers.next_deadline(), Some(PERIOD));
    }

    #[test]
    fn test_start_twice_fails() {
        let (_fx, source) = fixture(Arc::new(NullNotifier));
        source.start().unwrap();
        assert!(source.start().is_err());
    }

    #[test]
    fn test_zero_period_rejected() {
        let source = EventSource::new(
            Duration::ZERO,
            Arc::new(ReadinessGate::new(false)),
            Arc::new(ClientRegistration::new()),
            Arc::new(NullNotifier),
            Arc::new(DeviceStats::new()),
            Arc::new(TimerQueue::new()),
        );
        assert!(source.start().is_err());
        assert!(!source.is_armed());
    }

    #[test]
    fn test_fire_reschedules_and_sets_flag() {
        let (fx, source) = fixture(Arc::new(NullNotifier));
        source.start().unwrap();
        assert!(fx.gate.try_consume());

        assert_eq!(fx.timers.check_events(PERIOD), 1);
        assert!(fx.gate.is_pending());
        assert_eq!(fx.timers.next_deadline(), Some(PERIOD * 2));
        assert_eq!(fx.stats.fired(), 1);
    }

    #[test]
    fn test_unconsumed_firings_coalesce() {
        let (fx, source) = fixture(Arc::new(NullNotifier));
        source.start().unwrap();

        for n in 1..=4 {
            fx.timers.check_events(PERIOD * n);
        }

        assert_eq!(fx.stats.fired(), 4);
        assert_eq!(fx.stats.coalesced(), 4);
        assert!(fx.gate.try_consume());
        assert!(!fx.gate.try_consume());
    }

    #[test]
    fn test_stop_prevents_further_firings() {
        let (fx, source) = fixture(Arc::new(NullNotifier));
        source.start().unwrap();
        assert!(fx.gate.try_consume());

        source.stop();
        assert!(!source.is_armed());
        assert!(fx.timers.is_empty());

        assert_eq!(fx.timers.check_events(PERIOD * 10), 0);
        assert!(!fx.gate.is_pending());
        assert_eq!(fx.stats.fired(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (_fx, source) = fixture(Arc::new(NullNotifier));
        source.stop();
        source.start().unwrap();
        source.stop();
        source.stop();
        assert!(!source.is_armed());
    }

    #[test]
    fn test_registered_client_notified_per_firing() {
        let signals = Arc::new(SignalFlags::new());
        let (fx, source) = fixture(signals.clone());
        let client = ClientId(1234);
        signals.register(client);

        source.start().unwrap();
        fx.timers.check_events(PERIOD);
        assert_eq!(signals.take(client), 0);

        fx.client.register(client);
        fx.timers.check_events(PERIOD * 2);
        fx.timers.check_events(PERIOD * 3);
        assert_eq!(signals.take(client), 2);
    }

    #[test]
    fn test_stop_while_firing_on_another_thread() {
        use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
        use std::thread;

        for _ in 0..20 {
            let fx = Fixture {
                gate: Arc::new(ReadinessGate::new(false)),
                client: Arc::new(ClientRegistration::new()),
                stats: Arc::new(DeviceStats::new()),
                timers: Arc::new(TimerQueue::new()),
            };
            let source = EventSource::new(
                Duration::from_nanos(1),
                Arc::clone(&fx.gate),
                Arc::clone(&fx.client),
                Arc::new(NullNotifier),
                Arc::clone(&fx.stats),
                fx.timers.clone(),
            );
            source.start().unwrap();

            let done = AtomicBool::new(false);
            let ticks = AtomicU64::new(0);
            thread::scope(|s| {
                s.spawn(|| {
                    let mut now = 1;
                    while !done.load(Ordering::Acquire) {
                        fx.timers.check_events(Duration::from_nanos(now));
                        now += 1;
                        ticks.fetch_add(1, Ordering::Release);
                    }
                });

                while fx.stats.fired() < 50 {
                    thread::yield_now();
                }
                source.stop();
                let fired = fx.stats.fired();

                // Let the driver keep ticking well past the stop.
                let seen = ticks.load(Ordering::Acquire);
                while ticks.load(Ordering::Acquire) < seen + 500 {
                    thread::yield_now();
                }
                done.store(true, Ordering::Release);

                assert_eq!(fx.stats.fired(), fired);
            });

            assert!(!source.is_armed());
            assert!(fx.timers.is_empty());
        }
    }
}
