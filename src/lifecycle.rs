//! Arming state machine for the periodic event source.
//!
//! A timer callback that has already been picked by the host may run
//! concurrently with `stop()`. To make `stop()` deterministic, every callback
//! must first enter the lifecycle, which only succeeds while the source is
//! armed. Disarming flips the state so no new callback can enter, then waits
//! for the ones already inside to leave.
//!
//! # Design
//!
//! A single `AtomicU32` stores both state and the in-flight callback count,
//! so the "is it armed" check and the count increment happen in one CAS.
//!
//! Layout: `[state(8 bits) | in_flight(24 bits)]`

use core::sync::atomic::{AtomicU32, Ordering};

/// Arming states of the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceState {
    /// Firings are delivered.
    Armed = 0,
    /// Disarm in progress, new firings are dropped.
    Disarming = 1,
    /// No firing runs and none will.
    Disarmed = 2,
}

/// Combined state and in-flight count in a single atomic value.
struct StateAndCount(AtomicU32);

impl StateAndCount {
    const STATE_SHIFT: u32 = 24;
    const COUNT_MASK: u32 = (1 << Self::STATE_SHIFT) - 1;
    const STATE_ARMED: u32 = 0;
    const STATE_DISARMING: u32 = 1;
    const STATE_DISARMED: u32 = 2;

    const fn new(state: u32) -> Self {
        Self(AtomicU32::new(state << Self::STATE_SHIFT))
    }

    #[inline]
    fn state(&self) -> SourceState {
        Self::decode(self.0.load(Ordering::Acquire) >> Self::STATE_SHIFT)
    }

    #[inline]
    fn decode(state: u32) -> SourceState {
        match state {
            Self::STATE_ARMED => SourceState::Armed,
            Self::STATE_DISARMING => SourceState::Disarming,
            _ => SourceState::Disarmed,
        }
    }

    #[inline]
    fn count(&self) -> u32 {
        self.0.load(Ordering::Acquire) & Self::COUNT_MASK
    }

    /// Increments the in-flight count if and only if the state is `Armed`.
    fn try_enter(&self) -> Result<(), SourceState> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = current >> Self::STATE_SHIFT;
            if state != Self::STATE_ARMED {
                return Err(Self::decode(state));
            }

            let count = current & Self::COUNT_MASK;
            if count == Self::COUNT_MASK {
                return Err(SourceState::Armed);
            }

            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    #[inline]
    fn leave(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }

    /// Moves `from` to `to`, keeping the count. Fails if the state is not `from`.
    fn transition(&self, from: u32, to: u32) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current >> Self::STATE_SHIFT != from {
                return false;
            }
            let next = (to << Self::STATE_SHIFT) | (current & Self::COUNT_MASK);
            match self.0.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Tracks whether the event source is armed and which callbacks are running.
///
/// # State Transitions
///
/// ```text
/// ┌──────────┐  arm()   ┌───────┐  begin_disarm()  ┌───────────┐  complete_disarm()  ┌──────────┐
/// │ Disarmed │ ───────> │ Armed │ ───────────────> │ Disarming │ ──────────────────> │ Disarmed │
/// └──────────┘          └───────┘                  └───────────┘                     └──────────┘
/// ```
pub struct SourceLifecycle {
    state_count: StateAndCount,
}

impl SourceLifecycle {
    /// Creates a lifecycle in the `Disarmed` state.
    pub const fn new() -> Self {
        Self {
            state_count: StateAndCount::new(StateAndCount::STATE_DISARMED),
        }
    }

    /// Current arming state.
    #[inline]
    pub fn state(&self) -> SourceState {
        self.state_count.state()
    }

    /// Number of callbacks currently running.
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.state_count.count() as usize
    }

    /// `Disarmed` → `Armed`. Returns `false` if the source was not disarmed.
    pub fn arm(&self) -> bool {
        self.state_count
            .transition(StateAndCount::STATE_DISARMED, StateAndCount::STATE_ARMED)
    }

    /// Enters a callback. Returns `false` if the firing must be dropped.
    #[inline]
    pub fn try_begin_fire(&self) -> bool {
        self.state_count.try_enter().is_ok()
    }

    /// Leaves a callback entered with [`try_begin_fire`](Self::try_begin_fire).
    #[inline]
    pub fn end_fire(&self) {
        self.state_count.leave();
    }

    /// `Armed` → `Disarming`. Returns `false` if the source was not armed.
    pub fn begin_disarm(&self) -> bool {
        self.state_count
            .transition(StateAndCount::STATE_ARMED, StateAndCount::STATE_DISARMING)
    }

    /// Waits until no callback is running.
    pub fn wait_idle(&self) {
        while self.state_count.count() != 0 {
            core::hint::spin_loop();
        }
    }

    /// `Disarming` → `Disarmed`. Call after [`wait_idle`](Self::wait_idle).
    pub fn complete_disarm(&self) {
        self.state_count.transition(
            StateAndCount::STATE_DISARMING,
            StateAndCount::STATE_DISARMED,
        );
    }
}

impl Default for SourceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SourceLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SourceLifecycle")
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_initial_state() {
        let lifecycle = SourceLifecycle::new();
        assert_eq!(lifecycle.state(), SourceState::Disarmed);
        assert_eq!(lifecycle.in_flight(), 0);
        assert!(!lifecycle.try_begin_fire());
    }

    #[test]
    fn test_lifecycle_fire_tracking() {
        let lifecycle = SourceLifecycle::new();
        assert!(lifecycle.arm());

        assert!(lifecycle.try_begin_fire());
        assert!(lifecycle.try_begin_fire());
        assert_eq!(lifecycle.in_flight(), 2);

        lifecycle.end_fire();
        lifecycle.end_fire();
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[test]
    fn test_lifecycle_disarm_rejects_new_firings() {
        let lifecycle = SourceLifecycle::new();
        assert!(lifecycle.arm());
        assert!(lifecycle.try_begin_fire());

        assert!(lifecycle.begin_disarm());
        assert_eq!(lifecycle.state(), SourceState::Disarming);
        assert!(!lifecycle.try_begin_fire());
        assert_eq!(lifecycle.in_flight(), 1);

        lifecycle.end_fire();
        lifecycle.wait_idle();
        lifecycle.complete_disarm();
        assert_eq!(lifecycle.state(), SourceState::Disarmed);
    }

    #[test]
    fn test_lifecycle_double_transitions() {
        let lifecycle = SourceLifecycle::new();
        assert!(lifecycle.arm());
        assert!(!lifecycle.arm());

        assert!(lifecycle.begin_disarm());
        assert!(!lifecycle.begin_disarm());
    }

    #[test]
    fn test_lifecycle_rearm_after_disarm() {
        let lifecycle = SourceLifecycle::new();
        assert!(lifecycle.arm());
        assert!(lifecycle.begin_disarm());
        lifecycle.wait_idle();
        lifecycle.complete_disarm();

        assert!(lifecycle.arm());
        assert!(lifecycle.try_begin_fire());
    }
}
