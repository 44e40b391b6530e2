#![no_std]

//! # Readiness character device
//!
//! A character device whose readers learn that "something happened": a
//! periodic event source sets a readiness flag, and each read hands out the
//! pending event together with a fixed four-byte payload. Pending events
//! coalesce, so a reader that falls behind sees one event, not a backlog.
//!
//! It is designed for `no_std` environments and uses the `alloc` crate.
//!
//! ## Architecture
//!
//! ### Lifecycle
//! - [`CharDevice`]: acquires the device number region, class, node and
//!   dispatch binding in order, unwinding on failure, and tears them down on
//!   shutdown
//! - [`ResourceLedger`]: what has been acquired so far
//! - [`SourceLifecycle`]: arm/disarm state of the event source, with an
//!   in-flight count so disarming waits for running firings
//!
//! ### Readiness
//! - [`ReadinessGate`]: the pending flag and the wait queue of blocked readers
//! - [`EventSource`]: periodic timer feeding the gate
//! - [`EventDevOps`]: the dispatch table (`read`, `write`, `ioctl`, ...)
//!
//! ### Host services
//! - [`DeviceHost`], [`TimerHost`], [`ClientNotifier`]: what the device needs
//!   from its environment
//! - [`DevRegistry`], [`TimerQueue`], [`SignalFlags`]: in-memory
//!   implementations of those
//!
//! ## Example
//!
//! ```rust,ignore
//! use alloc::sync::Arc;
//! use axchardev::*;
//!
//! let registry = Arc::new(DevRegistry::new());
//! let timers = Arc::new(TimerQueue::new());
//! let host = HostServices::new(registry.clone(), timers.clone(), Arc::new(NullNotifier));
//!
//! let mut dev = CharDevice::start(CharDevConfig::default(), host)?;
//!
//! let file = registry.open("/dev/userspace", OpenFlags::O_RDONLY)?;
//! let mut buf = [0u8; 4];
//! file.read(&mut buf, &SpinWait)?; // pre-armed: returns "test" at once
//!
//! timers.check_events(CharDevConfig::DEFAULT_PERIOD);
//! file.read(&mut buf, &SpinWait)?; // next event
//!
//! drop(file);
//! dev.shutdown();
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

#[cfg(test)]
extern crate std;

mod config;
mod device;
mod gate;
mod host;
mod lifecycle;
mod notify;
mod ops;
mod registry;
mod setup;
mod source;
mod stats;
mod timer;
mod wait;

pub use config::CharDevConfig;
pub use device::{CharDevice, DeviceStatus, EventDevOps};
pub use gate::{Consume, ReadinessGate};
pub use host::{ClassId, DevNum, DeviceHost, HostServices, NodeId};
pub use lifecycle::{SourceLifecycle, SourceState};
pub use notify::{ClientId, ClientNotifier, ClientRegistration, NullNotifier, SignalFlags};
pub use ops::{CharDevOps, FileCtx, OpenFlags, REGISTER_CLIENT};
pub use registry::{DYNAMIC_MAJOR_MAX, DYNAMIC_MAJOR_MIN, DevRegistry, OpenFile};
pub use setup::{Acquired, ResourceLedger, SetupError, SetupStep};
pub use source::EventSource;
pub use stats::DeviceStats;
pub use timer::{TimerCallback, TimerHost, TimerQueue, TimerToken};
pub use wait::{SpinWait, WaitContext, WaitQueue};

pub use timer_list::TimeValue;
