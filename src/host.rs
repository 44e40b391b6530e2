//! What the device needs from its host environment.
//!
//! The host owns device numbers, classes, nodes and the dispatch table. It
//! also supplies timers and the transport for client notifications. The
//! lifecycle manager only ever talks to these traits.

use alloc::sync::Arc;

use axerrno::{ax_err, AxResult};

use crate::notify::ClientNotifier;
use crate::ops::CharDevOps;
use crate::timer::TimerHost;

/// Device number: major and minor packed the Linux way.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevNum(u32);

impl DevNum {
    const MINOR_BITS: u32 = 20;
    const MINOR_MASK: u32 = (1 << Self::MINOR_BITS) - 1;

    /// Largest major that fits the encoding.
    pub const MAX_MAJOR: u32 = u32::MAX >> Self::MINOR_BITS;
    /// Largest minor that fits the encoding.
    pub const MAX_MINOR: u32 = Self::MINOR_MASK;

    /// Builds a device number from its parts.
    ///
    /// Out-of-range parts are truncated; use [`try_new`](Self::try_new) for
    /// values that come from outside.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self((major << Self::MINOR_BITS) | (minor & Self::MINOR_MASK))
    }

    /// Builds a device number, rejecting parts that do not fit.
    pub fn try_new(major: u32, minor: u32) -> AxResult<Self> {
        if major > Self::MAX_MAJOR || minor > Self::MAX_MINOR {
            return ax_err!(InvalidInput, "device number out of range");
        }
        Ok(Self::new(major, minor))
    }

    /// Whether `count` minors starting at `first_minor` fit under one major.
    pub fn minor_range_fits(first_minor: u32, count: u32) -> bool {
        let end = u64::from(first_minor) + u64::from(count);
        count != 0 && end <= u64::from(Self::MAX_MINOR) + 1
    }

    /// Major number.
    #[inline]
    pub const fn major(self) -> u32 {
        self.0 >> Self::MINOR_BITS
    }

    /// Minor number.
    #[inline]
    pub const fn minor(self) -> u32 {
        self.0 & Self::MINOR_MASK
    }

    /// Raw encoded value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl core::fmt::Debug for DevNum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "DevNum({}:{})", self.major(), self.minor())
    }
}

/// Handle of a device class created by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(pub usize);

/// Handle of a device node created by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Device bookkeeping provided by the host.
///
/// Acquiring operations can fail. Releasing operations cannot, and are only
/// called for resources the caller actually holds.
pub trait DeviceHost: Send + Sync {
    /// Reserves `count` minors starting at `first`.
    fn register_region(&self, first: DevNum, count: u32, name: &str) -> AxResult;

    /// Reserves `count` minors starting at `first_minor` under a free major.
    fn alloc_region(&self, first_minor: u32, count: u32, name: &str) -> AxResult<DevNum>;

    /// Releases a region reserved by one of the calls above.
    fn unregister_region(&self, first: DevNum, count: u32);

    /// Creates a device class.
    fn create_class(&self, name: &str) -> AxResult<ClassId>;

    /// Destroys a class created by [`create_class`](Self::create_class).
    fn destroy_class(&self, class: ClassId);

    /// Creates the visible node `name` for `dev` under `class`.
    fn create_node(&self, class: ClassId, dev: DevNum, name: &str) -> AxResult<NodeId>;

    /// Destroys the node of `dev` under `class`.
    fn destroy_node(&self, class: ClassId, dev: DevNum);

    /// Binds `ops` to `count` device numbers starting at `dev`.
    fn add_dispatch(&self, dev: DevNum, count: u32, ops: Arc<dyn CharDevOps>) -> AxResult;

    /// Unbinds the dispatch table of `dev`.
    fn del_dispatch(&self, dev: DevNum, count: u32);
}

/// Everything a device borrows from its host.
#[derive(Clone)]
pub struct HostServices {
    /// Numbers, classes, nodes and dispatch.
    pub devices: Arc<dyn DeviceHost>,
    /// Timer facility driving the event source.
    pub timers: Arc<dyn TimerHost>,
    /// Transport for client notifications.
    pub notifier: Arc<dyn ClientNotifier>,
}

impl HostServices {
    /// Bundles the three host services.
    pub fn new(
        devices: Arc<dyn DeviceHost>,
        timers: Arc<dyn TimerHost>,
        notifier: Arc<dyn ClientNotifier>,
    ) -> Self {
        Self {
            devices,
            timers,
            notifier,
        }
    }
}
