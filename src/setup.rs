//! Ordered acquisition of device resources and their release.
//!
//! Every resource acquired during startup is pushed onto a
//! [`ResourceLedger`]. On a failed step the ledger is unwound, popping and
//! releasing entries in reverse order, so only resources that were really
//! acquired are ever released. Shutdown takes entries out of the same ledger
//! one kind at a time.

use arrayvec::ArrayVec;
use axerrno::{AxError, LinuxError};

use crate::host::{ClassId, DevNum, DeviceHost};

/// Startup steps, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SetupStep {
    /// Reserve the device number region.
    ReserveRegion,
    /// Create the device class.
    CreateClass,
    /// Create the device node under the class.
    CreateNode,
    /// Bind the dispatch table to the device number.
    RegisterDispatch,
    /// Arm the event source once the device is live. Holds no resource.
    ArmTimer,
}

impl SetupStep {
    /// All resource-acquiring steps, in acquisition order.
    pub const ALL: [SetupStep; 4] = [
        SetupStep::ReserveRegion,
        SetupStep::CreateClass,
        SetupStep::CreateNode,
        SetupStep::RegisterDispatch,
    ];
}

/// A startup step failed. Everything acquired before it has been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupError {
    /// The step that failed.
    pub step: SetupStep,
    /// What the host reported.
    pub source: AxError,
}

impl SetupError {
    /// Linux error code for the caller of the start entry point.
    pub fn errno(&self) -> LinuxError {
        LinuxError::from(self.source)
    }
}

impl core::fmt::Display for SetupError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "device setup failed at {:?}: {:?}", self.step, self.source)
    }
}

/// A resource held on behalf of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// Device number region.
    Region {
        /// First device number.
        first: DevNum,
        /// Number of minors.
        count: u32,
    },
    /// Device class.
    Class(ClassId),
    /// Device node.
    Node {
        /// Class the node lives under.
        class: ClassId,
        /// Device number of the node.
        dev: DevNum,
    },
    /// Dispatch table binding.
    Dispatch {
        /// First bound device number.
        dev: DevNum,
        /// Number of bound minors.
        count: u32,
    },
}

impl Acquired {
    /// The startup step that produced this resource.
    pub fn step(&self) -> SetupStep {
        match self {
            Acquired::Region { .. } => SetupStep::ReserveRegion,
            Acquired::Class(_) => SetupStep::CreateClass,
            Acquired::Node { .. } => SetupStep::CreateNode,
            Acquired::Dispatch { .. } => SetupStep::RegisterDispatch,
        }
    }

    /// Hands the resource back to the host.
    pub fn release(self, host: &dyn DeviceHost) {
        match self {
            Acquired::Region { first, count } => host.unregister_region(first, count),
            Acquired::Class(class) => host.destroy_class(class),
            Acquired::Node { class, dev } => host.destroy_node(class, dev),
            Acquired::Dispatch { dev, count } => host.del_dispatch(dev, count),
        }
        debug!("released {:?}", self);
    }
}

/// Resources acquired so far, in acquisition order.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    held: ArrayVec<Acquired, 4>,
}

impl ResourceLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly acquired resource.
    ///
    /// Each step is recorded at most once.
    pub fn push(&mut self, resource: Acquired) {
        debug_assert!(self.get(resource.step()).is_none());
        self.held.push(resource);
    }

    /// Releases everything, most recent first.
    pub fn unwind(&mut self, host: &dyn DeviceHost) {
        while let Some(resource) = self.held.pop() {
            resource.release(host);
        }
    }

    /// Removes and returns the resource from `step`, if held.
    pub fn take(&mut self, step: SetupStep) -> Option<Acquired> {
        let index = self.held.iter().position(|r| r.step() == step)?;
        Some(self.held.remove(index))
    }

    /// Releases the resource from `step` if it is held.
    pub fn release(&mut self, step: SetupStep, host: &dyn DeviceHost) -> bool {
        match self.take(step) {
            Some(resource) => {
                resource.release(host);
                true
            }
            None => false,
        }
    }

    /// The resource from `step`, if held.
    pub fn get(&self, step: SetupStep) -> Option<&Acquired> {
        self.held.iter().find(|r| r.step() == step)
    }

    /// Steps whose resources are held, in acquisition order.
    pub fn steps(&self) -> impl Iterator<Item = SetupStep> + '_ {
        self.held.iter().map(Acquired::step)
    }

    /// Number of held resources.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Whether all four resources are held.
    pub fn is_complete(&self) -> bool {
        self.held.is_full()
    }
}
