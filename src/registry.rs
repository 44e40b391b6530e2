//! In-memory device host.
//!
//! [`DevRegistry`] keeps the tables a kernel keeps for character devices:
//! - reserved device number regions, with dynamic majors handed out from
//!   the top of the range downwards
//! - device classes
//! - device nodes, keyed by their `/dev` path
//! - dispatch tables, keyed by the first device number they serve
//!
//! [`DevRegistry::open`] resolves a node path the way a process opening the
//! node would, producing an [`OpenFile`] that forwards to the dispatch table.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use axerrno::{ax_err, AxResult, LinuxError, LinuxResult};
use spin::RwLock;

use crate::host::{ClassId, DevNum, DeviceHost, NodeId};
use crate::ops::{CharDevOps, FileCtx, OpenFlags};
use crate::wait::WaitContext;

/// Highest major handed out by dynamic allocation.
pub const DYNAMIC_MAJOR_MAX: u32 = 254;
/// Lowest major handed out by dynamic allocation.
pub const DYNAMIC_MAJOR_MIN: u32 = 234;

struct Region {
    first: DevNum,
    count: u32,
    name: String,
}

impl Region {
    fn overlaps(&self, first: DevNum, count: u32) -> bool {
        self.first.major() == first.major()
            && u64::from(self.first.minor()) < minor_end(first, count)
            && u64::from(first.minor()) < minor_end(self.first, self.count)
    }
}

/// One past the last minor of a range, widened so it cannot wrap.
fn minor_end(first: DevNum, count: u32) -> u64 {
    u64::from(first.minor()) + u64::from(count)
}

struct Node {
    class: ClassId,
    dev: DevNum,
}

struct Dispatch {
    count: u32,
    ops: Arc<dyn CharDevOps>,
}

/// Character device tables of a host.
///
/// All tables sit behind read-write locks, so lookups from concurrent
/// `open` calls never serialize against each other.
pub struct DevRegistry {
    regions: RwLock<Vec<Region>>,
    classes: RwLock<BTreeMap<ClassId, String>>,
    /// Nodes by path.
    nodes: RwLock<BTreeMap<String, Node>>,
    /// Dispatch tables by first device number.
    dispatch: RwLock<BTreeMap<DevNum, Dispatch>>,
    next_id: AtomicUsize,
}

impl DevRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            regions: RwLock::new(Vec::new()),
            classes: RwLock::new(BTreeMap::new()),
            nodes: RwLock::new(BTreeMap::new()),
            dispatch: RwLock::new(BTreeMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Dispatch table serving `dev`, if any.
    fn find_dispatch(&self, dev: DevNum) -> Option<Arc<dyn CharDevOps>> {
        let dispatch = self.dispatch.read();
        let (first, entry) = dispatch.range(..=dev).next_back()?;
        let served = u64::from(dev.minor()) < minor_end(*first, entry.count);
        if first.major() == dev.major() && served {
            Some(Arc::clone(&entry.ops))
        } else {
            None
        }
    }

    /// Opens the node at `path`, the way a process would.
    ///
    /// # Errors
    ///
    /// `ENOENT` if no such node exists, `ENXIO` if the node's device number
    /// has no dispatch table, or whatever the device's `open` returns.
    pub fn open(&self, path: &str, flags: OpenFlags) -> LinuxResult<OpenFile> {
        let dev = self.lookup(path).ok_or(LinuxError::ENOENT)?;
        let ops = self.find_dispatch(dev).ok_or_else(|| {
            debug!("registry: {} ({:?}) has no dispatch table", path, dev);
            LinuxError::ENXIO
        })?;

        let ctx = FileCtx::new(dev, flags);
        ops.open(&ctx)?;
        Ok(OpenFile {
            ops,
            ctx,
            released: false,
        })
    }

    /// Device number of the node at `path`.
    pub fn lookup(&self, path: &str) -> Option<DevNum> {
        self.nodes.read().get(path).map(|node| node.dev)
    }

    /// Name a region containing `dev` was reserved under.
    pub fn region_name(&self, dev: DevNum) -> Option<String> {
        self.regions
            .read()
            .iter()
            .find(|r| r.overlaps(dev, 1))
            .map(|r| r.name.clone())
    }

    /// Whether a class called `name` exists.
    pub fn has_class(&self, name: &str) -> bool {
        self.classes.read().values().any(|n| n == name)
    }

    /// Number of reserved regions.
    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    /// Number of classes.
    pub fn class_count(&self) -> usize {
        self.classes.read().len()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Number of bound dispatch tables.
    pub fn dispatch_count(&self) -> usize {
        self.dispatch.read().len()
    }

    /// Whether every table is empty.
    pub fn is_empty(&self) -> bool {
        self.region_count() == 0
            && self.class_count() == 0
            && self.node_count() == 0
            && self.dispatch_count() == 0
    }
}

impl Default for DevRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceHost for DevRegistry {
    fn register_region(&self, first: DevNum, count: u32, name: &str) -> AxResult {
        if !DevNum::minor_range_fits(first.minor(), count) {
            return ax_err!(InvalidInput, "device number region out of bounds");
        }
        let mut regions = self.regions.write();
        if regions.iter().any(|r| r.overlaps(first, count)) {
            return ax_err!(AlreadyExists, "device number region in use");
        }
        regions.push(Region {
            first,
            count,
            name: String::from(name),
        });
        debug!("registry: reserved {:?}+{} for {}", first, count, name);
        Ok(())
    }

    fn alloc_region(&self, first_minor: u32, count: u32, name: &str) -> AxResult<DevNum> {
        if !DevNum::minor_range_fits(first_minor, count) {
            return ax_err!(InvalidInput, "device number region out of bounds");
        }
        let mut regions = self.regions.write();
        let major = (DYNAMIC_MAJOR_MIN..=DYNAMIC_MAJOR_MAX)
            .rev()
            .find(|&major| regions.iter().all(|r| r.first.major() != major));
        let Some(major) = major else {
            return ax_err!(ResourceBusy, "no free dynamic major");
        };

        let first = DevNum::new(major, first_minor);
        regions.push(Region {
            first,
            count,
            name: String::from(name),
        });
        debug!("registry: allocated {:?}+{} for {}", first, count, name);
        Ok(first)
    }

    fn unregister_region(&self, first: DevNum, count: u32) {
        self.regions
            .write()
            .retain(|r| !(r.first == first && r.count == count));
    }

    fn create_class(&self, name: &str) -> AxResult<ClassId> {
        let mut classes = self.classes.write();
        if classes.values().any(|n| n == name) {
            return ax_err!(AlreadyExists, "class already exists");
        }
        let id = ClassId(self.next_id());
        classes.insert(id, String::from(name));
        Ok(id)
    }

    fn destroy_class(&self, class: ClassId) {
        self.classes.write().remove(&class);
    }

    fn create_node(&self, class: ClassId, dev: DevNum, name: &str) -> AxResult<NodeId> {
        if !self.classes.read().contains_key(&class) {
            return ax_err!(NotFound, "class not found");
        }
        let path = format!("/dev/{}", name);
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&path) {
            return ax_err!(AlreadyExists, "device node already exists");
        }
        let id = NodeId(self.next_id());
        nodes.insert(path, Node { class, dev });
        Ok(id)
    }

    fn destroy_node(&self, class: ClassId, dev: DevNum) {
        self.nodes
            .write()
            .retain(|_, node| !(node.class == class && node.dev == dev));
    }

    fn add_dispatch(&self, dev: DevNum, count: u32, ops: Arc<dyn CharDevOps>) -> AxResult {
        let mut dispatch = self.dispatch.write();
        if dispatch.contains_key(&dev) {
            return ax_err!(AlreadyExists, "dispatch table already bound");
        }
        dispatch.insert(dev, Dispatch { count, ops });
        Ok(())
    }

    fn del_dispatch(&self, dev: DevNum, _count: u32) {
        self.dispatch.write().remove(&dev);
    }
}

/// A file opened on a device node.
///
/// The dispatch table is held for as long as the file is open. `release`
/// runs once, on [`close`](Self::close) or drop.
pub struct OpenFile {
    ops: Arc<dyn CharDevOps>,
    ctx: FileCtx,
    released: bool,
}

impl OpenFile {
    /// Reads into `buf`, waiting through `task` if the device has to.
    pub fn read(&self, buf: &mut [u8], task: &dyn WaitContext) -> LinuxResult<usize> {
        self.ops.read(&self.ctx, buf, task)
    }

    /// Writes `buf`.
    pub fn write(&self, buf: &[u8]) -> LinuxResult<usize> {
        self.ops.write(&self.ctx, buf)
    }

    /// Issues control request `cmd`.
    pub fn ioctl(&self, cmd: u32, arg: usize) -> LinuxResult<usize> {
        self.ops.ioctl(&self.ctx, cmd, arg)
    }

    /// Closes the file, returning what the device's `release` returned.
    pub fn close(mut self) -> LinuxResult {
        self.released = true;
        self.ops.release(&self.ctx)
    }

    /// Device number and flags of the file.
    pub fn ctx(&self) -> &FileCtx {
        &self.ctx
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(err) = self.ops.release(&self.ctx) {
                warn!("registry: release of {:?} failed: {:?}", self.ctx.dev, err);
            }
        }
    }
}

impl core::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpenFile").field("ctx", &self.ctx).finish()
    }
}
