//! Dispatch table the host invokes on behalf of callers of a device node.

use axerrno::LinuxResult;

use crate::host::DevNum;
use crate::wait::WaitContext;

bitflags::bitflags! {
    /// Flags a file was opened with (Linux values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Write only
        const O_WRONLY = 0o1;
        /// Read and write
        const O_RDWR = 0o2;
        /// Return instead of waiting when no data is available
        const O_NONBLOCK = 0o4000;
    }
}

impl OpenFlags {
    /// Read-only, blocking.
    pub const O_RDONLY: Self = Self::empty();
}

/// Request code for "notify this process of every event".
///
/// `_IOW('k', 1, u32)`; the argument is the caller's process id.
pub const REGISTER_CLIENT: u32 = 0x4004_6B01;

/// Per-call context: which device and how the file was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCtx {
    /// Device number the call was addressed to.
    pub dev: DevNum,
    /// Open flags of the file.
    pub flags: OpenFlags,
}

impl FileCtx {
    /// Creates a context for a file on `dev` opened with `flags`.
    pub const fn new(dev: DevNum, flags: OpenFlags) -> Self {
        Self { dev, flags }
    }

    /// Whether the caller asked for non-blocking I/O.
    #[inline]
    pub fn nonblocking(&self) -> bool {
        self.flags.contains(OpenFlags::O_NONBLOCK)
    }
}

/// Operations of a character device.
pub trait CharDevOps: Send + Sync {
    /// Called when a file is opened on the device.
    fn open(&self, _file: &FileCtx) -> LinuxResult {
        Ok(())
    }

    /// Called when the last reference to an open file goes away.
    fn release(&self, _file: &FileCtx) -> LinuxResult {
        Ok(())
    }

    /// Reads into `buf`. `task` is the calling context, used if the read
    /// has to wait.
    fn read(&self, file: &FileCtx, buf: &mut [u8], task: &dyn WaitContext) -> LinuxResult<usize>;

    /// Writes `buf`.
    fn write(&self, file: &FileCtx, buf: &[u8]) -> LinuxResult<usize>;

    /// Device-specific control request.
    fn ioctl(&self, file: &FileCtx, cmd: u32, arg: usize) -> LinuxResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonblocking_flag() {
        let dev = DevNum::new(240, 0);
        assert!(!FileCtx::new(dev, OpenFlags::O_RDONLY).nonblocking());
        assert!(FileCtx::new(dev, OpenFlags::O_NONBLOCK).nonblocking());
        assert!(FileCtx::new(dev, OpenFlags::O_RDWR | OpenFlags::O_NONBLOCK).nonblocking());
    }

    #[test]
    fn test_register_client_code_layout() {
        // dir=write(1) | size=4 | type='k' | nr=1
        let expected = (1 << 30) | (4 << 16) | ((b'k' as u32) << 8) | 1;
        assert_eq!(REGISTER_CLIENT, expected);
    }
}
