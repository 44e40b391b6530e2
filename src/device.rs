use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;

use axerrno::{ax_err, AxResult, LinuxError, LinuxResult};

use crate::config::CharDevConfig;
use crate::gate::{Consume, ReadinessGate};
use crate::host::{DevNum, DeviceHost, HostServices};
use crate::notify::{ClientId, ClientRegistration};
use crate::ops::{CharDevOps, FileCtx, REGISTER_CLIENT};
use crate::setup::{Acquired, ResourceLedger, SetupError, SetupStep};
use crate::source::EventSource;
use crate::stats::DeviceStats;
use crate::wait::WaitContext;

/// Where a device is in its life.
///
/// A device that failed to start is never handed out, so only the live and
/// torn-down states are observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// All resources held, event source armed.
    Live,
    /// Shut down. Nothing is held.
    TornDown,
}

/// Dispatch table of the readiness device.
///
/// Reads hand out one event each; writes are refused; the only control
/// request registers a client for notification.
pub struct EventDevOps {
    gate: Arc<ReadinessGate>,
    client: Arc<ClientRegistration>,
    stats: Arc<DeviceStats>,
    payload: [u8; 4],
}

impl EventDevOps {
    /// Creates the dispatch table over `gate`.
    pub fn new(
        gate: Arc<ReadinessGate>,
        client: Arc<ClientRegistration>,
        stats: Arc<DeviceStats>,
        payload: [u8; 4],
    ) -> Self {
        Self {
            gate,
            client,
            stats,
            payload,
        }
    }
}

impl CharDevOps for EventDevOps {
    fn open(&self, file: &FileCtx) -> LinuxResult {
        debug!("chardev: open {:?} flags {:?}", file.dev, file.flags);
        Ok(())
    }

    fn release(&self, file: &FileCtx) -> LinuxResult {
        debug!("chardev: release {:?}", file.dev);
        Ok(())
    }

    fn read(&self, file: &FileCtx, buf: &mut [u8], task: &dyn WaitContext) -> LinuxResult<usize> {
        let len = self.payload.len();
        // Checked up front so a short buffer never eats an event.
        if buf.len() < len {
            return Err(LinuxError::EINVAL);
        }

        match self.gate.consume(file.nonblocking(), task) {
            Consume::Consumed => {
                buf[..len].copy_from_slice(&self.payload);
                self.stats.record_read();
                trace!("chardev: read {:?} -> {} bytes", file.dev, len);
                Ok(len)
            }
            Consume::WouldBlock => {
                self.stats.record_would_block();
                Err(LinuxError::EAGAIN)
            }
            Consume::Interrupted => {
                self.stats.record_interrupted();
                Err(LinuxError::EINTR)
            }
        }
    }

    fn write(&self, _file: &FileCtx, _buf: &[u8]) -> LinuxResult<usize> {
        self.stats.record_write();
        Err(LinuxError::EPERM)
    }

    fn ioctl(&self, file: &FileCtx, cmd: u32, arg: usize) -> LinuxResult<usize> {
        match cmd {
            REGISTER_CLIENT => {
                let pid = u32::try_from(arg).map_err(|_| LinuxError::EINVAL)?;
                if pid == 0 {
                    return Err(LinuxError::EINVAL);
                }
                let previous = self.client.register(ClientId(pid));
                debug!(
                    "chardev: {:?} registered client {} (replacing {:?})",
                    file.dev, pid, previous
                );
                Ok(0)
            }
            _ => {
                debug!("chardev: unknown ioctl {:#x} on {:?}", cmd, file.dev);
                Err(LinuxError::ENOTTY)
            }
        }
    }
}

/// A live readiness device and everything it holds.
///
/// Constructed by [`start`](Self::start), destroyed by
/// [`shutdown`](Self::shutdown) or on drop.
pub struct CharDevice {
    config: CharDevConfig,
    host: HostServices,
    dev: DevNum,
    ledger: ResourceLedger,
    source: EventSource,
    gate: Arc<ReadinessGate>,
    client: Arc<ClientRegistration>,
    stats: Arc<DeviceStats>,
    status: DeviceStatus,
}

/// Turns a failed acquisition into a [`SetupError`], releasing what the
/// ledger holds first.
fn checked<T>(
    result: AxResult<T>,
    step: SetupStep,
    ledger: &mut ResourceLedger,
    devices: &dyn DeviceHost,
) -> Result<T, SetupError> {
    result.map_err(|source| {
        error!(
            "chardev: {:?} failed ({:?}), releasing {} resource(s)",
            step,
            source,
            ledger.len()
        );
        ledger.unwind(devices);
        SetupError { step, source }
    })
}

fn check_minor_range(first_minor: u32, count: u32) -> AxResult {
    if DevNum::minor_range_fits(first_minor, count) {
        Ok(())
    } else {
        ax_err!(InvalidInput, "minor range out of bounds")
    }
}

impl CharDevice {
    /// Acquires the device number region, class, node and dispatch binding
    /// in that order, then arms the event source.
    ///
    /// # Errors
    ///
    /// If a step fails, everything acquired before it is released in reverse
    /// order and the failing step is reported.
    pub fn start(config: CharDevConfig, host: HostServices) -> Result<Self, SetupError> {
        let devices = Arc::clone(&host.devices);
        let devices = &*devices;
        let mut ledger = ResourceLedger::new();
        let count = config.minor_count;

        checked(
            check_minor_range(config.first_minor, count),
            SetupStep::ReserveRegion,
            &mut ledger,
            devices,
        )?;
        let dev = match config.major {
            Some(major) => {
                let dev = checked(
                    DevNum::try_new(major, config.first_minor),
                    SetupStep::ReserveRegion,
                    &mut ledger,
                    devices,
                )?;
                checked(
                    devices.register_region(dev, count, &config.name),
                    SetupStep::ReserveRegion,
                    &mut ledger,
                    devices,
                )?;
                dev
            }
            None => checked(
                devices.alloc_region(config.first_minor, count, &config.name),
                SetupStep::ReserveRegion,
                &mut ledger,
                devices,
            )?,
        };
        ledger.push(Acquired::Region { first: dev, count });
        info!("chardev: allocated major number {}", dev.major());

        let class = checked(
            devices.create_class(&config.class_name),
            SetupStep::CreateClass,
            &mut ledger,
            devices,
        )?;
        ledger.push(Acquired::Class(class));
        info!("chardev: created class {}", config.class_name);

        checked(
            devices.create_node(class, dev, &config.name),
            SetupStep::CreateNode,
            &mut ledger,
            devices,
        )?;
        ledger.push(Acquired::Node { class, dev });
        info!("chardev: created char device /dev/{}", config.name);

        let gate = Arc::new(ReadinessGate::new(true));
        let client = Arc::new(ClientRegistration::new());
        let stats = Arc::new(DeviceStats::new());
        let ops = Arc::new(EventDevOps::new(
            Arc::clone(&gate),
            Arc::clone(&client),
            Arc::clone(&stats),
            config.payload,
        ));

        checked(
            devices.add_dispatch(dev, count, ops),
            SetupStep::RegisterDispatch,
            &mut ledger,
            devices,
        )?;
        ledger.push(Acquired::Dispatch { dev, count });
        info!("chardev: registered device with minor number {}", dev.minor());

        let source = EventSource::new(
            config.period,
            Arc::clone(&gate),
            Arc::clone(&client),
            Arc::clone(&host.notifier),
            Arc::clone(&stats),
            Arc::clone(&host.timers),
        );
        checked(source.start(), SetupStep::ArmTimer, &mut ledger, devices)?;

        Ok(Self {
            config,
            host,
            dev,
            ledger,
            source,
            gate,
            client,
            stats,
            status: DeviceStatus::Live,
        })
    }

    /// Disarms the event source, then releases the dispatch binding, node,
    /// device number region and class, each only if held.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.status == DeviceStatus::TornDown {
            return;
        }
        info!("chardev: shutting down {:?}", self.dev);

        self.source.stop();

        let devices = Arc::clone(&self.host.devices);
        let devices = &*devices;
        for step in [
            SetupStep::RegisterDispatch,
            SetupStep::CreateNode,
            SetupStep::ReserveRegion,
            SetupStep::CreateClass,
        ] {
            if !self.ledger.release(step, devices) {
                debug!("chardev: {:?} not held, skipping", step);
            }
        }

        self.client.clear();
        self.status = DeviceStatus::TornDown;
        info!("chardev: removed char device");
    }

    /// Device number of the node.
    pub fn dev(&self) -> DevNum {
        self.dev
    }

    /// Path of the node in the host's device namespace.
    pub fn node_path(&self) -> String {
        format!("/dev/{}", self.config.name)
    }

    /// Current status.
    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// The configuration the device was started with.
    pub fn config(&self) -> &CharDevConfig {
        &self.config
    }

    /// The readiness gate reads are served from.
    pub fn gate(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }

    /// Registered client, if any.
    pub fn client(&self) -> Option<ClientId> {
        self.client.get()
    }

    /// Access statistics.
    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Whether the event source is delivering firings.
    pub fn is_armed(&self) -> bool {
        self.source.is_armed()
    }

    /// Startup steps whose resources are still held.
    pub fn held(&self) -> impl Iterator<Item = SetupStep> + '_ {
        self.ledger.steps()
    }
}

impl Drop for CharDevice {
    fn drop(&mut self) {
        if self.status != DeviceStatus::TornDown {
            warn!("chardev: {:?} dropped while live, shutting down", self.dev);
            self.shutdown();
        }
    }
}

impl core::fmt::Debug for CharDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CharDevice")
            .field("name", &self.config.name)
            .field("dev", &self.dev)
            .field("status", &self.status)
            .field("gate", &self.gate)
            .field("source", &self.source)
            .finish()
    }
}
