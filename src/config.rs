use alloc::string::String;
use core::time::Duration;

/// Configuration of a readiness device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharDevConfig {
    /// Node name, also used to label the device number region.
    pub name: String,
    /// Class the node is created under.
    pub class_name: String,
    /// Fixed major number. `None` lets the host pick one.
    pub major: Option<u32>,
    /// First minor number of the region.
    pub first_minor: u32,
    /// Number of minors reserved.
    pub minor_count: u32,
    /// Interval between events.
    pub period: Duration,
    /// Bytes returned by every successful read.
    pub payload: [u8; 4],
}

impl CharDevConfig {
    /// Default node name.
    pub const DEFAULT_NAME: &'static str = "userspace";
    /// Default class name.
    pub const DEFAULT_CLASS: &'static str = "chardev";
    /// Default period between events.
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);
    /// Default read payload.
    pub const DEFAULT_PAYLOAD: [u8; 4] = *b"test";

    /// The default configuration with node `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            ..Self::default()
        }
    }

    /// Use a fixed major number instead of a dynamic one.
    pub fn with_major(mut self, major: u32) -> Self {
        self.major = Some(major);
        self
    }

    /// Create the node under class `class_name`.
    pub fn with_class(mut self, class_name: &str) -> Self {
        self.class_name = String::from(class_name);
        self
    }

    /// Fire every `period`.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Return `payload` from reads.
    pub fn with_payload(mut self, payload: [u8; 4]) -> Self {
        self.payload = payload;
        self
    }
}

impl Default for CharDevConfig {
    fn default() -> Self {
        Self {
            name: String::from(Self::DEFAULT_NAME),
            class_name: String::from(Self::DEFAULT_CLASS),
            major: None,
            first_minor: 0,
            minor_count: 1,
            period: Self::DEFAULT_PERIOD,
            payload: Self::DEFAULT_PAYLOAD,
        }
    }
}
