mod owner;
mod report;
mod types;
mod version;

pub use owner::{owner_label, FIRST_APPLICATION_UID};
pub use report::{IterationSnapshot, MergedReport, ScoredSnapshot};
pub use types::{
    AudioUsage, CpuUsage, GpsState, GpsUsage, RadioPowerState, RadioUsage, ScreenTechnology,
    ScreenUsage, SensorUsage, Subsystem, Uid, UsageRecord, WifiState, WifiUsage,
};
pub use version::{is_supported, MIN_SUPPORTED_VERSION, REPORT_VERSION};
