//! Core types for usgmon.
//!
//! This crate holds the data shared by the scanning engine, the store and
//! the daemon: physical filesystem identities, per-directory scan results,
//! persisted usage and scan records, monitored-path configuration, and the
//! error taxonomy.

mod config;
mod error;
mod identity;
mod record;
mod result;

pub use config::{
    Config, DatabaseConfig, LogFormat, LoggingConfig, MonitoredPath, MonitoredPathBuilder,
    MonitoredPathBuilderError, ScanDefaults, StrategyKind, DEFAULT_BATCH_SIZE,
    DEFAULT_DATABASE_PATH, DEFAULT_INTERVAL, DEFAULT_WORKERS, MIN_INTERVAL, format_duration,
    parse_duration,
};
pub use error::{ConfigError, MeasureError, ScanError};
pub use identity::FsIdentity;
pub use record::{ScanId, ScanRecord, ScanStatus, UsageRecord};
pub use result::{BatchScan, ScanResult};
