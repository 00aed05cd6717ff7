//! Daemon configuration: monitored paths and global defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ConfigError;

/// Default database location.
pub const DEFAULT_DATABASE_PATH: &str = "/var/lib/usgmon/usgmon.db";

/// Default interval between scans of one monitored path.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default number of measurement workers per scan.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of usage records per persisted batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Shortest interval accepted anywhere in the configuration.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Which size strategy to measure directories with.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StrategyKind {
    /// Pick per directory: xattr, then du, then walk.
    #[default]
    Auto,
    /// Filesystem-maintained recursive byte count.
    Xattr,
    /// External `du` utility.
    Du,
    /// Recursive walk summing file sizes.
    Walk,
}

/// Log output format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// One monitored base path.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct MonitoredPath {
    /// Base path whose descendants are measured.
    pub path: PathBuf,

    /// Separator hops from `path` to the measured directories.
    #[builder(default = "0")]
    #[serde(default)]
    pub depth: u32,

    /// Scan interval for this path (None = global default).
    #[builder(default)]
    #[serde(default, with = "opt_duration_str", skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,

    /// Descend through symlinked directories while enumerating.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Glob patterns; matching entries are neither descended into nor measured.
    #[builder(default)]
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl MonitoredPathBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.path {
            Some(ref path) if path.as_os_str().is_empty() => {
                Err("Monitored path cannot be empty".to_string())
            }
            Some(_) => Ok(()),
            None => Err("Monitored path is required".to_string()),
        }
    }
}

impl MonitoredPath {
    /// Create a new monitored path builder.
    pub fn builder() -> MonitoredPathBuilder {
        MonitoredPathBuilder::default()
    }

    /// Monitor `path` at `depth` with every other setting at its default.
    pub fn new(path: impl Into<PathBuf>, depth: u32) -> Self {
        Self {
            path: path.into(),
            depth,
            interval: None,
            follow_symlinks: false,
            exclude: Vec::new(),
        }
    }

    /// The interval for this path, falling back to `default`.
    pub fn effective_interval(&self, default: Duration) -> Duration {
        self.interval.unwrap_or(default)
    }

    /// Key under which an in-flight scan of this path is registered.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level filter directive (`debug`, `info`, `warn`, ...).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Scan defaults shared by every monitored path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanDefaults {
    /// Interval between scans of a path without its own interval.
    #[serde(with = "duration_str")]
    pub interval: Duration,
    /// Measurement workers per scan.
    pub workers: usize,
    /// Size strategy.
    pub strategy: StrategyKind,
    /// Usage records per persisted batch.
    pub batch_size: usize,
}

impl Default for ScanDefaults {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            workers: DEFAULT_WORKERS,
            strategy: StrategyKind::Auto,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Scan defaults.
    pub scan: ScanDefaults,
    /// Monitored paths, in configuration order.
    pub paths: Vec<MonitoredPath>,
}

impl Config {
    /// Locations searched, in order, when no config file is named.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/usgmon/usgmon.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("usgmon").join("usgmon.toml"));
        }
        paths.push(PathBuf::from("usgmon.toml"));
        paths
    }

    /// Load and validate configuration.
    ///
    /// An explicitly named file must exist. Without one, the first existing
    /// file from [`Config::search_paths`] is used, or the defaults if none is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let found = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.is_file()),
        };

        let config = match found {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file without validating it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every setting, reporting the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("database.path", "is required"));
        }
        if self.scan.workers < 1 {
            return Err(ConfigError::invalid("scan.workers", "must be at least 1"));
        }
        if self.scan.batch_size < 1 {
            return Err(ConfigError::invalid("scan.batch_size", "must be at least 1"));
        }
        if self.scan.interval < MIN_INTERVAL {
            return Err(ConfigError::invalid("scan.interval", "must be at least 1s"));
        }

        let mut seen = HashSet::new();
        for (i, p) in self.paths.iter().enumerate() {
            if p.path.as_os_str().is_empty() {
                return Err(ConfigError::invalid(format!("paths[{i}].path"), "is required"));
            }
            if p.interval.is_some_and(|d| d < MIN_INTERVAL) {
                return Err(ConfigError::invalid(
                    format!("paths[{i}].interval"),
                    "must be at least 1s",
                ));
            }
            if !seen.insert(p.key()) {
                return Err(ConfigError::invalid(
                    format!("paths[{i}].path"),
                    format!("duplicates an earlier entry ({})", p.path.display()),
                ));
            }
            for pattern in &p.exclude {
                if let Err(err) = globset::Glob::new(pattern) {
                    return Err(ConfigError::invalid(
                        format!("paths[{i}].exclude"),
                        format!("{pattern:?} is not a valid glob: {err}"),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Parse a duration such as `90s`, `15m`, `1h`, `7d` or `2w`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim().to_lowercase();
    let invalid = || ConfigError::InvalidDuration { value: s.clone() };

    let split = s.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let num: f64 = num.parse().map_err(|_| invalid())?;

    let multiplier = match unit.trim() {
        "" | "s" => 1.0,
        "m" => 60.0,
        "h" => 60.0 * 60.0,
        "d" => 24.0 * 60.0 * 60.0,
        "w" => 7.0 * 24.0 * 60.0 * 60.0,
        _ => return Err(invalid()),
    };

    if !num.is_finite() || num < 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(num * multiplier).map_err(|_| invalid())
}

/// Render a duration in the largest whole unit [`parse_duration`] accepts.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    for (unit, size) in [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs > 0 && secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

mod opt_duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => super::duration_str::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| super::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
