//! Error types for scanning, measuring, and configuration.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors that stop a scan of a base path before any directory is measured.
///
/// Problems with individual entries below the base path never surface as a
/// `ScanError`; the enumerator skips them.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An exclusion pattern failed to compile.
    #[error("Invalid exclude pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A background enumeration or worker task died.
    #[error("Scan task failed: {message}")]
    Task { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Failure to measure a single directory.
///
/// Always local to one directory: the scan carries on with the others.
#[derive(Debug, Error)]
pub enum MeasureError {
    /// The directory (or the symlink naming it) could not be resolved.
    #[error("Resolving {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The recursive-size extended attribute is missing or unreadable.
    #[error("Reading xattr {attr} on {path}: {source}")]
    Xattr {
        path: PathBuf,
        attr: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The extended attribute held something other than a byte count.
    #[error("Unexpected xattr value {value:?} on {path}")]
    XattrValue { path: PathBuf, value: String },

    /// The external size utility could not be started.
    #[error("Executing {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external size utility exited unsuccessfully.
    #[error("{program} failed ({status}): {stderr}")]
    CommandFailed {
        program: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    /// The external size utility printed something unparsable.
    #[error("Unexpected output from {program}: {output:?}")]
    CommandOutput { program: PathBuf, output: String },

    /// The strategy needs a facility this platform does not have.
    #[error("{strategy} is not supported on this platform")]
    Unsupported { strategy: &'static str },

    /// The blocking measurement task panicked or was aborted.
    #[error("Measurement task failed: {message}")]
    Task { message: String },

    /// The scan was cancelled while this directory was being measured.
    #[error("Measurement cancelled")]
    Cancelled,
}

impl MeasureError {
    /// Whether this error is the result of cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Invalid or unreadable configuration. Reported before any scan starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("Parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A duration string could not be parsed.
    #[error("Invalid duration {value:?}: expected <number><s|m|h|d|w>")]
    InvalidDuration { value: String },

    /// A setting failed validation.
    #[error("Invalid configuration: {field} {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    /// Create a validation error for a named field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));

        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_measure_error_cancelled() {
        assert!(MeasureError::Cancelled.is_cancelled());
        assert!(!MeasureError::Unsupported { strategy: "xattr" }.is_cancelled());
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::invalid("scan.workers", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: scan.workers must be at least 1"
        );
    }
}
