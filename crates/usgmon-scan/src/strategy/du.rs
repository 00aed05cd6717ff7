//! Sizing with the external `du` utility.

use std::path::{Path, PathBuf};
use std::process::Command;

use tokio_util::sync::CancellationToken;

use usgmon_core::MeasureError;

use super::{SizeStrategy, resolve_target};

/// Runs `du -sb` on the directory and reads the byte count it prints.
#[derive(Debug, Clone)]
pub struct DuStrategy {
    program: PathBuf,
}

impl DuStrategy {
    /// Use a specific `du` binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find `du` on `PATH`.
    pub fn locate() -> Option<Self> {
        which::which("du").ok().map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for DuStrategy {
    fn default() -> Self {
        Self::locate().unwrap_or_else(|| Self::new("du"))
    }
}

impl SizeStrategy for DuStrategy {
    fn name(&self) -> &'static str {
        "du"
    }

    fn measure(&self, path: &Path, cancel: &CancellationToken) -> Result<u64, MeasureError> {
        if cancel.is_cancelled() {
            return Err(MeasureError::Cancelled);
        }
        let target = resolve_target(path)?;

        let output = Command::new(&self.program)
            .arg("-sb")
            .arg(&target)
            .output()
            .map_err(|source| MeasureError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MeasureError::CommandFailed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_du_output(&stdout).ok_or_else(|| MeasureError::CommandOutput {
            program: self.program.clone(),
            output: stdout.trim().to_string(),
        })
    }
}

/// `du -sb` prints `<bytes>\t<path>`.
fn parse_du_output(output: &str) -> Option<u64> {
    output.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_du_output() {
        assert_eq!(parse_du_output("1000\t/www/users/alice.com\n"), Some(1000));
        assert_eq!(parse_du_output("0 /x"), Some(0));
        assert_eq!(parse_du_output(""), None);
        assert_eq!(parse_du_output("du: cannot read\n"), None);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let strategy = DuStrategy::new("/nonexistent/usgmon-du");
        let err = strategy
            .measure(temp.path(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, MeasureError::Spawn { .. }));
    }

    #[test]
    fn test_measures_files() {
        let Some(strategy) = DuStrategy::locate() else {
            return;
        };
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("data"), vec![0u8; 10_000]).unwrap();

        let size = strategy
            .measure(temp.path(), &CancellationToken::new())
            .unwrap();
        assert!(size >= 10_000);
    }
}
