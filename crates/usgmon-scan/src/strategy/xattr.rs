//! Sizing from the CephFS recursive byte count attribute.

use std::ffi::CStr;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use usgmon_core::MeasureError;

use super::{SizeStrategy, resolve_target, sys};

const RBYTES: &CStr = c"ceph.dir.rbytes";
const RBYTES_NAME: &str = "ceph.dir.rbytes";

/// Reads the recursive byte count CephFS keeps on every directory.
///
/// Constant time regardless of subtree size, but only meaningful on CephFS.
#[derive(Debug, Clone, Copy, Default)]
pub struct XattrStrategy;

impl XattrStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl SizeStrategy for XattrStrategy {
    fn name(&self) -> &'static str {
        "xattr"
    }

    fn measure(&self, path: &Path, cancel: &CancellationToken) -> Result<u64, MeasureError> {
        if cancel.is_cancelled() {
            return Err(MeasureError::Cancelled);
        }
        let target = resolve_target(path)?;

        let raw = sys::get_xattr(&target, RBYTES).map_err(|source| {
            if source.kind() == std::io::ErrorKind::Unsupported {
                MeasureError::Unsupported {
                    strategy: self.name(),
                }
            } else {
                MeasureError::Xattr {
                    path: target.clone(),
                    attr: RBYTES_NAME,
                    source,
                }
            }
        })?;

        parse_rbytes(&raw).ok_or_else(|| MeasureError::XattrValue {
            path: target,
            value: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}

/// The attribute is a decimal string, sometimes NUL- or newline-terminated.
fn parse_rbytes(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw)
        .ok()?
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rbytes() {
        assert_eq!(parse_rbytes(b"1000"), Some(1000));
        assert_eq!(parse_rbytes(b"4096\n"), Some(4096));
        assert_eq!(parse_rbytes(b"12\0"), Some(12));
        assert_eq!(parse_rbytes(b""), None);
        assert_eq!(parse_rbytes(b"-5"), None);
        assert_eq!(parse_rbytes(b"lots"), None);
    }

    #[test]
    fn test_missing_attribute_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = XattrStrategy::new()
            .measure(temp.path(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            MeasureError::Xattr { .. } | MeasureError::Unsupported { .. }
        ));
    }

    #[test]
    fn test_missing_directory_fails_to_resolve() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = XattrStrategy::new()
            .measure(&temp.path().join("gone"), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, MeasureError::Resolve { .. }));
    }
}
