//! Thin libc wrappers for extended attributes and filesystem type.

use std::ffi::{CStr, CString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// `f_type` reported by statfs(2) for CephFS mounts.
pub const CEPH_SUPER_MAGIC: i64 = 0x00c3_6400;

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

/// Read an extended attribute, following symlinks.
#[cfg(target_os = "linux")]
pub fn get_xattr(path: &Path, name: &CStr) -> io::Result<Vec<u8>> {
    let c_path = c_path(path)?;
    let mut buf = vec![0u8; 64];

    // SAFETY: both strings are NUL-terminated and `buf` is valid for `buf.len()` bytes.
    let len = unsafe {
        libc::getxattr(
            c_path.as_ptr(),
            name.as_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
        )
    };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }

    buf.truncate(len as usize);
    Ok(buf)
}

#[cfg(not(target_os = "linux"))]
pub fn get_xattr(_path: &Path, _name: &CStr) -> io::Result<Vec<u8>> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// Filesystem type magic for the filesystem holding `path`.
#[cfg(target_os = "linux")]
pub fn filesystem_magic(path: &Path) -> io::Result<i64> {
    let c_path = c_path(path)?;
    let mut stat = std::mem::MaybeUninit::<libc::statfs>::uninit();

    // SAFETY: `c_path` is NUL-terminated and `stat` is a valid out-pointer.
    let rc = unsafe { libc::statfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: statfs returned success, so the struct is initialized.
    let stat = unsafe { stat.assume_init() };
    Ok(stat.f_type as i64)
}

#[cfg(not(target_os = "linux"))]
pub fn filesystem_magic(_path: &Path) -> io::Result<i64> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// Whether `path` lives on a filesystem that maintains recursive byte counts.
pub fn is_cephfs(path: &Path) -> bool {
    filesystem_magic(path).is_ok_and(|magic| magic == CEPH_SUPER_MAGIC)
}
