// src/xattrs.rs

//! Extended attribute access for content hashing and delta application
//!
//! Attributes are read without following symlinks. Filesystems that do
//! not support extended attributes simply report none.

use std::ffi::{CString, OsStr, OsString};
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;
use tracing::debug;

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))
}

fn unsupported(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOTSUP) | Some(libc::ENODATA)
    )
}

/// List attribute names of `path`, sorted by name
pub fn list(path: &Path) -> io::Result<Vec<OsString>> {
    let cpath = c_path(path)?;

    let size = unsafe { libc::llistxattr(cpath.as_ptr(), std::ptr::null_mut(), 0) };
    if size < 0 {
        let err = io::Error::last_os_error();
        if unsupported(&err) {
            return Ok(Vec::new());
        }
        return Err(err);
    }
    if size == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; size as usize];
    let size = unsafe {
        libc::llistxattr(cpath.as_ptr(), buf.as_mut_ptr() as *mut libc::c_char, buf.len())
    };
    if size < 0 {
        return Err(io::Error::last_os_error());
    }
    buf.truncate(size as usize);

    let mut names: Vec<OsString> = buf
        .split(|b| *b == 0)
        .filter(|name| !name.is_empty())
        .map(|name| OsString::from_vec(name.to_vec()))
        .collect();
    names.sort();
    Ok(names)
}

/// Read one attribute value
pub fn get(path: &Path, name: &OsStr) -> io::Result<Vec<u8>> {
    let cpath = c_path(path)?;
    let cname = CString::new(name.as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "xattr name contains NUL byte"))?;

    let size = unsafe { libc::lgetxattr(cpath.as_ptr(), cname.as_ptr(), std::ptr::null_mut(), 0) };
    if size < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut value = vec![0u8; size as usize];
    if value.is_empty() {
        return Ok(value);
    }
    let size = unsafe {
        libc::lgetxattr(
            cpath.as_ptr(),
            cname.as_ptr(),
            value.as_mut_ptr() as *mut libc::c_void,
            value.len(),
        )
    };
    if size < 0 {
        return Err(io::Error::last_os_error());
    }
    value.truncate(size as usize);
    Ok(value)
}

/// Set one attribute value
pub fn set(path: &Path, name: &OsStr, value: &[u8]) -> io::Result<()> {
    let cpath = c_path(path)?;
    let cname = CString::new(name.as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "xattr name contains NUL byte"))?;

    let ret = unsafe {
        libc::lsetxattr(
            cpath.as_ptr(),
            cname.as_ptr(),
            value.as_ptr() as *const libc::c_void,
            value.len(),
            0,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Copy all extended attributes from `from` onto `to`
///
/// Best effort: attributes that cannot be read or written (for example
/// `security.*` without privileges) are skipped.
pub fn copy(from: &Path, to: &Path) {
    let names = match list(from) {
        Ok(names) => names,
        Err(e) => {
            debug!("Cannot list xattrs of {}: {}", from.display(), e);
            return;
        }
    };

    for name in names {
        let result = get(from, &name).and_then(|value| set(to, &name, &value));
        if let Err(e) = result {
            debug!(
                "Skipping xattr {} on {}: {}",
                name.to_string_lossy(),
                to.display(),
                e
            );
        }
    }
}
