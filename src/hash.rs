// src/hash.rs

//! Content hashing for file integrity and content addressing
//!
//! Every file the updater trusts is identified by a [`ContentHash`]: the
//! SHA-256 of its metadata, content and extended attributes. Two files
//! with equal content and equal metadata always hash equal, and hashes
//! are compared by exact string equality.
//!
//! # Hash input
//!
//! | Part     | Bytes                                              |
//! |----------|----------------------------------------------------|
//! | Header   | `kind:mode:uid:gid:size\0` (mode in octal, 0o7777)  |
//! | Content  | file bytes, symlink target, nothing for directories |
//! | Xattrs   | `name\0value\0` for each attribute, sorted by name  |

use crate::error::{Error, Result};
use crate::xattrs;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::str::FromStr;

/// Width of a content hash in hex characters
pub const HASH_LEN: usize = 64;

/// Mask of the permission bits covered by the hash
const MODE_MASK: u32 = 0o7777;

/// Hash parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Hash string has wrong length
    InvalidLength { expected: usize, got: usize },
    /// Hash string contains invalid hex characters
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid hash length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

/// A fixed-width hex content hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    /// Parse and validate a hash string
    ///
    /// The value is kept exactly as given; no case folding is applied, so
    /// comparison stays exact-string.
    pub fn parse(value: impl Into<String>) -> std::result::Result<Self, HashError> {
        let value = value.into();

        if value.len() != HASH_LEN {
            return Err(HashError::InvalidLength {
                expected: HASH_LEN,
                got: value.len(),
            });
        }

        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value));
        }

        Ok(Self(value))
    }

    /// Get the hash value as a hex string
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log messages
    #[inline]
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(value).map_err(serde::de::Error::custom)
    }
}

/// Exact-string hash comparison, no normalization
#[inline]
pub fn hashes_equal(a: &str, b: &str) -> bool {
    a == b
}

/// Compute the content hash of a file, directory or symlink
///
/// Never modifies the target. Fails with [`Error::HashComputation`] if
/// the path cannot be stat'ed or read.
pub fn compute_hash(path: &Path) -> Result<ContentHash> {
    let wrap = |source: io::Error| Error::HashComputation {
        path: path.to_path_buf(),
        source,
    };

    let metadata = fs::symlink_metadata(path).map_err(wrap)?;
    let file_type = metadata.file_type();
    let mut hasher = Sha256::new();

    let (kind, size) = if file_type.is_symlink() {
        ("L", metadata.len())
    } else if file_type.is_dir() {
        ("D", 0)
    } else {
        ("F", metadata.len())
    };

    hasher.update(
        format!(
            "{}:{:o}:{}:{}:{}\0",
            kind,
            metadata.mode() & MODE_MASK,
            metadata.uid(),
            metadata.gid(),
            size
        )
        .as_bytes(),
    );

    if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(wrap)?;
        hasher.update(target.as_os_str().as_bytes());
    } else if file_type.is_file() {
        let mut file = File::open(path).map_err(wrap)?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).map_err(wrap)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    for name in xattrs::list(path).map_err(wrap)? {
        let value = xattrs::get(path, &name).map_err(wrap)?;
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(&value);
        hasher.update([0u8]);
    }

    Ok(ContentHash(format!("{:x}", hasher.finalize())))
}
