//! Resolved media assets.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::timeline::MediaKind;

/// A resolved local media file.
///
/// Created by the media resolver, consumed by the render gateway, never
/// mutated after creation. The fingerprint is a SHA-256 hash over the file
/// bytes at rest; resolving the same source twice yields identical
/// fingerprints, which callers can use for dedup and cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Asset {
    /// Local filesystem path
    pub path: PathBuf,
    /// SHA-256 content hash (lowercase hex)
    pub fingerprint: String,
    /// Declared media kind
    pub kind: MediaKind,
    /// File size in bytes
    pub size_bytes: u64,
}

impl Asset {
    pub fn new(path: PathBuf, fingerprint: String, kind: MediaKind, size_bytes: u64) -> Self {
        Self {
            path,
            fingerprint,
            kind,
            size_bytes,
        }
    }
}
