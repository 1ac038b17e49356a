//! Source identity, fingerprints, and cache directory layout.
//!
//! Every indexed source gets its own directory under the cache root, named
//! `<basename>.<fingerprint>` where the fingerprint hashes the source's
//! `(device, inode, ctime)` identity. Distinct identities therefore
//! coexist; a rotated or replaced log lands in a fresh directory and the
//! stale one is simply never opened again.

use sha2::{Digest, Sha256};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Name of the packed `u16` per-line width file.
pub const WIDTHS_FILE: &str = "widths.dat";

/// Name of the packed `u64` per-line byte-offset file.
pub const POSITIONS_FILE: &str = "positions.dat";

/// Name of the node store file.
pub const NODES_FILE: &str = "nodes.dat";

/// Name of the metadata sidecar.
pub const META_FILE: &str = "metadata";

/// Filesystem identity of a log source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceId {
    pub device: u64,
    pub inode: u64,
    pub ctime_sec: i64,
    pub ctime_nsec: i64,
}

impl SourceId {
    /// Capture the identity of a stat'd file.
    pub fn of(meta: &fs::Metadata) -> Self {
        Self {
            device: meta.dev(),
            inode: meta.ino(),
            ctime_sec: meta.ctime(),
            ctime_nsec: meta.ctime_nsec(),
        }
    }

    /// Whether `other` refers to the same underlying file, ignoring ctime.
    pub fn same_file(&self, other: &SourceId) -> bool {
        self.device == other.device && self.inode == other.inode
    }

    /// First 8 hex digits of a SHA-256 over the identity fields.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.device.to_le_bytes());
        hasher.update(self.inode.to_le_bytes());
        hasher.update(self.ctime_sec.to_le_bytes());
        hasher.update(self.ctime_nsec.to_le_bytes());
        let digest = hasher.finalize();
        digest[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Cache directory for `source` with identity `id` under `root`.
pub fn dir_for(root: &Path, source: &Path, id: &SourceId) -> PathBuf {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());
    root.join(format!("{base}.{}", id.fingerprint()))
}

/// Platform per-user cache root for this crate.
pub fn default_root() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("logloglog"))
}
