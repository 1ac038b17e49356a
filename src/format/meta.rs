//! Metadata sidecar: a single fixed-layout binary record.
//!
//! The sidecar binds the cache files to a source identity and records how
//! far indexing has progressed. It is the last thing written on flush, via
//! write-to-temp-then-rename, so a crash leaves either the previous record
//! or the new one, never a torn mix.
//!
//! ## Binary format (128 bytes, little-endian)
//!
//! ```text
//! magic:           "LLL1" (4B)
//! version:         u8
//! _pad:            [u8; 3]
//! node_size:       u32
//! leaf_fanout:     u32
//! internal_fanout: u32
//! buckets:         u32
//! exact_buckets:   u32
//! _reserved:       u32
//! device:          u64
//! inode:           u64
//! ctime_sec:       i64
//! ctime_nsec:      i64
//! indexed_bytes:   u64
//! total_lines:     u64
//! root_ref:        u32
//! height:          u32
//! _tail:           zero padding to 128
//! ```

use crate::cache::SourceId;
use crate::error::{Error, Result};
use crate::format::node::{INTERNAL_FANOUT, LEAF_FANOUT, NODE_SIZE};
use crate::histogram::{BUCKETS, EXACT_BUCKETS};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Magic bytes for the metadata sidecar.
const META_MAGIC: [u8; 4] = *b"LLL1";

/// Current sidecar format version.
const META_VERSION: u8 = 1;

/// On-disk size of the sidecar record.
pub const META_SIZE: usize = 128;

/// Index progress and identity, as persisted in the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub source: SourceId,
    pub indexed_bytes: u64,
    pub total_lines: u64,
    pub root_ref: u32,
    pub height: u32,
}

impl Metadata {
    fn encode(&self) -> [u8; META_SIZE] {
        let mut buf = [0u8; META_SIZE];
        buf[0..4].copy_from_slice(&META_MAGIC);
        buf[4] = META_VERSION;
        buf[8..12].copy_from_slice(&(NODE_SIZE as u32).to_le_bytes());
        buf[12..16].copy_from_slice(&(LEAF_FANOUT as u32).to_le_bytes());
        buf[16..20].copy_from_slice(&(INTERNAL_FANOUT as u32).to_le_bytes());
        buf[20..24].copy_from_slice(&(BUCKETS as u32).to_le_bytes());
        buf[24..28].copy_from_slice(&(EXACT_BUCKETS as u32).to_le_bytes());
        buf[32..40].copy_from_slice(&self.source.device.to_le_bytes());
        buf[40..48].copy_from_slice(&self.source.inode.to_le_bytes());
        buf[48..56].copy_from_slice(&self.source.ctime_sec.to_le_bytes());
        buf[56..64].copy_from_slice(&self.source.ctime_nsec.to_le_bytes());
        buf[64..72].copy_from_slice(&self.indexed_bytes.to_le_bytes());
        buf[72..80].copy_from_slice(&self.total_lines.to_le_bytes());
        buf[80..84].copy_from_slice(&self.root_ref.to_le_bytes());
        buf[84..88].copy_from_slice(&self.height.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < META_SIZE {
            return Err(Error::Corruption(format!(
                "metadata truncated: {} bytes",
                buf.len()
            )));
        }
        if buf[0..4] != META_MAGIC {
            return Err(Error::Corruption("metadata: invalid magic".into()));
        }
        if buf[4] != META_VERSION {
            return Err(Error::Corruption(format!(
                "metadata: unsupported version {}",
                buf[4]
            )));
        }
        let geometry = [
            (8usize, NODE_SIZE as u32, "node size"),
            (12, LEAF_FANOUT as u32, "leaf fanout"),
            (16, INTERNAL_FANOUT as u32, "internal fanout"),
            (20, BUCKETS as u32, "bucket count"),
            (24, EXACT_BUCKETS as u32, "exact bucket count"),
        ];
        for (off, expected, what) in geometry {
            let got = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            if got != expected {
                return Err(Error::Corruption(format!(
                    "metadata: {what} mismatch ({got} != {expected})"
                )));
            }
        }
        Ok(Self {
            source: SourceId {
                device: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
                inode: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
                ctime_sec: i64::from_le_bytes(buf[48..56].try_into().unwrap()),
                ctime_nsec: i64::from_le_bytes(buf[56..64].try_into().unwrap()),
            },
            indexed_bytes: u64::from_le_bytes(buf[64..72].try_into().unwrap()),
            total_lines: u64::from_le_bytes(buf[72..80].try_into().unwrap()),
            root_ref: u32::from_le_bytes(buf[80..84].try_into().unwrap()),
            height: u32::from_le_bytes(buf[84..88].try_into().unwrap()),
        })
    }
}

/// Read and validate the sidecar at `path`.
pub fn read(path: &Path) -> Result<Metadata> {
    let data = fs::read(path)?;
    Metadata::decode(&data)
}

/// Atomically publish `meta` at `path` (temp file + rename).
pub fn write(path: &Path, meta: &Metadata) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&meta.encode())?;
    f.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            source: SourceId {
                device: 66310,
                inode: 9_000_001,
                ctime_sec: 1_750_000_000,
                ctime_nsec: 987_654_321,
            },
            indexed_bytes: 1 << 40,
            total_lines: 1 << 33,
            root_ref: 12345,
            height: 4,
        }
    }

    #[test]
    fn publish_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(crate::cache::META_FILE);
        let meta = sample();
        write(&path, &meta).unwrap();
        assert_eq!(read(&path).unwrap(), meta);
        // Republishing replaces atomically.
        let mut newer = meta;
        newer.total_lines += 1;
        write(&path, &newer).unwrap();
        assert_eq!(read(&path).unwrap(), newer);
    }

    #[test]
    fn rejects_bad_magic_and_geometry() {
        let meta = sample();
        let mut buf = meta.encode();
        buf[0] = b'X';
        assert!(Metadata::decode(&buf).is_err());

        let mut buf = meta.encode();
        buf[8..12].copy_from_slice(&8192u32.to_le_bytes());
        let err = Metadata::decode(&buf).unwrap_err();
        assert!(err.to_string().contains("node size"));

        assert!(Metadata::decode(&buf[..64]).is_err());
    }
}
