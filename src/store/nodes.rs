//! Fixed-record node store over a memory-mapped file.
//!
//! `nodes.dat` is a flat sequence of [`NODE_SIZE`]-byte records; a node
//! ref is simply its record index, and the file length always equals
//! `count * NODE_SIZE`. Records are appended by [`NodeStore::allocate`]
//! and, for right-spine nodes only, rewritten in place; everything else is
//! frozen once written.

use crate::error::{Error, Result};
use crate::format::node::NODE_SIZE;
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Append-only store of fixed-size node records.
pub struct NodeStore {
    file: File,
    /// None until the first record exists (a zero-length file cannot be
    /// mapped).
    map: Option<MmapMut>,
    count: u32,
}

impl NodeStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();
        if size % NODE_SIZE as u64 != 0 {
            return Err(Error::Corruption(format!(
                "{}: size {size} is not a multiple of the node size",
                path.display()
            )));
        }
        let count = (size / NODE_SIZE as u64) as u32;
        let map = if size > 0 {
            Some(unsafe { MmapMut::map_mut(&file)? })
        } else {
            None
        };
        Ok(Self { file, map, count })
    }

    /// Open the store at `path`, discarding any existing records.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            map: None,
            count: 0,
        })
    }

    /// Number of records in the store.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Append a zeroed record, returning its ref.
    pub fn allocate(&mut self) -> Result<u32> {
        let r = self.count;
        self.file
            .set_len((r as u64 + 1) * NODE_SIZE as u64)?;
        self.map = Some(unsafe { MmapMut::map_mut(&self.file)? });
        self.count = r + 1;
        Ok(r)
    }

    /// Rewrite the record at `node` in place.
    pub fn write(&mut self, node: u32, buf: &[u8; NODE_SIZE]) -> Result<()> {
        if node >= self.count {
            return Err(Error::Corruption(format!(
                "node ref {node} beyond store count {}",
                self.count
            )));
        }
        let map = self.map.as_mut().expect("count > 0 implies a mapping");
        let off = node as usize * NODE_SIZE;
        map[off..off + NODE_SIZE].copy_from_slice(buf);
        Ok(())
    }

    /// Borrow the record at `node` from the mapping.
    pub fn read(&self, node: u32) -> Result<&[u8]> {
        if node >= self.count {
            return Err(Error::Corruption(format!(
                "node ref {node} beyond store count {}",
                self.count
            )));
        }
        let map = self.map.as_ref().expect("count > 0 implies a mapping");
        let off = node as usize * NODE_SIZE;
        Ok(&map[off..off + NODE_SIZE])
    }

    /// Drop all records for a rebuild.
    pub fn reset(&mut self) -> Result<()> {
        self.map = None;
        self.file.set_len(0)?;
        self.count = 0;
        Ok(())
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        if let Some(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }
}
