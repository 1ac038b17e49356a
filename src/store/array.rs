//! Append-only fixed-record array over a memory-mapped file.
//!
//! Backs `widths.dat` (`u16` per line) and `positions.dat` (`u64` per
//! line). The file is grown in page-aligned chunks ahead of the write
//! cursor, so the on-disk size is capacity, not length; the metadata
//! sidecar carries the authoritative element count. A new element becomes
//! visible only after its bytes are in the mapping: the in-memory length
//! is published with a release store and read with acquire loads.

use crate::error::{Error, Result};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// File growth increment, a multiple of the page size.
const CHUNK_BYTES: u64 = 64 * 1024;

/// Fixed-width little-endian record element.
pub trait Record: Copy {
    /// Serialized size in bytes.
    const SIZE: usize;
    fn write_le(self, buf: &mut [u8]);
    fn read_le(buf: &[u8]) -> Self;
}

impl Record for u16 {
    const SIZE: usize = 2;

    fn write_le(self, buf: &mut [u8]) {
        buf[..2].copy_from_slice(&self.to_le_bytes());
    }

    fn read_le(buf: &[u8]) -> Self {
        u16::from_le_bytes(buf[..2].try_into().unwrap())
    }
}

impl Record for u64 {
    const SIZE: usize = 8;

    fn write_le(self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn read_le(buf: &[u8]) -> Self {
        u64::from_le_bytes(buf[..8].try_into().unwrap())
    }
}

/// Append-only mmap-backed array of fixed-size records.
pub struct PackedArray<T: Record> {
    file: File,
    map: MmapMut,
    /// Elements the current file size can hold.
    capacity: u64,
    /// Published element count; on-disk bytes beyond this are garbage.
    len: AtomicU64,
    _marker: PhantomData<T>,
}

impl<T: Record> PackedArray<T> {
    /// Open (or create) the array at `path`, trusting `len` elements from
    /// the metadata sidecar. Fails with `Corruption` if the file cannot
    /// hold that many.
    pub fn open(path: &Path, len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let mut size = file.metadata()?.len();
        if size < len * T::SIZE as u64 {
            return Err(Error::Corruption(format!(
                "{}: {size} bytes cannot hold {len} records",
                path.display()
            )));
        }
        if size == 0 {
            file.set_len(CHUNK_BYTES)?;
            size = CHUNK_BYTES;
        }
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            map,
            capacity: size / T::SIZE as u64,
            len: AtomicU64::new(len),
            _marker: PhantomData,
        })
    }

    /// Create the array at `path`, discarding any existing contents.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(CHUNK_BYTES)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            map,
            capacity: CHUNK_BYTES / T::SIZE as u64,
            len: AtomicU64::new(0),
            _marker: PhantomData,
        })
    }

    /// Published element count.
    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    /// Whether no elements are published.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one element. The file is extended before the new length is
    /// published, so a failed extension leaves the array unmodified.
    pub fn append(&mut self, value: T) -> Result<()> {
        let n = self.len.load(Ordering::Relaxed);
        if n == self.capacity {
            let new_size = self.capacity * T::SIZE as u64 + CHUNK_BYTES;
            self.file.set_len(new_size)?;
            self.map = unsafe { MmapMut::map_mut(&self.file)? };
            self.capacity = new_size / T::SIZE as u64;
        }
        let off = n as usize * T::SIZE;
        value.write_le(&mut self.map[off..off + T::SIZE]);
        self.len.store(n + 1, Ordering::Release);
        Ok(())
    }

    /// Read the element at `index`, bounds-checked against the published
    /// length.
    pub fn get(&self, index: u64) -> Result<T> {
        let len = self.len.load(Ordering::Acquire);
        if index >= len {
            return Err(Error::OutOfRange { index, len });
        }
        let off = index as usize * T::SIZE;
        Ok(T::read_le(&self.map[off..off + T::SIZE]))
    }

    /// Forget all elements. Capacity is kept; re-appends overwrite.
    pub fn reset(&mut self) {
        self.len.store(0, Ordering::Release);
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    /// Flush and trim the file to exactly `len` records, discarding the
    /// preallocated tail. Used on clean close; the next append re-extends.
    pub fn shrink_to_len(&mut self) -> Result<()> {
        self.map.flush()?;
        let exact = self.len.load(Ordering::Acquire) * T::SIZE as u64;
        self.file.set_len(exact)?;
        self.capacity = exact / T::SIZE as u64;
        Ok(())
    }
}
