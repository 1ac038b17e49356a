//! Top-level index: binds a log file to its width array, position array,
//! and wrap tree, and keeps them caught up with the source.
//!
//! Opening validates the cache against the source identity and either
//! restores the right spine or rebuilds from byte 0; both paths end with an
//! incremental catch-up to the source EOF. Rotation (identity change) and
//! truncation are detected on every update and trigger a silent rebuild;
//! the caller only ever sees a consistent index.

use crate::cache::{self, SourceId, META_FILE, NODES_FILE, POSITIONS_FILE, WIDTHS_FILE};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::format::meta::{self, Metadata};
use crate::store::array::PackedArray;
use crate::store::nodes::NodeStore;
use crate::tree::WrapTree;
use crate::view::DisplayView;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};

/// Initial read-buffer size for catch-up; doubles while a single line
/// exceeds it.
const READ_CHUNK: usize = 256 * 1024;

/// A log file with a persistent, incrementally-updated display index.
///
/// One writer and any number of same-process readers; queries take `&self`,
/// mutation takes `&mut self`. Dropping flushes best-effort; prefer
/// [`LogLogLog::close`] to also trim the cache files to their exact size.
pub struct LogLogLog {
    path: PathBuf,
    source: File,
    writer: Option<File>,
    identity: SourceId,
    cache_root: PathBuf,
    dir: PathBuf,
    widths: PackedArray<u16>,
    positions: PackedArray<u64>,
    tree: WrapTree,
    indexed_bytes: u64,
    opts: Options,
    closed: bool,
}

impl LogLogLog {
    /// Open `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Options::default())
    }

    /// Open `path`, creating or validating its cache, then catch up to the
    /// source EOF.
    pub fn open_with(path: impl AsRef<Path>, opts: Options) -> Result<Self> {
        let path = fs::canonicalize(path.as_ref())?;
        let _span = info_span!("LogLogLog::open", path = %path.display()).entered();

        let source = File::open(&path)?;
        let identity = SourceId::of(&source.metadata()?);
        let cache_root = match &opts.cache_dir {
            Some(dir) => dir.clone(),
            None => cache::default_root().ok_or_else(|| {
                Error::Io(std::io::Error::other("no platform cache directory"))
            })?,
        };
        let dir = cache::dir_for(&cache_root, &path, &identity);
        fs::create_dir_all(&dir)?;

        let source_len = source.metadata()?.len();
        let (widths, positions, tree, indexed_bytes) =
            match Self::restore(&dir, &identity, source_len) {
                Ok(parts) => parts,
                Err(err) => {
                    if dir.join(META_FILE).exists() {
                        warn!(%err, "cache invalid, rebuilding");
                    } else {
                        info!("creating new index");
                    }
                    let widths = PackedArray::create(&dir.join(WIDTHS_FILE))?;
                    let positions = PackedArray::create(&dir.join(POSITIONS_FILE))?;
                    let tree = WrapTree::create(NodeStore::create(&dir.join(NODES_FILE))?)?;
                    (widths, positions, tree, 0)
                }
            };

        let mut log = Self {
            path,
            source,
            writer: None,
            identity,
            cache_root,
            dir,
            widths,
            positions,
            tree,
            indexed_bytes,
            opts,
            closed: false,
        };
        log.update()?;
        Ok(log)
    }

    /// Try to reuse the cache in `dir` for a source with `identity`.
    fn restore(
        dir: &Path,
        identity: &SourceId,
        source_len: u64,
    ) -> Result<(PackedArray<u16>, PackedArray<u64>, WrapTree, u64)> {
        let m = meta::read(&dir.join(META_FILE))?;
        if m.source != *identity {
            return Err(Error::Corruption("source identity changed".into()));
        }
        if m.indexed_bytes > source_len {
            return Err(Error::Corruption("source shrank below indexed length".into()));
        }
        let widths = PackedArray::open(&dir.join(WIDTHS_FILE), m.total_lines)?;
        let positions = PackedArray::open(&dir.join(POSITIONS_FILE), m.total_lines)?;
        let store = NodeStore::open(&dir.join(NODES_FILE))?;
        let tree = WrapTree::load(store, m.root_ref, m.height, m.total_lines)?;
        debug!(
            lines = m.total_lines,
            bytes = m.indexed_bytes,
            "restored index"
        );
        Ok((widths, positions, tree, m.indexed_bytes))
    }

    /// Catch the index up to the source EOF and publish the new state.
    pub fn update(&mut self) -> Result<()> {
        self.catch_up()?;
        self.flush()
    }

    fn catch_up(&mut self) -> Result<()> {
        let stat = fs::metadata(&self.path)?;
        let id = SourceId::of(&stat);
        if !id.same_file(&self.identity) {
            info!("source rotated, rebuilding in a fresh cache directory");
            self.source = File::open(&self.path)?;
            self.writer = None;
            self.identity = id;
            let dir = cache::dir_for(&self.cache_root, &self.path, &id);
            fs::create_dir_all(&dir)?;
            self.dir = dir;
            self.widths = PackedArray::create(&self.dir.join(WIDTHS_FILE))?;
            self.positions = PackedArray::create(&self.dir.join(POSITIONS_FILE))?;
            self.tree = WrapTree::create(NodeStore::create(&self.dir.join(NODES_FILE))?)?;
            self.indexed_bytes = 0;
        } else if stat.len() < self.indexed_bytes {
            info!(
                size = stat.len(),
                indexed = self.indexed_bytes,
                "source truncated, rebuilding"
            );
            self.identity = id;
            self.widths.reset();
            self.positions.reset();
            self.tree.reset()?;
            self.indexed_bytes = 0;
        } else {
            // Growth only moves ctime forward; absorb it so the identity
            // snapshot stays current for the next flush.
            self.identity = id;
        }

        let mut buf = vec![0u8; READ_CHUNK];
        let mut new_lines = 0u64;
        loop {
            let n = read_at_fully(&self.source, &mut buf, self.indexed_bytes)?;
            if n == 0 {
                break;
            }
            let lines = (self.opts.split_fn)(&buf[..n]);
            if lines.is_empty() {
                if n == buf.len() {
                    // A single line larger than the buffer; widen and retry.
                    buf.resize(buf.len() * 2, 0);
                    continue;
                }
                break;
            }
            for line in &lines {
                let w = (self.opts.width_fn)(&line.text);
                self.positions.append(self.indexed_bytes)?;
                self.widths.append(w)?;
                self.tree.append(w)?;
                self.indexed_bytes += line.byte_len as u64;
            }
            new_lines += lines.len() as u64;
        }
        if new_lines > 0 {
            debug!(new_lines, bytes = self.indexed_bytes, "caught up");
        }
        Ok(())
    }

    /// Persist the spine and publish metadata. If the source identity has
    /// advanced (self-appends move ctime), the cache directory is renamed
    /// to the new fingerprint so the next open finds it.
    pub fn flush(&mut self) -> Result<()> {
        self.widths.flush()?;
        self.positions.flush()?;
        self.tree.flush()?;

        let target = cache::dir_for(&self.cache_root, &self.path, &self.identity);
        if target != self.dir {
            if target.exists() {
                fs::remove_dir_all(&target)?;
            }
            fs::rename(&self.dir, &target)?;
            self.dir = target;
        }
        meta::write(
            &self.dir.join(META_FILE),
            &Metadata {
                source: self.identity,
                indexed_bytes: self.indexed_bytes,
                total_lines: self.tree.len(),
                root_ref: self.tree.root_ref(),
                height: self.tree.height(),
            },
        )
    }

    /// Append a line to the source file and index it. A `\n` terminator is
    /// added. Metadata is not published per call; use [`LogLogLog::flush`],
    /// [`LogLogLog::update`], or [`LogLogLog::close`].
    pub fn append(&mut self, text: &str) -> Result<()> {
        self.catch_up()?;
        if self.writer.is_none() {
            self.writer = Some(OpenOptions::new().append(true).open(&self.path)?);
        }
        let writer = self.writer.as_mut().expect("writer opened above");
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');
        writer.write_all(&bytes)?;
        self.catch_up()
    }

    /// Number of indexed logical lines.
    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    /// Whether no lines are indexed.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Read logical line `line` from the source, terminator stripped.
    pub fn get(&self, line: u64) -> Result<String> {
        let len = self.len();
        if line >= len {
            return Err(Error::OutOfRange { index: line, len });
        }
        let start = self.positions.get(line)?;
        let end = if line + 1 < len {
            self.positions.get(line + 1)?
        } else {
            self.indexed_bytes
        };
        let mut data = vec![0u8; (end - start) as usize];
        self.source.read_exact_at(&mut data, start)?;
        if data.last() == Some(&b'\n') {
            data.pop();
            if data.last() == Some(&b'\r') {
                data.pop();
            }
        }
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Stored display width of logical line `line`.
    pub fn width_of(&self, line: u64) -> Result<u16> {
        self.widths.get(line)
    }

    /// Total display rows at terminal width `width`. Exact for any width.
    pub fn rows_at(&self, width: u16) -> Result<u64> {
        self.tree.rows_at(width)
    }

    /// Line containing absolute display row `row` at `width`, with the row
    /// offset inside that line.
    pub fn locate(&self, width: u16, row: u64) -> Result<(u64, u64)> {
        self.tree.locate(width, row)
    }

    /// Absolute display row at which logical line `line` starts at `width`.
    pub fn row_of(&self, width: u16, line: u64) -> Result<u64> {
        self.tree.row_of(width, line)
    }

    /// A row-addressable view at terminal width `width`, covering display
    /// rows `start..end` (end clamped to the total; `None` means the end of
    /// the log). The view is a snapshot of the current row count.
    pub fn at(&self, width: u16, start: u64, end: Option<u64>) -> Result<DisplayView<'_>> {
        DisplayView::new(self, width, start, end)
    }

    /// The last `n` display rows at terminal width `width`.
    pub fn tail_rows(&self, width: u16, n: u64) -> Result<Vec<String>> {
        let total = self.rows_at(width)?;
        let view = self.at(width, total.saturating_sub(n), None)?;
        view.iter().collect()
    }

    /// Flush, trim cache files to their exact size, and consume the index.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.widths.shrink_to_len()?;
        self.positions.shrink_to_len()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for LogLogLog {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.flush() {
                warn!(%err, "flush on drop failed");
            }
        }
    }
}

/// Read as much of `buf` as is available at `offset`, tolerating short
/// reads. Returns the number of bytes read (0 at EOF).
fn read_at_fully(file: &File, buf: &mut [u8], offset: u64) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
