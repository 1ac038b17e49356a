//! The wrap tree: an append-only positional B-tree whose internal entries
//! carry width histograms.
//!
//! Lines are keyed by position, so the tree never compares, rotates, or
//! rebalances: appends touch only the right spine (the path from the root
//! to the rightmost leaf), and every node left of that path is frozen in
//! the node store. Each spine node is allocated its store slot at birth and
//! rewritten in place until it fills, at which point it is sealed and a
//! fresh sibling opens to its right.
//!
//! Queries descend from the root summing exact per-child row counts. A
//! child whose histogram is exact for the query width is answered from the
//! summary; otherwise the descent refines by expanding the child, and
//! leaves always answer exactly from individual widths.

use crate::error::{Error, Result};
use crate::format::node::{
    decode, encode_internal, encode_leaf, ChildEntry, Node, INTERNAL_FANOUT, LEAF_FANOUT,
    NODE_SIZE,
};
use crate::histogram::Histogram;
use crate::store::nodes::NodeStore;
use crate::wrap::rows;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// The mutable rightmost leaf.
struct SpineLeaf {
    slot: u32,
    widths: Vec<u16>,
}

/// A mutable internal node on the right spine. The last entry always
/// summarizes the open child one level below.
struct SpineInternal {
    slot: u32,
    entries: Vec<ChildEntry>,
}

/// Either a live spine node or a frozen node decoded from the store.
enum NodeView<'t> {
    Leaf(Cow<'t, [u16]>),
    Internal(Cow<'t, [ChildEntry]>),
}

/// Append-only positional B-tree over per-line display widths.
pub struct WrapTree {
    store: NodeStore,
    leaf: SpineLeaf,
    /// Spine internals, bottom-up: `internals[0]` is the leaf's parent.
    internals: Vec<SpineInternal>,
    total: AtomicU64,
}

fn leaf_summary(slot: u32, widths: &[u16]) -> ChildEntry {
    let mut hist = Histogram::new();
    for &w in widths {
        hist.add(w);
    }
    ChildEntry {
        child: slot,
        lines: widths.len() as u32,
        hist,
    }
}

fn internal_summary(slot: u32, entries: &[ChildEntry]) -> ChildEntry {
    let mut hist = Histogram::new();
    let mut lines = 0u32;
    for e in entries {
        lines += e.lines;
        hist.merge(&e.hist);
    }
    ChildEntry {
        child: slot,
        lines,
        hist,
    }
}

impl WrapTree {
    /// Create an empty tree over a fresh node store.
    pub fn create(mut store: NodeStore) -> Result<Self> {
        let slot = store.allocate()?;
        Ok(Self {
            store,
            leaf: SpineLeaf {
                slot,
                widths: Vec::new(),
            },
            internals: Vec::new(),
            total: AtomicU64::new(0),
        })
    }

    /// Restore a tree from a flushed store by walking the rightmost path
    /// from `root_ref` and rebuilding the in-memory spine.
    ///
    /// The spine leaf is trimmed to the line count the metadata vouches
    /// for (the store may carry a few extra appends from a flush that
    /// never published), and every spine internal's last entry is
    /// recomputed from the child below it.
    pub fn load(store: NodeStore, root_ref: u32, height: u32, total: u64) -> Result<Self> {
        if height == 0 {
            return Err(Error::Corruption("tree height 0".into()));
        }

        // Walk the rightmost path top-down.
        let mut internals_top_down: Vec<SpineInternal> = Vec::new();
        let mut slot = root_ref;
        for _ in 1..height {
            match decode(store.read(slot)?)? {
                Node::Internal(entries) => {
                    let next = entries.last().expect("internal nodes are never empty").child;
                    internals_top_down.push(SpineInternal { slot, entries });
                    slot = next;
                }
                Node::Leaf(_) => {
                    return Err(Error::Corruption(format!(
                        "leaf node {slot} above leaf level"
                    )));
                }
            }
        }
        let mut leaf = match decode(store.read(slot)?)? {
            Node::Leaf(widths) => SpineLeaf { slot, widths },
            Node::Internal(_) => {
                return Err(Error::Corruption(format!(
                    "internal node {slot} at leaf level"
                )));
            }
        };
        internals_top_down.reverse();
        let mut internals = internals_top_down;

        // Lines frozen left of the spine path, at all levels.
        let frozen: u64 = internals
            .iter()
            .flat_map(|n| n.entries[..n.entries.len() - 1].iter())
            .map(|e| e.lines as u64)
            .sum();
        let expected_leaf = total
            .checked_sub(frozen)
            .ok_or_else(|| Error::Corruption("frozen line count exceeds total".into()))?;
        if expected_leaf > leaf.widths.len() as u64 {
            return Err(Error::Corruption(format!(
                "spine leaf holds {} lines, expected {expected_leaf}",
                leaf.widths.len()
            )));
        }
        leaf.widths.truncate(expected_leaf as usize);

        // Recompute each spine internal's last entry bottom-up.
        let mut below = leaf_summary(leaf.slot, &leaf.widths);
        for node in internals.iter_mut() {
            let last = node.entries.last_mut().expect("internal nodes are never empty");
            if last.child != below.child {
                return Err(Error::Corruption(format!(
                    "spine entry points at node {}, expected {}",
                    last.child, below.child
                )));
            }
            *last = below;
            below = internal_summary(node.slot, &node.entries);
        }
        if below.lines as u64 != total {
            return Err(Error::Corruption(format!(
                "root covers {} lines, metadata says {total}",
                below.lines
            )));
        }

        debug!(total, height, root_ref, "restored wrap tree spine");
        Ok(Self {
            store,
            leaf,
            internals,
            total: AtomicU64::new(total),
        })
    }

    /// Number of indexed lines.
    pub fn len(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Whether any lines are indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store ref of the current root node.
    pub fn root_ref(&self) -> u32 {
        self.internals.last().map_or(self.leaf.slot, |n| n.slot)
    }

    /// Tree height; 1 while the root is the single leaf.
    pub fn height(&self) -> u32 {
        self.internals.len() as u32 + 1
    }

    /// Append the width of the next logical line.
    pub fn append(&mut self, w: u16) -> Result<()> {
        if self.leaf.widths.len() == LEAF_FANOUT {
            let summary = leaf_summary(self.leaf.slot, &self.leaf.widths);
            let mut buf = [0u8; NODE_SIZE];
            encode_leaf(&self.leaf.widths, &mut buf);
            self.store.write(self.leaf.slot, &buf)?;

            let slot = self.store.allocate()?;
            self.leaf = SpineLeaf {
                slot,
                widths: Vec::with_capacity(LEAF_FANOUT),
            };
            self.open_child_at(1, slot, summary)?;
        }

        self.leaf.widths.push(w);
        for node in &mut self.internals {
            let last = node.entries.last_mut().expect("internal nodes are never empty");
            last.lines += 1;
            last.hist.add(w);
        }
        let n = self.total.load(Ordering::Relaxed);
        self.total.store(n + 1, Ordering::Release);
        Ok(())
    }

    /// Register a freshly opened spine node at `level - 1` with its parent,
    /// sealing full ancestors and growing the root as needed. `sealed` is
    /// the summary of the node the fresh one replaces, used when the sealed
    /// node was the root and the tree gains a level.
    fn open_child_at(&mut self, level: usize, fresh_slot: u32, sealed: ChildEntry) -> Result<()> {
        if level - 1 < self.internals.len() {
            if self.internals[level - 1].entries.len() == INTERNAL_FANOUT {
                let node = &self.internals[level - 1];
                let summary = internal_summary(node.slot, &node.entries);
                let mut buf = [0u8; NODE_SIZE];
                encode_internal(&node.entries, &mut buf);
                self.store.write(node.slot, &buf)?;

                let slot = self.store.allocate()?;
                self.internals[level - 1] = SpineInternal {
                    slot,
                    entries: Vec::with_capacity(INTERNAL_FANOUT),
                };
                self.open_child_at(level + 1, slot, summary)?;
            }
            self.internals[level - 1]
                .entries
                .push(ChildEntry::open(fresh_slot));
        } else {
            // The sealed node was the root; grow the tree by one level.
            let slot = self.store.allocate()?;
            self.internals.push(SpineInternal {
                slot,
                entries: vec![sealed, ChildEntry::open(fresh_slot)],
            });
        }
        Ok(())
    }

    /// Total display rows across all lines at terminal width `width`.
    /// Exact for every width; a zero width displays nothing.
    pub fn rows_at(&self, width: u16) -> Result<u64> {
        if width == 0 || self.is_empty() {
            return Ok(0);
        }
        self.subtree_rows(self.internals.len(), self.root_ref(), width)
    }

    /// Line containing display row `row` at `width`, and the row offset
    /// within that line.
    pub fn locate(&self, width: u16, row: u64) -> Result<(u64, u64)> {
        let total = self.rows_at(width)?;
        if row >= total {
            return Err(Error::OutOfRange {
                index: row,
                len: total,
            });
        }

        let mut level = self.internals.len();
        let mut slot = self.root_ref();
        let mut remaining = row;
        let mut base_line = 0u64;
        loop {
            match self.node_view(level, slot)? {
                NodeView::Leaf(widths) => {
                    for (j, &w) in widths.iter().enumerate() {
                        let r = rows(w, width);
                        if remaining < r {
                            return Ok((base_line + j as u64, remaining));
                        }
                        remaining -= r;
                    }
                    return Err(Error::Corruption(format!(
                        "row {row} not found under leaf {slot}"
                    )));
                }
                NodeView::Internal(entries) => {
                    let mut next = None;
                    for e in entries.iter() {
                        let r = self.entry_rows(level - 1, e, width)?;
                        if remaining < r {
                            next = Some(e.child);
                            break;
                        }
                        remaining -= r;
                        base_line += e.lines as u64;
                    }
                    slot = next.ok_or_else(|| {
                        Error::Corruption(format!("row {row} not found under node {slot}"))
                    })?;
                    level -= 1;
                }
            }
        }
    }

    /// Display row at which logical line `line` starts at `width`.
    pub fn row_of(&self, width: u16, line: u64) -> Result<u64> {
        let total = self.len();
        if line >= total {
            return Err(Error::OutOfRange {
                index: line,
                len: total,
            });
        }
        if width == 0 {
            return Ok(0);
        }

        let mut level = self.internals.len();
        let mut slot = self.root_ref();
        let mut remaining = line;
        let mut row = 0u64;
        loop {
            match self.node_view(level, slot)? {
                NodeView::Leaf(widths) => {
                    for &w in widths.iter().take(remaining as usize) {
                        row += rows(w, width);
                    }
                    return Ok(row);
                }
                NodeView::Internal(entries) => {
                    let mut next = None;
                    for e in entries.iter() {
                        if remaining < e.lines as u64 {
                            next = Some(e.child);
                            break;
                        }
                        remaining -= e.lines as u64;
                        row += self.entry_rows(level - 1, e, width)?;
                    }
                    slot = next.ok_or_else(|| {
                        Error::Corruption(format!("line {line} not found under node {slot}"))
                    })?;
                    level -= 1;
                }
            }
        }
    }

    /// Persist the current right spine into its store slots.
    pub fn flush(&mut self) -> Result<()> {
        let mut buf = [0u8; NODE_SIZE];
        encode_leaf(&self.leaf.widths, &mut buf);
        self.store.write(self.leaf.slot, &buf)?;
        for node in &self.internals {
            encode_internal(&node.entries, &mut buf);
            self.store.write(node.slot, &buf)?;
        }
        self.store.flush()
    }

    /// Discard everything for a rebuild from line 0.
    pub fn reset(&mut self) -> Result<()> {
        self.store.reset()?;
        let slot = self.store.allocate()?;
        self.leaf = SpineLeaf {
            slot,
            widths: Vec::new(),
        };
        self.internals.clear();
        self.total.store(0, Ordering::Release);
        Ok(())
    }

    /// Exact display rows under one child entry, answering from the
    /// histogram when it is exact for `width` and expanding the subtree
    /// otherwise.
    fn entry_rows(&self, child_level: usize, entry: &ChildEntry, width: u16) -> Result<u64> {
        match entry.hist.rows_exact(width) {
            Some(r) => Ok(r),
            None => self.subtree_rows(child_level, entry.child, width),
        }
    }

    fn subtree_rows(&self, level: usize, slot: u32, width: u16) -> Result<u64> {
        match self.node_view(level, slot)? {
            NodeView::Leaf(widths) => Ok(widths.iter().map(|&w| rows(w, width)).sum()),
            NodeView::Internal(entries) => {
                let mut total = 0u64;
                for e in entries.iter() {
                    total += self.entry_rows(level - 1, e, width)?;
                }
                Ok(total)
            }
        }
    }

    /// Resolve a node ref at a given level, preferring the live spine node
    /// over its (possibly stale) store slot.
    fn node_view(&self, level: usize, slot: u32) -> Result<NodeView<'_>> {
        if level == 0 {
            if slot == self.leaf.slot {
                return Ok(NodeView::Leaf(Cow::Borrowed(&self.leaf.widths)));
            }
        } else if let Some(node) = self.internals.get(level - 1) {
            if node.slot == slot {
                return Ok(NodeView::Internal(Cow::Borrowed(&node.entries)));
            }
        }
        match decode(self.store.read(slot)?)? {
            Node::Leaf(widths) if level == 0 => Ok(NodeView::Leaf(Cow::Owned(widths))),
            Node::Internal(entries) if level > 0 => Ok(NodeView::Internal(Cow::Owned(entries))),
            _ => Err(Error::Corruption(format!(
                "node {slot} has the wrong kind for level {level}"
            ))),
        }
    }
}
