//! Packed on-disk tree node, one fixed-size record per node.
//!
//! Nodes are written sequentially into the node store and, once their
//! subtree is complete, never touched again; only right-spine nodes are
//! rewritten in place as they fill.
//!
//! ## Wire layout (4096 bytes, little-endian)
//!
//! ```text
//! kind:      u8    [0]       0 = leaf, 1 = internal
//! _pad:      u8    [1]
//! count:     u16   [2..4]    entries in use
//! _reserved: u32   [4..8]
//! Leaf payload:     count × u16 line widths            (fanout 2044)
//! Internal payload: count × 524-byte child entries     (fanout 7)
//!   child_ref:   u32   node index in the store
//!   child_lines: u32   logical lines beneath the child
//!   child_hist:  516B  width histogram of those lines
//! ```

use crate::error::{Error, Result};
use crate::histogram::{Histogram, HIST_WIRE_SIZE};

/// On-disk size of every node record.
pub const NODE_SIZE: usize = 4096;

/// Bytes of header before the payload.
pub const NODE_HEADER: usize = 8;

/// Maximum widths per leaf node.
pub const LEAF_FANOUT: usize = (NODE_SIZE - NODE_HEADER) / 2;

/// Serialized size of one internal child entry.
pub const ENTRY_SIZE: usize = 4 + 4 + HIST_WIRE_SIZE;

/// Maximum child entries per internal node.
pub const INTERNAL_FANOUT: usize = (NODE_SIZE - NODE_HEADER) / ENTRY_SIZE;

const KIND_LEAF: u8 = 0;
const KIND_INTERNAL: u8 = 1;

const _: () = assert!(LEAF_FANOUT == 2044);
const _: () = assert!(ENTRY_SIZE == 524);
const _: () = assert!(INTERNAL_FANOUT == 7);
const _: () = assert!(NODE_HEADER + LEAF_FANOUT * 2 == NODE_SIZE);
const _: () = assert!(NODE_HEADER + INTERNAL_FANOUT * ENTRY_SIZE <= NODE_SIZE);

/// One child of an internal node: a frozen (or right-spine) subtree
/// summarized by its line count and width histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    /// Node index of the child in the node store.
    pub child: u32,
    /// Logical lines beneath the child.
    pub lines: u32,
    /// Width histogram of those lines.
    pub hist: Histogram,
}

impl ChildEntry {
    /// A zeroed entry for a freshly opened right-spine child.
    pub fn open(child: u32) -> Self {
        Self {
            child,
            lines: 0,
            hist: Histogram::new(),
        }
    }
}

/// Decoded node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// One width per logical line in this leaf, in line order.
    Leaf(Vec<u16>),
    /// Child subtrees in line order.
    Internal(Vec<ChildEntry>),
}

/// Serialize a leaf node into a record buffer.
pub fn encode_leaf(widths: &[u16], buf: &mut [u8; NODE_SIZE]) {
    debug_assert!(widths.len() <= LEAF_FANOUT);
    buf.fill(0);
    buf[0] = KIND_LEAF;
    buf[2..4].copy_from_slice(&(widths.len() as u16).to_le_bytes());
    for (i, &w) in widths.iter().enumerate() {
        let off = NODE_HEADER + i * 2;
        buf[off..off + 2].copy_from_slice(&w.to_le_bytes());
    }
}

/// Serialize an internal node into a record buffer.
pub fn encode_internal(entries: &[ChildEntry], buf: &mut [u8; NODE_SIZE]) {
    debug_assert!(!entries.is_empty() && entries.len() <= INTERNAL_FANOUT);
    buf.fill(0);
    buf[0] = KIND_INTERNAL;
    buf[2..4].copy_from_slice(&(entries.len() as u16).to_le_bytes());
    for (i, e) in entries.iter().enumerate() {
        let off = NODE_HEADER + i * ENTRY_SIZE;
        buf[off..off + 4].copy_from_slice(&e.child.to_le_bytes());
        buf[off + 4..off + 8].copy_from_slice(&e.lines.to_le_bytes());
        e.hist.write_le(&mut buf[off + 8..off + ENTRY_SIZE]);
    }
}

/// Decode a node record. Validates kind and count bounds; a leaf may be
/// empty (the transient single-leaf root of an empty index), an internal
/// node may not.
pub fn decode(buf: &[u8]) -> Result<Node> {
    if buf.len() < NODE_SIZE {
        return Err(Error::Corruption(format!(
            "node record truncated: {} bytes",
            buf.len()
        )));
    }
    let kind = buf[0];
    let count = u16::from_le_bytes(buf[2..4].try_into().unwrap()) as usize;
    match kind {
        KIND_LEAF => {
            if count > LEAF_FANOUT {
                return Err(Error::Corruption(format!(
                    "leaf count {count} exceeds fanout {LEAF_FANOUT}"
                )));
            }
            let mut widths = Vec::with_capacity(count);
            for i in 0..count {
                let off = NODE_HEADER + i * 2;
                widths.push(u16::from_le_bytes(buf[off..off + 2].try_into().unwrap()));
            }
            Ok(Node::Leaf(widths))
        }
        KIND_INTERNAL => {
            if count == 0 || count > INTERNAL_FANOUT {
                return Err(Error::Corruption(format!(
                    "internal count {count} outside [1, {INTERNAL_FANOUT}]"
                )));
            }
            let mut entries = Vec::with_capacity(count);
            for i in 0..count {
                let off = NODE_HEADER + i * ENTRY_SIZE;
                entries.push(ChildEntry {
                    child: u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()),
                    lines: u32::from_le_bytes(buf[off + 4..off + 8].try_into().unwrap()),
                    hist: Histogram::read_le(&buf[off + 8..off + ENTRY_SIZE]),
                });
            }
            Ok(Node::Internal(entries))
        }
        other => Err(Error::Corruption(format!("unknown node kind {other}"))),
    }
}
