//! Fixed-bucket width histogram carried by internal tree nodes.
//!
//! A histogram summarizes the multiset of line widths beneath a subtree so
//! that per-terminal-width row counts can be answered without visiting
//! leaves. The layout is hybrid: widths below [`EXACT_BUCKETS`] each get a
//! single-width bucket (always exact), the rest fall into power-of-two
//! ranges `[32,63], [64,127], …, [32768,65535]`.
//!
//! Row counts derived from a histogram are exact whenever every populated
//! range bucket lies entirely below the query width, which for realistic
//! terminal widths is nearly always. When a populated range bucket straddles
//! the query width the histogram cannot answer exactly and callers refine
//! by descending into the subtree instead.
//!
//! ## Wire layout (516 bytes, little-endian)
//!
//! ```text
//! For each of the 43 buckets:
//!   count: u32   lines whose width falls in the bucket
//!   sum:   u64   total width of those lines
//! ```

use crate::wrap::rows;

/// Number of leading single-width buckets (widths `0..EXACT_BUCKETS`).
pub const EXACT_BUCKETS: usize = 32;

/// Total bucket count: 32 exact plus 11 power-of-two ranges up to 65535.
pub const BUCKETS: usize = 43;

/// Serialized size of a histogram in node entries.
pub const HIST_WIRE_SIZE: usize = BUCKETS * 12;

const _: () = assert!(EXACT_BUCKETS == 32);
const _: () = assert!(BUCKETS == EXACT_BUCKETS + 11);

/// Bucket index for a line width.
#[inline]
fn bucket_of(w: u16) -> usize {
    if (w as usize) < EXACT_BUCKETS {
        w as usize
    } else {
        EXACT_BUCKETS + (w.ilog2() as usize - 5)
    }
}

/// Inclusive `(lo, hi)` width range of a bucket.
#[inline]
fn bucket_range(i: usize) -> (u16, u16) {
    if i < EXACT_BUCKETS {
        (i as u16, i as u16)
    } else {
        let k = i - EXACT_BUCKETS + 5;
        (1u16 << k, (((1u32 << (k + 1)) - 1).min(u16::MAX as u32)) as u16)
    }
}

/// Mergeable summary of a multiset of line widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: [u32; BUCKETS],
    sums: [u64; BUCKETS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    /// An empty histogram.
    pub fn new() -> Self {
        Self {
            counts: [0; BUCKETS],
            sums: [0; BUCKETS],
        }
    }

    /// Record one line of width `w`.
    pub fn add(&mut self, w: u16) {
        let b = bucket_of(w);
        self.counts[b] += 1;
        self.sums[b] += w as u64;
    }

    /// Add every line of `other` into `self`.
    pub fn merge(&mut self, other: &Histogram) {
        for i in 0..BUCKETS {
            self.counts[i] += other.counts[i];
            self.sums[i] += other.sums[i];
        }
    }

    /// Remove every line of `other` from `self`. `other` must be a subset.
    pub fn unmerge(&mut self, other: &Histogram) {
        for i in 0..BUCKETS {
            debug_assert!(self.counts[i] >= other.counts[i]);
            debug_assert!(self.sums[i] >= other.sums[i]);
            self.counts[i] -= other.counts[i];
            self.sums[i] -= other.sums[i];
        }
    }

    /// Total number of recorded lines.
    pub fn lines(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Whether no lines are recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// Exact total display rows at terminal width `width`, or `None` when a
    /// populated range bucket straddles `width` and the answer would carry
    /// error. Callers fall back to descending the subtree in that case.
    pub fn rows_exact(&self, width: u16) -> Option<u64> {
        let mut total = 0u64;
        for i in 0..BUCKETS {
            let c = self.counts[i];
            if c == 0 {
                continue;
            }
            let (lo, hi) = bucket_range(i);
            if lo == hi {
                total += c as u64 * rows(lo, width);
            } else if hi < width {
                total += c as u64;
            } else {
                return None;
            }
        }
        Some(total)
    }

    /// Estimated total display rows at terminal width `width`.
    ///
    /// Equals the exact count whenever [`Histogram::rows_exact`] is `Some`.
    /// Otherwise each straddling bucket contributes
    /// `count + (sum - count) / width`, which bounds the true count from
    /// above by less than `count` rows.
    pub fn rows_estimate(&self, width: u16) -> u64 {
        if width == 0 {
            return 0;
        }
        let mut total = 0u64;
        for i in 0..BUCKETS {
            let c = self.counts[i] as u64;
            if c == 0 {
                continue;
            }
            let (lo, hi) = bucket_range(i);
            if lo == hi {
                total += c * rows(lo, width);
            } else if hi < width {
                total += c;
            } else {
                total += c + self.sums[i].saturating_sub(c) / width as u64;
            }
        }
        total
    }

    /// Serialize into `buf` (at least [`HIST_WIRE_SIZE`] bytes).
    pub fn write_le(&self, buf: &mut [u8]) {
        for i in 0..BUCKETS {
            let off = i * 12;
            buf[off..off + 4].copy_from_slice(&self.counts[i].to_le_bytes());
            buf[off + 4..off + 12].copy_from_slice(&self.sums[i].to_le_bytes());
        }
    }

    /// Deserialize from `buf` (at least [`HIST_WIRE_SIZE`] bytes).
    pub fn read_le(buf: &[u8]) -> Self {
        let mut h = Self::new();
        for i in 0..BUCKETS {
            let off = i * 12;
            h.counts[i] = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            h.sums[i] = u64::from_le_bytes(buf[off + 4..off + 12].try_into().unwrap());
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_rows(widths: &[u16], width: u16) -> u64 {
        widths.iter().map(|&w| rows(w, width)).sum()
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(bucket_of(0), 0);
        assert_eq!(bucket_of(31), 31);
        assert_eq!(bucket_of(32), 32);
        assert_eq!(bucket_of(63), 32);
        assert_eq!(bucket_of(64), 33);
        assert_eq!(bucket_of(65535), BUCKETS - 1);
        for i in 0..BUCKETS {
            let (lo, hi) = bucket_range(i);
            assert_eq!(bucket_of(lo), i);
            assert_eq!(bucket_of(hi), i);
        }
        assert_eq!(bucket_range(BUCKETS - 1), (32768, 65535));
    }

    #[test]
    fn exact_when_all_buckets_below_width() {
        let widths = [0u16, 5, 31, 40, 63, 100, 127];
        let mut h = Histogram::new();
        for &w in &widths {
            h.add(w);
        }
        // 128 clears every populated bucket ([64,127] included).
        for width in [128u16, 200, 1000] {
            assert_eq!(h.rows_exact(width), Some(brute_rows(&widths, width)));
            assert_eq!(h.rows_estimate(width), brute_rows(&widths, width));
        }
        // 80 straddles [64,127].
        assert_eq!(h.rows_exact(80), None);
    }

    #[test]
    fn exact_buckets_always_exact() {
        let widths = [0u16, 1, 2, 3, 30, 31];
        let mut h = Histogram::new();
        for &w in &widths {
            h.add(w);
        }
        for width in 1..=64u16 {
            assert_eq!(h.rows_exact(width), Some(brute_rows(&widths, width)));
        }
    }

    #[test]
    fn estimate_bounds_truth_from_above() {
        let widths = [33u16, 40, 47, 63, 200, 500, 4000];
        let mut h = Histogram::new();
        for &w in &widths {
            h.add(w);
        }
        for width in [1u16, 2, 10, 33, 40, 64, 100, 300] {
            let truth = brute_rows(&widths, width);
            let est = h.rows_estimate(width);
            assert!(est >= truth, "width {width}: est {est} < truth {truth}");
            assert!(
                est - truth < widths.len() as u64,
                "width {width}: est {est} too far above {truth}"
            );
        }
    }

    #[test]
    fn merge_unmerge_roundtrip() {
        let mut a = Histogram::new();
        let mut b = Histogram::new();
        for w in [0u16, 10, 100, 5000] {
            a.add(w);
        }
        for w in [3u16, 100, 65535] {
            b.add(w);
        }
        let a_orig = a.clone();
        a.merge(&b);
        assert_eq!(a.lines(), 7);
        // The top bucket reaches 65535, so no u16 width clears it once a
        // 65535-wide line is present.
        assert_eq!(a.rows_exact(u16::MAX), None);
        a.unmerge(&b);
        assert_eq!(a, a_orig);
        assert_eq!(a.rows_exact(8192), Some(4));
    }

    #[test]
    fn wire_roundtrip_preserves_queries() {
        let mut h = Histogram::new();
        for w in [0u16, 7, 31, 32, 99, 1000, 65535] {
            h.add(w);
        }
        let mut buf = [0u8; HIST_WIRE_SIZE];
        h.write_le(&mut buf);
        let back = Histogram::read_le(&buf);
        assert_eq!(back, h);
        assert_eq!(back.lines(), 7);
    }
}
