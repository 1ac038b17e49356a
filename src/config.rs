//! Index configuration: pluggable width and split callbacks, cache root.

use crate::wrap::default_width;
use std::path::PathBuf;

/// Display-width callback: terminal cells a line occupies unwrapped.
/// Implementations saturate at `u16::MAX`.
pub type WidthFn = Box<dyn Fn(&str) -> u16 + Send + Sync>;

/// Line-splitting callback: completed lines in an unindexed byte region.
///
/// The splitter returns only terminator-complete lines, each with its
/// terminator-inclusive byte length so the index can advance its byte
/// cursor and record per-line offsets. A trailing unterminated line is
/// omitted and retried once more bytes arrive.
pub type SplitFn = Box<dyn Fn(&[u8]) -> Vec<SplitLine> + Send + Sync>;

/// One completed logical line produced by a [`SplitFn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLine {
    /// Line text, terminator excluded.
    pub text: String,
    /// Bytes consumed from the source, terminator included.
    pub byte_len: usize,
}

/// Configuration for opening an index.
pub struct Options {
    /// Display-width measure. Default: cell width per UAX #11, with an
    /// ASCII fast path.
    pub width_fn: WidthFn,
    /// Line splitter. Default: split on `\n`, strip a preceding `\r`,
    /// lossy UTF-8 decode, drop the trailing partial line.
    pub split_fn: SplitFn,
    /// Cache root. Default: the platform per-user cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            width_fn: Box::new(default_width),
            split_fn: Box::new(default_split),
            cache_dir: None,
        }
    }
}

impl Options {
    /// Replace the width callback.
    pub fn width_fn(mut self, f: impl Fn(&str) -> u16 + Send + Sync + 'static) -> Self {
        self.width_fn = Box::new(f);
        self
    }

    /// Replace the split callback.
    pub fn split_fn(mut self, f: impl Fn(&[u8]) -> Vec<SplitLine> + Send + Sync + 'static) -> Self {
        self.split_fn = Box::new(f);
        self
    }

    /// Use `dir` as the cache root instead of the platform default.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

/// Default splitter: newline-terminated lines, CRLF tolerated.
pub fn default_split(bytes: &[u8]) -> Vec<SplitLine> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            let mut end = i;
            if end > start && bytes[end - 1] == b'\r' {
                end -= 1;
            }
            lines.push(SplitLine {
                text: String::from_utf8_lossy(&bytes[start..end]).into_owned(),
                byte_len: i + 1 - start,
            });
            start = i + 1;
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_drops_trailing_partial() {
        let lines = default_split(b"one\ntwo\nthr");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "one");
        assert_eq!(lines[0].byte_len, 4);
        assert_eq!(lines[1].text, "two");
        let consumed: usize = lines.iter().map(|l| l.byte_len).sum();
        assert_eq!(consumed, 8);
    }

    #[test]
    fn split_keeps_empty_lines() {
        let lines = default_split(b"\n\na\n");
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["", "", "a"]);
    }

    #[test]
    fn split_strips_crlf() {
        let lines = default_split(b"one\r\ntwo\n");
        assert_eq!(lines[0].text, "one");
        assert_eq!(lines[0].byte_len, 5);
        assert_eq!(lines[1].text, "two");
        assert_eq!(lines[1].byte_len, 4);
    }

    #[test]
    fn split_of_empty_region() {
        assert!(default_split(b"").is_empty());
        assert!(default_split(b"no terminator").is_empty());
    }
}
