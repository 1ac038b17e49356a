//! Row-addressable view of a log at one terminal width.

use crate::error::{Error, Result};
use crate::index::LogLogLog;
use crate::wrap;

/// A window of display rows `[start, start + len)` over a log wrapped at a
/// fixed terminal width.
///
/// The row count is snapshotted at creation; create a fresh view after
/// updating the index to see new rows.
pub struct DisplayView<'a> {
    log: &'a LogLogLog,
    width: u16,
    start: u64,
    len: u64,
}

impl<'a> DisplayView<'a> {
    pub(crate) fn new(
        log: &'a LogLogLog,
        width: u16,
        start: u64,
        end: Option<u64>,
    ) -> Result<Self> {
        let total = log.rows_at(width)?;
        let end = end.map_or(total, |e| e.min(total));
        Ok(Self {
            log,
            width,
            start,
            len: end.saturating_sub(start),
        })
    }

    /// Terminal width this view wraps at.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Number of display rows in the view.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the view contains no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical line containing view row `row`, with the row offset within
    /// that line.
    pub fn line_at(&self, row: u64) -> Result<(u64, u64)> {
        if row >= self.len {
            return Err(Error::OutOfRange {
                index: row,
                len: self.len,
            });
        }
        self.log.locate(self.width, self.start + row)
    }

    /// View row at which logical line `line` starts. Fails when the line
    /// starts outside the view.
    pub fn row_of_line(&self, line: u64) -> Result<u64> {
        let absolute = self.log.row_of(self.width, line)?;
        let row = absolute
            .checked_sub(self.start)
            .filter(|&r| r < self.len)
            .ok_or(Error::OutOfRange {
                index: absolute,
                len: self.len,
            })?;
        Ok(row)
    }

    /// Text of view row `row`: the wrapped display slice of its line.
    pub fn get(&self, row: u64) -> Result<String> {
        let (line, residual) = self.line_at(row)?;
        let text = self.log.get(line)?;
        Ok(wrap::slice(&text, self.width, residual).to_string())
    }

    /// Iterate the view's rows in order. Lazy and restartable: each call
    /// starts a fresh pass.
    pub fn iter(&self) -> Rows<'_> {
        Rows {
            view: self,
            next: 0,
        }
    }
}

/// Iterator over the rows of a [`DisplayView`].
pub struct Rows<'v> {
    view: &'v DisplayView<'v>,
    next: u64,
}

impl Iterator for Rows<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.view.len {
            return None;
        }
        let row = self.next;
        self.next += 1;
        Some(self.view.get(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = (self.view.len - self.next) as usize;
        (rest, Some(rest))
    }
}
