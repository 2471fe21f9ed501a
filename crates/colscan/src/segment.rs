#![forbid(unsafe_code)]

use crate::error::{ScanError, ScanResult};

/// Maps global row ordinals to `(segment, offset)` pairs for a column whose segments vary in
/// length and are discovered one at a time.
///
/// The index only moves forward: `base` is the number of rows in segments that have been
/// stepped over, so resolving an ascending sequence of rows costs O(segments) in total
/// rather than per lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentIndex {
    segment: usize,
    base: usize,
}

impl SegmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Segment the index currently points at.
    pub fn segment(&self) -> usize {
        self.segment
    }

    /// Global row ordinal of the first row in [`SegmentIndex::segment`].
    pub fn base(&self) -> usize {
        self.base
    }

    /// Resolve `row` to `(segment, local offset)`, stepping over earlier segments.
    ///
    /// `segment_len` is queried for segment lengths as they are needed and returns `None`
    /// past the last segment. Rows before the current segment or past the end of the column
    /// are contract violations and are reported as errors.
    pub fn locate<F>(&mut self, row: usize, mut segment_len: F) -> ScanResult<(usize, usize)>
    where
        F: FnMut(usize) -> ScanResult<Option<usize>>,
    {
        if row < self.base {
            return Err(ScanError::RowOrder {
                row,
                previous: self.base,
            });
        }

        loop {
            let Some(len) = segment_len(self.segment)? else {
                return Err(ScanError::RowOutOfRange {
                    row,
                    rows: self.base,
                });
            };
            if row < self.base + len {
                return Ok((self.segment, row - self.base));
            }
            log::trace!(
                "stepping over segment {} ({len} rows, base {})",
                self.segment,
                self.base
            );
            self.base += len;
            self.segment += 1;
        }
    }
}
