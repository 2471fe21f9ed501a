#![forbid(unsafe_code)]

use crate::error::{ScanError, ScanResult};
use crate::scan::ScanTable;
use crate::segment::SegmentIndex;
use crate::types::{Dictionary, PhysicalType};
use std::sync::Arc;

/// Decodes the values of one segment, front to back.
pub trait ValueDecoder {
    type Value;

    /// Advance past `n` rows without producing their values.
    fn skip(&mut self, n: usize) -> ScanResult<()>;

    /// Decode the value at the current row and advance by one.
    fn next_value(&mut self) -> ScanResult<Self::Value>;
}

/// The ordered segments of one column.
///
/// Segment lengths must be cheap to query (metadata only); decoding happens through the
/// decoder returned by [`SegmentSource::open_segment`].
pub trait SegmentSource {
    type Value;
    type Decoder: ValueDecoder<Value = Self::Value>;

    fn segment_count(&self) -> usize;

    fn segment_len(&self, segment: usize) -> ScanResult<usize>;

    fn open_segment(&self, segment: usize) -> ScanResult<Self::Decoder>;
}

/// A column of a [`ScanTable`], tagged by physical type.
///
/// Stages match on this once per column and then run a loop that is monomorphized for the
/// backing store's decoder, so there is no per-row dispatch.
pub enum ColumnSource<F, I, S, D> {
    Float64(F),
    Int32(I),
    Utf8(S),
    Dictionary {
        keys: D,
        dictionary: Arc<Dictionary>,
    },
}

pub type TableColumn<'a, T> = ColumnSource<
    <T as ScanTable>::Float64Segments<'a>,
    <T as ScanTable>::Int32Segments<'a>,
    <T as ScanTable>::Utf8Segments<'a>,
    <T as ScanTable>::DictionarySegments<'a>,
>;

impl<F, I, S, D> ColumnSource<F, I, S, D> {
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            ColumnSource::Float64(_) => PhysicalType::Float64,
            ColumnSource::Int32(_) => PhysicalType::Int32,
            ColumnSource::Utf8(_) => PhysicalType::Utf8,
            ColumnSource::Dictionary { .. } => PhysicalType::Dictionary,
        }
    }
}

/// Segment source for a value type a backing store never produces.
///
/// Parquet surfaces string columns as plain UTF-8 (its dictionary pages are resolved inside
/// the reader), so the on-disk store uses this for its dictionary-key segments.
#[derive(Debug)]
pub enum NoSegments<T> {
    #[doc(hidden)]
    Never(std::convert::Infallible, std::marker::PhantomData<T>),
}

impl<T> ValueDecoder for NoSegments<T> {
    type Value = T;

    fn skip(&mut self, _n: usize) -> ScanResult<()> {
        match *self {
            NoSegments::Never(never, _) => match never {},
        }
    }

    fn next_value(&mut self) -> ScanResult<T> {
        match *self {
            NoSegments::Never(never, _) => match never {},
        }
    }
}

impl<T> SegmentSource for NoSegments<T> {
    type Value = T;
    type Decoder = NoSegments<T>;

    fn segment_count(&self) -> usize {
        match *self {
            NoSegments::Never(never, _) => match never {},
        }
    }

    fn segment_len(&self, _segment: usize) -> ScanResult<usize> {
        match *self {
            NoSegments::Never(never, _) => match never {},
        }
    }

    fn open_segment(&self, _segment: usize) -> ScanResult<Self::Decoder> {
        match *self {
            NoSegments::Never(never, _) => match never {},
        }
    }
}

struct OpenSegment<D> {
    segment: usize,
    decoder: D,
    /// Local offset of the next row the decoder will produce.
    next: usize,
}

/// Per-stage read cursor over one column.
///
/// Rows must be requested in strictly ascending order. Segments that contain no requested
/// row are stepped over using their length alone and are never opened; gaps inside a
/// segment are passed to the decoder's `skip`.
pub struct DecodePosition<S: SegmentSource> {
    source: S,
    index: SegmentIndex,
    open: Option<OpenSegment<S::Decoder>>,
    last_row: Option<usize>,
}

impl<S: SegmentSource> DecodePosition<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            index: SegmentIndex::new(),
            open: None,
            last_row: None,
        }
    }

    /// Decode the value at global row `row`, skipping any rows between the previous
    /// request and this one.
    pub fn read(&mut self, row: usize) -> ScanResult<S::Value> {
        if let Some(previous) = self.last_row {
            if row <= previous {
                return Err(ScanError::RowOrder { row, previous });
            }
        }

        let source = &self.source;
        let segments = source.segment_count();
        let (segment, local) = self.index.locate(row, |segment| {
            if segment < segments {
                source.segment_len(segment).map(Some)
            } else {
                Ok(None)
            }
        })?;

        let open = match self.open.take() {
            Some(open) if open.segment == segment => self.open.insert(open),
            _ => {
                log::trace!("opening segment {segment} at row {row}");
                let decoder = self.source.open_segment(segment)?;
                self.open.insert(OpenSegment {
                    segment,
                    decoder,
                    next: 0,
                })
            }
        };

        let gap = local - open.next;
        if gap > 0 {
            open.decoder.skip(gap)?;
        }
        let value = open.decoder.next_value()?;
        open.next = local + 1;
        self.last_row = Some(row);
        Ok(value)
    }

    /// Decode every row of every segment in order, calling `f(row, value)` for each.
    pub fn for_each_row<F>(self, mut f: F) -> ScanResult<()>
    where
        F: FnMut(usize, S::Value),
    {
        let mut base = 0usize;
        for segment in 0..self.source.segment_count() {
            let len = self.source.segment_len(segment)?;
            if len == 0 {
                continue;
            }
            log::trace!("decoding segment {segment} ({len} rows from row {base})");
            let mut decoder = self.source.open_segment(segment)?;
            for local in 0..len {
                f(base + local, decoder.next_value()?);
            }
            base += len;
        }
        Ok(())
    }
}
