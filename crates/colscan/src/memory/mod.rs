//! In-memory chunked column store.
//!
//! Each column is a list of chunks; chunks are the segments the scan engine walks. Chunk
//! lengths are known up front and may differ between chunks and between columns.

#![forbid(unsafe_code)]

mod builder;

pub use builder::MemTableBuilder;
#[cfg(feature = "arrow")]
pub(crate) use builder::DictionaryInterner;

use crate::decoder::{ColumnSource, SegmentSource, TableColumn, ValueDecoder};
use crate::error::{ScanError, ScanResult};
use crate::scan::ScanTable;
use crate::types::{ColumnSchema, Dictionary, PhysicalType};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct TableOptions {
    /// Rows per chunk when building a table row by row.
    pub chunk_rows: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self { chunk_rows: 65_536 }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum ColumnData {
    Float64(Vec<Vec<f64>>),
    Int32(Vec<Vec<i32>>),
    Utf8(Vec<Vec<Arc<str>>>),
    Dictionary {
        chunks: Vec<Vec<u32>>,
        dictionary: Arc<Dictionary>,
    },
    /// A column whose source type the engine cannot scan. It still counts towards the
    /// table's column ids so positional ids stay stable.
    Unsupported { type_name: String, rows: usize },
}

#[derive(Clone, Debug)]
pub struct MemColumn {
    name: String,
    data: ColumnData,
}

impl MemColumn {
    pub fn float64(name: impl Into<String>, chunks: Vec<Vec<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Float64(chunks),
        }
    }

    pub fn int32(name: impl Into<String>, chunks: Vec<Vec<i32>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Int32(chunks),
        }
    }

    pub fn utf8(name: impl Into<String>, chunks: Vec<Vec<Arc<str>>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Utf8(chunks),
        }
    }

    /// A dictionary-encoded string column. Every key must index into `dictionary`.
    pub fn dictionary(
        name: impl Into<String>,
        chunks: Vec<Vec<u32>>,
        dictionary: Arc<Dictionary>,
    ) -> ScanResult<Self> {
        let len = dictionary.len();
        if let Some(&index) = chunks.iter().flatten().find(|&&key| key as usize >= len) {
            return Err(ScanError::DictionaryIndex { index, len });
        }
        Ok(Self {
            name: name.into(),
            data: ColumnData::Dictionary { chunks, dictionary },
        })
    }

    pub fn unsupported(name: impl Into<String>, type_name: impl Into<String>, rows: usize) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Unsupported {
                type_name: type_name.into(),
                rows,
            },
        }
    }

    pub(crate) fn from_data(name: String, data: ColumnData) -> Self {
        Self { name, data }
    }

    pub(crate) fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The column's physical type, or `None` if the engine cannot scan it.
    pub fn column_type(&self) -> Option<PhysicalType> {
        match &self.data {
            ColumnData::Float64(_) => Some(PhysicalType::Float64),
            ColumnData::Int32(_) => Some(PhysicalType::Int32),
            ColumnData::Utf8(_) => Some(PhysicalType::Utf8),
            ColumnData::Dictionary { .. } => Some(PhysicalType::Dictionary),
            ColumnData::Unsupported { .. } => None,
        }
    }

    pub fn dictionary_values(&self) -> Option<&Arc<Dictionary>> {
        match &self.data {
            ColumnData::Dictionary { dictionary, .. } => Some(dictionary),
            _ => None,
        }
    }

    /// Row count of every chunk, in order.
    pub fn chunk_lens(&self) -> Vec<usize> {
        fn lens<T>(chunks: &[Vec<T>]) -> Vec<usize> {
            chunks.iter().map(Vec::len).collect()
        }
        match &self.data {
            ColumnData::Float64(chunks) => lens(chunks),
            ColumnData::Int32(chunks) => lens(chunks),
            ColumnData::Utf8(chunks) => lens(chunks),
            ColumnData::Dictionary { chunks, .. } => lens(chunks),
            ColumnData::Unsupported { rows, .. } => vec![*rows],
        }
    }

    pub fn len(&self) -> usize {
        self.chunk_lens().iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemTable {
    columns: Vec<MemColumn>,
    rows: usize,
}

impl MemTable {
    /// Assemble a table from columns that must all have the same number of rows.
    pub fn try_new(columns: Vec<MemColumn>) -> ScanResult<Self> {
        let rows = columns.first().map(MemColumn::len).unwrap_or(0);
        for (column, c) in columns.iter().enumerate() {
            let actual = c.len();
            if actual != rows {
                return Err(ScanError::ColumnLength {
                    column,
                    expected: rows,
                    actual,
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[MemColumn] {
        &self.columns
    }

    /// Schema of the scannable columns, as `(column id, schema)` pairs.
    pub fn schema(&self) -> Vec<(usize, ColumnSchema)> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| {
                c.column_type()
                    .map(|column_type| (idx, ColumnSchema::new(c.name.clone(), column_type)))
            })
            .collect()
    }

    pub fn dictionary(&self, col: usize) -> Option<Arc<Dictionary>> {
        self.columns.get(col)?.dictionary_values().cloned()
    }

    fn column_or_err(&self, col: usize) -> ScanResult<&MemColumn> {
        self.columns.get(col).ok_or(ScanError::UnknownColumn {
            column: col,
            columns: self.columns.len(),
        })
    }
}

impl ScanTable for MemTable {
    type Float64Segments<'a> = MemSegments<'a, f64>;
    type Int32Segments<'a> = MemSegments<'a, i32>;
    type Utf8Segments<'a> = MemSegments<'a, Arc<str>>;
    type DictionarySegments<'a> = MemSegments<'a, u32>;

    fn row_count(&self) -> usize {
        self.rows
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, col: usize) -> Option<&str> {
        self.columns.get(col).map(MemColumn::name)
    }

    fn physical_type(&self, col: usize) -> ScanResult<PhysicalType> {
        let column = self.column_or_err(col)?;
        match &column.data {
            ColumnData::Unsupported { type_name, .. } => Err(ScanError::UnsupportedPhysicalType {
                column: col,
                type_name: type_name.clone(),
            }),
            ColumnData::Float64(_) => Ok(PhysicalType::Float64),
            ColumnData::Int32(_) => Ok(PhysicalType::Int32),
            ColumnData::Utf8(_) => Ok(PhysicalType::Utf8),
            ColumnData::Dictionary { .. } => Ok(PhysicalType::Dictionary),
        }
    }

    fn segment_lens(&self, col: usize) -> ScanResult<Vec<usize>> {
        Ok(self.column_or_err(col)?.chunk_lens())
    }

    fn column(&self, col: usize) -> ScanResult<TableColumn<'_, Self>> {
        let column = self.column_or_err(col)?;
        Ok(match &column.data {
            ColumnData::Float64(chunks) => ColumnSource::Float64(MemSegments::new(chunks)),
            ColumnData::Int32(chunks) => ColumnSource::Int32(MemSegments::new(chunks)),
            ColumnData::Utf8(chunks) => ColumnSource::Utf8(MemSegments::new(chunks)),
            ColumnData::Dictionary { chunks, dictionary } => ColumnSource::Dictionary {
                keys: MemSegments::new(chunks),
                dictionary: dictionary.clone(),
            },
            ColumnData::Unsupported { type_name, .. } => {
                return Err(ScanError::UnsupportedPhysicalType {
                    column: col,
                    type_name: type_name.clone(),
                })
            }
        })
    }
}

/// The chunks of one in-memory column.
#[derive(Clone, Copy, Debug)]
pub struct MemSegments<'a, T> {
    chunks: &'a [Vec<T>],
}

impl<'a, T> MemSegments<'a, T> {
    pub fn new(chunks: &'a [Vec<T>]) -> Self {
        Self { chunks }
    }
}

impl<'a, T: Clone> SegmentSource for MemSegments<'a, T> {
    type Value = T;
    type Decoder = SliceDecoder<'a, T>;

    fn segment_count(&self) -> usize {
        self.chunks.len()
    }

    fn segment_len(&self, segment: usize) -> ScanResult<usize> {
        Ok(self.chunks.get(segment).map(Vec::len).unwrap_or(0))
    }

    fn open_segment(&self, segment: usize) -> ScanResult<SliceDecoder<'a, T>> {
        let values = self.chunks.get(segment).map(Vec::as_slice).unwrap_or(&[]);
        Ok(SliceDecoder {
            values,
            pos: 0,
            segment,
        })
    }
}

/// Decoder over one in-memory chunk. Skipping is index arithmetic.
#[derive(Clone, Debug)]
pub struct SliceDecoder<'a, T> {
    values: &'a [T],
    pos: usize,
    segment: usize,
}

impl<T: Clone> ValueDecoder for SliceDecoder<'_, T> {
    type Value = T;

    fn skip(&mut self, n: usize) -> ScanResult<()> {
        let remaining = self.values.len() - self.pos;
        if n > remaining {
            return Err(ScanError::TruncatedSegment {
                segment: self.segment,
                requested: n,
                remaining,
            });
        }
        self.pos += n;
        Ok(())
    }

    fn next_value(&mut self) -> ScanResult<T> {
        let value = self
            .values
            .get(self.pos)
            .cloned()
            .ok_or(ScanError::TruncatedSegment {
                segment: self.segment,
                requested: 1,
                remaining: 0,
            })?;
        self.pos += 1;
        Ok(value)
    }
}
