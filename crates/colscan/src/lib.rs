//! Predicate-pushdown scans over segmented column stores.
//!
//! This crate focuses on:
//! - Filtering and projecting columns that are stored as ordered runs of segments (Parquet
//!   row groups on disk, chunks in memory) without materializing the table first.
//! - Threading a shrinking [`CandidateSet`] through filters so each filter only decodes rows
//!   that survived the previous ones.
//! - Skip-ahead decoding: rows that are no longer candidates are skipped with the backing
//!   store's native skip primitive instead of being decoded.
//!
//! The stage algorithms are written once against the [`SegmentSource`] / [`ValueDecoder`]
//! capabilities; [`MemTable`] and (with the `arrow` feature) [`ParquetTable`] provide them.

#![forbid(unsafe_code)]

mod candidates;
mod decoder;
mod error;
mod filter;
mod memory;
mod project;
mod scan;
mod segment;
mod types;

#[cfg(feature = "arrow")]
pub mod arrow;
#[cfg(feature = "arrow")]
mod disk;

pub use crate::candidates::CandidateSet;
pub use crate::decoder::{
    ColumnSource, DecodePosition, NoSegments, SegmentSource, TableColumn, ValueDecoder,
};
pub use crate::error::{ScanError, ScanResult};
pub use crate::filter::{filter_column, filter_segments};
pub use crate::memory::{
    MemColumn, MemSegments, MemTable, MemTableBuilder, SliceDecoder, TableOptions,
};
pub use crate::project::{project_column, project_segments, ColumnValues, DictionaryOutput};
pub use crate::scan::{
    scan, FilterOutcome, FilterSpec, ProjectedColumn, ScanOptions, ScanOutput, ScanRequest,
    ScanTable,
};
pub use crate::segment::SegmentIndex;
pub use crate::types::{CmpOp, ColumnSchema, Dictionary, Operand, PhysicalType, Predicate, Value};

#[cfg(feature = "arrow")]
pub use crate::disk::{DiskSegments, DiskValue, ParquetTable, RowGroupDecoder};
