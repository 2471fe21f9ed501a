#![forbid(unsafe_code)]

use crate::types::{CmpOp, PhysicalType};

pub type ScanResult<T> = Result<T, ScanError>;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("unknown column {column} (table has {columns} columns)")]
    UnknownColumn { column: usize, columns: usize },

    #[error(
        "filter lists differ in length: {columns} columns, {operators} operators, {operands} operands"
    )]
    FilterArity {
        columns: usize,
        operators: usize,
        operands: usize,
    },

    #[error("unknown comparison operator: {0}")]
    UnknownOperator(String),

    #[error("operator {op} is not supported on {column_type} column {column}")]
    UnsupportedOperator {
        column: usize,
        op: CmpOp,
        column_type: PhysicalType,
    },

    #[error("column {column} has unsupported physical type {type_name}")]
    UnsupportedPhysicalType { column: usize, type_name: String },

    #[error("cannot parse operand {operand:?} as {column_type} for column {column}")]
    OperandParse {
        column: usize,
        column_type: PhysicalType,
        operand: String,
    },

    #[error("operand type does not match {column_type} column")]
    OperandType { column_type: PhysicalType },

    #[error("candidate rows must be strictly ascending: row {row} follows row {previous}")]
    CandidateOrder { row: usize, previous: usize },

    #[error("row {row} is out of range for a column with {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },

    #[error("row {row} requested after row {previous}; decoders cannot rewind")]
    RowOrder { row: usize, previous: usize },

    #[error("segment {segment} has {remaining} rows left, {requested} requested")]
    TruncatedSegment {
        segment: usize,
        requested: usize,
        remaining: usize,
    },

    #[error("null value in segment {segment}; nullable values cannot be scanned")]
    NullValue { segment: usize },

    #[error("row group {segment} reports {num_rows} rows")]
    CorruptMetadata { segment: usize, num_rows: i64 },

    #[error("invalid UTF-8 in segment {segment}")]
    InvalidUtf8 { segment: usize },

    #[error("row has {actual} values, schema has {expected} columns")]
    RowArity { expected: usize, actual: usize },

    #[error("value {value} does not fit {column_type} column {column}")]
    ValueType {
        column: usize,
        column_type: PhysicalType,
        value: String,
    },

    #[error("column {column} has {actual} rows, expected {expected}")]
    ColumnLength {
        column: usize,
        expected: usize,
        actual: usize,
    },

    #[error("dictionary index {index} is out of range for a dictionary of {len} values")]
    DictionaryIndex { index: u32, len: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "arrow")]
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[cfg(feature = "arrow")]
    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),
}

impl ScanError {
    /// Whether the error came from the backing store rather than from the request.
    ///
    /// Store faults are never retried: skipping the affected rows would silently corrupt
    /// the candidate set.
    pub fn is_backing_store_fault(&self) -> bool {
        match self {
            ScanError::TruncatedSegment { .. }
            | ScanError::NullValue { .. }
            | ScanError::InvalidUtf8 { .. }
            | ScanError::CorruptMetadata { .. }
            | ScanError::DictionaryIndex { .. }
            | ScanError::Io(_) => true,
            #[cfg(feature = "arrow")]
            ScanError::Parquet(_) | ScanError::Arrow(_) => true,
            _ => false,
        }
    }
}
