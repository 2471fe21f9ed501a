//! On-disk Parquet store.
//!
//! Segments are row groups. Their lengths come from the footer metadata, so stepping over a
//! row group never touches its pages. Inside a row group the column reader's record skip
//! is used for gaps and a single record is read per requested row.

#![forbid(unsafe_code)]

use crate::decoder::{ColumnSource, NoSegments, SegmentSource, TableColumn, ValueDecoder};
use crate::error::{ScanError, ScanResult};
use crate::scan::ScanTable;
use crate::types::PhysicalType;
use bytes::Bytes;
use parquet::basic::Type as ParquetType;
use parquet::column::reader::{ColumnReader, ColumnReaderImpl};
use parquet::data_type::{ByteArray, ByteArrayType, DataType, DoubleType, Int32Type};
use parquet::file::reader::{ChunkReader, FileReader, SerializedFileReader};
use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// A Rust value type that can be decoded from a Parquet physical type.
pub trait DiskValue: Sized {
    type Physical: DataType;

    fn typed_reader(reader: ColumnReader) -> Option<ColumnReaderImpl<Self::Physical>>;

    fn from_physical(value: <Self::Physical as DataType>::T, segment: usize) -> ScanResult<Self>;
}

impl DiskValue for f64 {
    type Physical = DoubleType;

    fn typed_reader(reader: ColumnReader) -> Option<ColumnReaderImpl<DoubleType>> {
        match reader {
            ColumnReader::DoubleColumnReader(r) => Some(r),
            _ => None,
        }
    }

    fn from_physical(value: f64, _segment: usize) -> ScanResult<f64> {
        Ok(value)
    }
}

impl DiskValue for i32 {
    type Physical = Int32Type;

    fn typed_reader(reader: ColumnReader) -> Option<ColumnReaderImpl<Int32Type>> {
        match reader {
            ColumnReader::Int32ColumnReader(r) => Some(r),
            _ => None,
        }
    }

    fn from_physical(value: i32, _segment: usize) -> ScanResult<i32> {
        Ok(value)
    }
}

impl DiskValue for Arc<str> {
    type Physical = ByteArrayType;

    fn typed_reader(reader: ColumnReader) -> Option<ColumnReaderImpl<ByteArrayType>> {
        match reader {
            ColumnReader::ByteArrayColumnReader(r) => Some(r),
            _ => None,
        }
    }

    fn from_physical(value: ByteArray, segment: usize) -> ScanResult<Arc<str>> {
        std::str::from_utf8(value.data())
            .map(Arc::from)
            .map_err(|_| ScanError::InvalidUtf8 { segment })
    }
}

/// A Parquet file opened for scanning.
pub struct ParquetTable<R: ChunkReader + 'static = File> {
    reader: SerializedFileReader<R>,
    row_groups: Vec<usize>,
    rows: usize,
}

impl ParquetTable<File> {
    pub fn open(path: impl AsRef<Path>) -> ScanResult<Self> {
        let path = path.as_ref();
        log::debug!("opening parquet file {}", path.display());
        Self::new(File::open(path)?)
    }
}

impl ParquetTable<Bytes> {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> ScanResult<Self> {
        Self::new(bytes.into())
    }
}

impl<R: ChunkReader + 'static> ParquetTable<R> {
    pub fn new(reader: R) -> ScanResult<Self> {
        let reader = SerializedFileReader::new(reader)?;
        let metadata = reader.metadata();
        let row_groups = metadata
            .row_groups()
            .iter()
            .enumerate()
            .map(|(segment, rg)| row_group_rows(segment, rg.num_rows()))
            .collect::<ScanResult<Vec<_>>>()?;
        let rows = row_groups.iter().sum();
        log::debug!(
            "parquet table: {rows} rows, {} row groups, {} columns",
            metadata.num_row_groups(),
            metadata.file_metadata().schema_descr().num_columns()
        );
        Ok(Self {
            reader,
            row_groups,
            rows,
        })
    }

    pub fn row_group_count(&self) -> usize {
        self.row_groups.len()
    }

    /// Row count of every row group, in file order.
    pub fn row_group_lens(&self) -> &[usize] {
        &self.row_groups
    }

    fn check_column(&self, col: usize) -> ScanResult<()> {
        let columns = self.column_count();
        if col >= columns {
            return Err(ScanError::UnknownColumn {
                column: col,
                columns,
            });
        }
        Ok(())
    }

    fn segments<T>(&self, column: usize) -> DiskSegments<'_, T, R> {
        DiskSegments {
            table: self,
            column,
            _value: PhantomData,
        }
    }
}

impl<R: ChunkReader + 'static> ScanTable for ParquetTable<R> {
    type Float64Segments<'a> = DiskSegments<'a, f64, R>;
    type Int32Segments<'a> = DiskSegments<'a, i32, R>;
    type Utf8Segments<'a> = DiskSegments<'a, Arc<str>, R>;
    type DictionarySegments<'a> = NoSegments<u32>;

    fn row_count(&self) -> usize {
        self.rows
    }

    fn column_count(&self) -> usize {
        self.reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .num_columns()
    }

    fn column_name(&self, col: usize) -> Option<&str> {
        self.reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .columns()
            .get(col)
            .map(|descr| descr.name())
    }

    fn physical_type(&self, col: usize) -> ScanResult<PhysicalType> {
        self.check_column(col)?;
        let descr = self
            .reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .column(col);
        if descr.max_rep_level() > 0 {
            return Err(ScanError::UnsupportedPhysicalType {
                column: col,
                type_name: format!("repeated {:?}", descr.physical_type()),
            });
        }
        match descr.physical_type() {
            ParquetType::DOUBLE => Ok(PhysicalType::Float64),
            ParquetType::INT32 => Ok(PhysicalType::Int32),
            ParquetType::BYTE_ARRAY => Ok(PhysicalType::Utf8),
            other => Err(ScanError::UnsupportedPhysicalType {
                column: col,
                type_name: format!("{other:?}"),
            }),
        }
    }

    fn segment_lens(&self, col: usize) -> ScanResult<Vec<usize>> {
        self.check_column(col)?;
        Ok(self.row_groups.clone())
    }

    fn column(&self, col: usize) -> ScanResult<TableColumn<'_, Self>> {
        Ok(match self.physical_type(col)? {
            PhysicalType::Float64 => ColumnSource::Float64(self.segments(col)),
            PhysicalType::Int32 => ColumnSource::Int32(self.segments(col)),
            PhysicalType::Utf8 => ColumnSource::Utf8(self.segments(col)),
            PhysicalType::Dictionary => {
                return Err(ScanError::UnsupportedPhysicalType {
                    column: col,
                    type_name: PhysicalType::Dictionary.to_string(),
                })
            }
        })
    }
}

/// Row count of a row group as recorded in the footer. A negative count means the footer is
/// corrupt.
fn row_group_rows(segment: usize, num_rows: i64) -> ScanResult<usize> {
    usize::try_from(num_rows).map_err(|_| ScanError::CorruptMetadata { segment, num_rows })
}

/// The row groups of one Parquet column, decoded as `T`.
pub struct DiskSegments<'a, T, R: ChunkReader + 'static> {
    table: &'a ParquetTable<R>,
    column: usize,
    _value: PhantomData<fn() -> T>,
}

impl<T: DiskValue, R: ChunkReader + 'static> SegmentSource for DiskSegments<'_, T, R> {
    type Value = T;
    type Decoder = RowGroupDecoder<T>;

    fn segment_count(&self) -> usize {
        self.table.row_group_count()
    }

    fn segment_len(&self, segment: usize) -> ScanResult<usize> {
        Ok(self.table.row_groups.get(segment).copied().unwrap_or(0))
    }

    fn open_segment(&self, segment: usize) -> ScanResult<RowGroupDecoder<T>> {
        let remaining = self.segment_len(segment)?;
        let nullable = self
            .table
            .reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .column(self.column)
            .max_def_level()
            > 0;
        let reader = self
            .table
            .reader
            .get_row_group(segment)?
            .get_column_reader(self.column)?;
        let reader = T::typed_reader(reader).ok_or_else(|| ScanError::UnsupportedPhysicalType {
            column: self.column,
            type_name: std::any::type_name::<T>().to_owned(),
        })?;
        Ok(RowGroupDecoder {
            reader,
            segment,
            remaining,
            nullable,
            values: Vec::with_capacity(1),
            def_levels: Vec::with_capacity(1),
        })
    }
}

/// Decoder over one column chunk of one row group.
pub struct RowGroupDecoder<T: DiskValue> {
    reader: ColumnReaderImpl<T::Physical>,
    segment: usize,
    remaining: usize,
    nullable: bool,
    values: Vec<<T::Physical as DataType>::T>,
    def_levels: Vec<i16>,
}

impl<T: DiskValue> ValueDecoder for RowGroupDecoder<T> {
    type Value = T;

    fn skip(&mut self, n: usize) -> ScanResult<()> {
        if n > self.remaining {
            return Err(ScanError::TruncatedSegment {
                segment: self.segment,
                requested: n,
                remaining: self.remaining,
            });
        }
        let skipped = self.reader.skip_records(n)?;
        if skipped != n {
            return Err(ScanError::TruncatedSegment {
                segment: self.segment,
                requested: n,
                remaining: skipped,
            });
        }
        self.remaining -= n;
        Ok(())
    }

    fn next_value(&mut self) -> ScanResult<T> {
        let truncated = ScanError::TruncatedSegment {
            segment: self.segment,
            requested: 1,
            remaining: 0,
        };
        if self.remaining == 0 {
            return Err(truncated);
        }

        self.values.clear();
        self.def_levels.clear();
        let def_levels = if self.nullable {
            Some(&mut self.def_levels)
        } else {
            None
        };
        let (records, _, _) = self.reader.read_records(1, def_levels, None, &mut self.values)?;
        if records == 0 {
            return Err(truncated);
        }
        self.remaining -= 1;

        let value = self.values.pop().ok_or(ScanError::NullValue {
            segment: self.segment,
        })?;
        T::from_physical(value, self.segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::CandidateSet;
    use crate::filter::filter_column;
    use crate::project::project_segments;
    use crate::types::{CmpOp, Predicate};
    use arrow_array::{ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray};
    use arrow_schema::{DataType as ArrowType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use pretty_assertions::assert_eq;

    /// One row group per batch.
    fn parquet_bytes(batches: &[RecordBatch]) -> Bytes {
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, batches[0].schema(), None).unwrap();
        for batch in batches {
            writer.write(batch).unwrap();
            writer.flush().unwrap();
        }
        writer.close().unwrap();
        Bytes::from(buf)
    }

    fn batch(prices: &[f64], ages: &[i32], cities: &[&str]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("price", ArrowType::Float64, false),
            Field::new("age", ArrowType::Int32, false),
            Field::new("city", ArrowType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(prices.to_vec())) as ArrayRef,
                Arc::new(Int32Array::from(ages.to_vec())),
                Arc::new(StringArray::from(cities.to_vec())),
            ],
        )
        .unwrap()
    }

    fn table() -> ParquetTable<Bytes> {
        ParquetTable::from_bytes(parquet_bytes(&[
            batch(&[10.0, 25.0], &[31, 45], &["Oslo", "Lima"]),
            batch(&[7.0], &[22], &["Oslo"]),
            batch(&[30.0, 15.0], &[60, 38], &["Pune", "Oslo"]),
        ]))
        .unwrap()
    }

    #[test]
    fn row_groups_are_segments() {
        let table = table();
        assert_eq!(table.row_count(), 5);
        assert_eq!(table.row_group_lens(), vec![2, 1, 2]);
        assert_eq!(table.column_name(2), Some("city"));
        assert_eq!(table.physical_type(0).unwrap(), PhysicalType::Float64);
        assert_eq!(table.physical_type(1).unwrap(), PhysicalType::Int32);
        assert_eq!(table.physical_type(2).unwrap(), PhysicalType::Utf8);
    }

    #[test]
    fn negative_row_group_counts_are_store_faults() {
        assert_eq!(row_group_rows(0, 4).unwrap(), 4);
        assert_eq!(row_group_rows(1, 0).unwrap(), 0);

        let err = row_group_rows(2, -1).unwrap_err();
        assert!(matches!(
            err,
            ScanError::CorruptMetadata {
                segment: 2,
                num_rows: -1
            }
        ));
        assert!(err.is_backing_store_fault());
    }

    #[test]
    fn filters_and_projects_across_row_groups() {
        let table = table();
        let predicate =
            Predicate::parse(0, PhysicalType::Float64, CmpOp::Greater, "12.0").unwrap();
        let candidates =
            filter_column(table.column(0).unwrap(), &predicate, &CandidateSet::Unbounded)
                .unwrap();
        assert_eq!(candidates, CandidateSet::Bounded(vec![1, 3, 4]));

        let ColumnSource::Utf8(cities) = table.column(2).unwrap() else {
            panic!("expected a Utf8 column");
        };
        let values = project_segments(cities, &candidates).unwrap();
        assert_eq!(values, vec![Arc::from("Lima"), Arc::from("Pune"), Arc::from("Oslo")]);

        let ColumnSource::Int32(ages) = table.column(1).unwrap() else {
            panic!("expected an Int32 column");
        };
        let values = project_segments(ages, &CandidateSet::Bounded(vec![4])).unwrap();
        assert_eq!(values, vec![38]);
    }

    #[test]
    fn nulls_are_store_faults() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "n",
            ArrowType::Int32,
            true,
        )]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int32Array::from(vec![Some(1), None, Some(3)])) as ArrayRef],
        )
        .unwrap();
        let table = ParquetTable::from_bytes(parquet_bytes(&[batch])).unwrap();

        let ints = || match table.column(0).unwrap() {
            ColumnSource::Int32(source) => source,
            _ => panic!("expected an Int32 column"),
        };
        // Nullable columns are readable as long as the requested rows are set.
        let values = project_segments(ints(), &CandidateSet::Bounded(vec![0, 2])).unwrap();
        assert_eq!(values, vec![1, 3]);

        let err = project_segments(ints(), &CandidateSet::Bounded(vec![1])).unwrap_err();
        assert!(matches!(err, ScanError::NullValue { segment: 0 }));
        assert!(err.is_backing_store_fault());
    }

    #[test]
    fn unsupported_physical_types_are_reported() {
        let schema = Arc::new(Schema::new(vec![Field::new("ts", ArrowType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![1i64, 2])) as ArrayRef],
        )
        .unwrap();
        let table = ParquetTable::from_bytes(parquet_bytes(&[batch])).unwrap();
        assert!(matches!(
            table.physical_type(0),
            Err(ScanError::UnsupportedPhysicalType { column: 0, ref type_name }) if type_name == "INT64"
        ));
        assert!(matches!(
            table.physical_type(3),
            Err(ScanError::UnknownColumn { column: 3, columns: 1 })
        ));
    }
}
