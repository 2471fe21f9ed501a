//! Arrow interop for the in-memory store.
//!
//! Arrow `RecordBatch`es map naturally onto chunks: each batch becomes one segment of every
//! column. Parquet files can be loaded into memory row group by row group, and a
//! [`MemTable`] can be written back out with one row group per segment boundary.

#![forbid(unsafe_code)]

use crate::error::{ScanError, ScanResult};
use crate::memory::{ColumnData, DictionaryInterner, MemColumn, MemTable};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, Int32Type};
use arrow_array::{Array, ArrayRef, Float64Array, Int32Array, RecordBatch, StringArray};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use bytes::Bytes;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
};
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Dictionary-encode plain string columns while loading.
    pub dictionary_strings: bool,
    /// Maximum rows per in-memory chunk. Larger row groups or IPC batches are split; chunks
    /// never span two of them.
    pub batch_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            dictionary_strings: false,
            batch_size: 65_536,
        }
    }
}

enum ColumnLoader {
    Float64(Vec<Vec<f64>>),
    Int32(Vec<Vec<i32>>),
    Utf8(Vec<Vec<Arc<str>>>),
    Dictionary {
        chunks: Vec<Vec<u32>>,
        interner: DictionaryInterner,
    },
    Unsupported {
        type_name: String,
        rows: usize,
    },
}

impl ColumnLoader {
    fn for_type(data_type: &DataType, options: &LoadOptions) -> Self {
        match data_type {
            DataType::Float64 => ColumnLoader::Float64(Vec::new()),
            DataType::Int32 => ColumnLoader::Int32(Vec::new()),
            DataType::Utf8 | DataType::LargeUtf8 if options.dictionary_strings => {
                ColumnLoader::Dictionary {
                    chunks: Vec::new(),
                    interner: DictionaryInterner::default(),
                }
            }
            DataType::Utf8 | DataType::LargeUtf8 => ColumnLoader::Utf8(Vec::new()),
            DataType::Dictionary(key, value)
                if key.as_ref() == &DataType::Int32 && value.as_ref() == &DataType::Utf8 =>
            {
                ColumnLoader::Dictionary {
                    chunks: Vec::new(),
                    interner: DictionaryInterner::default(),
                }
            }
            other => ColumnLoader::Unsupported {
                type_name: other.to_string(),
                rows: 0,
            },
        }
    }

    fn push(&mut self, field: &Field, array: &ArrayRef, segment: usize) -> ScanResult<()> {
        if !matches!(self, ColumnLoader::Unsupported { .. }) && array.null_count() > 0 {
            return Err(ScanError::NullValue { segment });
        }
        let mismatch = || {
            ScanError::Arrow(ArrowError::SchemaError(format!(
                "column {}: expected {}, found {} in batch {segment}",
                field.name(),
                field.data_type(),
                array.data_type()
            )))
        };

        match self {
            ColumnLoader::Float64(chunks) => {
                let values = array.as_primitive_opt::<Float64Type>().ok_or_else(mismatch)?;
                chunks.push(values.values().to_vec());
            }
            ColumnLoader::Int32(chunks) => {
                let values = array.as_primitive_opt::<Int32Type>().ok_or_else(mismatch)?;
                chunks.push(values.values().to_vec());
            }
            ColumnLoader::Utf8(chunks) => {
                chunks.push(strings(array.as_ref()).ok_or_else(mismatch)?);
            }
            ColumnLoader::Dictionary { chunks, interner } => {
                let keys = if let Some(dict) = array.as_dictionary_opt::<Int32Type>() {
                    let values = dict.values();
                    if values.null_count() > 0 {
                        return Err(ScanError::NullValue { segment });
                    }
                    // Batch-local dictionary; remap its indices into the column dictionary.
                    let local = strings(values.as_ref()).ok_or_else(mismatch)?;
                    let remap: Vec<u32> = local.iter().map(|s| interner.intern(s)).collect();
                    dict.keys()
                        .values()
                        .iter()
                        .map(|&key| {
                            usize::try_from(key)
                                .ok()
                                .and_then(|key| remap.get(key).copied())
                                .ok_or(ScanError::DictionaryIndex {
                                    index: key as u32,
                                    len: remap.len(),
                                })
                        })
                        .collect::<ScanResult<Vec<_>>>()?
                } else {
                    let values = strings(array.as_ref()).ok_or_else(mismatch)?;
                    values.iter().map(|s| interner.intern(s)).collect()
                };
                chunks.push(keys);
            }
            ColumnLoader::Unsupported { rows, .. } => *rows += array.len(),
        }
        Ok(())
    }

    fn finish(self) -> ColumnData {
        match self {
            ColumnLoader::Float64(chunks) => ColumnData::Float64(chunks),
            ColumnLoader::Int32(chunks) => ColumnData::Int32(chunks),
            ColumnLoader::Utf8(chunks) => ColumnData::Utf8(chunks),
            ColumnLoader::Dictionary { chunks, interner } => ColumnData::Dictionary {
                chunks,
                dictionary: Arc::new(interner.finish()),
            },
            ColumnLoader::Unsupported { type_name, rows } => {
                ColumnData::Unsupported { type_name, rows }
            }
        }
    }
}

fn strings(array: &dyn Array) -> Option<Vec<Arc<str>>> {
    if let Some(values) = array.as_string_opt::<i32>() {
        return Some(values.iter().flatten().map(Arc::from).collect());
    }
    array
        .as_string_opt::<i64>()
        .map(|values| values.iter().flatten().map(Arc::from).collect())
}

/// Convert record batches into an in-memory table; each batch becomes one chunk.
///
/// Columns of an Arrow type the engine cannot scan are kept as unsupported placeholders so
/// column ids match the schema. Null values are rejected.
pub fn memory_table_from_batches(
    schema: &Schema,
    batches: &[RecordBatch],
    options: &LoadOptions,
) -> ScanResult<MemTable> {
    let mut loaders: Vec<ColumnLoader> = schema
        .fields()
        .iter()
        .map(|field| ColumnLoader::for_type(field.data_type(), options))
        .collect();

    for (segment, batch) in batches.iter().enumerate() {
        if batch.num_columns() != loaders.len() {
            return Err(ScanError::RowArity {
                expected: loaders.len(),
                actual: batch.num_columns(),
            });
        }
        for ((loader, field), array) in loaders.iter_mut().zip(schema.fields()).zip(batch.columns())
        {
            loader.push(field, array, segment)?;
        }
    }

    let columns = schema
        .fields()
        .iter()
        .zip(loaders)
        .map(|(field, loader)| MemColumn::from_data(field.name().clone(), loader.finish()))
        .collect();
    log::debug!(
        "loaded {} batches into memory ({} columns)",
        batches.len(),
        schema.fields().len()
    );
    MemTable::try_new(columns)
}

/// Load a Parquet file into memory. Chunks follow row groups, split at `batch_size`.
pub fn read_parquet_to_memory(path: impl AsRef<Path>, options: &LoadOptions) -> ScanResult<MemTable> {
    let bytes = Bytes::from(std::fs::read(path)?);
    read_parquet_bytes_to_memory(bytes, options)
}

pub fn read_parquet_bytes_to_memory(bytes: Bytes, options: &LoadOptions) -> ScanResult<MemTable> {
    let metadata = ArrowReaderMetadata::load(&bytes, ArrowReaderOptions::new())?;
    let schema = metadata.schema().clone();

    let mut batches = Vec::new();
    for row_group in 0..metadata.metadata().num_row_groups() {
        let reader = ParquetRecordBatchReaderBuilder::new_with_metadata(bytes.clone(), metadata.clone())
            .with_row_groups(vec![row_group])
            .with_batch_size(options.batch_size.max(1))
            .build()?;
        for batch in reader {
            batches.push(batch?);
        }
    }
    memory_table_from_batches(&schema, &batches, options)
}

/// Load an Arrow IPC file (Feather v2) into memory. Batches larger than `batch_size` are
/// split.
pub fn read_ipc_to_memory(path: impl AsRef<Path>, options: &LoadOptions) -> ScanResult<MemTable> {
    let reader = arrow_ipc::reader::FileReader::try_new(File::open(path)?, None)?;
    let schema: SchemaRef = reader.schema();
    let step = options.batch_size.max(1);

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch?;
        let mut offset = 0;
        while offset < batch.num_rows() {
            let len = step.min(batch.num_rows() - offset);
            batches.push(batch.slice(offset, len));
            offset += len;
        }
    }
    memory_table_from_batches(&schema, &batches, options)
}

enum FlatColumn {
    Float64(Vec<f64>),
    Int32(Vec<i32>),
    Utf8(Vec<Arc<str>>),
}

/// Write `table` as Parquet, cutting a row group at every segment boundary of every column.
pub fn write_parquet<W: Write + Send>(table: &MemTable, writer: W) -> ScanResult<()> {
    let mut fields = Vec::with_capacity(table.columns().len());
    let mut flat = Vec::with_capacity(table.columns().len());
    for (idx, column) in table.columns().iter().enumerate() {
        let (data_type, values) = match column.data() {
            ColumnData::Float64(chunks) => (DataType::Float64, FlatColumn::Float64(chunks.concat())),
            ColumnData::Int32(chunks) => (DataType::Int32, FlatColumn::Int32(chunks.concat())),
            ColumnData::Utf8(chunks) => (DataType::Utf8, FlatColumn::Utf8(chunks.concat())),
            ColumnData::Dictionary { chunks, dictionary } => {
                let resolved = chunks
                    .iter()
                    .flatten()
                    .map(|&key| dictionary.resolve(key))
                    .collect::<ScanResult<Vec<_>>>()?;
                (DataType::Utf8, FlatColumn::Utf8(resolved))
            }
            ColumnData::Unsupported { type_name, .. } => {
                return Err(ScanError::UnsupportedPhysicalType {
                    column: idx,
                    type_name: type_name.clone(),
                })
            }
        };
        fields.push(Field::new(column.name(), data_type, false));
        flat.push(values);
    }

    let mut boundaries: Vec<usize> = table
        .columns()
        .iter()
        .flat_map(|column| {
            column.chunk_lens().into_iter().scan(0, |end, len| {
                *end += len;
                Some(*end)
            })
        })
        .filter(|&end| end > 0)
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();

    let schema = Arc::new(Schema::new(fields));
    let mut writer = ArrowWriter::try_new(writer, schema.clone(), None)?;
    let mut start = 0;
    for end in boundaries {
        let arrays = flat
            .iter()
            .map(|column| -> ArrayRef {
                match column {
                    FlatColumn::Float64(values) => {
                        Arc::new(Float64Array::from(values[start..end].to_vec()))
                    }
                    FlatColumn::Int32(values) => {
                        Arc::new(Int32Array::from(values[start..end].to_vec()))
                    }
                    FlatColumn::Utf8(values) => Arc::new(StringArray::from_iter_values(
                        values[start..end].iter().map(|s| s.as_ref()),
                    )),
                }
            })
            .collect();
        writer.write(&RecordBatch::try_new(schema.clone(), arrays)?)?;
        writer.flush()?;
        log::trace!("wrote row group for rows {start}..{end}");
        start = end;
    }
    writer.close()?;
    Ok(())
}

/// Write `table` to a Parquet file at `path`.
pub fn write_parquet_file(table: &MemTable, path: impl AsRef<Path>) -> ScanResult<()> {
    write_parquet(table, File::create(path)?)
}
