#![forbid(unsafe_code)]

use super::{ColumnData, MemColumn, MemTable, TableOptions};
use crate::error::{ScanError, ScanResult};
use crate::types::{ColumnSchema, Dictionary, PhysicalType, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a [`MemTable`] row by row, cutting a chunk every `chunk_rows` rows or whenever
/// [`MemTableBuilder::finish_chunk`] is called.
pub struct MemTableBuilder {
    schema: Vec<ColumnSchema>,
    options: TableOptions,
    builders: Vec<ColumnBuilder>,
    rows: usize,
    chunk_fill: usize,
}

enum ColumnBuilder {
    Float64(ChunkBuilder<f64>),
    Int32(ChunkBuilder<i32>),
    Utf8(ChunkBuilder<Arc<str>>),
    Dictionary {
        keys: ChunkBuilder<u32>,
        interner: DictionaryInterner,
    },
}

struct ChunkBuilder<T> {
    current: Vec<T>,
    chunks: Vec<Vec<T>>,
}

impl<T> ChunkBuilder<T> {
    fn new(chunk_rows: usize) -> Self {
        Self {
            current: Vec::with_capacity(chunk_rows.min(4096)),
            chunks: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            let capacity = self.current.capacity();
            self.chunks
                .push(std::mem::replace(&mut self.current, Vec::with_capacity(capacity)));
        }
    }

    fn finish(mut self) -> Vec<Vec<T>> {
        self.flush();
        self.chunks
    }
}

/// Assigns dense `u32` indices to distinct strings in first-seen order.
#[derive(Debug, Default)]
pub(crate) struct DictionaryInterner {
    values: Vec<Arc<str>>,
    index: HashMap<Arc<str>, u32>,
}

impl DictionaryInterner {
    pub(crate) fn intern(&mut self, s: &Arc<str>) -> u32 {
        if let Some(idx) = self.index.get(s.as_ref()) {
            return *idx;
        }

        let idx = self.values.len() as u32;
        self.values.push(s.clone());
        self.index.insert(s.clone(), idx);
        idx
    }

    pub(crate) fn finish(self) -> Dictionary {
        Dictionary::new(self.values)
    }
}

impl MemTableBuilder {
    pub fn new(schema: Vec<ColumnSchema>, options: TableOptions) -> Self {
        let chunk_rows = options.chunk_rows.max(1);
        let builders = schema
            .iter()
            .map(|col| match col.column_type {
                PhysicalType::Float64 => ColumnBuilder::Float64(ChunkBuilder::new(chunk_rows)),
                PhysicalType::Int32 => ColumnBuilder::Int32(ChunkBuilder::new(chunk_rows)),
                PhysicalType::Utf8 => ColumnBuilder::Utf8(ChunkBuilder::new(chunk_rows)),
                PhysicalType::Dictionary => ColumnBuilder::Dictionary {
                    keys: ChunkBuilder::new(chunk_rows),
                    interner: DictionaryInterner::default(),
                },
            })
            .collect();

        Self {
            schema,
            options: TableOptions { chunk_rows },
            builders,
            rows: 0,
            chunk_fill: 0,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append one row. The row is checked against the schema before anything is written, so
    /// a rejected row leaves the builder unchanged.
    pub fn append_row(&mut self, row: &[Value]) -> ScanResult<()> {
        if row.len() != self.builders.len() {
            return Err(ScanError::RowArity {
                expected: self.builders.len(),
                actual: row.len(),
            });
        }

        for (column, (schema, value)) in self.schema.iter().zip(row).enumerate() {
            let ok = matches!(
                (schema.column_type, value),
                (PhysicalType::Float64, Value::Float64(_))
                    | (PhysicalType::Int32, Value::Int32(_))
                    | (PhysicalType::Utf8 | PhysicalType::Dictionary, Value::Utf8(_))
            );
            if !ok {
                return Err(ScanError::ValueType {
                    column,
                    column_type: schema.column_type,
                    value: value.to_string(),
                });
            }
        }

        for (builder, value) in self.builders.iter_mut().zip(row) {
            match (builder, value) {
                (ColumnBuilder::Float64(b), Value::Float64(v)) => b.current.push(*v),
                (ColumnBuilder::Int32(b), Value::Int32(v)) => b.current.push(*v),
                (ColumnBuilder::Utf8(b), Value::Utf8(v)) => b.current.push(v.clone()),
                (ColumnBuilder::Dictionary { keys, interner }, Value::Utf8(v)) => {
                    keys.current.push(interner.intern(v))
                }
                _ => {}
            }
        }

        self.rows += 1;
        self.chunk_fill += 1;
        if self.chunk_fill == self.options.chunk_rows {
            self.finish_chunk();
        }
        Ok(())
    }

    /// Close the current chunk early. Does nothing if no rows were added since the last cut.
    pub fn finish_chunk(&mut self) {
        if self.chunk_fill == 0 {
            return;
        }
        for builder in &mut self.builders {
            match builder {
                ColumnBuilder::Float64(b) => b.flush(),
                ColumnBuilder::Int32(b) => b.flush(),
                ColumnBuilder::Utf8(b) => b.flush(),
                ColumnBuilder::Dictionary { keys, .. } => keys.flush(),
            }
        }
        self.chunk_fill = 0;
    }

    pub fn finalize(mut self) -> MemTable {
        self.finish_chunk();

        let columns = self
            .schema
            .into_iter()
            .zip(self.builders)
            .map(|(schema, builder)| {
                let data = match builder {
                    ColumnBuilder::Float64(b) => ColumnData::Float64(b.finish()),
                    ColumnBuilder::Int32(b) => ColumnData::Int32(b.finish()),
                    ColumnBuilder::Utf8(b) => ColumnData::Utf8(b.finish()),
                    ColumnBuilder::Dictionary { keys, interner } => ColumnData::Dictionary {
                        chunks: keys.finish(),
                        dictionary: Arc::new(interner.finish()),
                    },
                };
                MemColumn::from_data(schema.name, data)
            })
            .collect();

        MemTable {
            columns,
            rows: self.rows,
        }
    }
}
