#![forbid(unsafe_code)]

use crate::candidates::CandidateSet;
use crate::decoder::{SegmentSource, TableColumn};
use crate::error::{ScanError, ScanResult};
use crate::filter::filter_column;
use crate::project::{project_column, ColumnValues, DictionaryOutput};
use crate::types::{CmpOp, PhysicalType, Predicate};
use std::sync::Arc;

/// A table the scan engine can read: a fixed number of rows and positionally identified
/// columns, each exposed as an ordered run of segments.
pub trait ScanTable: Sized {
    type Float64Segments<'a>: SegmentSource<Value = f64>
    where
        Self: 'a;
    type Int32Segments<'a>: SegmentSource<Value = i32>
    where
        Self: 'a;
    type Utf8Segments<'a>: SegmentSource<Value = Arc<str>>
    where
        Self: 'a;
    type DictionarySegments<'a>: SegmentSource<Value = u32>
    where
        Self: 'a;

    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize;

    fn column_name(&self, col: usize) -> Option<&str>;

    /// Physical type of `col`, or an error if the column does not exist or has a type the
    /// engine cannot scan.
    fn physical_type(&self, col: usize) -> ScanResult<PhysicalType>;

    /// Row count of every segment of `col`, read from metadata.
    fn segment_lens(&self, col: usize) -> ScanResult<Vec<usize>>;

    fn column(&self, col: usize) -> ScanResult<TableColumn<'_, Self>>;
}

/// One filter of a scan request. The operand is kept as text and parsed into the column's
/// type when the scan is validated.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSpec {
    pub column: usize,
    pub op: CmpOp,
    pub operand: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanRequest {
    pub projections: Vec<usize>,
    pub filters: Vec<FilterSpec>,
}

impl ScanRequest {
    pub fn new(projections: impl Into<Vec<usize>>) -> Self {
        Self {
            projections: projections.into(),
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, column: usize, op: CmpOp, operand: impl Into<String>) -> Self {
        self.filters.push(FilterSpec {
            column,
            op,
            operand: operand.into(),
        });
        self
    }

    /// Build a request from parallel filter lists: `filter_columns[i]`, `operators[i]` and
    /// `operands[i]` describe filter `i`.
    pub fn from_parallel(
        projections: Vec<usize>,
        filter_columns: &[usize],
        operators: &[&str],
        operands: &[&str],
    ) -> ScanResult<Self> {
        if filter_columns.len() != operators.len() || filter_columns.len() != operands.len() {
            return Err(ScanError::FilterArity {
                columns: filter_columns.len(),
                operators: operators.len(),
                operands: operands.len(),
            });
        }

        let filters = filter_columns
            .iter()
            .zip(operators)
            .zip(operands)
            .map(|((&column, op), operand)| {
                Ok(FilterSpec {
                    column,
                    op: op.parse()?,
                    operand: (*operand).to_owned(),
                })
            })
            .collect::<ScanResult<Vec<_>>>()?;

        Ok(Self {
            projections,
            filters,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanOptions {
    pub dictionary_output: DictionaryOutput,
}

/// What a single filter did during a scan.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterOutcome {
    pub column: usize,
    pub op: CmpOp,
    pub operand: String,
    /// Rows still candidates after this filter.
    pub candidates: usize,
    /// The filter was not evaluated because an earlier filter left no candidates.
    pub skipped: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedColumn {
    pub column: usize,
    pub values: ColumnValues,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScanOutput {
    /// One entry per requested projection, in request order.
    pub columns: Vec<ProjectedColumn>,
    pub candidates: CandidateSet,
    pub filters: Vec<FilterOutcome>,
    /// Number of rows in the output columns.
    pub rows: usize,
}

/// Run `request` against `table`.
///
/// Every column id, operator/type pairing and operand is validated before any value is
/// decoded. Filters then run in request order, each narrowing the candidate set of the
/// previous one; once no candidates remain the rest are recorded as skipped. Finally each
/// projection is decoded at the surviving rows.
pub fn scan<T: ScanTable>(
    table: &T,
    request: &ScanRequest,
    options: &ScanOptions,
) -> ScanResult<ScanOutput> {
    let columns = table.column_count();
    let check = |column: usize| -> ScanResult<PhysicalType> {
        if column >= columns {
            return Err(ScanError::UnknownColumn { column, columns });
        }
        table.physical_type(column)
    };

    let predicates = request
        .filters
        .iter()
        .map(|filter| {
            let column_type = check(filter.column)?;
            Predicate::parse(filter.column, column_type, filter.op, &filter.operand)
        })
        .collect::<ScanResult<Vec<_>>>()?;
    for &column in &request.projections {
        check(column)?;
    }

    let total = table.row_count();
    let mut candidates = CandidateSet::Unbounded;
    let mut filters = Vec::with_capacity(request.filters.len());
    for (filter, predicate) in request.filters.iter().zip(&predicates) {
        let skipped = candidates.is_empty();
        if skipped {
            log::debug!(
                "skipping filter {} {} {:?}: no candidates left",
                filter.column,
                filter.op,
                filter.operand
            );
        } else {
            let before = candidates.count(total);
            candidates = filter_column(table.column(filter.column)?, predicate, &candidates)?;
            log::debug!(
                "filter {} {} {:?}: {before} -> {} candidates",
                filter.column,
                filter.op,
                filter.operand,
                candidates.count(total)
            );
        }
        filters.push(FilterOutcome {
            column: filter.column,
            op: filter.op,
            operand: filter.operand.clone(),
            candidates: candidates.count(total),
            skipped,
        });
    }

    let mut projected = Vec::with_capacity(request.projections.len());
    for &column in &request.projections {
        let values = project_column(
            table.column(column)?,
            &candidates,
            options.dictionary_output,
        )?;
        log::debug!("projected column {column}: {} values", values.len());
        projected.push(ProjectedColumn { column, values });
    }

    Ok(ScanOutput {
        columns: projected,
        rows: candidates.count(total),
        candidates,
        filters,
    })
}
