#![forbid(unsafe_code)]

use crate::candidates::CandidateSet;
use crate::decoder::{ColumnSource, DecodePosition, SegmentSource};
use crate::error::ScanResult;
use crate::types::PhysicalType;
use std::sync::Arc;

/// How dictionary-encoded columns are returned by a projection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DictionaryOutput {
    /// Raw dictionary indices.
    Indices,
    /// Indices resolved through the column dictionary.
    #[default]
    Strings,
}

/// Decoded values of one projected column, in row order.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValues {
    Float64(Vec<f64>),
    Int32(Vec<i32>),
    Utf8(Vec<Arc<str>>),
    DictionaryIndices(Vec<u32>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::Utf8(v) => v.len(),
            ColumnValues::DictionaryIndices(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn empty(column_type: PhysicalType, output: DictionaryOutput) -> Self {
        match (column_type, output) {
            (PhysicalType::Float64, _) => ColumnValues::Float64(Vec::new()),
            (PhysicalType::Int32, _) => ColumnValues::Int32(Vec::new()),
            (PhysicalType::Utf8, _) | (PhysicalType::Dictionary, DictionaryOutput::Strings) => {
                ColumnValues::Utf8(Vec::new())
            }
            (PhysicalType::Dictionary, DictionaryOutput::Indices) => {
                ColumnValues::DictionaryIndices(Vec::new())
            }
        }
    }
}

/// Decode the values of `source` at the rows in `incoming`.
///
/// Uses the same skip-then-decode walk as [`crate::filter_segments`], without a predicate.
pub fn project_segments<S>(source: S, incoming: &CandidateSet) -> ScanResult<Vec<S::Value>>
where
    S: SegmentSource,
{
    match incoming {
        CandidateSet::Empty => Ok(Vec::new()),
        CandidateSet::Unbounded => {
            let mut out = Vec::new();
            DecodePosition::new(source).for_each_row(|_, value| out.push(value))?;
            Ok(out)
        }
        CandidateSet::Bounded(rows) => {
            let mut position = DecodePosition::new(source);
            let mut out = Vec::with_capacity(rows.len());
            for &row in rows {
                out.push(position.read(row)?);
            }
            Ok(out)
        }
    }
}

pub fn project_column<F, I, S, D>(
    column: ColumnSource<F, I, S, D>,
    incoming: &CandidateSet,
    output: DictionaryOutput,
) -> ScanResult<ColumnValues>
where
    F: SegmentSource<Value = f64>,
    I: SegmentSource<Value = i32>,
    S: SegmentSource<Value = Arc<str>>,
    D: SegmentSource<Value = u32>,
{
    if incoming.is_empty() {
        return Ok(ColumnValues::empty(column.physical_type(), output));
    }

    Ok(match column {
        ColumnSource::Float64(source) => ColumnValues::Float64(project_segments(source, incoming)?),
        ColumnSource::Int32(source) => ColumnValues::Int32(project_segments(source, incoming)?),
        ColumnSource::Utf8(source) => ColumnValues::Utf8(project_segments(source, incoming)?),
        ColumnSource::Dictionary { keys, dictionary } => {
            let indices = project_segments(keys, incoming)?;
            match output {
                DictionaryOutput::Indices => ColumnValues::DictionaryIndices(indices),
                DictionaryOutput::Strings => ColumnValues::Utf8(
                    indices
                        .into_iter()
                        .map(|idx| dictionary.resolve(idx))
                        .collect::<ScanResult<_>>()?,
                ),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::CountingSegments;
    use crate::types::Dictionary;
    use pretty_assertions::assert_eq;

    type TestColumn = ColumnSource<
        CountingSegments<f64>,
        CountingSegments<i32>,
        CountingSegments<Arc<str>>,
        CountingSegments<u32>,
    >;

    #[test]
    fn projects_candidates_across_segments() {
        let (source, calls) =
            CountingSegments::new(vec![vec![10.0, 25.0], vec![7.0], vec![30.0, 15.0]]);
        let values = project_segments(source, &CandidateSet::Bounded(vec![1, 3, 4])).unwrap();
        assert_eq!(values, vec![25.0, 30.0, 15.0]);
        assert_eq!(calls.decoded.get(), 3);
    }

    #[test]
    fn unbounded_projection_returns_every_value() {
        let (source, _) = CountingSegments::new(vec![vec![1, 2], vec![], vec![3]]);
        let values = project_segments(source, &CandidateSet::Unbounded).unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn empty_projection_keeps_column_type() {
        let (source, calls) = CountingSegments::new(vec![vec![1i32, 2]]);
        let column: TestColumn = ColumnSource::Int32(source);
        let values =
            project_column(column, &CandidateSet::Empty, DictionaryOutput::Strings).unwrap();
        assert_eq!(values, ColumnValues::Int32(Vec::new()));
        assert_eq!(calls.opened.get(), 0);
    }

    #[test]
    fn dictionary_projection_resolves_or_returns_indices() {
        let dictionary = Arc::new(Dictionary::new(vec![Arc::from("M"), Arc::from("F")]));
        let rows = CandidateSet::Bounded(vec![0, 2, 3]);

        let (keys, _) = CountingSegments::new(vec![vec![1, 0], vec![0, 1]]);
        let column: TestColumn = ColumnSource::Dictionary {
            keys,
            dictionary: dictionary.clone(),
        };
        let values = project_column(column, &rows, DictionaryOutput::Indices).unwrap();
        assert_eq!(values, ColumnValues::DictionaryIndices(vec![1, 0, 1]));

        let (keys, _) = CountingSegments::new(vec![vec![1, 0], vec![0, 1]]);
        let column: TestColumn = ColumnSource::Dictionary { keys, dictionary };
        let values = project_column(column, &rows, DictionaryOutput::Strings).unwrap();
        assert_eq!(
            values,
            ColumnValues::Utf8(vec![Arc::from("F"), Arc::from("M"), Arc::from("F")])
        );
    }
}
