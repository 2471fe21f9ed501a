#![forbid(unsafe_code)]

use crate::candidates::CandidateSet;
use crate::decoder::{ColumnSource, DecodePosition, SegmentSource};
use crate::error::{ScanError, ScanResult};
use crate::types::{CmpOp, Operand, Predicate};
use std::sync::Arc;

/// Narrow `incoming` to the rows of `source` whose value satisfies `keep`.
///
/// Only rows in `incoming` are decoded; rows between two candidates are skipped. An
/// [`CandidateSet::Empty`] input returns immediately without touching the source.
pub fn filter_segments<S, F>(
    source: S,
    incoming: &CandidateSet,
    mut keep: F,
) -> ScanResult<CandidateSet>
where
    S: SegmentSource,
    F: FnMut(&S::Value) -> bool,
{
    let mut out = Vec::new();
    match incoming {
        CandidateSet::Empty => return Ok(CandidateSet::Empty),
        CandidateSet::Unbounded => {
            DecodePosition::new(source).for_each_row(|row, value| {
                if keep(&value) {
                    out.push(row);
                }
            })?;
        }
        CandidateSet::Bounded(rows) => {
            let mut position = DecodePosition::new(source);
            for &row in rows {
                if keep(&position.read(row)?) {
                    out.push(row);
                }
            }
        }
    }
    Ok(CandidateSet::from_ascending(out))
}

/// Apply `predicate` to a typed column.
///
/// Dictionary columns translate the operand to a dictionary index once up front; an operand
/// that is not in the dictionary cannot match and yields [`CandidateSet::Empty`]. Ordering
/// operators on string and dictionary columns are rejected, even for an empty `incoming`.
pub fn filter_column<F, I, S, D>(
    column: ColumnSource<F, I, S, D>,
    predicate: &Predicate,
    incoming: &CandidateSet,
) -> ScanResult<CandidateSet>
where
    F: SegmentSource<Value = f64>,
    I: SegmentSource<Value = i32>,
    S: SegmentSource<Value = Arc<str>>,
    D: SegmentSource<Value = u32>,
{
    let op = predicate.op;
    let column_type = column.physical_type();
    if op != CmpOp::Equal && !column_type.is_ordered() {
        return Err(ScanError::UnsupportedOperator {
            column: predicate.column,
            op,
            column_type,
        });
    }
    if incoming.is_empty() {
        return Ok(CandidateSet::Empty);
    }

    match (column, &predicate.operand) {
        (ColumnSource::Float64(source), Operand::Float64(operand)) => {
            filter_segments(source, incoming, |v| op.compare(v, operand))
        }
        (ColumnSource::Int32(source), Operand::Int32(operand)) => {
            filter_segments(source, incoming, |v| op.compare(v, operand))
        }
        (ColumnSource::Utf8(source), Operand::Utf8(operand)) => {
            filter_segments(source, incoming, |v| op.compare(v.as_ref(), operand.as_ref()))
        }
        (ColumnSource::Dictionary { keys, dictionary }, Operand::Utf8(operand)) => {
            let Some(target) = dictionary.translate(operand) else {
                log::debug!("operand {operand:?} is not in the dictionary; no row can match");
                return Ok(CandidateSet::Empty);
            };
            filter_segments(keys, incoming, |v| op.compare(v, &target))
        }
        (column, _) => Err(ScanError::OperandType {
            column_type: column.physical_type(),
        }),
    }
}
