#![forbid(unsafe_code)]

use crate::error::{ScanError, ScanResult};

/// Rows that still qualify after the filters applied so far.
///
/// Bounded row lists are strictly ascending global row ordinals and never empty; an
/// empty result is always represented by [`CandidateSet::Empty`] so stages can
/// short-circuit on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CandidateSet {
    /// Every row qualifies. Only valid before the first filter has run.
    #[default]
    Unbounded,
    /// No row qualifies.
    Empty,
    Bounded(Vec<usize>),
}

impl CandidateSet {
    /// Build a candidate set from caller-supplied rows, checking they are strictly
    /// ascending.
    pub fn from_rows(rows: Vec<usize>) -> ScanResult<Self> {
        for pair in rows.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ScanError::CandidateOrder {
                    row: pair[1],
                    previous: pair[0],
                });
            }
        }
        Ok(Self::from_ascending(rows))
    }

    /// Wrap rows a stage produced in ascending order.
    pub(crate) fn from_ascending(rows: Vec<usize>) -> Self {
        debug_assert!(rows.windows(2).all(|w| w[0] < w[1]));
        if rows.is_empty() {
            CandidateSet::Empty
        } else {
            CandidateSet::Bounded(rows)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CandidateSet::Empty)
    }

    /// The candidate rows, or `None` when every row qualifies.
    pub fn rows(&self) -> Option<&[usize]> {
        match self {
            CandidateSet::Unbounded => None,
            CandidateSet::Empty => Some(&[]),
            CandidateSet::Bounded(rows) => Some(rows),
        }
    }

    /// Number of qualifying rows in a table of `total_rows` rows.
    pub fn count(&self, total_rows: usize) -> usize {
        match self {
            CandidateSet::Unbounded => total_rows,
            CandidateSet::Empty => 0,
            CandidateSet::Bounded(rows) => rows.len(),
        }
    }

    pub fn contains(&self, row: usize) -> bool {
        match self {
            CandidateSet::Unbounded => true,
            CandidateSet::Empty => false,
            CandidateSet::Bounded(rows) => rows.binary_search(&row).is_ok(),
        }
    }

    /// Whether every row in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &CandidateSet) -> bool {
        match (self, other) {
            (_, CandidateSet::Unbounded) | (CandidateSet::Empty, _) => true,
            (CandidateSet::Unbounded, _) => false,
            (CandidateSet::Bounded(_), CandidateSet::Empty) => false,
            (CandidateSet::Bounded(rows), CandidateSet::Bounded(_)) => {
                rows.iter().all(|row| other.contains(*row))
            }
        }
    }
}
