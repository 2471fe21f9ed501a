#![forbid(unsafe_code)]

use crate::error::{ScanError, ScanResult};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Physical encoding of a column as seen by the scan engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Float64,
    Int32,
    Utf8,
    /// Strings stored as `u32` indices into a per-column [`Dictionary`].
    Dictionary,
}

impl PhysicalType {
    /// Only numeric columns support ordering comparisons.
    pub fn is_ordered(self) -> bool {
        matches!(self, PhysicalType::Float64 | PhysicalType::Int32)
    }
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhysicalType::Float64 => "Float64",
            PhysicalType::Int32 => "Int32",
            PhysicalType::Utf8 => "Utf8",
            PhysicalType::Dictionary => "Dictionary<Utf8>",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: PhysicalType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: PhysicalType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A single cell value, used when building in-memory tables row by row.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Float64(f64),
    Int32(i32),
    Utf8(Arc<str>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float64(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Utf8(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Utf8(Arc::from(value))
    }
}

/// Comparison operator of a pushed-down filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Equal,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl CmpOp {
    pub const ALL: [CmpOp; 5] = [
        CmpOp::Equal,
        CmpOp::Greater,
        CmpOp::GreaterEqual,
        CmpOp::Less,
        CmpOp::LessEqual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Equal => "EQUAL",
            CmpOp::Greater => "GREATER",
            CmpOp::GreaterEqual => "GREATER_EQUAL",
            CmpOp::Less => "LESS",
            CmpOp::LessEqual => "LESS_EQUAL",
        }
    }

    /// Evaluate `value <op> operand`.
    ///
    /// Incomparable values (NaN) never satisfy any operator.
    #[inline]
    pub fn compare<T: PartialOrd + ?Sized>(self, value: &T, operand: &T) -> bool {
        match self {
            CmpOp::Equal => value == operand,
            CmpOp::Greater => value > operand,
            CmpOp::GreaterEqual => value >= operand,
            CmpOp::Less => value < operand,
            CmpOp::LessEqual => value <= operand,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CmpOp {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CmpOp::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ScanError::UnknownOperator(s.to_owned()))
    }
}

/// The unique string values of a dictionary-encoded column.
///
/// Order is insertion order; lookups never assume the values are sorted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dictionary {
    values: Vec<Arc<str>>,
}

impl Dictionary {
    pub fn new(values: Vec<Arc<str>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Arc<str>] {
        &self.values
    }

    /// Translate a literal into its dictionary index with a linear search.
    pub fn translate(&self, literal: &str) -> Option<u32> {
        self.values
            .iter()
            .position(|v| v.as_ref() == literal)
            .map(|idx| idx as u32)
    }

    pub fn resolve(&self, index: u32) -> ScanResult<Arc<str>> {
        self.values
            .get(index as usize)
            .cloned()
            .ok_or(ScanError::DictionaryIndex {
                index,
                len: self.values.len(),
            })
    }
}

/// A filter literal parsed into a column's physical type.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Float64(f64),
    Int32(i32),
    Utf8(Arc<str>),
}

/// A comparison that has been checked against the type of the column it filters.
///
/// Built with [`Predicate::parse`].
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub(crate) column: usize,
    pub(crate) op: CmpOp,
    pub(crate) operand: Operand,
}

impl Predicate {
    /// Validate `op` against `column_type` and parse `text` into the column's type.
    pub fn parse(
        column: usize,
        column_type: PhysicalType,
        op: CmpOp,
        text: &str,
    ) -> ScanResult<Self> {
        if op != CmpOp::Equal && !column_type.is_ordered() {
            return Err(ScanError::UnsupportedOperator {
                column,
                op,
                column_type,
            });
        }

        let parse_error = || ScanError::OperandParse {
            column,
            column_type,
            operand: text.to_owned(),
        };
        let operand = match column_type {
            PhysicalType::Float64 => {
                Operand::Float64(text.trim().parse::<f64>().map_err(|_| parse_error())?)
            }
            PhysicalType::Int32 => {
                Operand::Int32(text.trim().parse::<i32>().map_err(|_| parse_error())?)
            }
            PhysicalType::Utf8 | PhysicalType::Dictionary => Operand::Utf8(Arc::from(text)),
        };

        Ok(Self {
            column,
            op,
            operand,
        })
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn op(&self) -> CmpOp {
        self.op
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}
