use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

use crate::msa::ColumnRange;

#[derive(Debug)]
pub enum PangeblocksError {
    /// A block with an empty row set or with start > end
    InvalidBlock { rows: usize, start: usize, end: usize },

    /// A derived block or a chosen coverage broke a structural invariant.
    /// The string carries the diagnostic context (input blocks, branch taken).
    InvariantViolation(String),

    /// A column range with start > end
    InvalidRange { start: usize, end: usize },

    /// An objective whose block weights would be negative or not a number
    InvalidObjective(String),

    /// A grid cell is not covered by any candidate block
    CoverageGap { row: usize, col: usize },

    /// The solver could not produce a feasible assignment for a cover model
    ModelInfeasible { range: ColumnRange, candidates: usize, status: String },

    /// The alignment is empty or its rows have different lengths
    InvalidMsa(String),

    /// A sub-MSA failed, wrapping the underlying error
    RangeFailed { range: ColumnRange, source: Box<PangeblocksError> },

    /// Error variant when we couldn't read from a file
    FileReadError { source: io::Error },

    /// Error variant when a block list could not be (de)serialized
    JsonError { source: serde_json::Error },

    /// Other IO errors
    IOError(io::Error),
}

impl PangeblocksError {
    pub fn in_range(self, range: ColumnRange) -> Self {
        match self {
            Self::RangeFailed { .. } => self,
            other => Self::RangeFailed { range, source: Box::new(other) },
        }
    }
}

impl Error for PangeblocksError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            Self::FileReadError { ref source } => Some(source),
            Self::JsonError { ref source } => Some(source),
            Self::IOError(ref source) => Some(source),
            Self::RangeFailed { ref source, .. } => Some(source.as_ref()),
            _ => None
        }
    }
}

impl From<io::Error> for PangeblocksError {
    fn from(value: io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<serde_json::Error> for PangeblocksError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError {
            source: value
        }
    }
}

impl Display for PangeblocksError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::InvalidBlock { rows, start, end } =>
                write!(f, "Invalid block with {rows} rows and columns [{start},{end}]: row set must be non-empty and start <= end!"),
            Self::InvariantViolation(ref context) =>
                write!(f, "Invariant violation: {context}"),
            Self::InvalidRange { start, end } =>
                write!(f, "Invalid column range [{start},{end}]: start must not exceed end!"),
            Self::InvalidObjective(ref reason) =>
                write!(f, "Invalid objective: {reason}"),
            Self::CoverageGap { row, col } =>
                write!(f, "Cell ({row},{col}) is not covered by any candidate block!"),
            Self::ModelInfeasible { range, candidates, ref status } =>
                write!(f, "Cover model for columns {range} with {candidates} candidate blocks has no feasible solution (solver status: {status})."),
            Self::InvalidMsa(ref reason) =>
                write!(f, "Invalid alignment: {reason}"),
            Self::RangeFailed { range, ref source } =>
                write!(f, "Sub-MSA {range} failed: {source}"),
            Self::FileReadError { source: _ } =>
                write!(f, "Could not read from file!"),
            Self::JsonError { ref source } =>
                write!(f, "Could not (de)serialize blocks as JSON: {source}"),
            Self::IOError(ref err) =>
                err.fmt(f),
        }
    }
}
