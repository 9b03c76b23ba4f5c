//! Read-only multiple sequence alignment grid

use std::fmt::{self, Display, Formatter};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::blocks::{Block, RowSet};
use crate::errors::PangeblocksError;

/// The gap character used in alignments
pub const GAP: u8 = b'-';

/// An inclusive range of alignment columns `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRange {
    pub start: usize,
    pub end: usize,
}

impl ColumnRange {
    /// Callers guarantee `start <= end`.
    pub(crate) fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "column range start {start} > end {end}");

        Self { start, end }
    }

    pub fn try_new(start: usize, end: usize) -> Result<Self, PangeblocksError> {
        if start > end {
            return Err(PangeblocksError::InvalidRange { start, end });
        }

        Ok(Self { start, end })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    #[inline]
    pub fn contains(&self, col: usize) -> bool {
        self.start <= col && col <= self.end
    }

    #[inline]
    pub fn contains_range(&self, other: &ColumnRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    #[inline]
    pub fn intersect(&self, other: &ColumnRange) -> Option<ColumnRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);

        (start <= end).then_some(ColumnRange { start, end })
    }

    pub fn columns(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }
}

impl Display for ColumnRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.start, self.end)
    }
}

/// A rectangular alignment of `n_seqs` rows by `n_cols` columns.
///
/// Characters are upper-cased on construction, so every label comparison is case-normalized.
#[derive(Debug, Clone)]
pub struct Msa {
    names: Vec<String>,
    rows: Vec<Vec<u8>>,
    n_cols: usize,
}

impl Msa {
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<u8>>) -> Result<Self, PangeblocksError> {
        if names.len() != rows.len() {
            return Err(PangeblocksError::InvalidMsa(
                format!("{} names given for {} rows", names.len(), rows.len())
            ));
        }

        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((ix, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
            return Err(PangeblocksError::InvalidMsa(
                format!("row {} ('{}') has {} columns, expected {n_cols}", ix, names[ix], row.len())
            ));
        }

        let rows = rows.into_iter()
            .map(|mut r| {
                r.make_ascii_uppercase();
                r
            })
            .collect();

        Ok(Self { names, rows, n_cols })
    }

    /// Build an alignment from plain strings, naming rows `seq0`, `seq1`, ...
    pub fn from_sequences<S: AsRef<str>>(sequences: &[S]) -> Result<Self, PangeblocksError> {
        let names = (0..sequences.len()).map(|r| format!("seq{r}")).collect();
        let rows = sequences.iter().map(|s| s.as_ref().as_bytes().to_vec()).collect();

        Self::from_rows(names, rows)
    }

    #[inline(always)]
    pub fn n_seqs(&self) -> usize {
        self.rows.len()
    }

    #[inline(always)]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.n_cols == 0 || self.rows.is_empty()
    }

    /// The range of all columns, `None` for an alignment without columns.
    pub fn full_range(&self) -> Option<ColumnRange> {
        (!self.is_empty()).then(|| ColumnRange::new(0, self.n_cols - 1))
    }

    #[inline(always)]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.rows[row][col]
    }

    pub fn row(&self, row: usize) -> &[u8] {
        &self.rows[row]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Alignment content of a single row over a column range.
    pub fn slice(&self, row: usize, range: ColumnRange) -> &[u8] {
        &self.rows[row][range.start..=range.end]
    }

    /// Label of a block, read from the first row of its row set.
    pub fn label(&self, block: &Block) -> String {
        let first = block.rows().first();

        String::from_utf8_lossy(self.slice(first, block.range())).into_owned()
    }

    /// Checks that a block lies inside the grid and that all its rows spell the same string,
    /// which must also match the block's stored label if it carries one.
    pub fn check_label(&self, block: &Block) -> Result<(), PangeblocksError> {
        let out_of_bounds = block.end() >= self.n_cols
            || block.rows().iter().any(|r| r >= self.n_seqs());
        if out_of_bounds {
            return Err(PangeblocksError::InvariantViolation(format!(
                "block {block} lies outside the {}x{} alignment", self.n_seqs(), self.n_cols
            )));
        }

        let expected = self.slice(block.rows().first(), block.range());
        if let Some(row) = block.rows().iter().find(|r| self.slice(*r, block.range()) != expected) {
            return Err(PangeblocksError::InvariantViolation(format!(
                "block {block} is not row-uniform: row {row} reads '{}', row {} reads '{}'",
                String::from_utf8_lossy(self.slice(row, block.range())),
                block.rows().first(),
                String::from_utf8_lossy(expected),
            )));
        }

        if let Some(label) = block.label() {
            if !label.as_bytes().eq_ignore_ascii_case(expected) {
                return Err(PangeblocksError::InvariantViolation(format!(
                    "block {block} carries label '{label}' but the alignment reads '{}'",
                    String::from_utf8_lossy(expected),
                )));
            }
        }

        Ok(())
    }

    /// Groups the rows of a column by character, in order of first appearance.
    pub fn column_groups(&self, col: usize) -> Vec<(u8, RowSet)> {
        let mut groups: Vec<(u8, Vec<usize>)> = Vec::new();
        for (row, seq) in self.rows.iter().enumerate() {
            let c = seq[col];
            match groups.iter_mut().find(|(gc, _)| *gc == c) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((c, vec![row])),
            }
        }

        groups.into_iter()
            .map(|(c, rows)| (c, RowSet::new(rows)))
            .collect()
    }
}
