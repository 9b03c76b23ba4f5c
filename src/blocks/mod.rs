//! Blocks: rectangles of alignment cells that share the same content on every row

pub mod geometry;
pub mod decompose;
pub mod source;

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::errors::PangeblocksError;
use crate::msa::ColumnRange;

/// A sorted set of alignment row indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct RowSet(SmallVec<[usize; 8]>);

impl RowSet {
    pub fn new(rows: impl IntoIterator<Item=usize>) -> Self {
        let mut rows: SmallVec<[usize; 8]> = rows.into_iter().collect();
        rows.sort_unstable();
        rows.dedup();

        Self(rows)
    }

    pub fn single(row: usize) -> Self {
        Self(smallvec::smallvec![row])
    }

    /// All rows of an alignment with `n_seqs` sequences
    pub fn full(n_seqs: usize) -> Self {
        Self((0..n_seqs).collect())
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Smallest row in the set. Panics on an empty set, which `Block` never holds.
    #[inline]
    pub fn first(&self) -> usize {
        self.0[0]
    }

    #[inline]
    pub fn contains(&self, row: usize) -> bool {
        self.0.binary_search(&row).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item=usize> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn intersection(&self, other: &RowSet) -> RowSet {
        let mut out = SmallVec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].cmp(&other.0[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    out.push(self.0[i]);
                    i += 1;
                    j += 1;
                }
            }
        }

        RowSet(out)
    }

    pub fn difference(&self, other: &RowSet) -> RowSet {
        RowSet(self.0.iter().copied().filter(|r| !other.contains(*r)).collect())
    }

    pub fn union(&self, other: &RowSet) -> RowSet {
        RowSet::new(self.iter().chain(other.iter()))
    }

    pub fn is_subset(&self, other: &RowSet) -> bool {
        self.0.iter().all(|r| other.contains(*r))
    }

    pub fn is_disjoint(&self, other: &RowSet) -> bool {
        self.intersection(other).is_empty()
    }
}

impl FromIterator<usize> for RowSet {
    fn from_iter<T: IntoIterator<Item=usize>>(iter: T) -> Self {
        RowSet::new(iter)
    }
}

impl From<Vec<usize>> for RowSet {
    fn from(rows: Vec<usize>) -> Self {
        RowSet::new(rows)
    }
}

impl From<RowSet> for Vec<usize> {
    fn from(rows: RowSet) -> Self {
        rows.0.into_vec()
    }
}

impl Display for RowSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(","))
    }
}

/// A set of rows `K` sharing identical content over the columns `[start, end]`.
///
/// Blocks are immutable values. Identity is the triple `(K, start, end)`: the label is
/// determined by the alignment and only carried along when a block was read with one.
#[derive(Debug, Clone)]
pub struct Block {
    rows: RowSet,
    start: usize,
    end: usize,
    label: Option<String>,
}

impl Block {
    pub fn new(rows: RowSet, start: usize, end: usize) -> Result<Self, PangeblocksError> {
        if rows.is_empty() || start > end {
            return Err(PangeblocksError::InvalidBlock { rows: rows.len(), start, end });
        }

        Ok(Self { rows, start, end, label: None })
    }

    /// Attach a label. Its length must match the number of columns spanned.
    pub fn with_label(self, label: impl Into<String>) -> Result<Self, PangeblocksError> {
        let label = label.into();
        if label.len() != self.len() {
            return Err(PangeblocksError::InvariantViolation(format!(
                "label '{label}' of block {self} should have length {}", self.len()
            )));
        }

        Ok(Self { label: Some(label), ..self })
    }

    /// Same rows over another column range; the label is dropped.
    pub fn with_range(&self, start: usize, end: usize) -> Result<Self, PangeblocksError> {
        Self::new(self.rows.clone(), start, end)
    }

    pub fn without_label(self) -> Self {
        Self { label: None, ..self }
    }

    #[inline(always)]
    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    #[inline(always)]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline(always)]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline(always)]
    pub fn range(&self) -> ColumnRange {
        ColumnRange { start: self.start, end: self.end }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Number of columns spanned
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of cells covered
    #[inline]
    pub fn area(&self) -> usize {
        self.len() * self.rows.len()
    }

    /// A vertical block spans every sequence of the alignment.
    #[inline]
    pub fn is_vertical(&self, n_seqs: usize) -> bool {
        self.rows.len() == n_seqs
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end && self.rows == other.rows
    }
}

impl Eq for Block {}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rows.hash(state);
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.start, self.end, &self.rows).cmp(&(other.start, other.end, &other.rows))
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.rows, self.start, self.end)
    }
}

/// Convenience constructor used throughout the tests.
#[cfg(test)]
pub(crate) fn block(rows: &[usize], start: usize, end: usize) -> Block {
    Block::new(RowSet::new(rows.iter().copied()), start, end).unwrap()
}
