//! Providers of maximal blocks

use crate::blocks::{Block, RowSet};
use crate::blocks::geometry::clip;
use crate::errors::PangeblocksError;
use crate::msa::{ColumnRange, Msa};

/// Anything that can hand out the maximal blocks of an alignment restricted to a column range.
///
/// Implementations must return blocks lying inside `range`; blocks that extend beyond it are
/// clipped.
pub trait MaximalBlockSource {
    fn maximal_blocks(&self, msa: &Msa, range: ColumnRange) -> Result<Vec<Block>, PangeblocksError>;
}

impl MaximalBlockSource for Vec<Block> {
    fn maximal_blocks(&self, msa: &Msa, range: ColumnRange) -> Result<Vec<Block>, PangeblocksError> {
        self.as_slice().maximal_blocks(msa, range)
    }
}

impl MaximalBlockSource for [Block] {
    fn maximal_blocks(&self, msa: &Msa, range: ColumnRange) -> Result<Vec<Block>, PangeblocksError> {
        let mut blocks = Vec::with_capacity(self.len());
        for block in self {
            msa.check_label(block)?;

            if let Some(clipped) = clip(block, &range) {
                blocks.push(clipped);
            }
        }

        Ok(blocks)
    }
}

/// Builds blocks from the groups of rows that share a character in some column.
///
/// For every column and every group of at least `min_rows` rows with the same character, the
/// group is extended to both sides as long as all its rows keep agreeing. The blocks are maximal
/// in their columns for their row set, but not necessarily in their rows.
#[derive(Debug, Clone, Copy)]
pub struct SharedRunSource {
    min_rows: usize,
}

impl SharedRunSource {
    pub fn new(min_rows: usize) -> Self {
        Self { min_rows: min_rows.max(1) }
    }

    fn rows_agree(msa: &Msa, rows: &RowSet, col: usize) -> bool {
        let c = msa.get(rows.first(), col);
        rows.iter().all(|r| msa.get(r, col) == c)
    }
}

impl Default for SharedRunSource {
    fn default() -> Self {
        Self::new(2)
    }
}

impl MaximalBlockSource for SharedRunSource {
    fn maximal_blocks(&self, msa: &Msa, range: ColumnRange) -> Result<Vec<Block>, PangeblocksError> {
        let mut blocks = Vec::new();

        for col in range.columns() {
            for (_, rows) in msa.column_groups(col) {
                if rows.len() < self.min_rows {
                    continue;
                }

                let mut start = col;
                while start > range.start && Self::rows_agree(msa, &rows, start - 1) {
                    start -= 1;
                }

                let mut end = col;
                while end < range.end && Self::rows_agree(msa, &rows, end + 1) {
                    end += 1;
                }

                blocks.push(Block::new(rows, start, end)?);
            }
        }

        blocks.sort_unstable();
        blocks.dedup();

        Ok(blocks)
    }
}
