//! Vertical blocks: blocks spanning every row of the alignment.
//!
//! A cell of a column covered by a vertical block can only be covered optimally by that block, so
//! vertical blocks are fixed before building the cover model and the columns they span are removed
//! from the search space.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::blocks::{Block, RowSet};
use crate::blocks::geometry::clip;
use crate::errors::PangeblocksError;
use crate::msa::ColumnRange;

/// Sorted, pairwise disjoint column ranges of the vertical blocks to fix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerticalChain {
    ranges: Vec<ColumnRange>,
}

impl VerticalChain {
    /// Builds the chain from all vertical blocks among `blocks`.
    ///
    /// For each start column only the block reaching furthest right is kept, then for each end
    /// column the one starting furthest left. Vertical ranges that still overlap describe columns
    /// that are all uniform, so they are merged into one.
    pub fn from_blocks<'a>(n_seqs: usize, blocks: impl IntoIterator<Item=&'a Block>) -> Self {
        let mut vertical: Vec<ColumnRange> = blocks.into_iter()
            .filter(|b| b.is_vertical(n_seqs))
            .map(|b| b.range())
            .collect();

        // Left-maximal: sorting by (start, end desc) puts the longest block first for each start
        vertical.sort_unstable_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        vertical.dedup_by_key(|r| r.start);

        // Right-maximal
        vertical.sort_unstable_by(|a, b| a.end.cmp(&b.end).then(a.start.cmp(&b.start)));
        vertical.dedup_by_key(|r| r.end);

        vertical.sort_unstable();
        let mut ranges: Vec<ColumnRange> = Vec::with_capacity(vertical.len());
        for range in vertical {
            match ranges.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => ranges.push(range),
            }
        }

        Self { ranges }
    }

    pub fn ranges(&self) -> &[ColumnRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The vertical range containing a column, if any.
    pub fn covering(&self, col: usize) -> Option<ColumnRange> {
        let ix = self.ranges.partition_point(|r| r.start <= col);
        (ix > 0 && self.ranges[ix - 1].end >= col).then(|| self.ranges[ix - 1])
    }

    /// `true` if the columns of `range` lie within a single vertical range.
    pub fn dominates(&self, range: &ColumnRange) -> bool {
        self.covering(range.start)
            .map(|v| v.contains_range(range))
            .unwrap_or(false)
    }

    /// `true` if any column of `range` is part of a vertical range.
    pub fn overlaps(&self, range: &ColumnRange) -> bool {
        self.ranges.iter().any(|v| v.intersect(range).is_some())
    }

    /// Maximal column ranges inside `within` that are not covered by a vertical range.
    pub fn free_zones(&self, within: ColumnRange) -> Vec<ColumnRange> {
        let mut zones = Vec::new();
        let mut next = within.start;

        for v in &self.ranges {
            if v.end < next {
                continue;
            }
            if v.start > within.end {
                break;
            }

            if v.start > next {
                zones.push(ColumnRange::new(next, v.start - 1));
            }
            next = v.end + 1;
        }

        if next <= within.end {
            zones.push(ColumnRange::new(next, within.end));
        }

        zones
    }

    /// The chain as full-width blocks.
    pub fn fixed_blocks(&self, n_seqs: usize) -> Result<Vec<Block>, PangeblocksError> {
        self.ranges.iter()
            .map(|r| Block::new(RowSet::full(n_seqs), r.start, r.end))
            .collect()
    }
}

/// Candidate set after removing the columns of fixed vertical blocks.
#[derive(Debug, Clone, Default)]
pub struct VerticalOptimization {
    /// Vertical blocks whose selection variable is pinned to one
    pub fixed: Vec<Block>,

    /// Remaining candidates, none of which shares a column with a fixed block
    pub candidates: Vec<Block>,

    pub num_discarded: usize,
    pub num_clipped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct VerticalBlockOptimizer {
    n_seqs: usize,
}

impl VerticalBlockOptimizer {
    pub fn new(n_seqs: usize) -> Self {
        Self { n_seqs }
    }

    /// Fix the vertical chain of a candidate set and restrict the other candidates to the
    /// remaining columns.
    ///
    /// Candidates lying inside a vertical range are dropped, those straddling a vertical boundary
    /// are cut into their parts outside the vertical ranges.
    pub fn optimize(&self, candidates: Vec<Block>) -> Result<VerticalOptimization, PangeblocksError> {
        let chain = VerticalChain::from_blocks(self.n_seqs, &candidates);
        if chain.is_empty() {
            return Ok(VerticalOptimization { candidates, ..Default::default() });
        }

        let fixed = chain.fixed_blocks(self.n_seqs)?;

        let mut seen: FxHashSet<Block> = FxHashSet::default();
        let mut kept = Vec::with_capacity(candidates.len());
        let mut num_discarded = 0;
        let mut num_clipped = 0;

        for block in candidates {
            let range = block.range();
            if chain.dominates(&range) {
                num_discarded += 1;
                continue;
            }

            if !chain.overlaps(&range) {
                if seen.insert(block.clone()) {
                    kept.push(block);
                }
                continue;
            }

            num_clipped += 1;
            for zone in chain.free_zones(range) {
                if let Some(piece) = clip(&block, &zone) {
                    if seen.insert(piece.clone()) {
                        kept.push(piece);
                    }
                }
            }
        }

        debug!(
            "Vertical blocks: {} fixed, {} candidates discarded, {} clipped, {} left.",
            fixed.len(), num_discarded, num_clipped, kept.len()
        );

        Ok(VerticalOptimization { fixed, candidates: kept, num_discarded, num_clipped })
    }
}
