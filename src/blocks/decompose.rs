//! Pairwise block decomposition and its closure over a block set.
//!
//! Two blocks *intersect* when they share rows and columns. Such a pair is replaced by blocks
//! whose row sets are either disjoint or aligned to a common column boundary, so that the cover
//! model can pick either input or a refinement of both. Every derived block is a sub-rectangle of
//! one of the inputs, hence row-uniform whenever the inputs are.

use std::fmt::{self, Display, Formatter};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::blocks::{Block, RowSet};
use crate::blocks::geometry::{cols_overlap, rows_intersect};
use crate::errors::PangeblocksError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecompositionPolicy {
    /// Keep row sets as large as possible, splitting rows only over the shared columns
    #[default]
    RowMaximal,

    /// Emit the intersection and both row differences over full ranges, plus the remainders
    Complete,
}

/// Relative position of the column intervals of a sorted pair `b1 <= b2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// `start1 == start2`, `end1 < end2`
    EqualStart,

    /// `start1 < start2`, `end2 < end1`
    Nested,

    /// `start1 < start2`, `end1 == end2`
    EqualEnd,

    /// `start1 < start2 <= end1 < end2`
    Crossing,

    /// Both blocks span the same columns
    SameInterval,
}

impl Branch {
    pub const ALL: [Branch; 5] = [
        Branch::EqualStart, Branch::Nested, Branch::EqualEnd, Branch::Crossing, Branch::SameInterval
    ];

    /// Classify a pair already sorted by `(start, end)` with overlapping columns.
    fn classify(b1: &Block, b2: &Block) -> Self {
        if b1.start() == b2.start() {
            if b1.end() == b2.end() { Branch::SameInterval } else { Branch::EqualStart }
        } else if b2.end() < b1.end() {
            Branch::Nested
        } else if b2.end() == b1.end() {
            Branch::EqualEnd
        } else {
            Branch::Crossing
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl Display for Branch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Branch::EqualStart => "equal-start",
            Branch::Nested => "nested",
            Branch::EqualEnd => "equal-end",
            Branch::Crossing => "crossing",
            Branch::SameInterval => "same-interval",
        };

        f.write_str(name)
    }
}

/// Counters collected while decomposing the blocks of one sub-MSA.
#[derive(Debug, Clone, Default)]
pub struct DecompositionContext {
    pub pairs_tested: usize,
    pub column_overlaps: usize,
    pub intersections: usize,
    pub rounds: usize,
    pub blocks_in: usize,
    pub blocks_out: usize,
    branch_blocks: [usize; 5],
}

impl DecompositionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks emitted by the given branch, including the row splits over the overlap.
    pub fn emitted(&self, branch: Branch) -> usize {
        self.branch_blocks[branch.index()]
    }

    fn record(&mut self, branch: Branch, emitted: usize) {
        self.branch_blocks[branch.index()] += emitted;
    }

    pub fn log_summary(&self) {
        debug!(
            pairs_tested = self.pairs_tested,
            column_overlaps = self.column_overlaps,
            intersections = self.intersections,
            rounds = self.rounds,
            "Decomposition done: {} blocks in, {} blocks out.",
            self.blocks_in,
            self.blocks_out
        );

        for branch in Branch::ALL {
            if self.emitted(branch) > 0 {
                trace!("Branch {branch}: {} blocks emitted", self.emitted(branch));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Decomposer {
    policy: DecompositionPolicy,
}

impl Decomposer {
    pub fn new(policy: DecompositionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DecompositionPolicy {
        self.policy
    }

    /// Decompose one pair of blocks.
    ///
    /// Returns an empty list if the blocks share no rows or no columns. Otherwise the union of the
    /// returned blocks covers exactly the cells of `a ∪ b`.
    pub fn decompose_pair(
        &self,
        a: &Block,
        b: &Block,
        ctx: &mut DecompositionContext,
    ) -> Result<Vec<Block>, PangeblocksError> {
        let (b1, b2) = if (a.start(), a.end()) <= (b.start(), b.end()) { (a, b) } else { (b, a) };

        ctx.pairs_tested += 1;
        let Some(overlap) = cols_overlap(b1, b2) else {
            return Ok(Vec::new());
        };
        ctx.column_overlaps += 1;

        let common = rows_intersect(b1, b2);
        if common.is_empty() {
            return Ok(Vec::new());
        }
        ctx.intersections += 1;

        let branch = Branch::classify(b1, b2);
        let derive = |rows: &RowSet, start: usize, end: usize| {
            Block::new(rows.clone(), start, end)
                .map_err(|e| PangeblocksError::InvariantViolation(
                    format!("decomposing {b1} and {b2} ({branch} branch): {e}")
                ))
        };

        let (k1, k2) = (b1.rows(), b2.rows());
        let only1 = k1.difference(k2);
        let only2 = k2.difference(k1);

        let mut out = Vec::with_capacity(6);
        match self.policy {
            DecompositionPolicy::RowMaximal => {
                match branch {
                    Branch::EqualStart => {
                        out.push(b1.clone().without_label());
                        out.push(derive(k2, b1.end() + 1, b2.end())?);
                    },
                    Branch::Nested => {
                        out.push(derive(k1, b1.start(), b2.start() - 1)?);
                        out.push(b2.clone().without_label());
                        out.push(derive(k1, b2.end() + 1, b1.end())?);
                    },
                    Branch::EqualEnd => {
                        out.push(derive(k1, b1.start(), b2.start() - 1)?);
                        out.push(b2.clone().without_label());
                    },
                    Branch::Crossing => {
                        out.push(derive(k1, b1.start(), b2.start() - 1)?);
                        out.push(b2.clone().without_label());
                        out.push(b1.clone().without_label());
                        out.push(derive(k2, b1.end() + 1, b2.end())?);
                    },
                    Branch::SameInterval => (),
                }

                // Rows private to one block need their own blocks over the shared columns
                if !only1.is_empty() || !only2.is_empty() {
                    for rows in [&common, &only1, &only2] {
                        if !rows.is_empty() {
                            out.push(derive(rows, overlap.start, overlap.end)?);
                        }
                    }
                }
            },
            DecompositionPolicy::Complete => {
                if b1.start() < b2.start() {
                    out.push(derive(k1, b1.start(), b2.start() - 1)?);
                }
                if b1.end() < b2.end() {
                    out.push(derive(k2, b1.end() + 1, b2.end())?);
                }
                if b2.end() < b1.end() {
                    out.push(derive(k1, b2.end() + 1, b1.end())?);
                }

                out.push(derive(&common, overlap.start, overlap.end)?);

                if !only1.is_empty() {
                    out.push(derive(&only1, b1.start(), b1.end())?);
                }
                if !only2.is_empty() {
                    out.push(derive(&only2, b2.start(), b2.end())?);
                }
            }
        }

        ctx.record(branch, out.len());
        trace!("{b1} x {b2} ({branch}): {} blocks", out.len());

        Ok(out)
    }

    /// Decompose a block set until no intersecting pair yields a block not yet in the set.
    ///
    /// The result holds the (deduplicated) input blocks plus every derived block, sorted by
    /// `(start, end, rows)` and without labels. Each round only tests pairs involving a block
    /// that is new since the previous round; candidate pairs are found with a sweep over the
    /// columns keeping the blocks that are still open.
    pub fn decompose(
        &self,
        blocks: &[Block],
        ctx: &mut DecompositionContext,
    ) -> Result<Vec<Block>, PangeblocksError> {
        ctx.blocks_in += blocks.len();

        let mut known: FxHashSet<Block> = blocks.iter()
            .map(|b| b.clone().without_label())
            .collect();
        let mut fresh: FxHashSet<Block> = known.clone();

        while !fresh.is_empty() {
            ctx.rounds += 1;

            let mut sorted: Vec<&Block> = known.iter().collect();
            sorted.sort_unstable();

            let mut discovered = FxHashSet::default();
            let mut open: Vec<&Block> = Vec::new();
            for block in sorted {
                open.retain(|o| o.end() >= block.start());

                for other in &open {
                    if !fresh.contains(*other) && !fresh.contains(block) {
                        continue;
                    }

                    for derived in self.decompose_pair(other, block, ctx)? {
                        if !known.contains(&derived) {
                            discovered.insert(derived);
                        }
                    }
                }

                open.push(block);
            }

            trace!("Decomposition round {}: {} new blocks", ctx.rounds, discovered.len());
            known.extend(discovered.iter().cloned());
            fresh = discovered;
        }

        let mut result: Vec<Block> = known.into_iter().collect();
        result.sort_unstable();
        ctx.blocks_out += result.len();

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashSet;

    use super::*;
    use crate::blocks::block;
    use crate::blocks::geometry::cells;
    use crate::msa::Msa;

    fn cell_union<'a>(blocks: impl IntoIterator<Item=&'a Block>) -> FxHashSet<(usize, usize)> {
        blocks.into_iter().flat_map(|b| cells(b)).collect()
    }

    fn sorted(mut blocks: Vec<Block>) -> Vec<Block> {
        blocks.sort_unstable();
        blocks
    }

    #[test]
    fn test_regression_crossing_pair() {
        let b1 = block(&[0, 1, 2], 0, 3);
        let b2 = block(&[1, 2, 3], 2, 5);

        let decomposer = Decomposer::new(DecompositionPolicy::RowMaximal);
        let mut ctx = DecompositionContext::new();
        let out = decomposer.decompose_pair(&b2, &b1, &mut ctx).unwrap();

        assert_eq!(sorted(out.clone()), sorted(vec![
            block(&[0, 1, 2], 0, 1),
            b2.clone(),
            b1.clone(),
            block(&[1, 2, 3], 4, 5),
            block(&[1, 2], 2, 3),
            block(&[0], 2, 3),
            block(&[3], 2, 3),
        ]));
        assert_eq!(ctx.emitted(Branch::Crossing), 7);
        assert_eq!(cell_union(&out), cell_union([&b1, &b2]));
    }

    #[test]
    fn test_branches_preserve_area() {
        let pairs = [
            (block(&[0, 1], 2, 4), block(&[1, 2], 2, 7)),
            (block(&[0, 1, 2], 0, 9), block(&[2, 3], 3, 5)),
            (block(&[0, 1], 0, 5), block(&[1], 3, 5)),
            (block(&[0, 1], 0, 3), block(&[0, 1, 2], 3, 6)),
            (block(&[0, 1], 4, 6), block(&[1, 2], 4, 6)),
        ];

        for policy in [DecompositionPolicy::RowMaximal, DecompositionPolicy::Complete] {
            let decomposer = Decomposer::new(policy);
            for (b1, b2) in &pairs {
                let out = decomposer.decompose_pair(b1, b2, &mut DecompositionContext::new()).unwrap();
                assert!(!out.is_empty());
                assert_eq!(cell_union(&out), cell_union([b1, b2]), "{policy:?} {b1} {b2}");
            }
        }
    }

    #[test]
    fn test_non_intersecting_pair_is_noop() {
        let decomposer = Decomposer::default();
        let mut ctx = DecompositionContext::new();

        let disjoint_cols = decomposer.decompose_pair(&block(&[0, 1], 0, 2), &block(&[0, 1], 3, 4), &mut ctx);
        assert!(disjoint_cols.unwrap().is_empty());

        let disjoint_rows = decomposer.decompose_pair(&block(&[0], 0, 2), &block(&[1], 0, 4), &mut ctx);
        assert!(disjoint_rows.unwrap().is_empty());

        assert_eq!(ctx.pairs_tested, 2);
        assert_eq!(ctx.intersections, 0);
    }

    #[test]
    fn test_complete_policy() {
        let decomposer = Decomposer::new(DecompositionPolicy::Complete);
        let out = decomposer.decompose_pair(
            &block(&[0, 1, 2], 0, 3),
            &block(&[1, 2, 3], 2, 5),
            &mut DecompositionContext::new(),
        ).unwrap();

        assert_eq!(sorted(out), sorted(vec![
            block(&[0, 1, 2], 0, 1),
            block(&[1, 2, 3], 4, 5),
            block(&[1, 2], 2, 3),
            block(&[0], 0, 3),
            block(&[3], 2, 5),
        ]));
    }

    #[test]
    fn test_closure_is_idempotent_and_uniform() {
        let msa = Msa::from_sequences(&[
            "ACGTAC",
            "ACGTTC",
            "TCGTTC",
            "TCGAAC",
        ]).unwrap();

        let maximal = vec![
            block(&[0, 1], 0, 3),
            block(&[1, 2], 1, 5),
            block(&[0, 1, 2, 3], 1, 2),
            block(&[2, 3], 0, 2),
            block(&[0, 1, 2, 3], 5, 5),
        ];

        for policy in [DecompositionPolicy::RowMaximal, DecompositionPolicy::Complete] {
            let decomposer = Decomposer::new(policy);
            let mut ctx = DecompositionContext::new();
            let closed = decomposer.decompose(&maximal, &mut ctx).unwrap();

            for b in &maximal {
                assert!(closed.contains(b));
            }
            for b in &closed {
                assert!(msa.check_label(b).is_ok(), "{b} is not uniform");
            }
            assert_eq!(cell_union(&closed), cell_union(&maximal));

            let again = decomposer.decompose(&closed, &mut DecompositionContext::new()).unwrap();
            assert_eq!(again, closed);
            assert!(ctx.rounds >= 2);
        }
    }
}
