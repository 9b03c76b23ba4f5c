//! Coverage gap filling

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::blocks::{Block, RowSet};
use crate::errors::PangeblocksError;
use crate::msa::{ColumnRange, Msa};

/// Per-row column intervals covered by a set of blocks.
///
/// Only the intervals are stored, never the individual cells, so memory grows with the number of
/// blocks and not with the size of the alignment.
#[derive(Debug, Clone)]
pub struct RowCoverage {
    intervals: Vec<Vec<(usize, usize)>>,
}

impl RowCoverage {
    pub fn new<'a>(n_seqs: usize, blocks: impl IntoIterator<Item=&'a Block>) -> Self {
        let mut intervals = vec![Vec::new(); n_seqs];
        for block in blocks {
            for row in block.rows().iter() {
                if let Some(row_ivals) = intervals.get_mut(row) {
                    row_ivals.push((block.start(), block.end()));
                }
            }
        }

        for row_ivals in intervals.iter_mut() {
            Self::merge(row_ivals);
        }

        Self { intervals }
    }

    fn merge(ivals: &mut Vec<(usize, usize)>) {
        ivals.sort_unstable();

        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ivals.len());
        for &(start, end) in ivals.iter() {
            match merged.last_mut() {
                Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        *ivals = merged;
    }

    pub fn is_covered(&self, row: usize, col: usize) -> bool {
        self.intervals.get(row)
            .map(|ivals| {
                let ix = ivals.partition_point(|&(start, _)| start <= col);
                ix > 0 && ivals[ix - 1].1 >= col
            })
            .unwrap_or(false)
    }

    /// Maximal runs of uncovered columns of a row inside `range`.
    pub fn uncovered_runs(&self, row: usize, range: ColumnRange) -> Vec<ColumnRange> {
        let mut runs = Vec::new();
        let mut next = range.start;

        for &(start, end) in &self.intervals[row] {
            if end < next {
                continue;
            }
            if start > range.end {
                break;
            }

            if start > next {
                runs.push(ColumnRange::new(next, start - 1));
            }
            next = end + 1;
        }

        if next <= range.end {
            runs.push(ColumnRange::new(next, range.end));
        }

        runs
    }

    /// The first uncovered cell inside `range`, scanning row by row.
    pub fn first_gap(&self, range: ColumnRange) -> Option<(usize, usize)> {
        (0..self.intervals.len())
            .find_map(|row| self.uncovered_runs(row, range).first().map(|run| (row, run.start)))
    }
}

/// Check that every cell of the range is covered by at least one block.
pub fn check_complete_cover<'a>(
    n_seqs: usize,
    range: ColumnRange,
    blocks: impl IntoIterator<Item=&'a Block>,
) -> Result<(), PangeblocksError> {
    match RowCoverage::new(n_seqs, blocks).first_gap(range) {
        Some((row, col)) => Err(PangeblocksError::CoverageGap { row, col }),
        None => Ok(()),
    }
}

/// Synthesizes the blocks needed to cover every cell of a sub-MSA.
#[derive(Debug, Clone, Copy)]
pub struct CoverageFiller {
    glue: bool,
    single_column: bool,
}

impl Default for CoverageFiller {
    fn default() -> Self {
        Self { glue: true, single_column: true }
    }
}

impl CoverageFiller {
    pub fn new(glue: bool, single_column: bool) -> Self {
        Self { glue, single_column }
    }

    /// Returns the blocks to add to `candidates` so that all cells of `range` are covered.
    ///
    /// Uncovered cells give one single-row block per run of consecutive columns. With gluing,
    /// single-column runs sharing a column and a character are merged into one block. With
    /// single-column candidates, every column outside a vertical candidate also receives one block
    /// per group of rows with the same character, which makes the all-single-column cover always
    /// available to the solver. A group spanning all rows is split into single-row blocks so that it
    /// does not turn into a new vertical block.
    pub fn fill(&self, msa: &Msa, range: ColumnRange, candidates: &[Block]) -> Result<Vec<Block>, PangeblocksError> {
        let coverage = RowCoverage::new(msa.n_seqs(), candidates);
        let known: FxHashSet<&Block> = candidates.iter().collect();
        let mut added: FxHashSet<Block> = FxHashSet::default();

        let mut single_cells: FxHashMap<(usize, u8), Vec<usize>> = FxHashMap::default();
        let mut num_fillers = 0;
        for row in 0..msa.n_seqs() {
            for run in coverage.uncovered_runs(row, range) {
                if self.glue && run.len() == 1 {
                    single_cells.entry((run.start, msa.get(row, run.start)))
                        .or_default()
                        .push(row);
                } else {
                    added.insert(Block::new(RowSet::single(row), run.start, run.end)?);
                    num_fillers += 1;
                }
            }
        }

        for ((col, _), rows) in single_cells {
            added.insert(Block::new(RowSet::new(rows), col, col)?);
            num_fillers += 1;
        }

        let mut num_single_column = 0;
        if self.single_column && msa.n_seqs() > 1 {
            let vertical: Vec<ColumnRange> = candidates.iter()
                .filter(|b| b.is_vertical(msa.n_seqs()))
                .map(|b| b.range())
                .collect();

            for col in range.columns() {
                if vertical.iter().any(|v| v.contains(col)) {
                    continue;
                }

                for (_, rows) in msa.column_groups(col) {
                    let blocks = if rows.len() == msa.n_seqs() {
                        rows.iter()
                            .map(|r| Block::new(RowSet::single(r), col, col))
                            .collect::<Result<Vec<_>, _>>()?
                    } else {
                        vec![Block::new(rows, col, col)?]
                    };

                    for block in blocks {
                        if !known.contains(&block) && added.insert(block) {
                            num_single_column += 1;
                        }
                    }
                }
            }
        }

        debug!("Coverage filler: {num_fillers} filler blocks, {num_single_column} single-column blocks.");

        let mut added: Vec<Block> = added.into_iter()
            .filter(|b| !known.contains(b))
            .collect();
        added.sort_unstable();

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::block;

    #[test]
    fn test_row_coverage() {
        let blocks = vec![block(&[0, 1], 0, 2), block(&[0], 4, 5), block(&[0], 3, 3)];
        let coverage = RowCoverage::new(3, &blocks);

        assert!(coverage.is_covered(0, 5));
        assert!(!coverage.is_covered(0, 6));
        assert!(coverage.is_covered(1, 2));
        assert!(!coverage.is_covered(2, 0));

        let range = ColumnRange::new(0, 7);
        assert_eq!(coverage.uncovered_runs(0, range), vec![ColumnRange::new(6, 7)]);
        assert_eq!(coverage.uncovered_runs(1, range), vec![ColumnRange::new(3, 7)]);
        assert_eq!(coverage.uncovered_runs(2, range), vec![range]);
        assert!(coverage.uncovered_runs(1, ColumnRange::new(1, 2)).is_empty());
        assert_eq!(coverage.first_gap(range), Some((0, 6)));
    }

    #[test]
    fn test_filler_runs_and_glue() {
        let msa = Msa::from_sequences(&["ACGTA", "ACCTA", "ACGTT"]).unwrap();
        let candidates = vec![block(&[0, 1, 2], 0, 1), block(&[0, 2], 0, 3)];
        let range = ColumnRange::new(0, 4);

        let fillers = CoverageFiller::new(true, false).fill(&msa, range, &candidates).unwrap();
        assert_eq!(fillers, vec![
            block(&[1], 2, 4),
            block(&[0], 4, 4),
            block(&[2], 4, 4),
        ]);

        let mut all = candidates.clone();
        all.extend(fillers);
        assert!(check_complete_cover(3, range, &all).is_ok());
        assert!(matches!(
            check_complete_cover(3, range, &candidates),
            Err(PangeblocksError::CoverageGap { row: 0, col: 4 })
        ));
    }

    #[test]
    fn test_glue_same_character() {
        let msa = Msa::from_sequences(&["AC", "AG", "AG"]).unwrap();
        let candidates = vec![block(&[0, 1, 2], 0, 0)];

        let fillers = CoverageFiller::new(true, false)
            .fill(&msa, ColumnRange::new(0, 1), &candidates)
            .unwrap();
        assert_eq!(fillers, vec![block(&[0], 1, 1), block(&[1, 2], 1, 1)]);
    }

    #[test]
    fn test_single_column_candidates() {
        let msa = Msa::from_sequences(&["ACGTA", "ACCTA", "ACGTT"]).unwrap();
        let candidates = vec![block(&[0, 1, 2], 0, 1), block(&[0, 2], 2, 3), block(&[0, 1], 3, 4)];

        let added = CoverageFiller::default()
            .fill(&msa, ColumnRange::new(0, 4), &candidates)
            .unwrap();

        // no single-column blocks inside the vertical block, uniform column 3 is split per row
        assert!(added.iter().all(|b| b.start() >= 2));
        assert!(added.contains(&block(&[0], 3, 3)));
        assert!(added.contains(&block(&[2], 3, 3)));
        assert!(!added.contains(&block(&[0, 1, 2], 3, 3)));
        assert!(added.contains(&block(&[0, 1], 4, 4)));
        assert!(added.contains(&block(&[1], 2, 2)));
        assert!(!added.iter().any(|b| candidates.contains(b)));
    }
}
