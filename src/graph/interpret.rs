//! Turning solver assignments into block coverages

use tracing::warn;

use crate::blocks::Block;
use crate::cover::CoverModel;
use crate::errors::PangeblocksError;
use crate::msa::{ColumnRange, Msa};
use crate::solver::{SolverOutput, SolverStatus};

/// The blocks chosen for one sub-MSA.
#[derive(Debug, Clone)]
pub struct RangeSolution {
    pub range: ColumnRange,
    pub blocks: Vec<Block>,
    pub num_candidates: usize,
    pub status: SolverStatus,
    pub objective: Option<f64>,
}

/// Collect the blocks selected by a solver, including the fixed ones, and check that they
/// partition the model's columns.
///
/// Optimal and feasible assignments are accepted, as is the incumbent of a solver that ran out of
/// time. Anything else means the model had no solution, which is reported as `ModelInfeasible`.
pub fn interpret(msa: &Msa, model: &CoverModel, output: SolverOutput) -> Result<RangeSolution, PangeblocksError> {
    let infeasible = || PangeblocksError::ModelInfeasible {
        range: model.range(),
        candidates: model.num_variables(),
        status: output.status.to_string(),
    };

    let assignment = match (output.status, &output.assignment) {
        (SolverStatus::Optimal | SolverStatus::Feasible, Some(assignment)) => assignment,
        (SolverStatus::Timeout, Some(assignment)) => {
            warn!(
                "Solver hit the time limit on {}, using its best solution so far which may not be optimal.",
                model.range()
            );
            assignment
        },
        _ => return Err(infeasible()),
    };

    if assignment.len() != model.num_variables() {
        return Err(PangeblocksError::InvariantViolation(format!(
            "solver returned {} values for {} variables", assignment.len(), model.num_variables()
        )));
    }

    let mut blocks: Vec<Block> = model.variables().iter()
        .zip(assignment)
        .enumerate()
        .filter(|(var, (_, selected))| **selected || model.is_fixed(*var))
        .map(|(_, (block, _))| block.clone())
        .collect();
    blocks.sort_unstable();

    validate_partition(msa.n_seqs(), model.range(), &blocks)?;

    Ok(RangeSolution {
        range: model.range(),
        blocks,
        num_candidates: model.num_variables(),
        status: output.status,
        objective: output.objective,
    })
}

/// Check that every cell of `range` is covered by exactly one block.
pub fn validate_partition(n_seqs: usize, range: ColumnRange, blocks: &[Block]) -> Result<(), PangeblocksError> {
    let mut per_row: Vec<Vec<&Block>> = vec![Vec::new(); n_seqs];
    for block in blocks {
        if !range.contains_range(&block.range()) {
            return Err(PangeblocksError::InvariantViolation(
                format!("chosen block {block} lies outside {range}")
            ));
        }

        for row in block.rows().iter() {
            match per_row.get_mut(row) {
                Some(row_blocks) => row_blocks.push(block),
                None => return Err(PangeblocksError::InvariantViolation(
                    format!("chosen block {block} refers to row {row} of a {n_seqs}-row alignment")
                )),
            }
        }
    }

    for (row, row_blocks) in per_row.iter_mut().enumerate() {
        row_blocks.sort_unstable_by_key(|b| b.start());

        let mut next = range.start;
        let mut previous: Option<&Block> = None;
        for block in row_blocks.iter() {
            if block.start() > next {
                return Err(PangeblocksError::CoverageGap { row, col: next });
            }
            if block.start() < next {
                return Err(PangeblocksError::InvariantViolation(format!(
                    "cell ({row},{}) is covered by both {} and {block}",
                    block.start(),
                    previous.map(|p| p.to_string()).unwrap_or_default(),
                )));
            }

            next = block.end() + 1;
            previous = Some(block);
        }

        if next <= range.end {
            return Err(PangeblocksError::CoverageGap { row, col: next });
        }
    }

    Ok(())
}

/// Blocks partitioning a whole alignment, sorted by start column.
#[derive(Debug, Clone, Default)]
pub struct OptimalCoverage {
    blocks: Vec<Block>,
}

impl OptimalCoverage {
    /// Merge the blocks of all sub-MSAs, checking that together they partition the alignment.
    pub fn from_blocks(msa: &Msa, blocks: impl IntoIterator<Item=Block>) -> Result<Self, PangeblocksError> {
        let mut blocks: Vec<Block> = blocks.into_iter().collect();
        blocks.sort_unstable();
        blocks.dedup();

        if let Some(range) = msa.full_range() {
            validate_partition(msa.n_seqs(), range, &blocks)?;
        }

        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The coverage with every block carrying its label read from the alignment.
    pub fn labeled(&self, msa: &Msa) -> Result<Vec<Block>, PangeblocksError> {
        self.blocks.iter()
            .map(|b| b.clone().with_label(msa.label(b)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::blocks::block;
    use crate::cover::CoverModelBuilder;
    use crate::solver::{BranchAndBound, CoverSolver};

    #[test]
    fn test_validate_partition() {
        let range = ColumnRange::new(0, 3);
        let ok = vec![block(&[0, 1], 0, 1), block(&[0], 2, 3), block(&[1], 2, 3)];
        assert!(validate_partition(2, range, &ok).is_ok());

        let gap = vec![block(&[0, 1], 0, 1), block(&[0], 2, 3)];
        assert!(matches!(
            validate_partition(2, range, &gap),
            Err(PangeblocksError::CoverageGap { row: 1, col: 2 })
        ));

        let overlap = vec![block(&[0, 1], 0, 2), block(&[0], 2, 3), block(&[1], 3, 3)];
        assert!(matches!(
            validate_partition(2, range, &overlap),
            Err(PangeblocksError::InvariantViolation(_))
        ));
    }

    fn small_model(msa: &Msa) -> CoverModel {
        CoverModelBuilder::default()
            .build(
                msa,
                ColumnRange::new(0, 1),
                vec![block(&[0, 1], 0, 0)],
                vec![block(&[0], 1, 1), block(&[1], 1, 1)],
            )
            .unwrap()
    }

    #[test]
    fn test_interpret_statuses() {
        let msa = Msa::from_sequences(&["AC", "AG"]).unwrap();
        let model = small_model(&msa);

        let solved = BranchAndBound::new().solve(&model, Duration::from_secs(5)).unwrap();
        let solution = interpret(&msa, &model, solved).unwrap();
        assert_eq!(solution.blocks, vec![block(&[0, 1], 0, 0), block(&[0], 1, 1), block(&[1], 1, 1)]);

        // the fixed block is part of the coverage even if the assignment leaves it out
        let timeout = SolverOutput {
            status: SolverStatus::Timeout,
            assignment: Some(vec![false, true, true]),
            objective: Some(2.0),
        };
        assert_eq!(interpret(&msa, &model, timeout).unwrap().blocks.len(), 3);

        let no_incumbent = SolverOutput { status: SolverStatus::Timeout, assignment: None, objective: None };
        assert!(matches!(
            interpret(&msa, &model, no_incumbent),
            Err(PangeblocksError::ModelInfeasible { candidates: 3, .. })
        ));

        assert!(matches!(
            interpret(&msa, &model, SolverOutput::infeasible()),
            Err(PangeblocksError::ModelInfeasible { .. })
        ));

        let partial = SolverOutput {
            status: SolverStatus::Feasible,
            assignment: Some(vec![true, true, false]),
            objective: None,
        };
        assert!(matches!(
            interpret(&msa, &model, partial),
            Err(PangeblocksError::CoverageGap { row: 1, col: 1 })
        ));
    }

    #[test]
    fn test_labeled_coverage() {
        let msa = Msa::from_sequences(&["AC", "AG"]).unwrap();
        let model = small_model(&msa);
        let solved = BranchAndBound::new().solve(&model, Duration::from_secs(5)).unwrap();
        let solution = interpret(&msa, &model, solved).unwrap();

        let coverage = OptimalCoverage::from_blocks(&msa, solution.blocks).unwrap();
        let labels: Vec<_> = coverage.labeled(&msa).unwrap()
            .iter()
            .map(|b| b.label().unwrap().to_string())
            .collect();
        assert_eq!(labels, vec!["A", "C", "G"]);
    }
}
