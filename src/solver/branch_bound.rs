//! Depth-first branch and bound for exact cover models.
//!
//! Every constrained cell must be covered exactly once. The search always branches on the uncovered
//! cell with the fewest selectable blocks, and prunes nodes whose cost plus a lower bound on the
//! cost of covering the remaining cells cannot beat the incumbent.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::cover::CoverModel;
use crate::errors::PangeblocksError;
use crate::solver::{CoverSolver, SolverOutput, SolverStatus};

const EPSILON: f64 = 1e-9;

/// Number of search nodes between two wall-clock checks
const CLOCK_INTERVAL: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct BranchAndBound;

impl BranchAndBound {
    pub fn new() -> Self {
        Self
    }
}

impl CoverSolver for BranchAndBound {
    fn name(&self) -> &str {
        "branch-and-bound"
    }

    fn solve(&self, model: &CoverModel, time_limit: Duration) -> Result<SolverOutput, PangeblocksError> {
        let mut search = SearchState::new(model);
        let result = search.run(time_limit);

        debug!(
            "Branch and bound on {}: {} nodes, status {}, objective {:?}.",
            model.range(), search.nodes, result.status, result.objective
        );

        Ok(result)
    }
}

struct Frame {
    options: Vec<usize>,
    next: usize,
    chosen: Option<usize>,
}

struct SearchState<'a> {
    model: &'a CoverModel,

    cell_vars: Vec<Vec<usize>>,
    var_cells: Vec<Vec<usize>>,

    covered: Vec<bool>,
    num_uncovered: usize,

    /// Number of covered cells of each variable; a variable is selectable only at zero
    blocked: Vec<u32>,

    /// Number of selectable variables of each cell
    available: Vec<u32>,

    selected: Vec<bool>,
    cost: f64,
    min_cost_per_cell: f64,

    best: Option<(f64, Vec<bool>)>,
    nodes: usize,
}

impl<'a> SearchState<'a> {
    fn new(model: &'a CoverModel) -> Self {
        // Constraints on the same cell (<= and >= pairs) share their variables
        let mut cell_index: FxHashMap<(usize, usize), usize> = FxHashMap::default();
        let mut cell_vars: Vec<Vec<usize>> = Vec::new();
        for constraint in model.constraints() {
            cell_index.entry((constraint.row, constraint.col))
                .or_insert_with(|| {
                    cell_vars.push(constraint.vars.clone());
                    cell_vars.len() - 1
                });
        }

        let mut var_cells = vec![Vec::new(); model.num_variables()];
        for (cell, vars) in cell_vars.iter().enumerate() {
            for &var in vars {
                var_cells[var].push(cell);
            }
        }

        let available = cell_vars.iter().map(|vars| vars.len() as u32).collect();

        let min_cost_per_cell = var_cells.iter()
            .enumerate()
            .filter(|(var, cells)| !model.is_fixed(*var) && !cells.is_empty())
            .map(|(var, cells)| model.weights()[var] / cells.len() as f64)
            .fold(f64::INFINITY, f64::min);

        let num_cells = cell_vars.len();
        Self {
            model,
            cell_vars,
            var_cells,
            covered: vec![false; num_cells],
            num_uncovered: num_cells,
            blocked: vec![0; model.num_variables()],
            available,
            selected: vec![false; model.num_variables()],
            cost: 0.0,
            min_cost_per_cell: if min_cost_per_cell.is_finite() { min_cost_per_cell.max(0.0) } else { 0.0 },
            best: None,
            nodes: 0,
        }
    }

    fn select(&mut self, var: usize) {
        for &cell in &self.var_cells[var] {
            self.covered[cell] = true;
            self.num_uncovered -= 1;

            for &other in &self.cell_vars[cell] {
                if self.blocked[other] == 0 {
                    for &c in &self.var_cells[other] {
                        self.available[c] -= 1;
                    }
                }
                self.blocked[other] += 1;
            }
        }

        self.selected[var] = true;
        self.cost += self.model.weights()[var];
    }

    fn unselect(&mut self, var: usize) {
        self.selected[var] = false;
        self.cost -= self.model.weights()[var];

        for &cell in self.var_cells[var].iter().rev() {
            for &other in self.cell_vars[cell].iter().rev() {
                self.blocked[other] -= 1;
                if self.blocked[other] == 0 {
                    for &c in &self.var_cells[other] {
                        self.available[c] += 1;
                    }
                }
            }

            self.covered[cell] = false;
            self.num_uncovered += 1;
        }
    }

    /// The uncovered cell with the fewest selectable variables, `None` if some uncovered cell has
    /// none left.
    fn branch_cell(&self) -> Option<usize> {
        let (cell, available) = self.covered.iter()
            .enumerate()
            .filter(|(_, covered)| !**covered)
            .map(|(cell, _)| (cell, self.available[cell]))
            .min_by_key(|(_, available)| *available)?;

        (available > 0).then_some(cell)
    }

    /// Selectable variables covering a cell, cheapest per covered cell first.
    fn options(&self, cell: usize) -> Vec<usize> {
        let weights = self.model.weights();
        let mut options: Vec<usize> = self.cell_vars[cell].iter()
            .copied()
            .filter(|var| self.blocked[*var] == 0)
            .collect();

        options.sort_by(|a, b| {
            let ratio_a = weights[*a] / self.var_cells[*a].len() as f64;
            let ratio_b = weights[*b] / self.var_cells[*b].len() as f64;

            ratio_a.total_cmp(&ratio_b)
                .then(self.var_cells[*b].len().cmp(&self.var_cells[*a].len()))
                .then(a.cmp(b))
        });

        options
    }

    fn record_incumbent(&mut self) {
        let improves = self.best.as_ref()
            .map(|(best, _)| self.cost < best - EPSILON)
            .unwrap_or(true);

        if improves {
            self.best = Some((self.cost, self.selected.clone()));
        }
    }

    fn run(&mut self, time_limit: Duration) -> SolverOutput {
        let start = Instant::now();

        for var in 0..self.model.num_fixed() {
            if self.blocked[var] > 0 {
                warn!("Fixed variable x{var} conflicts with another fixed variable.");
                return SolverOutput::infeasible();
            }
            self.select(var);
        }

        let mut stack: Vec<Frame> = Vec::new();
        let mut timed_out = false;

        'search: loop {
            if self.nodes % CLOCK_INTERVAL == 0 && start.elapsed() >= time_limit {
                timed_out = true;
                break;
            }
            self.nodes += 1;

            if self.num_uncovered == 0 {
                self.record_incumbent();
            } else {
                let bound = self.cost + self.num_uncovered as f64 * self.min_cost_per_cell;
                let promising = self.best.as_ref()
                    .map(|(best, _)| bound < best - EPSILON)
                    .unwrap_or(true);

                if promising {
                    if let Some(cell) = self.branch_cell() {
                        stack.push(Frame { options: self.options(cell), next: 0, chosen: None });
                    }
                }
            }

            // Move on to the next unexplored branch
            loop {
                let Some(frame) = stack.last_mut() else {
                    break 'search;
                };

                let previous = frame.chosen.take();
                let next = frame.options.get(frame.next).copied();
                frame.next += 1;
                if next.is_some() {
                    frame.chosen = next;
                }

                if let Some(var) = previous {
                    self.unselect(var);
                }

                match next {
                    Some(var) => {
                        self.select(var);
                        break;
                    },
                    None => {
                        stack.pop();
                    }
                }
            }
        }

        let status = match (timed_out, self.best.is_some()) {
            (true, _) => SolverStatus::Timeout,
            (false, true) => SolverStatus::Optimal,
            (false, false) => SolverStatus::Infeasible,
        };

        match self.best.take() {
            Some((objective, assignment)) => SolverOutput {
                status,
                assignment: Some(assignment),
                objective: Some(objective),
            },
            None => SolverOutput { status, assignment: None, objective: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::block;
    use crate::cover::{ConstraintForm, CoverModelBuilder, Objective};
    use crate::msa::{ColumnRange, Msa};

    fn selected(model: &CoverModel, output: &SolverOutput) -> Vec<crate::blocks::Block> {
        let assignment = output.assignment.as_ref().unwrap();
        let mut blocks: Vec<_> = model.variables().iter()
            .zip(assignment)
            .filter(|(_, s)| **s)
            .map(|(b, _)| b.clone())
            .collect();
        blocks.sort_unstable();
        blocks
    }

    #[test]
    fn test_minimum_block_count() {
        let msa = Msa::from_sequences(&["ACGTA", "ACCTA", "ACGTT"]).unwrap();
        let candidates = vec![
            block(&[0, 2], 2, 3),
            block(&[1], 2, 2),
            block(&[1], 3, 3),
            block(&[0, 1], 3, 4),
            block(&[0], 3, 3),
            block(&[2], 3, 3),
            block(&[0, 1], 4, 4),
            block(&[2], 4, 4),
            block(&[0, 2], 2, 2),
        ];

        for form in [ConstraintForm::Equality, ConstraintForm::Split] {
            let model = CoverModelBuilder::new(Objective::Nodes, form)
                .build(&msa, ColumnRange::new(0, 4), vec![block(&[0, 1, 2], 0, 1)], candidates.clone())
                .unwrap();

            let output = BranchAndBound::new().solve(&model, Duration::from_secs(10)).unwrap();
            assert_eq!(output.status, SolverStatus::Optimal);
            assert_eq!(output.objective, Some(6.0));

            let chosen = selected(&model, &output);
            assert!(chosen.contains(&block(&[0, 1, 2], 0, 1)));
            assert_eq!(chosen.len(), 6);
        }
    }

    #[test]
    fn test_weights_change_optimum() {
        let msa = Msa::from_sequences(&["AAAA", "AAAA"]).unwrap();
        let candidates = vec![
            block(&[0, 1], 0, 3),
            block(&[0], 0, 3),
            block(&[1], 0, 3),
        ];

        let model = CoverModelBuilder::new(Objective::Nodes, ConstraintForm::Equality)
            .build(&msa, ColumnRange::new(0, 3), vec![], candidates.clone())
            .unwrap();
        let output = BranchAndBound::new().solve(&model, Duration::from_secs(10)).unwrap();
        assert_eq!(selected(&model, &output), vec![block(&[0, 1], 0, 3)]);

        // Two sequences out of two is full depth, so no penalty applies to the shared block
        let depth = Objective::Depth { penalty: 3.0, min_coverage: 0.75 };
        let model = CoverModelBuilder::new(depth, ConstraintForm::Equality)
            .build(&msa, ColumnRange::new(0, 3), vec![], candidates)
            .unwrap();
        let output = BranchAndBound::new().solve(&model, Duration::from_secs(10)).unwrap();
        assert_eq!(output.objective, Some(1.0));
    }

    #[test]
    fn test_infeasible_model() {
        let msa = Msa::from_sequences(&["AC", "AG"]).unwrap();
        let candidates = vec![
            block(&[0, 1], 0, 0),
            block(&[0], 0, 1),
            block(&[1], 1, 1),
        ];

        let model = CoverModelBuilder::default()
            .build(&msa, ColumnRange::new(0, 1), vec![], candidates)
            .unwrap();
        let output = BranchAndBound::new().solve(&model, Duration::from_secs(10)).unwrap();

        assert_eq!(output.status, SolverStatus::Infeasible);
        assert!(output.assignment.is_none());
    }

    #[test]
    fn test_zero_time_limit() {
        let msa = Msa::from_sequences(&["AC", "AG"]).unwrap();
        let model = CoverModelBuilder::default()
            .build(&msa, ColumnRange::new(0, 1), vec![], vec![block(&[0], 0, 1), block(&[1], 0, 1)])
            .unwrap();

        let output = BranchAndBound::new().solve(&model, Duration::ZERO).unwrap();
        assert_eq!(output.status, SolverStatus::Timeout);
        assert!(output.assignment.is_none());
    }
}
