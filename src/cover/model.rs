//! Exact-cover optimization model over a candidate block set

use std::fmt::{self, Display, Formatter};
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blocks::Block;
use crate::errors::PangeblocksError;
use crate::msa::{ColumnRange, Msa, GAP};

/// Linear objective to minimize over the selected blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Objective {
    /// Number of blocks
    #[default]
    Nodes,

    /// Total number of non-gap characters in the labels
    Strings,

    /// Number of blocks, blocks with fewer than `min_len` non-gap characters cost `penalty`
    Weighted { penalty: f64, min_len: usize },

    /// Number of blocks, blocks covering less than `min_coverage` of the sequences cost `penalty`
    Depth { penalty: f64, min_coverage: f64 },
}

impl Objective {
    /// Block weights must be non-negative, otherwise the cost-per-cell bound of the search is
    /// not a lower bound.
    pub fn validate(&self) -> Result<(), PangeblocksError> {
        match *self {
            Objective::Weighted { penalty, .. } | Objective::Depth { penalty, .. } if !(penalty >= 0.0) =>
                Err(PangeblocksError::InvalidObjective(format!("penalty of {self} must be non-negative"))),
            _ => Ok(()),
        }
    }

    /// Cost of selecting a block
    pub fn weight(&self, msa: &Msa, block: &Block) -> f64 {
        match *self {
            Objective::Nodes => 1.0,
            Objective::Strings => non_gap_len(msa, block) as f64,
            Objective::Weighted { penalty, min_len } => {
                if non_gap_len(msa, block) < min_len { penalty } else { 1.0 }
            },
            Objective::Depth { penalty, min_coverage } => {
                let depth = block.rows().len() as f64 / msa.n_seqs().max(1) as f64;
                if depth < min_coverage { penalty } else { 1.0 }
            },
        }
    }
}

impl Display for Objective {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Objective::Nodes => write!(f, "nodes"),
            Objective::Strings => write!(f, "strings"),
            Objective::Weighted { penalty, min_len } => write!(f, "weighted(penalty={penalty}, min_len={min_len})"),
            Objective::Depth { penalty, min_coverage } => write!(f, "depth(penalty={penalty}, min_coverage={min_coverage})"),
        }
    }
}

fn non_gap_len(msa: &Msa, block: &Block) -> usize {
    msa.slice(block.rows().first(), block.range())
        .iter()
        .filter(|c| **c != GAP)
        .count()
}

/// How the per-cell covering constraint is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintForm {
    /// `sum == 1`
    #[default]
    Equality,

    /// `sum <= 1` and `sum >= 1` as separate constraints
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Eq,
    Le,
    Ge,
}

impl Sense {
    fn as_lp(&self) -> &'static str {
        match self {
            Sense::Eq => "=",
            Sense::Le => "<=",
            Sense::Ge => ">=",
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Sense::Eq => "",
            Sense::Le => "_le",
            Sense::Ge => "_ge",
        }
    }
}

/// `sum(vars) <sense> 1` for the cell `(row, col)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellConstraint {
    pub row: usize,
    pub col: usize,
    pub sense: Sense,
    pub vars: Vec<usize>,
}

/// A 0/1 model with one variable per candidate block.
///
/// The fixed vertical blocks come first, their variables are `0..num_fixed()`. Cells in columns of
/// a fixed block have no constraint, since the fixed block covers them.
#[derive(Debug, Clone)]
pub struct CoverModel {
    range: ColumnRange,
    variables: Vec<Block>,
    num_fixed: usize,
    weights: Vec<f64>,
    constraints: Vec<CellConstraint>,
    objective: Objective,
}

impl CoverModel {
    pub fn range(&self) -> ColumnRange {
        self.range
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_fixed(&self) -> usize {
        self.num_fixed
    }

    pub fn is_fixed(&self, var: usize) -> bool {
        var < self.num_fixed
    }

    pub fn variables(&self) -> &[Block] {
        &self.variables
    }

    pub fn block(&self, var: usize) -> &Block {
        &self.variables[var]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn constraints(&self) -> &[CellConstraint] {
        &self.constraints
    }

    pub fn objective_value(&self, assignment: &[bool]) -> f64 {
        assignment.iter()
            .zip(&self.weights)
            .filter(|(selected, _)| **selected)
            .map(|(_, w)| *w)
            .sum()
    }

    /// Write the model in CPLEX LP format.
    pub fn write_lp<W: Write>(&self, mut writer: W) -> Result<(), PangeblocksError> {
        writeln!(writer, "\\ Exact cover of columns {} with {} blocks", self.range, self.variables.len())?;
        writeln!(writer, "\\ Objective: {}", self.objective)?;
        for (ix, block) in self.variables.iter().enumerate() {
            writeln!(writer, "\\ x{ix} = {block}")?;
        }

        writeln!(writer, "Minimize")?;
        write!(writer, " obj:")?;
        for (ix, w) in self.weights.iter().enumerate() {
            let sign = if ix == 0 { "" } else { " +" };
            write!(writer, "{sign} {w} x{ix}")?;
        }
        writeln!(writer)?;

        writeln!(writer, "Subject To")?;
        for constraint in &self.constraints {
            write!(writer, " c_{}_{}{}:", constraint.row, constraint.col, constraint.sense.suffix())?;
            for (i, var) in constraint.vars.iter().enumerate() {
                let sign = if i == 0 { "" } else { " +" };
                write!(writer, "{sign} x{var}")?;
            }
            writeln!(writer, " {} 1", constraint.sense.as_lp())?;
        }

        if self.num_fixed > 0 {
            writeln!(writer, "Bounds")?;
            for var in 0..self.num_fixed {
                writeln!(writer, " x{var} = 1")?;
            }
        }

        writeln!(writer, "Binaries")?;
        for var in 0..self.variables.len() {
            writeln!(writer, " x{var}")?;
        }
        writeln!(writer, "End")?;

        Ok(())
    }
}

/// Builds a [`CoverModel`] for one sub-MSA.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoverModelBuilder {
    objective: Objective,
    form: ConstraintForm,
}

impl CoverModelBuilder {
    pub fn new(objective: Objective, form: ConstraintForm) -> Self {
        Self { objective, form }
    }

    /// Every cell of `range` outside the fixed blocks gets a covering constraint.
    ///
    /// Fails with `CoverageGap` if some cell has no candidate, and with `InvariantViolation` if a
    /// free candidate shares columns with a fixed block or leaves the range.
    pub fn build(
        &self,
        msa: &Msa,
        range: ColumnRange,
        fixed: Vec<Block>,
        candidates: Vec<Block>,
    ) -> Result<CoverModel, PangeblocksError> {
        self.objective.validate()?;

        let fixed_ranges: Vec<ColumnRange> = fixed.iter().map(|b| b.range()).collect();
        let is_fixed_col = |col: usize| fixed_ranges.iter().any(|r| r.contains(col));

        for block in fixed.iter().chain(&candidates) {
            if !range.contains_range(&block.range()) {
                return Err(PangeblocksError::InvariantViolation(
                    format!("candidate {block} lies outside the sub-MSA {range}")
                ));
            }
        }

        if let Some(block) = candidates.iter()
            .find(|b| fixed_ranges.iter().any(|r| r.intersect(&b.range()).is_some()))
        {
            return Err(PangeblocksError::InvariantViolation(
                format!("candidate {block} shares columns with a fixed vertical block")
            ));
        }

        let num_fixed = fixed.len();
        let mut variables = fixed;
        variables.extend(candidates);

        // Variables spanning each column
        let mut by_column: Vec<Vec<usize>> = vec![Vec::new(); range.len()];
        for (var, block) in variables.iter().enumerate().skip(num_fixed) {
            for col in block.range().columns() {
                by_column[col - range.start].push(var);
            }
        }

        let mut constraints = Vec::new();
        for col in range.columns() {
            if is_fixed_col(col) {
                continue;
            }

            let spanning = &by_column[col - range.start];
            for row in 0..msa.n_seqs() {
                let vars: Vec<usize> = spanning.iter()
                    .copied()
                    .filter(|v| variables[*v].rows().contains(row))
                    .collect();

                if vars.is_empty() {
                    return Err(PangeblocksError::CoverageGap { row, col });
                }

                match self.form {
                    ConstraintForm::Equality => {
                        constraints.push(CellConstraint { row, col, sense: Sense::Eq, vars });
                    },
                    ConstraintForm::Split => {
                        constraints.push(CellConstraint { row, col, sense: Sense::Le, vars: vars.clone() });
                        constraints.push(CellConstraint { row, col, sense: Sense::Ge, vars });
                    }
                }
            }
        }

        let weights = variables.iter()
            .map(|b| self.objective.weight(msa, b))
            .collect();

        debug!(
            "Cover model for {range}: {} variables ({num_fixed} fixed), {} constraints, objective {}.",
            variables.len(), constraints.len(), self.objective
        );

        Ok(CoverModel { range, variables, num_fixed, weights, constraints, objective: self.objective })
    }
}
