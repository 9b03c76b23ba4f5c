//! From maximal blocks to an optimal coverage: range splitting, candidate generation, solving.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span};

use crate::blocks::Block;
use crate::blocks::decompose::{DecompositionContext, DecompositionPolicy, Decomposer};
use crate::blocks::geometry::clip;
use crate::blocks::source::MaximalBlockSource;
use crate::cover::{
    check_complete_cover, ConstraintForm, CoverageFiller, CoverModel, CoverModelBuilder, Objective,
    VerticalBlockOptimizer, VerticalChain,
};
use crate::errors::PangeblocksError;
use crate::graph::{interpret, OptimalCoverage, RangeSolution, VariationGraph};
use crate::msa::{ColumnRange, Msa};
use crate::solver::{BranchAndBound, CoverSolver, SolverStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub policy: DecompositionPolicy,
    pub objective: Objective,
    pub constraint_form: ConstraintForm,

    /// Wall-clock limit for each sub-MSA model
    pub time_limit: Duration,

    pub num_workers: usize,

    /// Fix the vertical blocks of the maximal block set up front and solve the columns between
    /// them independently. Without it, the whole alignment is a single model.
    pub split_ranges: bool,

    /// Only maximal vertical blocks spanning at least this many columns split the alignment.
    /// Shorter ones stay inside their sub-MSA, where they are still fixed.
    pub min_vertical_len: usize,

    /// Split the columns between vertical blocks further so that no sub-MSA has more cells
    pub max_cells_per_range: Option<usize>,

    pub single_column_blocks: bool,
    pub glue_fillers: bool,
    pub verify_labels: bool,
    pub remove_gap_nodes: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            policy: DecompositionPolicy::default(),
            objective: Objective::default(),
            constraint_form: ConstraintForm::default(),
            time_limit: Duration::from_secs(3 * 60 * 60),
            num_workers: 1,
            split_ranges: true,
            min_vertical_len: 1,
            max_cells_per_range: None,
            single_column_blocks: true,
            glue_fillers: true,
            verify_labels: true,
            remove_gap_nodes: false,
        }
    }
}

/// One sub-MSA together with the maximal blocks clipped to it.
#[derive(Debug, Clone)]
pub struct RangeProblem {
    pub range: ColumnRange,
    pub maximal: Vec<Block>,
}

/// Vertical blocks fixed for the whole alignment, and the sub-MSAs left to solve.
#[derive(Debug, Clone, Default)]
pub struct RangePlan {
    pub fixed: Vec<Block>,
    pub problems: Vec<RangeProblem>,
}

impl RangePlan {
    pub fn ranges(&self) -> impl Iterator<Item=ColumnRange> + '_ {
        self.problems.iter().map(|p| p.range)
    }
}

/// Candidates of a sub-MSA, ready to be turned into a cover model.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub range: ColumnRange,
    pub fixed: Vec<Block>,
    pub candidates: Vec<Block>,
    pub context: DecompositionContext,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.fixed.len() + self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn blocks(&self) -> impl Iterator<Item=&Block> + '_ {
        self.fixed.iter().chain(&self.candidates)
    }
}

/// Outcome of a run. Sub-MSAs fail independently of each other.
#[derive(Debug, Default)]
pub struct CoverageReport {
    pub fixed: Vec<Block>,
    pub solutions: Vec<RangeSolution>,
    pub failures: Vec<PangeblocksError>,
}

impl CoverageReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Sub-MSAs that were not solved to optimality.
    pub fn num_suboptimal(&self) -> usize {
        self.solutions.iter()
            .filter(|s| s.status != SolverStatus::Optimal)
            .count()
    }

    /// Merge everything into one coverage, or return the first failure.
    pub fn into_coverage(self, msa: &Msa) -> Result<OptimalCoverage, PangeblocksError> {
        if let Some(failure) = self.failures.into_iter().next() {
            return Err(failure);
        }

        let blocks = self.fixed.into_iter()
            .chain(self.solutions.into_iter().flat_map(|s| s.blocks));

        OptimalCoverage::from_blocks(msa, blocks)
    }
}

pub struct Pipeline<S = BranchAndBound> {
    config: PipelineConfig,
    solver: S,
}

impl Pipeline<BranchAndBound> {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_solver(config, BranchAndBound::new())
    }
}

impl<S: CoverSolver> Pipeline<S> {
    pub fn with_solver(config: PipelineConfig, solver: S) -> Self {
        Self { config, solver }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch the maximal blocks and split the alignment into independent sub-MSAs.
    pub fn plan(&self, msa: &Msa, source: &dyn MaximalBlockSource) -> Result<RangePlan, PangeblocksError> {
        let Some(full) = msa.full_range() else {
            return Ok(RangePlan::default());
        };

        let maximal = source.maximal_blocks(msa, full)?;
        info!("Got {} maximal blocks.", maximal.len());

        if !self.config.split_ranges {
            return Ok(RangePlan {
                fixed: Vec::new(),
                problems: vec![RangeProblem { range: full, maximal }],
            });
        }

        let splitting = maximal.iter()
            .filter(|b| b.len() >= self.config.min_vertical_len);
        let chain = VerticalChain::from_blocks(msa.n_seqs(), splitting);
        let fixed = chain.fixed_blocks(msa.n_seqs())?;

        let max_cols = self.config.max_cells_per_range
            .map(|cells| (cells / msa.n_seqs()).max(1))
            .unwrap_or(usize::MAX);

        let problems: Vec<RangeProblem> = chain.free_zones(full).into_iter()
            .flat_map(|zone| split_zone(zone, max_cols))
            .map(|range| RangeProblem {
                range,
                maximal: maximal.iter().filter_map(|b| clip(b, &range)).collect(),
            })
            .collect();

        info!("Fixed {} vertical blocks, {} sub-MSAs left to solve.", fixed.len(), problems.len());

        Ok(RangePlan { fixed, problems })
    }

    /// Decompose, fill and fix the vertical blocks of one sub-MSA.
    pub fn candidates(&self, msa: &Msa, problem: &RangeProblem) -> Result<CandidateSet, PangeblocksError> {
        let range = problem.range;

        let mut context = DecompositionContext::new();
        let mut blocks = Decomposer::new(self.config.policy)
            .decompose(&problem.maximal, &mut context)?;

        let fillers = CoverageFiller::new(self.config.glue_fillers, self.config.single_column_blocks)
            .fill(msa, range, &blocks)?;
        debug!("Decomposition gave {} blocks, added {} fillers.", blocks.len(), fillers.len());
        blocks.extend(fillers);

        check_complete_cover(msa.n_seqs(), range, &blocks)?;

        let optimized = VerticalBlockOptimizer::new(msa.n_seqs()).optimize(blocks)?;
        debug!(
            "Fixed {} vertical blocks, discarded {} and clipped {} candidates.",
            optimized.fixed.len(), optimized.num_discarded, optimized.num_clipped
        );
        context.log_summary();

        Ok(CandidateSet {
            range,
            fixed: optimized.fixed,
            candidates: optimized.candidates,
            context,
        })
    }

    pub fn build_model(&self, msa: &Msa, set: &CandidateSet) -> Result<CoverModel, PangeblocksError> {
        CoverModelBuilder::new(self.config.objective, self.config.constraint_form)
            .build(msa, set.range, set.fixed.clone(), set.candidates.clone())
    }

    /// Candidate sets of all sub-MSAs of a plan, in column order.
    pub fn candidate_sets(&self, msa: &Msa, plan: &RangePlan) -> Result<Vec<CandidateSet>, PangeblocksError> {
        plan.problems.iter()
            .map(|p| self.candidates(msa, p).map_err(|e| e.in_range(p.range)))
            .collect()
    }

    /// Find an optimal coverage of one sub-MSA.
    ///
    /// A single column needs no model: its optimal coverage is one block per character.
    pub fn solve_range(&self, msa: &Msa, problem: &RangeProblem) -> Result<RangeSolution, PangeblocksError> {
        let range = problem.range;
        let span = info_span!("submsa", start = range.start, end = range.end);
        let _enter = span.enter();

        if range.len() == 1 {
            let blocks = msa.column_groups(range.start).into_iter()
                .map(|(_, rows)| Block::new(rows, range.start, range.end))
                .collect::<Result<Vec<_>, _>>()?;
            let objective = blocks.iter().map(|b| self.config.objective.weight(msa, b)).sum();

            return Ok(RangeSolution {
                range,
                num_candidates: blocks.len(),
                blocks,
                status: SolverStatus::Optimal,
                objective: Some(objective),
            });
        }

        let set = self.candidates(msa, problem)?;
        let model = self.build_model(msa, &set)?;
        debug!(
            "Solving with {}: {} variables ({} fixed), {} constraints.",
            self.solver.name(), model.num_variables(), model.num_fixed(), model.constraints().len()
        );

        let output = self.solver.solve(&model, self.config.time_limit)?;
        let solution = interpret(msa, &model, output)?;
        debug!(
            "Chose {} of {} candidates ({}, objective {:?}).",
            solution.blocks.len(), solution.num_candidates, solution.status, solution.objective
        );

        Ok(solution)
    }

    /// Solve every sub-MSA of the plan on the worker pool.
    pub fn solve(&self, msa: &Msa, plan: RangePlan) -> CoverageReport {
        let num_workers = self.config.num_workers.clamp(1, plan.problems.len().max(1));

        let mut results: Vec<(usize, Result<RangeSolution, PangeblocksError>)> = if num_workers == 1 {
            plan.problems.iter()
                .map(|p| self.solve_range(msa, p))
                .enumerate()
                .collect()
        } else {
            let (tx, rx) = crossbeam_channel::unbounded();
            let (tx_out, rx_out) = crossbeam_channel::unbounded();

            for job in plan.problems.iter().enumerate() {
                if tx.send(job).is_err() {
                    break;
                }
            }
            drop(tx);

            thread::scope(|scope| {
                for _ in 0..num_workers {
                    let thread_rx = rx.clone();
                    let tx_out_thread = tx_out.clone();

                    scope.spawn(move || {
                        while let Ok((ix, problem)) = thread_rx.recv() {
                            let result = self.solve_range(msa, problem);
                            if tx_out_thread.send((ix, result)).is_err() {
                                break;
                            }
                        }
                    });
                }

                drop(tx_out);
            });

            rx_out.iter().collect()
        };

        results.sort_unstable_by_key(|(ix, _)| *ix);

        let mut report = CoverageReport { fixed: plan.fixed, ..Default::default() };
        for ((_, result), problem) in results.into_iter().zip(&plan.problems) {
            match result {
                Ok(solution) => report.solutions.push(solution),
                Err(e) => {
                    let e = e.in_range(problem.range);
                    error!("{e}");
                    report.failures.push(e);
                },
            }
        }

        info!(
            "Solved {} of {} sub-MSAs ({} not proven optimal).",
            report.solutions.len(), plan.problems.len(), report.num_suboptimal()
        );

        report
    }

    pub fn run(&self, msa: &Msa, source: &dyn MaximalBlockSource) -> Result<CoverageReport, PangeblocksError> {
        let plan = self.plan(msa, source)?;

        Ok(self.solve(msa, plan))
    }

    pub fn build_graph(&self, msa: &Msa, coverage: &OptimalCoverage) -> Result<VariationGraph, PangeblocksError> {
        let mut graph = VariationGraph::from_blocks(msa, coverage.blocks(), self.config.verify_labels)?;
        if self.config.remove_gap_nodes {
            graph.remove_gap_nodes();
        }

        info!("Built variation graph with {} nodes and {} edges.", graph.node_count(), graph.edge_count());

        Ok(graph)
    }
}

fn split_zone(zone: ColumnRange, max_cols: usize) -> Vec<ColumnRange> {
    let mut ranges = Vec::new();
    let mut start = zone.start;
    while start <= zone.end {
        let end = start.saturating_add(max_cols - 1).min(zone.end);
        ranges.push(ColumnRange::new(start, end));
        start = end + 1;
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::block;
    use crate::blocks::source::SharedRunSource;
    use crate::solver::SolverOutput;

    fn example_msa() -> Msa {
        Msa::from_sequences(&["ACGTA", "ACCTA", "ACGTT"]).unwrap()
    }

    fn example_maximal() -> Vec<Block> {
        vec![block(&[0, 1, 2], 0, 1), block(&[0, 2], 0, 3), block(&[0, 1], 3, 4)]
    }

    fn spelled_paths(msa: &Msa, pipeline: &Pipeline, source: &dyn MaximalBlockSource) -> Vec<String> {
        let coverage = pipeline.run(msa, source).unwrap().into_coverage(msa).unwrap();
        let graph = pipeline.build_graph(msa, &coverage).unwrap();

        graph.paths().iter()
            .map(|p| p.nodes.iter().map(|n| graph.segment(*n).label.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_example_coverage() {
        let msa = example_msa();

        for split_ranges in [true, false] {
            let config = PipelineConfig { split_ranges, ..Default::default() };
            let pipeline = Pipeline::new(config);

            let coverage = pipeline.run(&msa, &example_maximal()).unwrap()
                .into_coverage(&msa)
                .unwrap();
            assert_eq!(coverage.len(), 6, "split_ranges={split_ranges}");
            assert!(coverage.blocks().contains(&block(&[0, 1, 2], 0, 1)));

            let coverage = pipeline.run(&msa, &SharedRunSource::default()).unwrap()
                .into_coverage(&msa)
                .unwrap();
            assert_eq!(coverage.len(), 6, "split_ranges={split_ranges}");
        }
    }

    #[test]
    fn test_example_with_row_blocks() {
        let msa = example_msa();
        let mut maximal = example_maximal();
        maximal.push(block(&[1], 0, 4));

        let pipeline = Pipeline::new(PipelineConfig::default());
        let coverage = pipeline.run(&msa, &maximal).unwrap()
            .into_coverage(&msa)
            .unwrap();
        assert_eq!(coverage.len(), 5);
        assert!(coverage.blocks().contains(&block(&[0, 1, 2], 0, 1)));
        assert!(coverage.blocks().contains(&block(&[0, 2], 2, 3)));

        let labels: Vec<String> = coverage.labeled(&msa).unwrap()
            .iter()
            .filter(|b| b.start() == 2)
            .map(|b| b.label().unwrap_or_default().to_string())
            .collect();
        assert!(labels.contains(&"GT".to_string()));

        let single = Pipeline::new(PipelineConfig { split_ranges: false, ..Default::default() });
        let coverage = single.run(&msa, &maximal).unwrap()
            .into_coverage(&msa)
            .unwrap();
        assert_eq!(coverage.len(), 5);
    }

    #[test]
    fn test_short_vertical_blocks_stay_in_zone() {
        let msa = example_msa();
        let config = PipelineConfig { min_vertical_len: 2, ..Default::default() };
        let pipeline = Pipeline::new(config);

        let plan = pipeline.plan(&msa, &SharedRunSource::default()).unwrap();
        assert_eq!(plan.fixed, vec![block(&[0, 1, 2], 0, 1)]);
        assert_eq!(plan.ranges().collect::<Vec<_>>(), vec![ColumnRange::new(2, 4)]);
        assert!(plan.problems[0].maximal.contains(&block(&[0, 1, 2], 3, 3)));

        // the short vertical block is still fixed inside its sub-MSA
        let set = pipeline.candidates(&msa, &plan.problems[0]).unwrap();
        assert_eq!(set.fixed, vec![block(&[0, 1, 2], 3, 3)]);

        let coverage = pipeline.solve(&msa, plan).into_coverage(&msa).unwrap();
        assert_eq!(coverage.len(), 6);
    }

    #[test]
    fn test_plan_fixes_vertical_blocks() {
        let msa = example_msa();
        let pipeline = Pipeline::new(PipelineConfig::default());

        let plan = pipeline.plan(&msa, &SharedRunSource::default()).unwrap();
        assert_eq!(plan.fixed, vec![block(&[0, 1, 2], 0, 1), block(&[0, 1, 2], 3, 3)]);
        assert_eq!(plan.ranges().collect::<Vec<_>>(), vec![ColumnRange::new(2, 2), ColumnRange::new(4, 4)]);

        let report = pipeline.solve(&msa, plan);
        assert!(report.is_complete());
        assert!(report.solutions.iter().all(|s| s.blocks.len() == 2));
    }

    #[test]
    fn test_plan_chunks_free_zones() {
        let msa = Msa::from_sequences(&["AAAAAAA", "CCCCCCC"]).unwrap();
        let config = PipelineConfig { max_cells_per_range: Some(4), ..Default::default() };
        let pipeline = Pipeline::new(config);

        let plan = pipeline.plan(&msa, &SharedRunSource::default()).unwrap();
        assert!(plan.fixed.is_empty());
        assert_eq!(plan.ranges().collect::<Vec<_>>(), vec![
            ColumnRange::new(0, 1),
            ColumnRange::new(2, 3),
            ColumnRange::new(4, 5),
            ColumnRange::new(6, 6),
        ]);

        let coverage = pipeline.solve(&msa, plan).into_coverage(&msa).unwrap();
        assert_eq!(coverage.len(), 8);
    }

    #[test]
    fn test_paths_spell_sequences() {
        let sequences = ["ACGT-ACGTA", "ACGTTACG-A", "ACCT-ACGTA", "TCGTTAC-TA"];
        let msa = Msa::from_sequences(&sequences).unwrap();
        let ungapped: Vec<String> = sequences.iter().map(|s| s.replace('-', "")).collect();

        for policy in [DecompositionPolicy::RowMaximal, DecompositionPolicy::Complete] {
            for num_workers in [1, 3] {
                let config = PipelineConfig {
                    policy,
                    num_workers,
                    remove_gap_nodes: true,
                    ..Default::default()
                };
                let pipeline = Pipeline::new(config);

                assert_eq!(spelled_paths(&msa, &pipeline, &SharedRunSource::default()), ungapped);
            }
        }
    }

    #[test]
    fn test_workers_agree() {
        let msa = Msa::from_sequences(&["ACGTTGCA", "ACGATGCA", "TCGTTGCC", "ACGTAGCA"]).unwrap();
        let config = PipelineConfig { max_cells_per_range: Some(8), ..Default::default() };

        let sequential = Pipeline::new(config.clone())
            .run(&msa, &SharedRunSource::default()).unwrap()
            .into_coverage(&msa).unwrap();
        let parallel = Pipeline::new(PipelineConfig { num_workers: 4, ..config })
            .run(&msa, &SharedRunSource::default()).unwrap()
            .into_coverage(&msa).unwrap();

        assert_eq!(sequential.blocks(), parallel.blocks());
    }

    #[test]
    fn test_candidate_sets_cover_ranges() {
        let msa = example_msa();
        let pipeline = Pipeline::new(PipelineConfig { split_ranges: false, ..Default::default() });

        let plan = pipeline.plan(&msa, &example_maximal()).unwrap();
        let sets = pipeline.candidate_sets(&msa, &plan).unwrap();
        assert_eq!(sets.len(), 1);
        assert!(sets[0].fixed.contains(&block(&[0, 1, 2], 0, 1)));
        assert!(check_complete_cover(msa.n_seqs(), sets[0].range, sets[0].blocks()).is_ok());

        let model = pipeline.build_model(&msa, &sets[0]).unwrap();
        assert_eq!(model.num_variables(), sets[0].len());
    }

    fn random_msa(n_seqs: usize, n_cols: usize, seed: u64) -> Msa {
        let mut state = seed;
        let mut next_base = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            b"ACGT"[(state % 4) as usize] as char
        };

        let rows: Vec<String> = (0..n_seqs)
            .map(|_| (0..n_cols).map(|_| next_base()).collect())
            .collect();

        Msa::from_sequences(&rows).unwrap()
    }

    #[test]
    fn test_timeout_keeps_incumbent() {
        let msa = random_msa(12, 60, 0x5eed_1234);
        let full = msa.full_range().unwrap();
        let pipeline = Pipeline::new(PipelineConfig::default());

        let problem = RangeProblem {
            range: full,
            maximal: SharedRunSource::default().maximal_blocks(&msa, full).unwrap(),
        };
        let set = pipeline.candidates(&msa, &problem).unwrap();
        let model = pipeline.build_model(&msa, &set).unwrap();

        let output = BranchAndBound::new().solve(&model, Duration::from_millis(100)).unwrap();
        assert_eq!(output.status, SolverStatus::Timeout);
        assert!(output.assignment.is_some());
        let objective = output.objective;

        let solution = interpret(&msa, &model, output).unwrap();
        assert_eq!(solution.status, SolverStatus::Timeout);
        assert_eq!(solution.objective, objective);
        assert!(OptimalCoverage::from_blocks(&msa, solution.blocks).is_ok());
    }

    struct NoSolution;

    impl CoverSolver for NoSolution {
        fn name(&self) -> &str {
            "none"
        }

        fn solve(&self, _model: &CoverModel, _time_limit: Duration) -> Result<SolverOutput, PangeblocksError> {
            Ok(SolverOutput::infeasible())
        }
    }

    #[test]
    fn test_failures_are_isolated() {
        let msa = Msa::from_sequences(&["ACGTAC", "ACCTAG", "ACGTTG"]).unwrap();
        let maximal = vec![block(&[0, 1, 2], 0, 1), block(&[0, 1, 2], 3, 3)];
        let config = PipelineConfig { num_workers: 2, ..Default::default() };
        let pipeline = Pipeline::with_solver(config, NoSolution);

        let report = pipeline.run(&msa, &maximal).unwrap();
        assert_eq!(report.solutions.len(), 1);
        assert_eq!(report.solutions[0].range, ColumnRange::new(2, 2));
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            PangeblocksError::RangeFailed { range, source }
                if *range == ColumnRange::new(4, 5)
                    && matches!(**source, PangeblocksError::ModelInfeasible { .. })
        ));

        assert!(matches!(report.into_coverage(&msa), Err(PangeblocksError::RangeFailed { .. })));
    }

    #[test]
    fn test_single_row_and_empty() {
        let pipeline = Pipeline::new(PipelineConfig::default());

        let msa = Msa::from_sequences(&["AC-GT"]).unwrap();
        let coverage = pipeline.run(&msa, &SharedRunSource::default()).unwrap()
            .into_coverage(&msa)
            .unwrap();
        assert_eq!(coverage.blocks(), &[block(&[0], 0, 4)]);

        let msa = Msa::from_sequences(&["", ""]).unwrap();
        let report = pipeline.run(&msa, &SharedRunSource::default()).unwrap();
        assert!(report.solutions.is_empty());
        assert!(report.into_coverage(&msa).unwrap().is_empty());
    }
}
