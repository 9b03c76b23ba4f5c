use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, stdout, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

use pangeblocks::blocks::Block;
use pangeblocks::blocks::decompose::DecompositionPolicy;
use pangeblocks::blocks::source::{MaximalBlockSource, SharedRunSource};
use pangeblocks::cover::{ConstraintForm, Objective};
use pangeblocks::io::{load_msa, write_blocks, write_gfa, JsonBlockFile};
use pangeblocks::msa::Msa;
use pangeblocks::pipeline::{Pipeline, PipelineConfig};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Keep row sets as large as possible when splitting intersecting blocks
    RowMaximal,

    /// Emit intersections, row differences and remainders of every intersecting pair
    Complete,
}

impl From<PolicyArg> for DecompositionPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::RowMaximal => DecompositionPolicy::RowMaximal,
            PolicyArg::Complete => DecompositionPolicy::Complete,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ObjectiveArg {
    /// Minimize the number of nodes
    Nodes,

    /// Minimize the total length of the node labels
    Strings,

    /// Minimize the number of nodes, penalizing nodes shorter than --min-len
    Weighted,

    /// Minimize the number of nodes, penalizing nodes spanning less than --min-coverage of the sequences
    Depth,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ConstraintFormArg {
    /// One equality constraint per cell
    Equality,

    /// A pair of inequalities per cell
    Split,
}

impl From<ConstraintFormArg> for ConstraintForm {
    fn from(value: ConstraintFormArg) -> Self {
        match value {
            ConstraintFormArg::Equality => ConstraintForm::Equality,
            ConstraintFormArg::Split => ConstraintForm::Split,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct CliArgs {
    /// Set verbosity level. Use multiple times to increase the verbosity level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<CliSubcommand>,
}

#[derive(Subcommand, Debug)]
enum CliSubcommand {
    /// Build a variation graph from a multiple sequence alignment
    Graph(GraphArgs),

    /// Write the candidate blocks and the optimization model of each sub-MSA without solving
    Model(ModelArgs),

    /// Print the column ranges of the sub-MSAs that are solved independently
    Ranges(RangesArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Multiple sequence alignment in FASTA format, optionally gzipped
    #[clap(help_heading = "Inputs")]
    msa: PathBuf,

    /// Maximal blocks as JSON. If not given, blocks are derived from runs of shared characters.
    #[arg(short, long)]
    #[clap(help_heading = "Inputs")]
    blocks: Option<PathBuf>,

    /// Minimum number of rows of a derived maximal block
    #[arg(long, default_value = "2")]
    #[clap(help_heading = "Inputs")]
    min_rows: usize,

    /// Minimum number of columns of a vertical block that splits the alignment into sub-MSAs
    #[arg(long, default_value = "1")]
    #[clap(help_heading = "Inputs")]
    min_vertical_len: usize,
}

impl InputArgs {
    fn load(&self) -> Result<(Msa, Box<dyn MaximalBlockSource>)> {
        let msa = load_msa(&self.msa)
            .with_context(|| format!("Could not load alignment {:?}", self.msa))?;

        let source: Box<dyn MaximalBlockSource> = match &self.blocks {
            Some(path) => Box::new(
                JsonBlockFile::open(path).with_context(|| format!("Could not read blocks from {path:?}"))?
            ),
            None => Box::new(SharedRunSource::new(self.min_rows)),
        };

        Ok((msa, source))
    }
}

#[derive(Args, Debug)]
struct ModelOptions {
    /// How intersecting blocks are split
    #[arg(value_enum, long, default_value = "row-maximal")]
    #[clap(help_heading = "Model")]
    policy: PolicyArg,

    #[arg(value_enum, long, default_value = "nodes")]
    #[clap(help_heading = "Model")]
    objective: ObjectiveArg,

    /// Cost of a penalized node
    #[arg(long, default_value = "1000")]
    #[clap(help_heading = "Model")]
    penalty: f64,

    /// Nodes with fewer characters are penalized by the weighted objective
    #[arg(long, default_value = "5")]
    #[clap(help_heading = "Model")]
    min_len: usize,

    /// Nodes spanning a smaller fraction of the sequences are penalized by the depth objective
    #[arg(long, default_value = "0.1")]
    #[clap(help_heading = "Model")]
    min_coverage: f64,

    #[arg(value_enum, long, default_value = "equality")]
    #[clap(help_heading = "Model")]
    constraint_form: ConstraintFormArg,

    /// Maximum number of cells of a sub-MSA; larger ones are split by columns
    #[arg(long)]
    #[clap(help_heading = "Model")]
    max_cells: Option<usize>,

    /// Solve the whole alignment as one model instead of splitting it at vertical blocks
    #[arg(long)]
    #[clap(help_heading = "Model")]
    no_split: bool,

    /// Do not add single-column candidate blocks
    #[arg(long)]
    #[clap(help_heading = "Model")]
    no_single_column: bool,
}

impl ModelOptions {
    fn objective(&self) -> Objective {
        match self.objective {
            ObjectiveArg::Nodes => Objective::Nodes,
            ObjectiveArg::Strings => Objective::Strings,
            ObjectiveArg::Weighted => Objective::Weighted { penalty: self.penalty, min_len: self.min_len },
            ObjectiveArg::Depth => Objective::Depth { penalty: self.penalty, min_coverage: self.min_coverage },
        }
    }

    fn to_config(&self, input: &InputArgs) -> Result<PipelineConfig> {
        let objective = self.objective();
        objective.validate()?;

        Ok(PipelineConfig {
            policy: self.policy.into(),
            objective,
            constraint_form: self.constraint_form.into(),
            split_ranges: !self.no_split,
            max_cells_per_range: self.max_cells,
            single_column_blocks: !self.no_single_column,
            min_vertical_len: input.min_vertical_len,
            ..Default::default()
        })
    }
}

#[derive(Args, Debug)]
struct GraphArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    model: ModelOptions,

    /// Time limit per sub-MSA in seconds
    #[arg(short, long, default_value = "10800")]
    #[clap(help_heading = "Processing")]
    time_limit: u64,

    /// Number of sub-MSAs solved in parallel
    #[arg(short = 'j', long, default_value = "1")]
    #[clap(help_heading = "Processing")]
    workers: usize,

    /// Keep gap-only nodes and gap characters in node labels
    #[arg(long)]
    #[clap(help_heading = "Outputs")]
    keep_gaps: bool,

    /// Output GFA filename. If not given, defaults to stdout
    #[arg(short, long)]
    #[clap(help_heading = "Outputs")]
    output: Option<PathBuf>,

    /// Also write the chosen blocks with their labels as JSON
    #[arg(long)]
    #[clap(help_heading = "Outputs")]
    coverage: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ModelArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    model: ModelOptions,

    /// Output prefix: writes PREFIX.candidates.json and PREFIX_<start>-<end>.lp
    #[arg(short, long)]
    #[clap(help_heading = "Outputs")]
    prefix: PathBuf,
}

#[derive(Args, Debug)]
struct RangesArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Maximum number of cells of a sub-MSA; larger ones are split by columns
    #[arg(long)]
    max_cells: Option<usize>,
}

fn init_logging(verbose: u8) -> Result<()> {
    let filter_layer = match verbose {
        0 => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))?,
        1 => EnvFilter::try_new("debug")?,
        _ => EnvFilter::try_new("trace")?,
    };

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_filter(filter_layer);

    Registry::default().with(stderr_log).init();

    Ok(())
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?
    }

    let file = File::create(path)
        .with_context(|| format!("Could not create {path:?}"))?;

    Ok(BufWriter::new(file))
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = prefix.as_os_str().to_owned();
    name.push(suffix);

    PathBuf::from(name)
}

fn graph_subcommand(args: &GraphArgs) -> Result<()> {
    let (msa, source) = args.input.load()?;

    let config = PipelineConfig {
        time_limit: Duration::from_secs(args.time_limit),
        num_workers: args.workers,
        remove_gap_nodes: !args.keep_gaps,
        ..args.model.to_config(&args.input)?
    };
    let pipeline = Pipeline::new(config);

    let report = pipeline.run(&msa, source.as_ref())?;
    if report.num_suboptimal() > 0 {
        warn!("{} sub-MSAs were not solved to optimality.", report.num_suboptimal());
    }

    let num_failed = report.failures.len();
    let coverage = report.into_coverage(&msa)
        .with_context(|| format!("{num_failed} sub-MSA(s) could not be solved"))?;
    info!("Optimal coverage has {} blocks.", coverage.len());

    if let Some(path) = &args.coverage {
        let mut writer = create_file(path)?;
        write_blocks(&mut writer, &coverage.labeled(&msa)?)?;
        writer.flush()?;
    }

    let graph = pipeline.build_graph(&msa, &coverage)?;

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(create_file(path)?),
        None => Box::new(BufWriter::new(stdout())),
    };
    write_gfa(&mut writer, &graph)?;
    writer.flush()?;

    Ok(())
}

fn model_subcommand(args: &ModelArgs) -> Result<()> {
    let (msa, source) = args.input.load()?;
    let pipeline = Pipeline::new(args.model.to_config(&args.input)?);

    let plan = pipeline.plan(&msa, source.as_ref())?;
    let sets = pipeline.candidate_sets(&msa, &plan)?;

    let candidates: Vec<Block> = plan.fixed.iter()
        .chain(sets.iter().flat_map(|s| s.blocks()))
        .map(|b| b.clone().with_label(msa.label(b)))
        .collect::<Result<_, _>>()?;

    let mut writer = create_file(&with_suffix(&args.prefix, ".candidates.json"))?;
    write_blocks(&mut writer, &candidates)?;
    writer.flush()?;

    for set in &sets {
        let model = pipeline.build_model(&msa, set)?;
        let path = with_suffix(&args.prefix, &format!("_{}-{}.lp", set.range.start, set.range.end));

        let mut writer = create_file(&path)?;
        model.write_lp(&mut writer)?;
        writer.flush()?;
    }

    info!("Wrote {} candidate blocks and {} models.", candidates.len(), sets.len());

    Ok(())
}

fn ranges_subcommand(args: &RangesArgs) -> Result<()> {
    let (msa, source) = args.input.load()?;
    let config = PipelineConfig {
        max_cells_per_range: args.max_cells,
        min_vertical_len: args.input.min_vertical_len,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config);

    let plan = pipeline.plan(&msa, source.as_ref())?;

    let mut writer = BufWriter::new(stdout());
    for range in plan.ranges() {
        writeln!(writer, "{}\t{}", range.start, range.end)?;
    }
    writer.flush()?;

    Ok(())
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose)?;

    match &args.command {
        Some(CliSubcommand::Graph(v)) => graph_subcommand(v)?,
        Some(CliSubcommand::Model(v)) => model_subcommand(v)?,
        Some(CliSubcommand::Ranges(v)) => ranges_subcommand(v)?,
        None => bail!("No subcommand given."),
    };

    Ok(())
}
