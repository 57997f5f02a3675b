//! hMETIS-style command line front end of the partitioner

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, LevelFilter};

use tritonpart::coarsen::CoarsenOrder;
use tritonpart::graphio::{self, InputFiles};
use tritonpart::tritonpart::{evaluate_hypergraph_solution, partition_hypergraph, write_weighted_hypergraph};
use tritonpart::Options;

#[derive(Parser)]
#[command(version, about = "Multilevel hypergraph partitioner")]
struct Cli {
    /// hypergraph in hMETIS format
    hypergraph: PathBuf,

    /// number of blocks
    num_parts: usize,

    /// allowed imbalance in percent
    #[arg(short, long, default_value = "1.0")]
    ub_factor: f32,

    #[arg(short, long, default_value = "0")]
    seed: u64,

    #[arg(long, default_value = "1")]
    vertex_dims: usize,

    #[arg(long, default_value = "1")]
    hyperedge_dims: usize,

    #[arg(long, default_value = "0")]
    placement_dims: usize,

    /// block per vertex, -1 for free vertices
    #[arg(long)]
    fixed: Option<PathBuf>,

    #[arg(long)]
    community: Option<PathBuf>,

    /// vertices that must share a block, one group per line
    #[arg(long)]
    group: Option<PathBuf>,

    #[arg(long)]
    placement: Option<PathBuf>,

    #[arg(short, long, default_value = "random")]
    coarsen_order: CoarsenOrder,

    #[arg(long, default_value = "50")]
    num_initial_solutions: usize,

    #[arg(short = 'r', long, default_value = "10")]
    refiner_iters: usize,

    #[arg(short, long, default_value = "60")]
    max_moves: usize,

    /// skip the V-cycle refinement
    #[arg(long)]
    no_vcycle: bool,

    #[arg(long, default_value = "1")]
    max_num_vcycle: usize,

    #[arg(long, default_value = "3")]
    num_coarsen_solutions: usize,

    /// report on an existing solution instead of partitioning
    #[arg(long, value_name = "SOLUTION")]
    evaluate: Option<PathBuf>,

    /// write the hypergraph with its evaluated weights instead of partitioning
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// round exported weights to integers
    #[arg(long, requires = "export")]
    int_weights: bool,

    /// don't write the solution file
    #[arg(long)]
    nooutput: bool,

    /// more log output, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            num_parts: self.num_parts,
            ub_factor: self.ub_factor,
            seed: self.seed,
            vertex_dimensions: self.vertex_dims,
            hyperedge_dimensions: self.hyperedge_dims,
            placement_dimensions: self.placement_dims,
            coarsen_order: self.coarsen_order,
            num_initial_solutions: self.num_initial_solutions,
            refiner_iters: self.refiner_iters,
            max_moves: self.max_moves,
            v_cycle_flag: !self.no_vcycle,
            max_num_vcycle: self.max_num_vcycle,
            num_coarsen_solutions: self.num_coarsen_solutions,
            ..Options::default()
        }
    }

    fn files(&self) -> InputFiles {
        InputFiles {
            hypergraph: self.hypergraph.clone(),
            fixed: self.fixed.clone(),
            community: self.community.clone(),
            group: self.group.clone(),
            placement: self.placement.clone(),
        }
    }
}

fn run(cli: &Cli) -> tritonpart::Result<()> {
    let options = cli.options();
    let files = cli.files();

    if let Some(export) = &cli.export {
        write_weighted_hypergraph(&options, &files, export, cli.int_weights)?;
        info!("weighted hypergraph written to {}", export.display());
        return Ok(());
    }

    if let Some(solution) = &cli.evaluate {
        let report = evaluate_hypergraph_solution(&options, &files, solution)?;
        println!("cost: {}", report.token.cost);
        println!("feasible: {}", report.satisfied());
        return Ok(());
    }

    let output = (!cli.nooutput).then(|| graphio::partition_file_name(&cli.hypergraph, cli.num_parts));
    let result = partition_hypergraph(&options, &files, output.as_deref())?;
    println!("cost: {}", result.report.token.cost);
    println!("feasible: {}", result.report.satisfied());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
