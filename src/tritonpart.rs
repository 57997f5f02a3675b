//! Entry points: partition a hypergraph read from files or built in memory, evaluate an existing
//! solution, export a weighted hypergraph.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::coarsen::Coarsener;
use crate::error::{Error, Result};
use crate::evaluator::{ConstraintReport, Evaluator, PathStats};
use crate::graphio::{self, InputFiles};
use crate::hypergraph::Hypergraph;
use crate::initpart::Partitioner;
use crate::multilevel::{MultilevelParams, MultilevelPartitioner, Refiners};
use crate::options::Options;
use crate::refine::{Refiner, RefinerKind};

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResult {
    /// block of every vertex of the input hypergraph
    pub solution: Vec<usize>,
    pub report: ConstraintReport,
    /// present for timing-aware runs
    pub path_stats: Option<PathStats>,
}

fn check_inputs(options: &Options, hgraph: &Hypergraph, groups: &[Vec<usize>]) -> Result<()> {
    if hgraph.vertex_dimensions() != options.vertex_dimensions
        || hgraph.hyperedge_dimensions() != options.hyperedge_dimensions
    {
        return Err(Error::InvalidInput(format!(
            "the hypergraph has {} vertex and {} hyperedge dimensions, the options say {} and {}",
            hgraph.vertex_dimensions(),
            hgraph.hyperedge_dimensions(),
            options.vertex_dimensions,
            options.hyperedge_dimensions
        )));
    }
    if let Some(b) = hgraph
        .fixed_attr()
        .iter()
        .flatten()
        .find(|&&b| b >= options.num_parts)
    {
        return Err(Error::InvalidInput(format!(
            "a vertex is fixed to block {b}, but there are only {} blocks",
            options.num_parts
        )));
    }
    if let Some(&v) = groups.iter().flatten().find(|&&v| v >= hgraph.num_vertices()) {
        return Err(Error::InvalidInput(format!(
            "group references vertex {v}, but there are only {}",
            hgraph.num_vertices()
        )));
    }
    Ok(())
}

fn build_evaluator(options: &Options) -> Arc<Evaluator> {
    Arc::new(
        Evaluator::new(
            options.num_parts,
            options.e_wt_factors.clone(),
            options.v_wt_factors.clone(),
            options.placement_wt_factors.clone(),
        )
        .with_timing_factors(options.timing_factors()),
    )
}

fn build_multilevel(
    options: &Options,
    hgraph: &Hypergraph,
    evaluator: &Arc<Evaluator>,
) -> MultilevelPartitioner {
    let coarsener = Coarsener::new(
        options.coarsen_params(&hgraph.total_vertex_weights()),
        evaluator.clone(),
        options.seed,
    );
    let partitioner = Partitioner::new(options.num_parts, evaluator.clone(), options.seed);
    let refiner = |kind| Refiner::new(kind, options.refiner_params(), evaluator.clone());
    let refiners = Refiners {
        k_way_pm: refiner(RefinerKind::KWayPm),
        k_way_fm: refiner(RefinerKind::KWayFm),
        greedy: refiner(RefinerKind::Greedy),
        ilp: refiner(RefinerKind::Ilp),
    };
    let params = MultilevelParams {
        num_parts: options.num_parts,
        num_initial_solutions: options.num_initial_solutions,
        num_best_initial_solutions: options.num_best_initial_solutions,
        num_vertices_threshold_ilp: options.num_vertices_threshold_ilp,
        max_num_vcycle: options.max_num_vcycle,
        num_coarsen_solutions: options.num_coarsen_solutions,
        v_cycle: options.v_cycle_flag,
        seed: options.seed,
    };
    MultilevelPartitioner::new(params, evaluator.clone(), coarsener, partitioner, refiners)
}

/// Partition an in-memory hypergraph. `groups` lists sets of vertices that must share a block.
pub fn partition(
    options: &Options,
    mut hgraph: Hypergraph,
    groups: &[Vec<usize>],
) -> Result<PartitionResult> {
    let start = Instant::now();
    let mut options = options.normalized()?;
    check_inputs(&options, &hgraph, groups)?;
    if options.timing_aware && !hgraph.has_timing() {
        warn!("no timing information available, running without timing");
        options.timing_aware = false;
    }
    options.log_parameters();

    let evaluator = build_evaluator(&options);
    if options.timing_aware {
        evaluator.initialize_timing(&mut hgraph);
    }
    let upper = hgraph.upper_vertex_balance(options.num_parts, options.ub_factor, &options.base_balance);
    let lower = hgraph.lower_vertex_balance(options.num_parts, options.ub_factor, &options.base_balance);

    let mut mlevel = build_multilevel(&options, &hgraph, &evaluator);

    // group fixed vertices and the user groups, and drop very large hyperedges
    mlevel
        .coarsener_mut()
        .set_thr_coarsen_hyperedge_size_skip(options.global_net_threshold);
    let mut grouped = mlevel.coarsener_mut().group_vertices(&hgraph, groups);
    mlevel
        .coarsener_mut()
        .set_thr_coarsen_hyperedge_size_skip(options.thr_coarsen_hyperedge_size_skip);
    info!(
        "grouped hypergraph has {} vertices and {} hyperedges",
        grouped.num_vertices(),
        grouped.num_hyperedges()
    );

    let grouped_solution = mlevel.partition(&mut grouped, &upper, &lower);
    let mut solution = grouped.project(&grouped_solution, hgraph.num_vertices());

    // last-minute refinement on the input hypergraph
    mlevel
        .coarsener_mut()
        .set_thr_coarsen_hyperedge_size_skip(options.global_net_threshold);
    mlevel.vcycle_refinement(&mut hgraph, &upper, &lower, &mut solution);

    let report = evaluator.constraint_and_cut_evaluator(
        &hgraph,
        &solution,
        options.ub_factor,
        &options.base_balance,
        groups,
        true,
    );
    let path_stats = options.timing_aware.then(|| {
        let stats = evaluator.timing_cuts(&hgraph, &solution);
        info!("Display Timing Path Cuts Statistics\n{stats}");
        stats
    });
    debug!(
        "The runtime of multilevel partitioner : {} seconds",
        start.elapsed().as_secs_f64()
    );

    Ok(PartitionResult {
        solution,
        report,
        path_stats,
    })
}

/// Read the inputs, partition, and write the solution to `output` when given.
pub fn partition_hypergraph(
    options: &Options,
    files: &InputFiles,
    output: Option<&Path>,
) -> Result<PartitionResult> {
    files.log();
    let (hgraph, groups) = graphio::read_inputs(
        files,
        options.vertex_dimensions,
        options.hyperedge_dimensions,
        options.placement_dimensions,
    )?;
    let result = partition(options, hgraph, &groups)?;
    if let Some(path) = output {
        graphio::write_partition(path, &result.solution)?;
        info!("solution written to {}", path.display());
    }
    Ok(result)
}

/// Partition with default options and scalar weights. Weights left empty default to 1.
pub fn partition_kway_simple(
    num_parts: usize,
    ub_factor: f32,
    seed: u64,
    num_vertices: usize,
    hyperedges: Vec<Vec<usize>>,
    vertex_weights: Vec<f32>,
    hyperedge_weights: Vec<f32>,
) -> Result<Vec<usize>> {
    let vertex_weights = if vertex_weights.is_empty() {
        vec![vec![1.0]; num_vertices]
    } else {
        vertex_weights.into_iter().map(|w| vec![w]).collect()
    };
    let hyperedge_weights = if hyperedge_weights.is_empty() {
        vec![vec![1.0]; hyperedges.len()]
    } else {
        hyperedge_weights.into_iter().map(|w| vec![w]).collect()
    };
    let hgraph = Hypergraph::new(1, 1, hyperedges, vertex_weights, hyperedge_weights)?;
    let options = Options {
        num_parts,
        ub_factor,
        seed,
        ..Options::default()
    };
    Ok(partition(&options, hgraph, &[])?.solution)
}

/// Cost and constraint report of `solution` on an in-memory hypergraph.
pub fn evaluate(
    options: &Options,
    mut hgraph: Hypergraph,
    groups: &[Vec<usize>],
    solution: &[usize],
) -> Result<ConstraintReport> {
    let options = options.normalized()?;
    check_inputs(&options, &hgraph, groups)?;
    if solution.len() != hgraph.num_vertices() || solution.iter().any(|&b| b >= options.num_parts) {
        return Err(Error::InvalidInput(format!(
            "the solution does not assign {} vertices to {} blocks",
            hgraph.num_vertices(),
            options.num_parts
        )));
    }
    let evaluator = build_evaluator(&options);
    let timing = options.timing_aware && hgraph.has_timing();
    if timing {
        evaluator.initialize_timing(&mut hgraph);
    }
    let report = evaluator.constraint_and_cut_evaluator(
        &hgraph,
        solution,
        options.ub_factor,
        &options.base_balance,
        groups,
        true,
    );
    if timing {
        info!(
            "Display Timing Path Cuts Statistics\n{}",
            evaluator.timing_cuts(&hgraph, solution)
        );
    }
    Ok(report)
}

/// Read a hypergraph and a solution written by the partitioner and report on it.
pub fn evaluate_hypergraph_solution(
    options: &Options,
    files: &InputFiles,
    solution_file: &Path,
) -> Result<ConstraintReport> {
    files.log();
    let (hgraph, groups) = graphio::read_inputs(
        files,
        options.vertex_dimensions,
        options.hyperedge_dimensions,
        options.placement_dimensions,
    )?;
    let solution = graphio::read_solution(solution_file, hgraph.num_vertices(), options.num_parts)?;
    evaluate(options, hgraph, &groups, &solution)
}

/// Write the hypergraph of `files` with its evaluated costs, rounded to integers if `int_weights`.
pub fn write_weighted_hypergraph(
    options: &Options,
    files: &InputFiles,
    output: &Path,
    int_weights: bool,
) -> Result<()> {
    let options = options.normalized()?;
    let (hgraph, _) = graphio::read_inputs(
        files,
        options.vertex_dimensions,
        options.hyperedge_dimensions,
        options.placement_dimensions,
    )?;
    let evaluator = build_evaluator(&options);
    if int_weights {
        graphio::write_int_weight_hypergraph(output, &hgraph, &evaluator)
    } else {
        graphio::write_weighted_hypergraph(output, &hgraph, &evaluator, true)
    }
}
