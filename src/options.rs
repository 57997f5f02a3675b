//! Run parameters of the partitioner.

use log::debug;

use crate::coarsen::{CoarsenOrder, CoarsenParams};
use crate::defs::*;
use crate::error::{Error, Result};
use crate::evaluator::TimingFactors;
use crate::refine::RefinerParams;
use crate::util;

/// Every tunable of a partitioning run. Vector fields left empty are filled with their defaults
/// by [`Options::normalized`].
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub num_parts: usize,
    /// allowed imbalance, in percent of the total weight
    pub ub_factor: f32,
    pub seed: u64,
    pub vertex_dimensions: usize,
    pub hyperedge_dimensions: usize,
    pub placement_dimensions: usize,
    /// target share of each block; `1 / num_parts` each when empty
    pub base_balance: Vec<f32>,
    /// divides `base_balance` block by block
    pub scale_factor: Vec<f32>,
    pub e_wt_factors: Vec<f32>,
    pub v_wt_factors: Vec<f32>,
    pub placement_wt_factors: Vec<f32>,

    pub timing_aware: bool,
    pub net_timing_factor: f32,
    pub path_timing_factor: f32,
    pub path_snaking_factor: f32,
    pub timing_exp_factor: f32,
    pub extra_delay: f32,

    pub coarsen_order: CoarsenOrder,
    pub thr_coarsen_hyperedge_size_skip: usize,
    pub thr_coarsen_vertices: usize,
    pub thr_coarsen_hyperedges: usize,
    pub coarsening_ratio: f32,
    pub max_coarsen_iters: usize,
    pub adj_diff_ratio: f32,
    pub min_num_vertices_each_part: usize,
    /// hyperedge size skip used while grouping the input and during the final V-cycle
    pub global_net_threshold: usize,

    pub num_initial_solutions: usize,
    pub num_best_initial_solutions: usize,
    pub num_vertices_threshold_ilp: usize,

    pub refiner_iters: usize,
    pub max_moves: usize,
    pub early_stop_ratio: f32,
    pub total_corking_passes: usize,
    pub v_cycle_flag: bool,
    pub max_num_vcycle: usize,
    pub num_coarsen_solutions: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            num_parts: DEFAULT_NUM_PARTS,
            ub_factor: DEFAULT_UB_FACTOR,
            seed: DEFAULT_SEED,
            vertex_dimensions: 1,
            hyperedge_dimensions: 1,
            placement_dimensions: 0,
            base_balance: Vec::new(),
            scale_factor: Vec::new(),
            e_wt_factors: Vec::new(),
            v_wt_factors: Vec::new(),
            placement_wt_factors: Vec::new(),

            timing_aware: false,
            net_timing_factor: DEFAULT_NET_TIMING_FACTOR,
            path_timing_factor: DEFAULT_PATH_TIMING_FACTOR,
            path_snaking_factor: DEFAULT_PATH_SNAKING_FACTOR,
            timing_exp_factor: DEFAULT_TIMING_EXP_FACTOR,
            extra_delay: DEFAULT_EXTRA_DELAY,

            coarsen_order: CoarsenOrder::default(),
            thr_coarsen_hyperedge_size_skip: DEFAULT_THR_COARSEN_HYPEREDGE_SIZE_SKIP,
            thr_coarsen_vertices: DEFAULT_THR_COARSEN_VERTICES,
            thr_coarsen_hyperedges: DEFAULT_THR_COARSEN_HYPEREDGES,
            coarsening_ratio: DEFAULT_COARSENING_RATIO,
            max_coarsen_iters: DEFAULT_MAX_COARSEN_ITERS,
            adj_diff_ratio: DEFAULT_ADJ_DIFF_RATIO,
            min_num_vertices_each_part: DEFAULT_MIN_NUM_VERTICES_EACH_PART,
            global_net_threshold: DEFAULT_GLOBAL_NET_THRESHOLD,

            num_initial_solutions: DEFAULT_NUM_INITIAL_SOLUTIONS,
            num_best_initial_solutions: DEFAULT_NUM_BEST_INITIAL_SOLUTIONS,
            num_vertices_threshold_ilp: DEFAULT_NUM_VERTICES_THRESHOLD_ILP,

            refiner_iters: DEFAULT_REFINER_ITERS,
            max_moves: DEFAULT_MAX_MOVES,
            early_stop_ratio: DEFAULT_EARLY_STOP_RATIO,
            total_corking_passes: DEFAULT_TOTAL_CORKING_PASSES,
            v_cycle_flag: true,
            max_num_vcycle: DEFAULT_MAX_NUM_VCYCLE,
            num_coarsen_solutions: DEFAULT_NUM_COARSEN_SOLUTIONS,
        }
    }
}

fn check_len(name: &str, v: &[f32], expected: usize) -> Result<()> {
    if !v.is_empty() && v.len() != expected {
        return Err(Error::InvalidInput(format!(
            "{name} has {} entries, expected {expected}",
            v.len()
        )));
    }
    Ok(())
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        if self.num_parts < 2 {
            return Err(Error::InvalidInput(format!(
                "num_parts must be at least 2, got {}",
                self.num_parts
            )));
        }
        if self.vertex_dimensions == 0 || self.hyperedge_dimensions == 0 {
            return Err(Error::InvalidInput(
                "vertex and hyperedge dimensions must be positive".into(),
            ));
        }
        if !(self.ub_factor >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "ub_factor must be non-negative, got {}",
                self.ub_factor
            )));
        }
        if !(self.coarsening_ratio > 1.0) {
            return Err(Error::InvalidInput(format!(
                "coarsening_ratio must exceed 1, got {}",
                self.coarsening_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.early_stop_ratio) {
            return Err(Error::InvalidInput(format!(
                "early_stop_ratio must lie in [0, 1], got {}",
                self.early_stop_ratio
            )));
        }
        check_len("base_balance", &self.base_balance, self.num_parts)?;
        check_len("scale_factor", &self.scale_factor, self.num_parts)?;
        check_len("e_wt_factors", &self.e_wt_factors, self.hyperedge_dimensions)?;
        check_len("v_wt_factors", &self.v_wt_factors, self.vertex_dimensions)?;
        check_len(
            "placement_wt_factors",
            &self.placement_wt_factors,
            self.placement_dimensions,
        )?;
        if self.scale_factor.iter().any(|&s| !(s > 0.0)) {
            return Err(Error::InvalidInput("scale_factor entries must be positive".into()));
        }
        Ok(())
    }

    /// Defaults filled in for every empty vector, and `base_balance` divided by `scale_factor`.
    pub fn normalized(&self) -> Result<Self> {
        self.validate()?;
        let mut o = self.clone();
        if o.base_balance.is_empty() {
            debug!("no base balance is specified, using 1/{} per block", o.num_parts);
            o.base_balance = vec![1.0 / o.num_parts as f32; o.num_parts];
        }
        if o.scale_factor.is_empty() {
            o.scale_factor = vec![1.0; o.num_parts];
        }
        o.base_balance = o
            .base_balance
            .iter()
            .zip(&o.scale_factor)
            .map(|(b, s)| b / s)
            .collect();
        o.scale_factor = vec![1.0; o.num_parts];
        if o.e_wt_factors.is_empty() {
            o.e_wt_factors = vec![1.0; o.hyperedge_dimensions];
        }
        if o.v_wt_factors.is_empty() {
            o.v_wt_factors = vec![1.0; o.vertex_dimensions];
        }
        if o.placement_wt_factors.is_empty() {
            o.placement_wt_factors = vec![1.0; o.placement_dimensions];
        }
        Ok(o)
    }

    pub fn timing_factors(&self) -> TimingFactors {
        TimingFactors {
            net_timing_factor: self.net_timing_factor,
            path_timing_factor: self.path_timing_factor,
            path_snaking_factor: self.path_snaking_factor,
            timing_exp_factor: self.timing_exp_factor,
            extra_delay: self.extra_delay,
        }
    }

    /// Coarsening parameters; clusters are capped at `total / (min_num_vertices_each_part * k)`.
    pub fn coarsen_params(&self, total_vertex_weights: &[f32]) -> CoarsenParams {
        let divisor = (self.min_num_vertices_each_part * self.num_parts).max(1) as f32;
        CoarsenParams {
            thr_coarsen_hyperedge_size_skip: self.thr_coarsen_hyperedge_size_skip,
            thr_coarsen_vertices: self.thr_coarsen_vertices,
            thr_coarsen_hyperedges: self.thr_coarsen_hyperedges,
            coarsening_ratio: self.coarsening_ratio,
            max_coarsen_iters: self.max_coarsen_iters,
            adj_diff_ratio: self.adj_diff_ratio,
            thr_cluster_weight: util::divide(total_vertex_weights, divisor),
            vertex_order: self.coarsen_order,
        }
    }

    pub fn refiner_params(&self) -> RefinerParams {
        RefinerParams {
            refiner_iters: self.refiner_iters,
            max_move: self.max_moves,
            total_corking_passes: self.total_corking_passes,
            early_stop_ratio: self.early_stop_ratio,
            ilp_vertex_threshold: self.num_vertices_threshold_ilp,
        }
    }

    pub fn log_parameters(&self) {
        debug!("Multilevel Partitioning Parameters:");
        debug!("hyperedge weight factor : [ {} ]", util::vec_string(&self.e_wt_factors));
        debug!("vertex weight factor : [ {} ]", util::vec_string(&self.v_wt_factors));
        debug!(
            "placement weight factor : [ {} ]",
            util::vec_string(&self.placement_wt_factors)
        );
        debug!("net_timing_factor : {}", self.net_timing_factor);
        debug!("path_timing_factor : {}", self.path_timing_factor);
        debug!("path_snaking_factor : {}", self.path_snaking_factor);
        debug!("timing_exp_factor : {}", self.timing_exp_factor);
        debug!("coarsen order : {}", self.coarsen_order);
        debug!("thr_coarsen_hyperedge_size_skip : {}", self.thr_coarsen_hyperedge_size_skip);
        debug!("thr_coarsen_vertices : {}", self.thr_coarsen_vertices);
        debug!("thr_coarsen_hyperedges : {}", self.thr_coarsen_hyperedges);
        debug!("coarsening_ratio : {}", self.coarsening_ratio);
        debug!("max_coarsen_iters : {}", self.max_coarsen_iters);
        debug!("adj_diff_ratio : {}", self.adj_diff_ratio);
        debug!("min_num_vertices_each_part : {}", self.min_num_vertices_each_part);
        debug!("num_initial_solutions : {}", self.num_initial_solutions);
        debug!("num_best_initial_solutions : {}", self.num_best_initial_solutions);
        debug!("refiner_iters : {}", self.refiner_iters);
        debug!("max_moves : {}", self.max_moves);
        debug!("early_stop_ratio : {}", self.early_stop_ratio);
        debug!("total_corking_passes : {}", self.total_corking_passes);
        debug!("v_cycle_flag : {}", self.v_cycle_flag);
        debug!("max_num_vcycle : {}", self.max_num_vcycle);
        debug!("num_coarsen_solutions : {}", self.num_coarsen_solutions);
        debug!("num_vertices_threshold_ilp : {}", self.num_vertices_threshold_ilp);
    }
}
