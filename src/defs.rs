//! default values for the tunables in [`crate::options::Options`]

pub const DEFAULT_NUM_PARTS: usize = 2;
/// allowed imbalance, in percent of the average block weight
pub const DEFAULT_UB_FACTOR: f32 = 1.0;
pub const DEFAULT_SEED: u64 = 0;

pub const DEFAULT_NET_TIMING_FACTOR: f32 = 1.0;
pub const DEFAULT_PATH_TIMING_FACTOR: f32 = 1.0;
pub const DEFAULT_PATH_SNAKING_FACTOR: f32 = 1.0;
pub const DEFAULT_TIMING_EXP_FACTOR: f32 = 2.0;
pub const DEFAULT_EXTRA_DELAY: f32 = 1e-9;

pub const DEFAULT_THR_COARSEN_HYPEREDGE_SIZE_SKIP: usize = 200;
pub const DEFAULT_THR_COARSEN_VERTICES: usize = 10;
pub const DEFAULT_THR_COARSEN_HYPEREDGES: usize = 50;
pub const DEFAULT_COARSENING_RATIO: f32 = 1.6;
pub const DEFAULT_MAX_COARSEN_ITERS: usize = 30;
pub const DEFAULT_ADJ_DIFF_RATIO: f32 = 0.0001;
pub const DEFAULT_MIN_NUM_VERTICES_EACH_PART: usize = 4;
pub const DEFAULT_GLOBAL_NET_THRESHOLD: usize = 1000;

pub const DEFAULT_NUM_INITIAL_SOLUTIONS: usize = 50;
pub const DEFAULT_NUM_BEST_INITIAL_SOLUTIONS: usize = 10;
pub const DEFAULT_NUM_VERTICES_THRESHOLD_ILP: usize = 50;

pub const DEFAULT_REFINER_ITERS: usize = 10;
pub const DEFAULT_MAX_MOVES: usize = 60;
pub const DEFAULT_EARLY_STOP_RATIO: f32 = 0.5;
pub const DEFAULT_TOTAL_CORKING_PASSES: usize = 25;
pub const DEFAULT_MAX_NUM_VCYCLE: usize = 1;
pub const DEFAULT_NUM_COARSEN_SOLUTIONS: usize = 3;

/// Initial ILP partitioning keeps at most this many hyperedges. The cheapest ones are dropped
/// first.
pub const ILP_MAX_HYPEREDGES: usize = 200;
/// ... but never drops more than this share of the total hyperedge cost
pub const ILP_MAX_DROPPED_COST_SHARE: f32 = 0.1;
/// search nodes the built-in branch and bound may expand before giving up
pub const ILP_NODE_BUDGET: usize = 500_000;
