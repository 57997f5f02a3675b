//! Initial partitioning of the coarsest hypergraph.
//!
//! The random and vile seeds are cheap and deliberately varied; refinement is expected to fix
//! them up. The ILP seed is exact but only used on small hypergraphs.

use std::sync::Arc;

use log::{debug, warn};

use crate::defs::*;
use crate::evaluator::Evaluator;
use crate::hypergraph::Hypergraph;
use crate::ilp::{BranchAndBound, IlpProblem, IlpSolver};
use crate::util::{self, Matrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    /// shuffled order, each block filled to its target in turn
    Random,
    /// shuffled order, each block filled to its upper bound, the rest dumped in the last block
    RandomVile,
    /// heaviest first, dealt round-robin
    Vile,
    /// exact solve, starting from the given solution when it is feasible
    Ilp,
}

#[derive(Clone)]
pub struct Partitioner {
    num_parts: usize,
    evaluator: Arc<Evaluator>,
    ilp_solver: Arc<dyn IlpSolver>,
    seed: u64,
}

impl Partitioner {
    pub fn new(num_parts: usize, evaluator: Arc<Evaluator>, seed: u64) -> Self {
        Self {
            num_parts,
            evaluator,
            ilp_solver: Arc::new(BranchAndBound::default()),
            seed,
        }
    }

    pub fn with_ilp_solver(mut self, solver: Arc<dyn IlpSolver>) -> Self {
        self.ilp_solver = solver;
        self
    }

    /// a copy drawing from another random sequence
    pub fn with_seed(&self, seed: u64) -> Self {
        let mut p = self.clone();
        p.seed = seed;
        p
    }

    /// Fill `solution` with a new assignment of `hgraph`. Returns false when the ILP fails; the
    /// solution is then left untouched.
    pub fn partition(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
        solution: &mut Vec<usize>,
        kind: PartitionType,
    ) -> bool {
        match kind {
            PartitionType::Random => *solution = self.random_part(hgraph, upper, lower, false),
            PartitionType::RandomVile => *solution = self.random_part(hgraph, upper, lower, true),
            PartitionType::Vile => *solution = self.vile_part(hgraph),
            PartitionType::Ilp => return self.ilp_part(hgraph, upper, lower, solution),
        }
        true
    }

    /// fixed vertices in their block, the rest unassigned
    fn seed_fixed(&self, hgraph: &Hypergraph) -> (Vec<usize>, Matrix<f32>) {
        let mut solution = vec![0; hgraph.num_vertices()];
        let mut balance = vec![vec![0.0; hgraph.vertex_dimensions()]; self.num_parts];
        for v in 0..hgraph.num_vertices() {
            if let Some(b) = hgraph.fixed_block(v) {
                solution[v] = b;
                util::add_assign(&mut balance[b], hgraph.vertex_weights(v));
            }
        }
        (solution, balance)
    }

    /// Free vertices in a random order, vertices on timing paths first in path order.
    fn shuffled_free_vertices(&self, hgraph: &Hypergraph) -> Vec<usize> {
        let mut rng = fastrand::Rng::with_seed(self.seed);
        let mut taken = vec![false; hgraph.num_vertices()];
        for v in 0..hgraph.num_vertices() {
            taken[v] = hgraph.fixed_block(v).is_some();
        }

        let mut order = Vec::with_capacity(hgraph.num_vertices());
        let mut paths: Vec<usize> = (0..hgraph.num_timing_paths()).collect();
        rng.shuffle(&mut paths);
        for p in paths {
            for &v in hgraph.path_vertices(p) {
                if !taken[v] {
                    taken[v] = true;
                    order.push(v);
                }
            }
        }

        let mut rest: Vec<usize> = (0..hgraph.num_vertices()).filter(|&v| !taken[v]).collect();
        rng.shuffle(&mut rest);
        order.extend(rest);
        order
    }

    fn random_part(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
        vile: bool,
    ) -> Vec<usize> {
        let (mut solution, mut balance) = self.seed_fixed(hgraph);
        let targets: Matrix<f32> = if vile {
            upper.to_vec()
        } else {
            // halfway between the bounds
            upper
                .iter()
                .zip(lower)
                .map(|(u, l)| util::scale(&util::add(u, l), 0.5))
                .collect()
        };

        let mut block = 0;
        for v in self.shuffled_free_vertices(hgraph) {
            let w = hgraph.vertex_weights(v);
            while block + 1 < self.num_parts
                && !util::all_le(&util::add(&balance[block], w), &targets[block])
            {
                block += 1;
            }
            solution[v] = block;
            util::add_assign(&mut balance[block], w);
        }
        solution
    }

    fn vile_part(&self, hgraph: &Hypergraph) -> Vec<usize> {
        let (mut solution, _) = self.seed_fixed(hgraph);
        let mut free: Vec<usize> = (0..hgraph.num_vertices())
            .filter(|&v| hgraph.fixed_block(v).is_none())
            .collect();
        free.sort_by(|&a, &b| {
            let wa = self.evaluator.vertex_weight_norm(hgraph, a);
            let wb = self.evaluator.vertex_weight_norm(hgraph, b);
            wb.total_cmp(&wa)
        });
        for (i, v) in free.into_iter().enumerate() {
            solution[v] = i % self.num_parts;
        }
        solution
    }

    fn ilp_part(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
        solution: &mut Vec<usize>,
    ) -> bool {
        let mut problem = IlpProblem::from_hypergraph(hgraph, &self.evaluator, upper, lower);
        problem.cap_hyperedges(ILP_MAX_HYPEREDGES, ILP_MAX_DROPPED_COST_SHARE);
        if solution.len() == hgraph.num_vertices() {
            problem.hint = Some(solution.clone());
        }
        match self.ilp_solver.solve(&problem) {
            Some(result) => {
                debug!(
                    "ilp partition of {} vertices, cut cost {}",
                    hgraph.num_vertices(),
                    problem.cut_cost(&result)
                );
                *solution = result;
                true
            }
            None => {
                warn!(
                    "ilp partitioning failed on {} vertices",
                    hgraph.num_vertices()
                );
                false
            }
        }
    }
}
