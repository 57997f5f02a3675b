//! The multilevel driver: coarsen, seed the coarsest level, refine back up, overlay the cuts of
//! several candidates, then run V-cycles.

use std::iter;
use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;

use crate::coarsen::Coarsener;
use crate::evaluator::Evaluator;
use crate::hypergraph::Hypergraph;
use crate::initpart::{PartitionType, Partitioner};
use crate::refine::Refiner;
use crate::util;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultilevelParams {
    pub num_parts: usize,
    pub num_initial_solutions: usize,
    pub num_best_initial_solutions: usize,
    /// the ILP is tried on hypergraphs with at most this many vertices
    pub num_vertices_threshold_ilp: usize,
    pub max_num_vcycle: usize,
    pub num_coarsen_solutions: usize,
    pub v_cycle: bool,
    pub seed: u64,
}

/// The four refiners, applied in this order by [`MultilevelPartitioner::call_refiner`].
#[derive(Clone)]
pub struct Refiners {
    pub k_way_pm: Refiner,
    pub k_way_fm: Refiner,
    pub greedy: Refiner,
    pub ilp: Refiner,
}

pub struct MultilevelPartitioner {
    params: MultilevelParams,
    evaluator: Arc<Evaluator>,
    coarsener: Coarsener,
    partitioner: Partitioner,
    refiners: Refiners,
}

/// a candidate together with its cost and whether it is balanced
struct Scored {
    solution: Vec<usize>,
    cost: f32,
    feasible: bool,
}

impl Scored {
    /// balanced beats unbalanced, then the lower cost wins
    fn worse_than(&self, (feasible, cost): (bool, f32)) -> bool {
        (!self.feasible && feasible) || (self.feasible == feasible && self.cost > cost)
    }
}

impl MultilevelPartitioner {
    pub fn new(
        params: MultilevelParams,
        evaluator: Arc<Evaluator>,
        coarsener: Coarsener,
        partitioner: Partitioner,
        refiners: Refiners,
    ) -> Self {
        Self {
            params,
            evaluator,
            coarsener,
            partitioner,
            refiners,
        }
    }

    pub fn coarsener_mut(&mut self) -> &mut Coarsener {
        &mut self.coarsener
    }

    fn score(
        &self,
        hgraph: &Hypergraph,
        solution: Vec<usize>,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
    ) -> Scored {
        let token = self.evaluator.cut_evaluator(hgraph, &solution, false);
        Scored {
            feasible: util::within_bounds(&token.block_balance, upper, lower),
            cost: token.cost,
            solution,
        }
    }

    /// Partition `hgraph` from scratch: several independent coarsening runs, the cut overlay of
    /// their results, then V-cycle refinement of the winner.
    pub fn partition(
        &mut self,
        hgraph: &mut Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
    ) -> Vec<usize> {
        let mut top_solutions = Vec::with_capacity(self.params.num_coarsen_solutions);
        let mut best: Option<(bool, f32)> = None;
        let mut best_id = 0;
        for id in 0..self.params.num_coarsen_solutions.max(1) {
            self.coarsener.increase_random_seed();
            let solution = self.single_level_partition(hgraph, upper, lower);
            let scored = self.score(hgraph, solution, upper, lower);
            info!(
                "coarsening run {id}: cost {}, balanced {}",
                scored.cost, scored.feasible
            );
            if best.map_or(true, |b| !scored.worse_than(b)) {
                best = Some((scored.feasible, scored.cost));
                best_id = id;
            }
            top_solutions.push(scored.solution);
        }

        let mut solution = self.cut_overlay_ilp_part(hgraph, upper, lower, &top_solutions, best_id);
        if self.params.v_cycle {
            self.vcycle_refinement(hgraph, upper, lower, &mut solution);
        }
        solution
    }

    /// One coarsening run: coarsen, seed the coarsest level, refine back up, overlay the
    /// surviving candidates.
    pub fn single_level_partition(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
    ) -> Vec<usize> {
        let hierarchy = self.coarsener.lazy_first_choice(hgraph);
        let coarsest = hierarchy.last().unwrap_or(hgraph);
        let mut top_solutions = self.initial_partition(coarsest, upper, lower);
        let best_id = self.refine_partition(hgraph, &hierarchy, upper, lower, &mut top_solutions);
        self.cut_overlay_ilp_part(hgraph, upper, lower, &top_solutions, best_id)
    }

    /// Candidate solutions of the coarsest hypergraph, feasible ones first, best first.
    pub fn initial_partition(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
    ) -> Vec<Vec<usize>> {
        let mut rng = fastrand::Rng::with_seed(self.params.seed);
        let fm = self.refiners.k_way_fm.with_max_move(hgraph.num_vertices());

        let mut seeds = Vec::new();
        for kind in [PartitionType::Random, PartitionType::RandomVile] {
            for _ in 0..self.params.num_initial_solutions {
                seeds.push((kind, rng.u64(..)));
            }
        }
        seeds.push((PartitionType::Vile, rng.u64(..)));

        let mut candidates: Vec<Scored> = seeds
            .into_par_iter()
            .map(|(kind, seed)| {
                let mut solution = Vec::new();
                self.partitioner
                    .with_seed(seed)
                    .partition(hgraph, upper, lower, &mut solution, kind);
                fm.refine(hgraph, upper, lower, &mut solution);
                self.score(hgraph, solution, upper, lower)
            })
            .collect();

        if hgraph.num_vertices() <= self.params.num_vertices_threshold_ilp {
            let hint = candidates
                .iter()
                .filter(|c| c.feasible)
                .min_by(|a, b| a.cost.total_cmp(&b.cost))
                .map(|c| c.solution.clone());
            let mut solution = hint.unwrap_or_default();
            let partitioner = self.partitioner.with_seed(rng.u64(..));
            if !partitioner.partition(hgraph, upper, lower, &mut solution, PartitionType::Ilp) {
                partitioner.partition(hgraph, upper, lower, &mut solution, PartitionType::Random);
            }
            fm.refine(hgraph, upper, lower, &mut solution);
            candidates.push(self.score(hgraph, solution, upper, lower));
        }

        candidates.sort_by(|a, b| (!a.feasible).cmp(&!b.feasible).then(a.cost.total_cmp(&b.cost)));
        candidates.truncate(self.params.num_best_initial_solutions.max(1));
        debug!(
            "initial partitioning kept {} candidates, best cost {}",
            candidates.len(),
            candidates[0].cost
        );
        candidates.into_iter().map(|c| c.solution).collect()
    }

    /// Walk the hierarchy from the coarsest level back to `hgraph`, projecting and refining every
    /// candidate in parallel at each level. Returns the index of the cheapest candidate.
    pub fn refine_partition(
        &self,
        hgraph: &Hypergraph,
        hierarchy: &[Hypergraph],
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
        top_solutions: &mut [Vec<usize>],
    ) -> usize {
        let levels: Vec<&Hypergraph> = iter::once(hgraph).chain(hierarchy).collect();
        for level in (1..levels.len()).rev() {
            let (coarse, fine) = (levels[level], levels[level - 1]);
            top_solutions.par_iter_mut().for_each(|solution| {
                *solution = coarse.project(solution.as_slice(), fine.num_vertices());
                self.call_refiner(fine, upper, lower, solution);
            });
            debug!("refined level {} ({} vertices)", level - 1, fine.num_vertices());
        }

        let mut best: Option<(bool, f32)> = None;
        let mut best_id = 0;
        for (id, solution) in top_solutions.iter().enumerate() {
            let token = self.evaluator.cut_evaluator(hgraph, solution, false);
            let key = (util::within_bounds(&token.block_balance, upper, lower), token.cost);
            if best.map_or(true, |b| key.0 > b.0 || (key.0 == b.0 && key.1 < b.1)) {
                best = Some(key);
                best_id = id;
            }
        }
        best_id
    }

    /// Pairwise (k > 2), FM, greedy, then ILP (k == 2).
    pub fn call_refiner(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
        solution: &mut [usize],
    ) {
        if self.params.num_parts > 2 {
            self.refiners.k_way_pm.refine(hgraph, upper, lower, solution);
        }
        self.refiners.k_way_fm.refine(hgraph, upper, lower, solution);
        self.refiners.greedy.refine(hgraph, upper, lower, solution);
        if self.params.num_parts == 2 {
            self.refiners.ilp.refine(hgraph, upper, lower, solution);
        }
    }

    /// Contract every region that no candidate cuts, solve the small problem left, and project
    /// the result back. Falls back to the best candidate if that does worse.
    pub fn cut_overlay_ilp_part(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
        top_solutions: &[Vec<usize>],
        best_id: usize,
    ) -> Vec<usize> {
        let best = &top_solutions[best_id];
        let groups = self.uncut_components(hgraph, top_solutions);
        let mut clustered = self.coarsener.group_vertices(hgraph, &groups);
        let mut solution: Vec<usize> = (0..clustered.num_vertices())
            .map(|c| {
                clustered
                    .fixed_block(c)
                    .unwrap_or(best[clustered.vertex_c_attr(c)[0]])
            })
            .collect();
        debug!(
            "cut overlay: {} candidates, {} clusters",
            top_solutions.len(),
            clustered.num_vertices()
        );

        if clustered.num_vertices() <= self.params.num_vertices_threshold_ilp {
            if !self.partitioner.partition(&clustered, upper, lower, &mut solution, PartitionType::Ilp)
            {
                debug!("cut overlay ILP failed, keeping the projected solution");
            }
        } else {
            clustered.set_community(solution);
            solution = self.single_cycle_refinement(&clustered, upper, lower);
        }

        let overlay = self.score(
            hgraph,
            clustered.project(&solution, hgraph.num_vertices()),
            upper,
            lower,
        );
        let incumbent = self.score(hgraph, best.clone(), upper, lower);
        if !overlay.worse_than((incumbent.feasible, incumbent.cost)) {
            overlay.solution
        } else {
            debug!(
                "cut overlay did worse ({} > {}), keeping the best candidate",
                overlay.cost, incumbent.cost
            );
            incumbent.solution
        }
    }

    /// Connected components over the hyperedges that none of `solutions` cuts.
    fn uncut_components(&self, hgraph: &Hypergraph, solutions: &[Vec<usize>]) -> Vec<Vec<usize>> {
        let cut: Vec<bool> = (0..hgraph.num_hyperedges())
            .map(|e| solutions.iter().any(|s| self.evaluator.is_cut(hgraph, e, s)))
            .collect();

        let mut visited = vec![false; hgraph.num_vertices()];
        let mut groups = Vec::new();
        let mut queue = Vec::new();
        for root in 0..hgraph.num_vertices() {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            queue.push(root);
            let mut group = Vec::new();
            while let Some(v) = queue.pop() {
                group.push(v);
                for &e in hgraph.edges(v) {
                    if cut[e] {
                        continue;
                    }
                    for &u in hgraph.vertices(e) {
                        if !visited[u] {
                            visited[u] = true;
                            queue.push(u);
                        }
                    }
                }
            }
            if group.len() > 1 {
                groups.push(group);
            }
        }
        groups
    }

    /// Repeat single-cycle refinement seeded with the incumbent, then overlay all the cycles.
    pub fn vcycle_refinement(
        &self,
        hgraph: &mut Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
        solution: &mut Vec<usize>,
    ) {
        let saved = hgraph.set_community(solution.clone());
        let mut candidates = vec![solution.clone()];
        for cycle in 0..self.params.max_num_vcycle {
            hgraph.set_community(solution.clone());
            *solution = self.single_cycle_refinement(hgraph, upper, lower);
            debug!(
                "v-cycle {cycle}: cost {}",
                self.evaluator.cut_evaluator(hgraph, solution, false).cost
            );
            candidates.push(solution.clone());
        }
        hgraph.set_community(saved);

        let last = candidates.len() - 1;
        *solution = self.cut_overlay_ilp_part(hgraph, upper, lower, &candidates, last);
    }

    /// Coarsen within the communities of `hgraph`, start from the community assignment of the
    /// coarsest level and refine back up.
    pub fn single_cycle_refinement(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
    ) -> Vec<usize> {
        let hierarchy = self.coarsener.lazy_first_choice(hgraph);
        let coarsest = hierarchy.last().unwrap_or(hgraph);
        let mut solution = coarsest.community_attr().to_vec();
        if solution.len() != coarsest.num_vertices() {
            self.partitioner
                .partition(coarsest, upper, lower, &mut solution, PartitionType::Random);
        }
        if coarsest.num_vertices() <= self.params.num_vertices_threshold_ilp {
            self.partitioner
                .partition(coarsest, upper, lower, &mut solution, PartitionType::Ilp);
        }

        let mut top_solutions = vec![solution];
        if hierarchy.is_empty() {
            self.call_refiner(hgraph, upper, lower, &mut top_solutions[0]);
        } else {
            self.refine_partition(hgraph, &hierarchy, upper, lower, &mut top_solutions);
        }
        top_solutions.swap_remove(0)
    }
}
