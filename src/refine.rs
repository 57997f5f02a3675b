//! Shared machinery of the refiners.
//!
//! A [`RefineState`] bundles an assignment with the shadow state every move keeps in lock-step:
//! net degrees, block balance and the cost of every timing path. The concrete strategies
//! (k-way FM, pairwise FM, greedy hyperedge moves and boundary ILP) only differ in their `pass`
//! function. [`Refiner`] picks that function from a table by [`RefinerKind`] and repeats it.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::defs::*;
use crate::evaluator::Evaluator;
use crate::hypergraph::Hypergraph;
use crate::ilp::{BranchAndBound, IlpSolver};
use crate::util::{self, Matrix};
use crate::{greedy, ilprefine, kwayfm, kwaypm};

/// A proposed move of one vertex
#[derive(Debug, Clone, PartialEq)]
pub struct VertexGain {
    pub vertex: usize,
    pub source_part: usize,
    pub destination_part: usize,
    pub gain: f32,
    /// change in cost of each timing path through the vertex
    pub path_delta: Vec<(usize, f32)>,
}

/// A proposed move of every vertex of a hyperedge into one block
#[derive(Debug, Clone, PartialEq)]
pub struct HyperedgeGain {
    pub hyperedge: usize,
    pub destination_part: usize,
    pub gain: f32,
    pub path_delta: Vec<(usize, f32)>,
    /// combined weight norm of the vertices that would move
    pub weight: f32,
}

/// What [`RefineState::rollback_vertex_gain`] needs to undo a move exactly.
#[derive(Debug, Clone)]
pub struct AcceptedMove {
    pub cell: VertexGain,
    prev_balance: [Vec<f32>; 2],
    prev_path_cost: Vec<(usize, f32)>,
}

pub struct RefineState<'a> {
    pub hgraph: &'a Hypergraph,
    pub evaluator: &'a Evaluator,
    pub upper: &'a [Vec<f32>],
    pub lower: &'a [Vec<f32>],
    pub solution: &'a mut [usize],
    pub net_degs: Matrix<usize>,
    pub block_balance: Matrix<f32>,
    pub cur_paths_cost: Vec<f32>,
    /// vertices that may not move again in this pass; fixed vertices always are
    pub visited: Vec<bool>,
}

impl<'a> RefineState<'a> {
    pub fn new(
        hgraph: &'a Hypergraph,
        evaluator: &'a Evaluator,
        upper: &'a [Vec<f32>],
        lower: &'a [Vec<f32>],
        solution: &'a mut [usize],
    ) -> Self {
        let net_degs = evaluator.net_degrees(hgraph, solution);
        let block_balance = evaluator.block_balance(hgraph, solution);
        let cur_paths_cost = evaluator.paths_cost(hgraph, solution);
        let mut state = Self {
            hgraph,
            evaluator,
            upper,
            lower,
            solution,
            net_degs,
            block_balance,
            cur_paths_cost,
            visited: Vec::new(),
        };
        state.reset_visited();
        state
    }

    /// unmark every free vertex
    pub fn reset_visited(&mut self) {
        let hg = self.hgraph;
        self.visited = (0..hg.num_vertices())
            .map(|v| hg.fixed_block(v).is_some())
            .collect();
    }

    pub fn num_parts(&self) -> usize {
        self.evaluator.num_parts()
    }

    /// number of blocks hyperedge `e` touches
    #[inline]
    pub fn connectivity(&self, e: usize) -> usize {
        self.net_degs[e].iter().filter(|&&d| d > 0).count()
    }

    pub fn is_feasible(&self) -> bool {
        (0..self.num_parts()).all(|b| {
            util::all_le(&self.block_balance[b], &self.upper[b])
                && util::all_le(&self.lower[b], &self.block_balance[b])
        })
    }

    /// Gain of moving `v` from `from` to `to`: the cut cost saved plus the path cost saved.
    pub fn vertex_gain(&self, v: usize, from: usize, to: usize) -> VertexGain {
        let hg = self.hgraph;
        if from == to {
            return VertexGain {
                vertex: v,
                source_part: from,
                destination_part: to,
                gain: 0.0,
                path_delta: Vec::new(),
            };
        }

        let mut cut_score = 0.0;
        for &e in hg.edges(v) {
            let degs = &self.net_degs[e];
            match self.connectivity(e) {
                0 => continue,
                1 if degs[from] > 1 => cut_score -= self.evaluator.hyperedge_cost(hg, e),
                2 if degs[from] == 1 && degs[to] > 0 => {
                    cut_score += self.evaluator.hyperedge_cost(hg, e)
                }
                _ => {}
            }
        }

        let mut path_score = 0.0;
        let mut path_delta = Vec::new();
        if hg.num_timing_paths() > 0 {
            let solution = &*self.solution;
            for &p in hg.timing_paths_through(v) {
                let cost = self
                    .evaluator
                    .path_cost_by(hg, p, |u| if u == v { to } else { solution[u] });
                path_delta.push((p, cost - self.cur_paths_cost[p]));
                path_score += self.cur_paths_cost[p] - cost;
            }
        }

        VertexGain {
            vertex: v,
            source_part: from,
            destination_part: to,
            gain: cut_score + path_score,
            path_delta,
        }
    }

    /// Gain of moving every vertex of `e` that is not already in `to` into `to`. The vertices
    /// are moved one after the other on a local copy of the affected net degrees.
    pub fn hyperedge_gain(&self, e: usize, to: usize) -> HyperedgeGain {
        let hg = self.hgraph;
        let moving: Vec<(usize, usize)> = hg
            .vertices(e)
            .iter()
            .filter(|&&v| self.solution[v] != to)
            .map(|&v| (v, self.solution[v]))
            .collect();

        let mut gain = HyperedgeGain {
            hyperedge: e,
            destination_part: to,
            gain: 0.0,
            path_delta: Vec::new(),
            weight: 0.0,
        };
        if moving.is_empty() {
            return gain;
        }

        let mut degs: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(v, _) in &moving {
            for &he in hg.edges(v) {
                degs.entry(he).or_insert_with(|| self.net_degs[he].clone());
            }
        }

        let mut cut_score = 0.0;
        for &(v, from) in &moving {
            gain.weight += self.evaluator.vertex_weight_norm(hg, v);
            for &he in hg.edges(v) {
                let Some(d) = degs.get_mut(&he) else {
                    continue;
                };
                let connectivity = d.iter().filter(|&&x| x > 0).count();
                match connectivity {
                    0 => continue,
                    1 if d[from] > 1 => cut_score -= self.evaluator.hyperedge_cost(hg, he),
                    2 if d[from] == 1 && d[to] > 0 => {
                        cut_score += self.evaluator.hyperedge_cost(hg, he)
                    }
                    _ => {}
                }
                d[from] -= 1;
                d[to] += 1;
            }
        }

        let mut path_score = 0.0;
        if hg.num_timing_paths() > 0 {
            let members = hg.vertices(e);
            let solution = &*self.solution;
            let mut seen = Vec::new();
            for &(v, _) in &moving {
                for &p in hg.timing_paths_through(v) {
                    if seen.contains(&p) {
                        continue;
                    }
                    seen.push(p);
                    let cost = self.evaluator.path_cost_by(hg, p, |u| {
                        if members.contains(&u) {
                            to
                        } else {
                            solution[u]
                        }
                    });
                    gain.path_delta.push((p, cost - self.cur_paths_cost[p]));
                    path_score += self.cur_paths_cost[p] - cost;
                }
            }
        }

        gain.gain = cut_score + path_score;
        gain
    }

    /// Commit a vertex move, returning what is needed to undo it.
    ///
    /// The costs of the paths through the vertex are recomputed from the assignment after the
    /// move, since a queued cell may predate moves of other vertices on the same paths. The
    /// returned cell carries the path deltas and gain that were actually applied.
    pub fn accept_vertex_gain(&mut self, cell: &VertexGain) -> AcceptedMove {
        let hg = self.hgraph;
        let (v, from, to) = (cell.vertex, cell.source_part, cell.destination_part);
        self.visited[v] = true;

        let prev_balance = [
            self.block_balance[from].clone(),
            self.block_balance[to].clone(),
        ];
        self.solution[v] = to;
        util::sub_assign(&mut self.block_balance[from], hg.vertex_weights(v));
        util::add_assign(&mut self.block_balance[to], hg.vertex_weights(v));
        for &e in hg.edges(v) {
            self.net_degs[e][from] -= 1;
            self.net_degs[e][to] += 1;
        }

        let mut applied = cell.clone();
        let mut prev_path_cost = Vec::with_capacity(cell.path_delta.len());
        if hg.num_timing_paths() > 0 {
            let queued: f32 = cell.path_delta.iter().map(|&(_, d)| d).sum();
            applied.path_delta.clear();
            let solution = &*self.solution;
            for &p in hg.timing_paths_through(v) {
                let cost = self.evaluator.path_cost(hg, p, solution);
                prev_path_cost.push((p, self.cur_paths_cost[p]));
                applied.path_delta.push((p, cost - self.cur_paths_cost[p]));
                self.cur_paths_cost[p] = cost;
            }
            let actual: f32 = applied.path_delta.iter().map(|&(_, d)| d).sum();
            applied.gain += queued - actual;
        }

        AcceptedMove {
            cell: applied,
            prev_balance,
            prev_path_cost,
        }
    }

    /// exact inverse of [`Self::accept_vertex_gain`]
    pub fn rollback_vertex_gain(&mut self, mv: AcceptedMove) {
        let hg = self.hgraph;
        let (v, from, to) = (mv.cell.vertex, mv.cell.source_part, mv.cell.destination_part);
        self.visited[v] = false;

        for (p, cost) in mv.prev_path_cost.into_iter().rev() {
            self.cur_paths_cost[p] = cost;
        }
        let [prev_from, prev_to] = mv.prev_balance;
        self.block_balance[from] = prev_from;
        self.block_balance[to] = prev_to;
        self.solution[v] = from;
        for &e in hg.edges(v) {
            self.net_degs[e][from] += 1;
            self.net_degs[e][to] -= 1;
        }
    }

    pub fn accept_hyperedge_gain(&mut self, gain: &HyperedgeGain) {
        let hg = self.hgraph;
        let to = gain.destination_part;
        for &(p, delta) in &gain.path_delta {
            self.cur_paths_cost[p] += delta;
        }
        for &v in hg.vertices(gain.hyperedge) {
            let from = self.solution[v];
            if from == to {
                continue;
            }
            self.solution[v] = to;
            util::sub_assign(&mut self.block_balance[from], hg.vertex_weights(v));
            util::add_assign(&mut self.block_balance[to], hg.vertex_weights(v));
            for &e in hg.edges(v) {
                self.net_degs[e][from] -= 1;
                self.net_degs[e][to] += 1;
            }
        }
    }

    /// `to` stays under its upper bound and `from` over its lower bound; fixed vertices never
    /// leave their block
    pub fn check_vertex_move_legality(&self, v: usize, from: usize, to: usize) -> bool {
        if self.hgraph.fixed_block(v).is_some_and(|b| b != to) {
            return false;
        }
        let w = self.hgraph.vertex_weights(v);
        util::all_le(&util::add(&self.block_balance[to], w), &self.upper[to])
            && util::all_le(&self.lower[from], &util::sub(&self.block_balance[from], w))
    }

    pub fn check_hyperedge_move_legality(&self, e: usize, to: usize) -> bool {
        let hg = self.hgraph;
        let mut balance = self.block_balance.clone();
        for &v in hg.vertices(e) {
            if hg.fixed_block(v).is_some_and(|b| b != to) {
                return false;
            }
            let from = self.solution[v];
            if from != to {
                util::add_assign(&mut balance[to], hg.vertex_weights(v));
                util::sub_assign(&mut balance[from], hg.vertex_weights(v));
            }
        }
        if !util::all_le(&balance[to], &self.upper[to]) {
            return false;
        }
        (0..self.num_parts())
            .filter(|&b| b != to)
            .all(|b| util::all_le(&self.lower[b], &balance[b]))
    }

    fn boundary_from(&self, is_boundary_net: impl Fn(usize) -> bool) -> Vec<usize> {
        let hg = self.hgraph;
        let flags: Vec<bool> = (0..hg.num_hyperedges()).map(is_boundary_net).collect();
        (0..hg.num_vertices())
            .filter(|&v| !self.visited[v] && hg.edges(v).iter().any(|&e| flags[e]))
            .collect()
    }

    /// unvisited vertices on a hyperedge that spans at least two blocks
    pub fn find_boundary_vertices(&self) -> Vec<usize> {
        self.boundary_from(|e| self.connectivity(e) >= 2)
    }

    /// unvisited vertices on a hyperedge that touches both `a` and `b`
    pub fn find_boundary_vertices_between(&self, a: usize, b: usize) -> Vec<usize> {
        self.boundary_from(|e| self.net_degs[e][a] > 0 && self.net_degs[e][b] > 0)
    }

    fn neighbors_where(&self, v: usize, keep: impl Fn(usize) -> bool) -> Vec<usize> {
        let hg = self.hgraph;
        let on_paths = hg
            .timing_paths_through(v)
            .iter()
            .flat_map(|&p| hg.path_vertices(p));
        let mut nbrs: Vec<usize> = hg
            .edges(v)
            .iter()
            .flat_map(|&e| hg.vertices(e))
            .chain(on_paths)
            .copied()
            .filter(|&u| !self.visited[u] && keep(u))
            .collect();
        nbrs.sort_unstable();
        nbrs.dedup();
        nbrs
    }

    /// unvisited vertices sharing a hyperedge or a timing path with `v`, ascending
    pub fn find_neighbors(&self, v: usize) -> Vec<usize> {
        self.neighbors_where(v, |_| true)
    }

    /// like [`Self::find_neighbors`], restricted to vertices in block `a` or `b`
    pub fn find_neighbors_between(&self, v: usize, a: usize, b: usize) -> Vec<usize> {
        self.neighbors_where(v, |u| self.solution[u] == a || self.solution[u] == b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefinerKind {
    /// heap-based k-way FM
    KWayFm = 0,
    /// pairwise FM over a matching of the blocks
    KWayPm = 1,
    /// greedy whole-hyperedge moves
    Greedy = 2,
    /// exact ILP over the boundary vertices
    Ilp = 3,
}

/// Values carried across the passes of one [`Refiner::refine_with_memo`] call.
#[derive(Debug, Clone, Default)]
pub struct PassMemo {
    /// block-pair connectivity seen by the previous pairwise pass
    pub prev_pair_scores: Option<Matrix<f32>>,
}

pub(crate) type PassFn = fn(&Refiner, &mut RefineState<'_>, &mut PassMemo) -> f32;

const PASSES: [PassFn; 4] = [kwayfm::pass, kwaypm::pass, greedy::pass, ilprefine::pass];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinerParams {
    pub refiner_iters: usize,
    /// moves allowed in one pass
    pub max_move: usize,
    /// heap levels searched when every bucket root is illegal
    pub total_corking_passes: usize,
    pub early_stop_ratio: f32,
    /// the ILP pass gives up on larger boundaries
    pub ilp_vertex_threshold: usize,
}

impl Default for RefinerParams {
    fn default() -> Self {
        Self {
            refiner_iters: DEFAULT_REFINER_ITERS,
            max_move: DEFAULT_MAX_MOVES,
            total_corking_passes: DEFAULT_TOTAL_CORKING_PASSES,
            early_stop_ratio: DEFAULT_EARLY_STOP_RATIO,
            ilp_vertex_threshold: DEFAULT_NUM_VERTICES_THRESHOLD_ILP,
        }
    }
}

#[derive(Clone)]
pub struct Refiner {
    pub kind: RefinerKind,
    pub params: RefinerParams,
    pub evaluator: Arc<Evaluator>,
    pub ilp_solver: Arc<dyn IlpSolver>,
}

impl Refiner {
    pub fn new(kind: RefinerKind, params: RefinerParams, evaluator: Arc<Evaluator>) -> Self {
        Self {
            kind,
            params,
            evaluator,
            ilp_solver: Arc::new(BranchAndBound::default()),
        }
    }

    pub fn with_ilp_solver(mut self, solver: Arc<dyn IlpSolver>) -> Self {
        self.ilp_solver = solver;
        self
    }

    /// a copy allowed `max_move` moves per pass
    pub fn with_max_move(&self, max_move: usize) -> Self {
        let mut r = self.clone();
        r.params.max_move = max_move;
        r
    }

    /// a copy running at most `refiner_iters` passes
    pub fn with_refiner_iters(&self, refiner_iters: usize) -> Self {
        let mut r = self.clone();
        r.params.refiner_iters = refiner_iters;
        r
    }

    /// Improve `solution` in place, returning the total gain.
    pub fn refine(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
        solution: &mut [usize],
    ) -> f32 {
        self.refine_with_memo(hgraph, upper, lower, solution, &mut PassMemo::default())
    }

    /// Repeat the pass of this refiner until it stops improving or `refiner_iters` is reached.
    pub fn refine_with_memo(
        &self,
        hgraph: &Hypergraph,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
        solution: &mut [usize],
        memo: &mut PassMemo,
    ) -> f32 {
        if self.params.max_move == 0 {
            debug!("max_move = 0, skipping {:?} refinement", self.kind);
            return 0.0;
        }

        let mut state = RefineState::new(hgraph, &self.evaluator, upper, lower, solution);
        let pass = PASSES[self.kind as usize];
        let mut total = 0.0;
        for iter in 0..self.params.refiner_iters {
            state.reset_visited();
            let gain = pass(self, &mut state, memo);
            debug!("{:?} pass {iter}: gain = {gain}", self.kind);
            if gain <= 0.0 {
                break;
            }
            total += gain;
        }
        total
    }
}
