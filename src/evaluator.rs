//! The cost model. Turns hypergraph weights plus an assignment into scalar costs, and keeps the
//! derived timing costs of a hypergraph up to date.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};

use crate::hypergraph::{Hypergraph, VertexType};
use crate::util::{self, Matrix};

/// Weighting of the timing-related terms of the cost function
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingFactors {
    /// weight of the accumulated timing cost of a hyperedge
    pub net_timing_factor: f32,
    /// weight of each cut on a timing path
    pub path_timing_factor: f32,
    /// weight of a path re-entering a block it already left
    pub path_snaking_factor: f32,
    /// exponent applied to `1 - slack`
    pub timing_exp_factor: f32,
    /// delay charged to every cut timing arc by [`Evaluator::update_timing`]
    pub extra_delay: f32,
}

impl Default for TimingFactors {
    fn default() -> Self {
        use crate::defs::*;
        Self {
            net_timing_factor: DEFAULT_NET_TIMING_FACTOR,
            path_timing_factor: DEFAULT_PATH_TIMING_FACTOR,
            path_snaking_factor: DEFAULT_PATH_SNAKING_FACTOR,
            timing_exp_factor: DEFAULT_TIMING_EXP_FACTOR,
            extra_delay: DEFAULT_EXTRA_DELAY,
        }
    }
}

/// cost and per-block balance of an assignment
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionToken {
    pub cost: f32,
    pub block_balance: Matrix<f32>,
}

/// Result of [`Evaluator::constraint_and_cut_evaluator`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintReport {
    pub token: PartitionToken,
    pub balance_satisfied: bool,
    pub group_satisfied: bool,
    pub fixed_satisfied: bool,
}

impl ConstraintReport {
    pub fn satisfied(&self) -> bool {
        self.balance_satisfied && self.group_satisfied && self.fixed_satisfied
    }
}

/// Cut statistics over the timing paths of a hypergraph
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PathStats {
    pub tot_num_path: usize,
    pub tot_num_critical_path: usize,
    pub tot_num_noncritical_path: usize,
    pub worst_cut_critical_path: usize,
    pub avg_cut_critical_path: f32,
    /// non-critical paths that turn critical once every cut on them costs the extra delay
    pub number_non2critical_path: usize,
    pub worst_cut_non2critical_path: usize,
    pub avg_cut_non2critical_path: f32,
}

impl fmt::Display for PathStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\tTotal number of timing paths = {}", self.tot_num_path)?;
        writeln!(f, "\tTotal number of timing-critical paths = {}", self.tot_num_critical_path)?;
        writeln!(f, "\tTotal number of timing-noncritical paths = {}", self.tot_num_noncritical_path)?;
        writeln!(f, "\tThe worst number of cuts on timing-critical paths = {}", self.worst_cut_critical_path)?;
        writeln!(f, "\tThe average number of cuts on timing-critical paths = {}", self.avg_cut_critical_path)?;
        writeln!(f, "\tTotal number of timing-noncritical to timing critical paths = {}", self.number_non2critical_path)?;
        writeln!(f, "\tThe worst number of cuts on timing-non2critical paths = {}", self.worst_cut_non2critical_path)?;
        write!(f, "\tThe average number of cuts on timing-non2critical paths = {}", self.avg_cut_non2critical_path)
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    num_parts: usize,
    e_wt_factors: Vec<f32>,
    v_wt_factors: Vec<f32>,
    placement_wt_factors: Vec<f32>,
    timing: TimingFactors,
    /// Graph of timing arcs referenced by the hyperedge arc sets. When absent every hyperedge is
    /// its own arc.
    timing_graph: Option<Arc<Hypergraph>>,
}

#[derive(Clone, Copy)]
enum Propagate {
    Forward(usize),
    Backward(usize),
}

impl Evaluator {
    pub fn new(
        num_parts: usize,
        e_wt_factors: Vec<f32>,
        v_wt_factors: Vec<f32>,
        placement_wt_factors: Vec<f32>,
    ) -> Self {
        Self {
            num_parts,
            e_wt_factors,
            v_wt_factors,
            placement_wt_factors,
            timing: TimingFactors::default(),
            timing_graph: None,
        }
    }

    /// unit factors for the given dimensions
    pub fn uniform(num_parts: usize, vertex_dimensions: usize, hyperedge_dimensions: usize) -> Self {
        Self::new(
            num_parts,
            vec![1.0; hyperedge_dimensions],
            vec![1.0; vertex_dimensions],
            Vec::new(),
        )
    }

    pub fn with_timing_factors(mut self, timing: TimingFactors) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_timing_graph(mut self, timing_graph: Arc<Hypergraph>) -> Self {
        self.timing_graph = Some(timing_graph);
        self
    }

    pub fn num_parts(&self) -> usize {
        self.num_parts
    }

    pub fn timing_factors(&self) -> &TimingFactors {
        &self.timing
    }

    /// count of the vertices of each hyperedge in each block
    pub fn net_degrees(&self, hgraph: &Hypergraph, solution: &[usize]) -> Matrix<usize> {
        (0..hgraph.num_hyperedges())
            .map(|e| {
                let mut degs = vec![0; self.num_parts];
                for &v in hgraph.vertices(e) {
                    degs[solution[v]] += 1;
                }
                degs
            })
            .collect()
    }

    pub fn block_balance(&self, hgraph: &Hypergraph, solution: &[usize]) -> Matrix<f32> {
        let mut balance = vec![vec![0.0; hgraph.vertex_dimensions()]; self.num_parts];
        for v in 0..hgraph.num_vertices() {
            util::add_assign(&mut balance[solution[v]], hgraph.vertex_weights(v));
        }
        balance
    }

    /// `(1 - slack)^exp` of a timing path
    pub fn path_timing_score(&self, hgraph: &Hypergraph, path: usize) -> f32 {
        if path >= hgraph.num_timing_paths() {
            return 0.0;
        }
        (1.0 - hgraph.path_timing_slack(path)).powf(self.timing.timing_exp_factor)
    }

    /// Cost of a timing path where `block_of` gives the block of each vertex on it.
    ///
    /// The path is first collapsed to its sequence of blocks. A path inside a single block is
    /// free; otherwise each block transition is charged the path's timing cost and every
    /// re-entry into a block is charged the snaking factor.
    pub fn path_cost_by(
        &self,
        hgraph: &Hypergraph,
        path: usize,
        block_of: impl Fn(usize) -> usize,
    ) -> f32 {
        let mut last = None;
        let mut transitions = 0usize;
        let mut counter = vec![0usize; self.num_parts];
        for &u in hgraph.path_vertices(path) {
            let block = block_of(u);
            if last != Some(block) {
                if last.is_some() {
                    transitions += 1;
                }
                last = Some(block);
                counter[block] += 1;
            }
        }
        if transitions == 0 {
            return 0.0;
        }

        let snaking = counter.iter().copied().max().unwrap_or(1);
        self.timing.path_timing_factor * transitions as f32 * hgraph.path_timing_cost(path)
            + self.timing.path_snaking_factor * (snaking - 1) as f32
    }

    pub fn path_cost(&self, hgraph: &Hypergraph, path: usize, solution: &[usize]) -> f32 {
        self.path_cost_by(hgraph, path, |v| solution[v])
    }

    pub fn paths_cost(&self, hgraph: &Hypergraph, solution: &[usize]) -> Vec<f32> {
        (0..hgraph.num_timing_paths())
            .map(|p| self.path_cost(hgraph, p, solution))
            .collect()
    }

    /// `(1 - slack)^exp` of a hyperedge
    pub fn hyperedge_timing_cost(&self, hgraph: &Hypergraph, e: usize) -> f32 {
        if !hgraph.has_timing() {
            return 0.0;
        }
        (1.0 - hgraph.hyperedge_slack(e)).powf(self.timing.timing_exp_factor)
    }

    /// weighted sum of the hyperedge weights, plus its accumulated timing cost
    pub fn hyperedge_cost(&self, hgraph: &Hypergraph, e: usize) -> f32 {
        let mut cost = util::dot(hgraph.hyperedge_weights(e), &self.e_wt_factors);
        if hgraph.has_timing() {
            cost += self.timing.net_timing_factor * hgraph.hyperedge_timing_cost(e);
        }
        cost
    }

    /// hyperedge cost spread over its `size - 1` connections
    pub fn norm_edge_score(&self, hgraph: &Hypergraph, e: usize) -> f32 {
        let size = hgraph.vertices(e).len();
        if size <= 1 {
            return 0.0;
        }
        self.hyperedge_cost(hgraph, e) / (size - 1) as f32
    }

    #[inline]
    pub fn weight_norm(&self, weights: &[f32]) -> f32 {
        util::dot(weights, &self.v_wt_factors)
    }

    #[inline]
    pub fn vertex_weight_norm(&self, hgraph: &Hypergraph, v: usize) -> f32 {
        self.weight_norm(hgraph.vertex_weights(v))
    }

    /// inverse placement distance between two vertices
    pub fn placement_score(&self, hgraph: &Hypergraph, v: usize, u: usize) -> f32 {
        self.placement_score_between(hgraph.placement(v), hgraph.placement(u))
    }

    pub fn placement_score_between(&self, a: &[f32], b: &[f32]) -> f32 {
        let dist = util::weighted_dist(a, b, &self.placement_wt_factors);
        if dist == 0.0 {
            f32::MAX / 2.0
        } else {
            1.0 / dist
        }
    }

    /// weight-averaged location of two placed objects
    pub fn avg_placement_loc(
        &self,
        weight_a: &[f32],
        weight_b: &[f32],
        loc_a: &[f32],
        loc_b: &[f32],
    ) -> Vec<f32> {
        let a = self.weight_norm(weight_a);
        let b = self.weight_norm(weight_b);
        let sum = a + b;
        if sum == 0.0 {
            return loc_a.to_vec();
        }
        util::add(&util::scale(loc_a, a / sum), &util::scale(loc_b, b / sum))
    }

    pub fn is_cut(&self, hgraph: &Hypergraph, e: usize, solution: &[usize]) -> bool {
        match hgraph.vertices(e) {
            [first, rest @ ..] => rest.iter().any(|&v| solution[v] != solution[*first]),
            [] => false,
        }
    }

    pub fn cut_hyperedges(&self, hgraph: &Hypergraph, solution: &[usize]) -> Vec<usize> {
        (0..hgraph.num_hyperedges())
            .filter(|&e| self.is_cut(hgraph, e, solution))
            .collect()
    }

    /// For each block pair `a < b`, the total cost of the hyperedges touching both.
    /// Entry `[a][b]` holds the score; the rest of the matrix is zero.
    pub fn matching_connectivity(&self, hgraph: &Hypergraph, solution: &[usize]) -> Matrix<f32> {
        let mut score = vec![vec![0.0; self.num_parts]; self.num_parts];
        let mut touched = vec![false; self.num_parts];
        let mut blocks = Vec::with_capacity(self.num_parts);
        for e in self.cut_hyperedges(hgraph, solution) {
            blocks.clear();
            for &v in hgraph.vertices(e) {
                if !touched[solution[v]] {
                    touched[solution[v]] = true;
                    blocks.push(solution[v]);
                }
            }
            blocks.sort_unstable();
            let cost = self.hyperedge_cost(hgraph, e);
            for (i, &a) in blocks.iter().enumerate() {
                for &b in &blocks[i + 1..] {
                    score[a][b] += cost;
                }
            }
            for &b in &blocks {
                touched[b] = false;
            }
        }
        score
    }

    /// total cost (cut hyperedges plus timing paths) and block balance of an assignment
    pub fn cut_evaluator(
        &self,
        hgraph: &Hypergraph,
        solution: &[usize],
        print: bool,
    ) -> PartitionToken {
        let block_balance = self.block_balance(hgraph, solution);
        let edge_cost: f32 = self
            .cut_hyperedges(hgraph, solution)
            .into_iter()
            .map(|e| self.hyperedge_cost(hgraph, e))
            .sum();
        let path_cost: f32 = (0..hgraph.num_timing_paths())
            .map(|p| self.path_cost(hgraph, p, solution))
            .sum();
        let cost = edge_cost + path_cost;

        if print {
            info!("Cutcost : {cost}");
            let total = hgraph.total_vertex_weights();
            for (block, balance) in block_balance.iter().enumerate() {
                let line = balance
                    .iter()
                    .zip(&total)
                    .map(|(b, t)| {
                        let ratio = if *t == 0.0 { 0.0 } else { b / t };
                        format!("{ratio:.5} ( {b} )")
                    })
                    .collect::<Vec<_>>()
                    .join("    ");
                info!("Vertex balance of block_{block} : {line}");
            }
        }

        PartitionToken {
            cost,
            block_balance,
        }
    }

    /// Cost plus feasibility: balance within bounds, groups kept together, fixed vertices
    /// honored.
    pub fn constraint_and_cut_evaluator(
        &self,
        hgraph: &Hypergraph,
        solution: &[usize],
        ub_factor: f32,
        base_balance: &[f32],
        groups: &[Vec<usize>],
        print: bool,
    ) -> ConstraintReport {
        let token = self.cut_evaluator(hgraph, solution, print);
        let upper = hgraph.upper_vertex_balance(self.num_parts, ub_factor, base_balance);
        let lower = hgraph.lower_vertex_balance(self.num_parts, ub_factor, base_balance);
        let balance_satisfied = (0..self.num_parts).all(|b| {
            util::all_le(&token.block_balance[b], &upper[b])
                && util::all_le(&lower[b], &token.block_balance[b])
        });

        let group_satisfied = groups
            .iter()
            .filter(|g| g.len() > 1)
            .all(|g| g.iter().all(|&v| solution[v] == solution[g[0]]));

        let fixed_satisfied = (0..hgraph.num_vertices())
            .all(|v| hgraph.fixed_block(v).map_or(true, |b| b == solution[v]));

        if print {
            info!("Satisfy the balance constraint : {balance_satisfied}");
            info!("Satisfy the group constraint : {group_satisfied}");
            info!("Satisfy the fixed vertices constraint : {fixed_satisfied}");
        }

        ConstraintReport {
            token,
            balance_satisfied,
            group_satisfied,
            fixed_satisfied,
        }
    }

    /// Derive the timing cost of every path and hyperedge from the current slacks. A hyperedge
    /// accumulates the cost of every path through it.
    pub fn initialize_timing(&self, hgraph: &mut Hypergraph) {
        if !hgraph.has_timing() {
            return;
        }

        let path_cost: Vec<f32> = (0..hgraph.num_timing_paths())
            .map(|p| self.path_timing_score(hgraph, p))
            .collect();
        let mut edge_cost: Vec<f32> = (0..hgraph.num_hyperedges())
            .map(|e| self.hyperedge_timing_cost(hgraph, e))
            .collect();
        for (p, &cost) in path_cost.iter().enumerate() {
            for &e in hgraph.path_edges(p) {
                edge_cost[e] += cost;
            }
        }

        hgraph.set_path_timing_cost(path_cost);
        hgraph.set_hyperedge_timing_cost(edge_cost);
    }

    /// Charge the extra delay to every arc of every cut hyperedge, propagate the worsened slack
    /// through combinational logic in both directions, then refresh hyperedge and path slacks and
    /// their derived costs.
    pub fn update_timing(&self, hgraph: &mut Hypergraph, solution: &[usize]) {
        if !hgraph.has_timing() {
            return;
        }

        let cut = self.cut_hyperedges(hgraph, solution);
        let graph: &Hypergraph = self.timing_graph.as_deref().unwrap_or(&*hgraph);
        let own_arcs = self.timing_graph.is_none();
        let arcs_of = |e: usize| -> Vec<usize> {
            if own_arcs {
                vec![e]
            } else {
                hgraph.hyperedge_arc_set(e).to_vec()
            }
        };

        let mut arc_slack = graph.hyperedge_slacks().to_vec();
        let mut worklist = Vec::new();
        for &e in &cut {
            for arc in arcs_of(e) {
                arc_slack[arc] -= self.timing.extra_delay;
                worklist.push(Propagate::Forward(arc));
                worklist.push(Propagate::Backward(arc));
                while let Some(step) = worklist.pop() {
                    propagate_step(graph, &mut arc_slack, step, &mut worklist);
                }
            }
        }

        let mut edge_slack = hgraph.hyperedge_slacks().to_vec();
        for (e, slack) in edge_slack.iter_mut().enumerate() {
            let arcs = arcs_of(e);
            if !arcs.is_empty() {
                *slack = arcs.iter().map(|&a| arc_slack[a]).fold(f32::MAX, f32::min);
            }
        }
        let path_slack: Vec<f32> = (0..hgraph.num_timing_paths())
            .map(|p| {
                let edges = hgraph.path_edges(p);
                if edges.is_empty() {
                    hgraph.path_timing_slack(p)
                } else {
                    edges.iter().map(|&e| edge_slack[e]).fold(f32::MAX, f32::min)
                }
            })
            .collect();

        debug!(
            "updated timing for {} cut hyperedges over {} paths",
            cut.len(),
            path_slack.len()
        );
        hgraph.set_hyperedge_slack(edge_slack);
        hgraph.set_path_slack(path_slack);
        self.initialize_timing(hgraph);
    }

    /// cut statistics of the timing paths under `solution`
    pub fn timing_cuts(&self, hgraph: &Hypergraph, solution: &[usize]) -> PathStats {
        let mut stats = PathStats::default();
        if hgraph.num_timing_paths() == 0 {
            debug!("no timing paths to report");
            return stats;
        }

        stats.tot_num_path = hgraph.num_timing_paths();
        for p in 0..hgraph.num_timing_paths() {
            let mut block_path: Vec<usize> = Vec::new();
            for &v in hgraph.path_vertices(p) {
                if block_path.last() != Some(&solution[v]) {
                    block_path.push(solution[v]);
                }
            }
            let cuts = block_path.len().saturating_sub(1);
            let slack = hgraph.path_timing_slack(p);
            if slack < 0.0 {
                stats.tot_num_critical_path += 1;
                if cuts > 0 {
                    stats.worst_cut_critical_path = stats.worst_cut_critical_path.max(cuts);
                    stats.avg_cut_critical_path += cuts as f32;
                }
            } else {
                stats.tot_num_noncritical_path += 1;
                if slack - self.timing.extra_delay * (cuts as f32) < 0.0 {
                    stats.number_non2critical_path += 1;
                    stats.worst_cut_non2critical_path =
                        stats.worst_cut_non2critical_path.max(cuts);
                    stats.avg_cut_non2critical_path += cuts as f32;
                }
            }
        }

        if stats.tot_num_critical_path > 0 {
            stats.avg_cut_critical_path /= stats.tot_num_critical_path as f32;
        }
        if stats.number_non2critical_path > 0 {
            stats.avg_cut_non2critical_path /= stats.number_non2critical_path as f32;
        }
        stats
    }
}

/// One step of slack propagation. In the timing graph the first vertex of an arc is its driver
/// and the rest are sinks. Propagation stops at anything that is not a combinational cell.
fn propagate_step(
    graph: &Hypergraph,
    arc_slack: &mut [f32],
    step: Propagate,
    worklist: &mut Vec<Propagate>,
) {
    match step {
        Propagate::Forward(arc) => {
            let slack = arc_slack[arc];
            for &v in graph.vertices(arc).iter().skip(1) {
                if graph.vertex_type(v) != VertexType::Combinational {
                    continue;
                }
                for &next in graph.edges(v) {
                    if graph.vertices(next).first() == Some(&v) && arc_slack[next] > slack {
                        arc_slack[next] = slack;
                        worklist.push(Propagate::Forward(next));
                    }
                }
            }
        }
        Propagate::Backward(arc) => {
            let slack = arc_slack[arc];
            let [src, _, ..] = graph.vertices(arc) else {
                return;
            };
            if graph.vertex_type(*src) != VertexType::Combinational {
                return;
            }
            for &prev in graph.edges(*src) {
                match graph.vertices(prev) {
                    [driver, _, ..] if driver != src => {
                        if arc_slack[prev] > slack {
                            arc_slack[prev] = slack;
                            worklist.push(Propagate::Backward(prev));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}
