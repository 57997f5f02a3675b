//! Exact min-cut partitioning of small instances.
//!
//! [`IlpSolver`] is the boundary to the exact solver: it receives a self-contained
//! [`IlpProblem`] and returns a feasible assignment or `None`. [`BranchAndBound`] is the
//! built-in backend. It searches block assignments depth first under a node budget.

use log::debug;

use crate::defs::*;
use crate::evaluator::Evaluator;
use crate::hypergraph::Hypergraph;
use crate::util::{self, Matrix};

/// A partitioning instance detached from any hypergraph
#[derive(Debug, Clone, PartialEq)]
pub struct IlpProblem {
    pub num_parts: usize,
    pub vertex_dimensions: usize,
    /// block of each fixed vertex; empty when nothing is fixed
    pub fixed: Vec<Option<usize>>,
    pub hyperedges: Vec<Vec<usize>>,
    /// scalar cost of cutting each hyperedge
    pub hyperedge_weights: Vec<f32>,
    pub vertex_weights: Matrix<f32>,
    pub upper: Matrix<f32>,
    pub lower: Matrix<f32>,
    /// a known solution to start from
    pub hint: Option<Vec<usize>>,
}

impl IlpProblem {
    /// The instance of a whole hypergraph. Single-vertex hyperedges are left out.
    pub fn from_hypergraph(
        hgraph: &Hypergraph,
        evaluator: &Evaluator,
        upper: &[Vec<f32>],
        lower: &[Vec<f32>],
    ) -> Self {
        let mut hyperedges = Vec::new();
        let mut hyperedge_weights = Vec::new();
        for e in 0..hgraph.num_hyperedges() {
            if hgraph.vertices(e).len() > 1 {
                hyperedges.push(hgraph.vertices(e).to_vec());
                hyperedge_weights.push(evaluator.hyperedge_cost(hgraph, e));
            }
        }
        Self {
            num_parts: evaluator.num_parts(),
            vertex_dimensions: hgraph.vertex_dimensions(),
            fixed: hgraph.fixed_attr().to_vec(),
            hyperedges,
            hyperedge_weights,
            vertex_weights: hgraph.all_vertex_weights().clone(),
            upper: upper.to_vec(),
            lower: lower.to_vec(),
            hint: None,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertex_weights.len()
    }

    /// Drop the cheapest hyperedges until at most `max_hyperedges` remain, but never more than
    /// `max_dropped_share` of the total cost.
    pub fn cap_hyperedges(&mut self, max_hyperedges: usize, max_dropped_share: f32) {
        if self.hyperedges.len() <= max_hyperedges {
            return;
        }
        let total: f32 = self.hyperedge_weights.iter().sum();
        let mut order: Vec<usize> = (0..self.hyperedges.len()).collect();
        order.sort_by(|&a, &b| self.hyperedge_weights[a].total_cmp(&self.hyperedge_weights[b]));

        let mut keep = vec![true; self.hyperedges.len()];
        let mut dropped = 0.0;
        let mut remaining = self.hyperedges.len();
        for e in order {
            if remaining <= max_hyperedges
                || dropped + self.hyperedge_weights[e] > max_dropped_share * total
            {
                break;
            }
            dropped += self.hyperedge_weights[e];
            keep[e] = false;
            remaining -= 1;
        }

        let mut i = 0;
        self.hyperedges.retain(|_| {
            i += 1;
            keep[i - 1]
        });
        let mut i = 0;
        self.hyperedge_weights.retain(|_| {
            i += 1;
            keep[i - 1]
        });
        debug!(
            "ilp instance capped to {} hyperedges, dropping cost {dropped} of {total}",
            self.hyperedges.len()
        );
    }

    fn fixed_block(&self, v: usize) -> Option<usize> {
        self.fixed.get(v).copied().flatten()
    }

    /// cut cost of `assignment`
    pub fn cut_cost(&self, assignment: &[usize]) -> f32 {
        self.hyperedges
            .iter()
            .zip(&self.hyperedge_weights)
            .filter(|(he, _)| he.iter().any(|&v| assignment[v] != assignment[he[0]]))
            .map(|(_, w)| w)
            .sum()
    }

    /// balance, fixed and range constraints all hold for `assignment`
    pub fn is_feasible(&self, assignment: &[usize]) -> bool {
        if assignment.len() != self.num_vertices()
            || assignment.iter().any(|&b| b >= self.num_parts)
        {
            return false;
        }
        if (0..self.num_vertices()).any(|v| self.fixed_block(v).is_some_and(|b| b != assignment[v])) {
            return false;
        }
        let mut balance = vec![vec![0.0; self.vertex_dimensions]; self.num_parts];
        for (v, &b) in assignment.iter().enumerate() {
            util::add_assign(&mut balance[b], &self.vertex_weights[v]);
        }
        (0..self.num_parts).all(|b| {
            util::all_le(&balance[b], &self.upper[b]) && util::all_le(&self.lower[b], &balance[b])
        })
    }
}

pub trait IlpSolver: Send + Sync {
    /// an optimal (or at least feasible) assignment, `None` on failure
    fn solve(&self, problem: &IlpProblem) -> Option<Vec<usize>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchAndBound {
    /// search nodes expanded before giving up
    pub node_budget: usize,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self {
            node_budget: ILP_NODE_BUDGET,
        }
    }
}

impl IlpSolver for BranchAndBound {
    fn solve(&self, problem: &IlpProblem) -> Option<Vec<usize>> {
        let n = problem.num_vertices();
        if n == 0 || problem.num_parts == 0 {
            return None;
        }
        let mut search = Search::new(problem, self.node_budget);
        search.dfs(0);
        debug!(
            "branch and bound: {} nodes, best cost {:?}",
            search.nodes,
            search.best.as_ref().map(|(c, _)| *c)
        );
        search.best.map(|(_, assignment)| assignment)
    }
}

const UNASSIGNED: usize = usize::MAX;

struct Search<'a> {
    p: &'a IlpProblem,
    /// vertices in branching order
    order: Vec<usize>,
    /// suffix sums of the vertex weights along `order`
    remaining: Matrix<f32>,
    incident: Vec<Vec<usize>>,
    assignment: Vec<usize>,
    balance: Matrix<f32>,
    /// per hyperedge, vertices assigned to each block
    counts: Vec<Vec<u32>>,
    span: Vec<usize>,
    cost: f32,
    best: Option<(f32, Vec<usize>)>,
    nodes: usize,
    budget: usize,
    /// blocks are interchangeable, so only the first empty block needs to be tried
    symmetric: bool,
    opened: usize,
}

impl<'a> Search<'a> {
    fn new(p: &'a IlpProblem, budget: usize) -> Self {
        let n = p.num_vertices();
        let k = p.num_parts;
        let mut incident = vec![Vec::new(); n];
        for (e, he) in p.hyperedges.iter().enumerate() {
            for &v in he {
                incident[v].push(e);
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&v| (p.fixed_block(v).is_none(), std::cmp::Reverse(incident[v].len())));

        let mut remaining = vec![vec![0.0; p.vertex_dimensions]; n + 1];
        for i in (0..n).rev() {
            remaining[i] = util::add(&remaining[i + 1], &p.vertex_weights[order[i]]);
        }

        let symmetric = p.fixed.iter().all(Option::is_none)
            && p.upper.windows(2).all(|w| w[0] == w[1])
            && p.lower.windows(2).all(|w| w[0] == w[1]);

        let mut search = Self {
            p,
            order,
            remaining,
            incident,
            assignment: vec![UNASSIGNED; n],
            balance: vec![vec![0.0; p.vertex_dimensions]; k],
            counts: vec![vec![0; k]; p.hyperedges.len()],
            span: vec![0; p.hyperedges.len()],
            cost: 0.0,
            best: None,
            nodes: 0,
            budget,
            symmetric,
            opened: 0,
        };
        if let Some(hint) = p.hint.as_ref().filter(|h| p.is_feasible(h)) {
            search.best = Some((p.cut_cost(hint), hint.clone()));
        }
        search
    }

    /// the remaining vertices can still fill every block up to its lower bound
    fn lower_reachable(&self, depth: usize) -> bool {
        let rest = &self.remaining[depth];
        (0..self.p.vertex_dimensions).all(|d| {
            let deficit: f32 = (0..self.p.num_parts)
                .map(|b| (self.p.lower[b][d] - self.balance[b][d]).max(0.0))
                .sum();
            deficit <= rest[d]
        })
    }

    /// blocks to try for `v`, most attached first
    fn candidates(&self, v: usize) -> Vec<usize> {
        if let Some(b) = self.p.fixed_block(v) {
            return vec![b];
        }
        let limit = if self.symmetric {
            (self.opened + 1).min(self.p.num_parts)
        } else {
            self.p.num_parts
        };
        let mut affinity = vec![0.0f32; limit];
        for &e in &self.incident[v] {
            for (b, a) in affinity.iter_mut().enumerate() {
                if self.counts[e][b] > 0 {
                    *a += self.p.hyperedge_weights[e];
                }
            }
        }
        let hinted = self.p.hint.as_ref().map(|h| h[v]);
        let mut blocks: Vec<usize> = (0..limit).collect();
        blocks.sort_by(|&a, &b| {
            (hinted != Some(a))
                .cmp(&(hinted != Some(b)))
                .then(affinity[b].total_cmp(&affinity[a]))
        });
        blocks
    }

    fn assign(&mut self, v: usize, b: usize) {
        self.assignment[v] = b;
        util::add_assign(&mut self.balance[b], &self.p.vertex_weights[v]);
        for &e in &self.incident[v] {
            if self.counts[e][b] == 0 {
                self.span[e] += 1;
                if self.span[e] == 2 {
                    self.cost += self.p.hyperedge_weights[e];
                }
            }
            self.counts[e][b] += 1;
        }
    }

    fn unassign(&mut self, v: usize, b: usize, balance: Vec<f32>, cost: f32) {
        self.assignment[v] = UNASSIGNED;
        self.balance[b] = balance;
        for &e in &self.incident[v] {
            self.counts[e][b] -= 1;
            if self.counts[e][b] == 0 {
                self.span[e] -= 1;
            }
        }
        self.cost = cost;
    }

    fn dfs(&mut self, depth: usize) {
        if self.nodes >= self.budget {
            return;
        }
        self.nodes += 1;
        if self.best.as_ref().is_some_and(|(best, _)| self.cost >= *best) {
            return;
        }
        let p = self.p;
        if depth == self.order.len() {
            let balanced = (0..p.num_parts).all(|b| util::all_le(&p.lower[b], &self.balance[b]));
            if balanced {
                self.best = Some((self.cost, self.assignment.clone()));
            }
            return;
        }
        if !self.lower_reachable(depth) {
            return;
        }

        let v = self.order[depth];
        let w = &p.vertex_weights[v];
        for b in self.candidates(v) {
            if !util::all_le(&util::add(&self.balance[b], w), &p.upper[b]) {
                continue;
            }
            let saved_balance = self.balance[b].clone();
            let saved_cost = self.cost;
            let saved_opened = self.opened;
            if b == self.opened {
                self.opened += 1;
            }
            self.assign(v, b);
            self.dfs(depth + 1);
            self.unassign(v, b, saved_balance, saved_cost);
            self.opened = saved_opened;
        }
    }
}
