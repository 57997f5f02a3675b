//! The hypergraph store.
//!
//! Vertices and hyperedges are dense indices. Incidence is kept in CSR form in both directions
//! (`eptr/eind` for hyperedge -> vertices, `vptr/vind` for vertex -> hyperedges). Timing paths are
//! kept the same way (`vptr_p/vind_p` for the vertices on a path, `eptr_p/eind_p` for the
//! hyperedges it traverses, `pptr_v/pind_v` for the paths through each vertex).
//!
//! A hypergraph is immutable once built, except for the derived timing fields that the
//! [`Evaluator`](crate::evaluator::Evaluator) writes and the community attribute that the
//! V-cycle seeds.

use crate::error::{Error, Result};
use crate::util::{self, Matrix};

/// Cell kind of a vertex. Timing propagation only walks through combinational cells.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum VertexType {
    #[default]
    Combinational,
    Sequential,
    Macro,
    Port,
}

/// a timing path through the design
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TimingPath {
    pub vertices: Vec<usize>,
    pub hyperedges: Vec<usize>,
    pub slack: f32,
}

/// Timing annotations supplied alongside the netlist
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TimingData {
    /// slack of every hyperedge
    pub hyperedge_slack: Vec<f32>,
    /// for every hyperedge, the arcs of the timing graph it stands for
    pub hyperedge_arc_set: Vec<Vec<usize>>,
    pub paths: Vec<TimingPath>,
}

#[derive(Debug, Clone)]
pub struct Hypergraph {
    vertex_dimensions: usize,
    hyperedge_dimensions: usize,
    placement_dimensions: usize,

    num_vertices: usize,
    num_hyperedges: usize,

    eptr: Vec<usize>,
    eind: Vec<usize>,
    vptr: Vec<usize>,
    vind: Vec<usize>,

    vertex_weights: Matrix<f32>,
    hyperedge_weights: Matrix<f32>,

    // the following attributes are empty when absent
    fixed_attr: Vec<Option<usize>>,
    community_attr: Vec<usize>,
    placement_attr: Matrix<f32>,
    vertex_types: Vec<VertexType>,

    // timing
    timing: bool,
    hyperedge_slack: Vec<f32>,
    hyperedge_arc_set: Vec<Vec<usize>>,
    hyperedge_timing_cost: Vec<f32>,
    num_timing_paths: usize,
    vptr_p: Vec<usize>,
    vind_p: Vec<usize>,
    eptr_p: Vec<usize>,
    eind_p: Vec<usize>,
    path_slack: Vec<f32>,
    path_timing_cost: Vec<f32>,
    pptr_v: Vec<usize>,
    pind_v: Vec<usize>,

    /// for a clustered hypergraph: cluster id -> vertices of the finer hypergraph
    vertex_c_attr: Vec<Vec<usize>>,
}

fn flatten(rows: &[Vec<usize>]) -> (Vec<usize>, Vec<usize>) {
    let mut ptr = Vec::with_capacity(rows.len() + 1);
    let mut ind = Vec::with_capacity(rows.iter().map(Vec::len).sum());
    ptr.push(0);
    for row in rows {
        ind.extend_from_slice(row);
        ptr.push(ind.len());
    }
    (ptr, ind)
}

fn check_rows(what: &str, rows: &Matrix<f32>, n: usize, dims: usize) -> Result<()> {
    if rows.len() != n {
        return Err(Error::InvalidInput(format!(
            "expected {n} {what} rows, got {}",
            rows.len()
        )));
    }
    if let Some(i) = rows.iter().position(|r| r.len() != dims) {
        return Err(Error::InvalidInput(format!(
            "{what} row {i} has {} entries, expected {dims}",
            rows[i].len()
        )));
    }
    Ok(())
}

impl Hypergraph {
    /// Builds a hypergraph without optional attributes. Repeated vertices inside a hyperedge are
    /// dropped, keeping the first occurrence.
    pub fn new(
        vertex_dimensions: usize,
        hyperedge_dimensions: usize,
        hyperedges: Vec<Vec<usize>>,
        vertex_weights: Matrix<f32>,
        hyperedge_weights: Matrix<f32>,
    ) -> Result<Self> {
        let num_vertices = vertex_weights.len();
        let num_hyperedges = hyperedges.len();
        check_rows("vertex weight", &vertex_weights, num_vertices, vertex_dimensions)?;
        check_rows(
            "hyperedge weight",
            &hyperedge_weights,
            num_hyperedges,
            hyperedge_dimensions,
        )?;

        let mut seen = vec![usize::MAX; num_vertices];
        let mut rows = Vec::with_capacity(num_hyperedges);
        for (e, he) in hyperedges.into_iter().enumerate() {
            let mut row = Vec::with_capacity(he.len());
            for v in he {
                if v >= num_vertices {
                    return Err(Error::InvalidInput(format!(
                        "hyperedge {e} references vertex {v}, but there are only {num_vertices}"
                    )));
                }
                if seen[v] != e {
                    seen[v] = e;
                    row.push(v);
                }
            }
            rows.push(row);
        }

        Ok(Self::from_parts(
            vertex_dimensions,
            hyperedge_dimensions,
            rows,
            vertex_weights,
            hyperedge_weights,
        ))
    }

    /// Build from rows that are already validated. Used by contraction.
    pub(crate) fn from_parts(
        vertex_dimensions: usize,
        hyperedge_dimensions: usize,
        hyperedges: Vec<Vec<usize>>,
        vertex_weights: Matrix<f32>,
        hyperedge_weights: Matrix<f32>,
    ) -> Self {
        let num_vertices = vertex_weights.len();
        let num_hyperedges = hyperedges.len();
        let (eptr, eind) = flatten(&hyperedges);
        let (vptr, vind) = util::transpose_csr(&eptr, &eind, num_vertices);

        Self {
            vertex_dimensions,
            hyperedge_dimensions,
            placement_dimensions: 0,
            num_vertices,
            num_hyperedges,
            eptr,
            eind,
            vptr,
            vind,
            vertex_weights,
            hyperedge_weights,
            fixed_attr: Vec::new(),
            community_attr: Vec::new(),
            placement_attr: Vec::new(),
            vertex_types: Vec::new(),
            timing: false,
            hyperedge_slack: Vec::new(),
            hyperedge_arc_set: Vec::new(),
            hyperedge_timing_cost: Vec::new(),
            num_timing_paths: 0,
            vptr_p: vec![0],
            vind_p: Vec::new(),
            eptr_p: vec![0],
            eind_p: Vec::new(),
            path_slack: Vec::new(),
            path_timing_cost: Vec::new(),
            pptr_v: vec![0; num_vertices + 1],
            pind_v: Vec::new(),
            vertex_c_attr: Vec::new(),
        }
    }

    /// unweighted hypergraph: every vertex and hyperedge weighs 1
    pub fn unweighted(num_vertices: usize, hyperedges: Vec<Vec<usize>>) -> Result<Self> {
        let num_hyperedges = hyperedges.len();
        Self::new(
            1,
            1,
            hyperedges,
            vec![vec![1.0]; num_vertices],
            vec![vec![1.0]; num_hyperedges],
        )
    }

    /// block id per vertex, `None` for free vertices
    pub fn with_fixed(mut self, fixed: Vec<Option<usize>>) -> Result<Self> {
        if fixed.len() != self.num_vertices {
            return Err(Error::InvalidInput(format!(
                "fixed attribute has {} entries for {} vertices",
                fixed.len(),
                self.num_vertices
            )));
        }
        self.fixed_attr = if fixed.iter().any(Option::is_some) {
            fixed
        } else {
            Vec::new()
        };
        Ok(self)
    }

    pub fn with_community(mut self, community: Vec<usize>) -> Result<Self> {
        if community.len() != self.num_vertices {
            return Err(Error::InvalidInput(format!(
                "community attribute has {} entries for {} vertices",
                community.len(),
                self.num_vertices
            )));
        }
        self.community_attr = community;
        Ok(self)
    }

    pub fn with_placement(mut self, dimensions: usize, placement: Matrix<f32>) -> Result<Self> {
        check_rows("placement", &placement, self.num_vertices, dimensions)?;
        self.placement_dimensions = dimensions;
        self.placement_attr = placement;
        Ok(self)
    }

    pub fn with_vertex_types(mut self, types: Vec<VertexType>) -> Result<Self> {
        if types.len() != self.num_vertices {
            return Err(Error::InvalidInput(format!(
                "vertex types have {} entries for {} vertices",
                types.len(),
                self.num_vertices
            )));
        }
        self.vertex_types = types;
        Ok(self)
    }

    /// Attach timing data. Costs stay zero until the evaluator initializes them.
    pub fn with_timing(mut self, timing: TimingData) -> Result<Self> {
        if timing.hyperedge_slack.len() != self.num_hyperedges {
            return Err(Error::InvalidInput(format!(
                "hyperedge slack has {} entries for {} hyperedges",
                timing.hyperedge_slack.len(),
                self.num_hyperedges
            )));
        }
        let arc_set = if timing.hyperedge_arc_set.is_empty() {
            vec![Vec::new(); self.num_hyperedges]
        } else if timing.hyperedge_arc_set.len() == self.num_hyperedges {
            timing.hyperedge_arc_set
        } else {
            return Err(Error::InvalidInput(format!(
                "hyperedge arc set has {} entries for {} hyperedges",
                timing.hyperedge_arc_set.len(),
                self.num_hyperedges
            )));
        };
        for (p, path) in timing.paths.iter().enumerate() {
            if path.vertices.iter().any(|&v| v >= self.num_vertices)
                || path.hyperedges.iter().any(|&e| e >= self.num_hyperedges)
            {
                return Err(Error::InvalidInput(format!(
                    "timing path {p} references an unknown vertex or hyperedge"
                )));
            }
        }

        let (vertices, hyperedges): (Vec<_>, Vec<_>) = timing
            .paths
            .iter()
            .map(|p| (p.vertices.clone(), p.hyperedges.clone()))
            .unzip();
        let slack = timing.paths.iter().map(|p| p.slack).collect();
        self.set_timing_parts(timing.hyperedge_slack, arc_set, vertices, hyperedges, slack);
        Ok(self)
    }

    pub(crate) fn set_timing_parts(
        &mut self,
        hyperedge_slack: Vec<f32>,
        hyperedge_arc_set: Vec<Vec<usize>>,
        path_vertices: Vec<Vec<usize>>,
        path_edges: Vec<Vec<usize>>,
        path_slack: Vec<f32>,
    ) {
        self.timing = true;
        self.hyperedge_timing_cost = vec![0.0; self.num_hyperedges];
        self.hyperedge_slack = hyperedge_slack;
        self.hyperedge_arc_set = hyperedge_arc_set;
        self.num_timing_paths = path_vertices.len();
        (self.vptr_p, self.vind_p) = flatten(&path_vertices);
        (self.eptr_p, self.eind_p) = flatten(&path_edges);
        // a contracted path may pass through the same cluster twice; list it once
        let (pptr, pind) = util::transpose_csr(&self.vptr_p, &self.vind_p, self.num_vertices);
        (self.pptr_v, self.pind_v) = util::dedup_csr_rows(&pptr, &pind);
        self.path_timing_cost = vec![0.0; self.num_timing_paths];
        self.path_slack = path_slack;
    }

    pub(crate) fn set_cluster_attrs(
        &mut self,
        fixed: Vec<Option<usize>>,
        community: Vec<usize>,
        placement_dimensions: usize,
        placement: Matrix<f32>,
        vertex_c_attr: Vec<Vec<usize>>,
    ) {
        self.fixed_attr = if fixed.iter().any(Option::is_some) {
            fixed
        } else {
            Vec::new()
        };
        self.community_attr = community;
        self.placement_dimensions = placement_dimensions;
        self.placement_attr = placement;
        self.vertex_c_attr = vertex_c_attr;
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_hyperedges(&self) -> usize {
        self.num_hyperedges
    }

    pub fn vertex_dimensions(&self) -> usize {
        self.vertex_dimensions
    }

    pub fn hyperedge_dimensions(&self) -> usize {
        self.hyperedge_dimensions
    }

    pub fn placement_dimensions(&self) -> usize {
        self.placement_dimensions
    }

    /// hyperedges incident to `v`
    #[inline]
    pub fn edges(&self, v: usize) -> &[usize] {
        &self.vind[self.vptr[v]..self.vptr[v + 1]]
    }

    /// vertices of hyperedge `e`
    #[inline]
    pub fn vertices(&self, e: usize) -> &[usize] {
        &self.eind[self.eptr[e]..self.eptr[e + 1]]
    }

    #[inline]
    pub fn vertex_weights(&self, v: usize) -> &[f32] {
        &self.vertex_weights[v]
    }

    pub fn all_vertex_weights(&self) -> &Matrix<f32> {
        &self.vertex_weights
    }

    #[inline]
    pub fn hyperedge_weights(&self, e: usize) -> &[f32] {
        &self.hyperedge_weights[e]
    }

    pub fn all_hyperedge_weights(&self) -> &Matrix<f32> {
        &self.hyperedge_weights
    }

    pub fn total_vertex_weights(&self) -> Vec<f32> {
        util::column_sums(&self.vertex_weights, self.vertex_dimensions)
    }

    pub fn has_fixed_vertices(&self) -> bool {
        !self.fixed_attr.is_empty()
    }

    #[inline]
    pub fn fixed_block(&self, v: usize) -> Option<usize> {
        self.fixed_attr.get(v).copied().flatten()
    }

    pub fn fixed_attr(&self) -> &[Option<usize>] {
        &self.fixed_attr
    }

    pub fn has_community(&self) -> bool {
        !self.community_attr.is_empty()
    }

    #[inline]
    pub fn community(&self, v: usize) -> usize {
        self.community_attr.get(v).copied().unwrap_or(0)
    }

    pub fn community_attr(&self) -> &[usize] {
        &self.community_attr
    }

    /// Replace the community attribute, returning the old one. An empty vector clears it.
    pub fn set_community(&mut self, community: Vec<usize>) -> Vec<usize> {
        debug_assert!(community.is_empty() || community.len() == self.num_vertices);
        std::mem::replace(&mut self.community_attr, community)
    }

    pub fn has_placement(&self) -> bool {
        self.placement_dimensions > 0 && !self.placement_attr.is_empty()
    }

    #[inline]
    pub fn placement(&self, v: usize) -> &[f32] {
        &self.placement_attr[v]
    }

    #[inline]
    pub fn vertex_type(&self, v: usize) -> VertexType {
        self.vertex_types.get(v).copied().unwrap_or_default()
    }

    pub fn has_timing(&self) -> bool {
        self.timing
    }

    pub fn num_timing_paths(&self) -> usize {
        self.num_timing_paths
    }

    #[inline]
    pub fn path_vertices(&self, p: usize) -> &[usize] {
        &self.vind_p[self.vptr_p[p]..self.vptr_p[p + 1]]
    }

    #[inline]
    pub fn path_edges(&self, p: usize) -> &[usize] {
        &self.eind_p[self.eptr_p[p]..self.eptr_p[p + 1]]
    }

    #[inline]
    pub fn path_timing_slack(&self, p: usize) -> f32 {
        self.path_slack[p]
    }

    #[inline]
    pub fn path_timing_cost(&self, p: usize) -> f32 {
        self.path_timing_cost[p]
    }

    /// timing paths that go through `v`
    #[inline]
    pub fn timing_paths_through(&self, v: usize) -> &[usize] {
        &self.pind_v[self.pptr_v[v]..self.pptr_v[v + 1]]
    }

    #[inline]
    pub fn hyperedge_slack(&self, e: usize) -> f32 {
        self.hyperedge_slack[e]
    }

    pub fn hyperedge_slacks(&self) -> &[f32] {
        &self.hyperedge_slack
    }

    #[inline]
    pub fn hyperedge_arc_set(&self, e: usize) -> &[usize] {
        self.hyperedge_arc_set.get(e).map_or(&[], Vec::as_slice)
    }

    #[inline]
    pub fn hyperedge_timing_cost(&self, e: usize) -> f32 {
        self.hyperedge_timing_cost.get(e).copied().unwrap_or(0.0)
    }

    pub(crate) fn set_path_timing_cost(&mut self, costs: Vec<f32>) {
        debug_assert_eq!(costs.len(), self.num_timing_paths);
        self.path_timing_cost = costs;
    }

    pub(crate) fn set_hyperedge_timing_cost(&mut self, costs: Vec<f32>) {
        debug_assert_eq!(costs.len(), self.num_hyperedges);
        self.hyperedge_timing_cost = costs;
    }

    pub(crate) fn set_hyperedge_slack(&mut self, slack: Vec<f32>) {
        self.hyperedge_slack = slack;
    }

    pub(crate) fn set_path_slack(&mut self, slack: Vec<f32>) {
        self.path_slack = slack;
    }

    /// vertices of the finer hypergraph that make up cluster `c`
    #[inline]
    pub fn vertex_c_attr(&self, c: usize) -> &[usize] {
        &self.vertex_c_attr[c]
    }

    pub fn is_clustered(&self) -> bool {
        !self.vertex_c_attr.is_empty()
    }

    /// Project an assignment on this (clustered) hypergraph to the finer hypergraph it was built
    /// from.
    pub fn project(&self, solution: &[usize], num_fine_vertices: usize) -> Vec<usize> {
        let mut fine = vec![0; num_fine_vertices];
        for (c, &block) in solution.iter().enumerate() {
            for &v in self.vertex_c_attr(c) {
                fine[v] = block;
            }
        }
        fine
    }

    /// Per-block upper bound: `total * (base_balance[b] + ub_factor / 100)`.
    pub fn upper_vertex_balance(
        &self,
        num_parts: usize,
        ub_factor: f32,
        base_balance: &[f32],
    ) -> Matrix<f32> {
        let total = self.total_vertex_weights();
        let ub = ub_factor * 0.01;
        (0..num_parts)
            .map(|b| util::scale(&total, base_balance[b] + ub))
            .collect()
    }

    /// Per-block lower bound: `total * max(0, base_balance[b] - ub_factor / 100)`.
    pub fn lower_vertex_balance(
        &self,
        num_parts: usize,
        ub_factor: f32,
        base_balance: &[f32],
    ) -> Matrix<f32> {
        let total = self.total_vertex_weights();
        let ub = ub_factor * 0.01;
        (0..num_parts)
            .map(|b| util::scale(&total, (base_balance[b] - ub).max(0.0)))
            .collect()
    }
}
