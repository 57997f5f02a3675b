//! Multilevel coarsening.
//!
//! [`Coarsener::lazy_first_choice`] builds a sequence of progressively smaller hypergraphs. Each
//! level is one round of first-choice vertex matching followed by contraction. Clusters keep a
//! reverse map to the vertices of the level below, so assignments can be projected back.
//!
//! [`Coarsener::group_vertices`] contracts a caller-supplied grouping instead of a matching. It
//! is used to glue fixed vertices together and for cut-overlay clustering.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use clap::ValueEnum;
use log::debug;

use crate::defs::*;
use crate::evaluator::Evaluator;
use crate::hypergraph::Hypergraph;
use crate::util::{self, Matrix};

/// Order in which vertices are visited by the matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CoarsenOrder {
    #[default]
    Random,
    /// insertion order
    Default,
    /// ascending weight norm
    Size,
    /// descending number of neighbors
    Degree,
}

impl fmt::Display for CoarsenOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoarsenOrder::Random => "RANDOM",
            CoarsenOrder::Default => "DEFAULT",
            CoarsenOrder::Size => "SIZE",
            CoarsenOrder::Degree => "DEGREE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoarsenParams {
    /// hyperedges larger than this are ignored while coarsening
    pub thr_coarsen_hyperedge_size_skip: usize,
    pub thr_coarsen_vertices: usize,
    pub thr_coarsen_hyperedges: usize,
    pub coarsening_ratio: f32,
    pub max_coarsen_iters: usize,
    /// stop once a level shrinks by less than this fraction
    pub adj_diff_ratio: f32,
    /// no cluster may outweigh this in any dimension; empty means no cap
    pub thr_cluster_weight: Vec<f32>,
    pub vertex_order: CoarsenOrder,
}

impl Default for CoarsenParams {
    fn default() -> Self {
        Self {
            thr_coarsen_hyperedge_size_skip: DEFAULT_THR_COARSEN_HYPEREDGE_SIZE_SKIP,
            thr_coarsen_vertices: DEFAULT_THR_COARSEN_VERTICES,
            thr_coarsen_hyperedges: DEFAULT_THR_COARSEN_HYPEREDGES,
            coarsening_ratio: DEFAULT_COARSENING_RATIO,
            max_coarsen_iters: DEFAULT_MAX_COARSEN_ITERS,
            adj_diff_ratio: DEFAULT_ADJ_DIFF_RATIO,
            thr_cluster_weight: Vec::new(),
            vertex_order: CoarsenOrder::default(),
        }
    }
}

const UNCLUSTERED: usize = usize::MAX;

/// A vertex -> cluster map together with the attributes of every cluster
#[derive(Debug, Default)]
struct Clusters {
    cluster_of: Vec<usize>,
    weights: Matrix<f32>,
    /// empty unless the hypergraph has communities
    community: Vec<usize>,
    /// empty unless the hypergraph has fixed vertices
    fixed: Vec<Option<usize>>,
    /// empty unless the hypergraph has placement
    placement: Matrix<f32>,
}

impl Clusters {
    fn new(num_vertices: usize) -> Self {
        Self {
            cluster_of: vec![UNCLUSTERED; num_vertices],
            ..Default::default()
        }
    }

    fn len(&self) -> usize {
        self.weights.len()
    }

    /// open a new cluster holding only `v`
    fn singleton(&mut self, hgraph: &Hypergraph, v: usize) -> usize {
        let id = self.weights.len();
        self.cluster_of[v] = id;
        self.weights.push(hgraph.vertex_weights(v).to_vec());
        if hgraph.has_community() {
            self.community.push(hgraph.community(v));
        }
        if hgraph.has_fixed_vertices() {
            self.fixed.push(hgraph.fixed_block(v));
        }
        if hgraph.has_placement() {
            self.placement.push(hgraph.placement(v).to_vec());
        }
        id
    }

    /// add `v` to cluster `c`, moving the cluster location to the weighted average
    fn join(&mut self, hgraph: &Hypergraph, evaluator: &Evaluator, v: usize, c: usize) {
        self.cluster_of[v] = c;
        if hgraph.has_placement() {
            self.placement[c] = evaluator.avg_placement_loc(
                &self.weights[c],
                hgraph.vertex_weights(v),
                &self.placement[c],
                hgraph.placement(v),
            );
        }
        util::add_assign(&mut self.weights[c], hgraph.vertex_weights(v));
    }
}

fn find_root(parent: &mut [usize], mut v: usize) -> usize {
    while parent[v] != v {
        parent[v] = parent[parent[v]];
        v = parent[v];
    }
    v
}

#[derive(Debug, Clone)]
pub struct Coarsener {
    params: CoarsenParams,
    evaluator: Arc<Evaluator>,
    seed: u64,
}

impl Coarsener {
    pub fn new(params: CoarsenParams, evaluator: Arc<Evaluator>, seed: u64) -> Self {
        Self {
            params,
            evaluator,
            seed,
        }
    }

    pub fn params(&self) -> &CoarsenParams {
        &self.params
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// next seed, so the next hierarchy is built from a different vertex order
    pub fn increase_random_seed(&mut self) {
        self.seed = self.seed.wrapping_add(1);
    }

    pub fn set_thr_coarsen_hyperedge_size_skip(&mut self, thr: usize) {
        self.params.thr_coarsen_hyperedge_size_skip = thr;
    }

    /// Coarser and coarser versions of `hgraph`, the first built directly from it. The input
    /// itself is not part of the result.
    pub fn lazy_first_choice(&self, hgraph: &Hypergraph) -> Vec<Hypergraph> {
        debug!(
            "coarsening ({} order): level 0 :: num_vertices = {}, num_hyperedges = {}, num_timing_paths = {}",
            self.params.vertex_order,
            hgraph.num_vertices(),
            hgraph.num_hyperedges(),
            hgraph.num_timing_paths()
        );

        let mut hierarchy: Vec<Hypergraph> = Vec::new();
        for iter in 0..self.params.max_coarsen_iters {
            let prev = hierarchy.last().unwrap_or(hgraph);
            let coarse = self.aggregate(prev);
            let num_prev = prev.num_vertices();
            let num_cur = coarse.num_vertices();
            if num_prev == num_cur {
                break;
            }

            debug!(
                "level {} :: num_vertices = {}, num_hyperedges = {}, num_timing_paths = {}",
                iter + 1,
                coarse.num_vertices(),
                coarse.num_hyperedges(),
                coarse.num_timing_paths()
            );
            let done = coarse.num_vertices() <= self.params.thr_coarsen_vertices
                || coarse.num_hyperedges() <= self.params.thr_coarsen_hyperedges
                || ((num_prev - num_cur) as f32) <= num_prev as f32 * self.params.adj_diff_ratio;
            hierarchy.push(coarse);
            if done {
                break;
            }
        }
        hierarchy
    }

    /// one level of coarsening
    pub fn aggregate(&self, hgraph: &Hypergraph) -> Hypergraph {
        let clusters = self.vertex_matching(hgraph);
        self.contraction(hgraph, clusters)
    }

    /// Contract `groups` (and every set of vertices fixed to the same block) into single
    /// vertices. Groups that share a vertex are merged.
    pub fn group_vertices(&self, hgraph: &Hypergraph, groups: &[Vec<usize>]) -> Hypergraph {
        let clusters = self.cluster_groups(hgraph, groups);
        self.contraction(hgraph, clusters)
    }

    fn order_vertices(&self, hgraph: &Hypergraph, vertices: &mut [usize]) {
        match self.params.vertex_order {
            CoarsenOrder::Random => {
                fastrand::Rng::with_seed(self.seed).shuffle(vertices);
            }
            CoarsenOrder::Default => {}
            CoarsenOrder::Size => {
                vertices.sort_by(|&a, &b| {
                    let wa = self.evaluator.vertex_weight_norm(hgraph, a);
                    let wb = self.evaluator.vertex_weight_norm(hgraph, b);
                    wa.total_cmp(&wb)
                });
            }
            CoarsenOrder::Degree => {
                let mut degree = vec![0; hgraph.num_vertices()];
                let mut mark = vec![usize::MAX; hgraph.num_vertices()];
                for &v in vertices.iter() {
                    for &e in hgraph.edges(v) {
                        for &u in hgraph.vertices(e) {
                            if u != v && mark[u] != v {
                                mark[u] = v;
                                degree[v] += 1;
                            }
                        }
                    }
                }
                vertices.sort_by(|&a, &b| degree[b].cmp(&degree[a]));
            }
        }
    }

    fn exceeds_cluster_weight(&self, weight: &[f32]) -> bool {
        !self.params.thr_cluster_weight.is_empty()
            && !util::all_le(weight, &self.params.thr_cluster_weight)
    }

    /// First-choice matching: every free vertex joins the neighbor it is most strongly
    /// connected to, either as a new pair or by joining the neighbor's cluster.
    fn vertex_matching(&self, hgraph: &Hypergraph) -> Clusters {
        let n = hgraph.num_vertices();
        let ev = &*self.evaluator;
        let mut clusters = Clusters::new(n);

        let mut unvisited = Vec::with_capacity(n);
        for v in 0..n {
            if hgraph.fixed_block(v).is_some() {
                clusters.singleton(hgraph, v);
            } else {
                unvisited.push(v);
            }
        }
        self.order_vertices(hgraph, &mut unvisited);

        let early_stop = (unvisited.len() as f32 / self.params.coarsening_ratio) as usize;
        let mut visited = n - unvisited.len();
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for (pos, &v) in unvisited.iter().enumerate() {
            if clusters.cluster_of[v] != UNCLUSTERED {
                continue;
            }

            scores.clear();
            for &e in hgraph.edges(v) {
                let size = hgraph.vertices(e).len();
                if size <= 1 || size > self.params.thr_coarsen_hyperedge_size_skip {
                    continue;
                }
                let score = ev.norm_edge_score(hgraph, e);
                for &u in hgraph.vertices(e) {
                    if u == v {
                        continue;
                    }
                    if let Some(s) = scores.get_mut(&u) {
                        *s += score;
                        continue;
                    }
                    if hgraph.fixed_block(u).is_some()
                        || (hgraph.has_community() && hgraph.community(u) != hgraph.community(v))
                    {
                        continue;
                    }
                    let u_weight = match clusters.cluster_of[u] {
                        UNCLUSTERED => hgraph.vertex_weights(u),
                        c => clusters.weights[c].as_slice(),
                    };
                    if self.exceeds_cluster_weight(&util::add(hgraph.vertex_weights(v), u_weight)) {
                        continue;
                    }
                    scores.insert(u, score);
                }
            }

            if scores.is_empty() {
                visited += 1;
                clusters.singleton(hgraph, v);
                continue;
            }

            if hgraph.num_timing_paths() > 0 {
                for &p in hgraph.timing_paths_through(v) {
                    let path_score = ev.path_timing_score(hgraph, p);
                    let path = hgraph.path_vertices(p);
                    for (i, _) in path.iter().enumerate().filter(|&(_, &x)| x == v) {
                        let left = i.checked_sub(1).map(|j| path[j]);
                        let right = path.get(i + 1).copied();
                        for u in left.into_iter().chain(right) {
                            if let Some(s) = scores.get_mut(&u) {
                                *s += path_score;
                            }
                        }
                    }
                }
            }
            if hgraph.has_placement() {
                for (&u, s) in scores.iter_mut() {
                    *s += ev.placement_score(hgraph, v, u);
                }
            }

            // ascending ids keep the choice independent of hash order
            let mut candidates: Vec<(usize, f32)> = scores.iter().map(|(&u, &s)| (u, s)).collect();
            candidates.sort_unstable_by_key(|&(u, _)| u);
            let mut best: Option<(usize, f32)> = None;
            for (u, s) in candidates {
                match best {
                    Some((_, bs)) if s < bs => {}
                    Some((_, bs)) if s == bs && clusters.cluster_of[u] != UNCLUSTERED => {}
                    _ => best = Some((u, s)),
                }
            }
            let Some((u, _)) = best else {
                visited += 1;
                clusters.singleton(hgraph, v);
                continue;
            };

            match clusters.cluster_of[u] {
                UNCLUSTERED => {
                    visited += 2;
                    let c = clusters.singleton(hgraph, u);
                    if hgraph.has_community() {
                        clusters.community[c] = hgraph.community(v);
                    }
                    clusters.join(hgraph, ev, v, c);
                }
                c => {
                    visited += 1;
                    clusters.join(hgraph, ev, v, c);
                }
            }

            let remaining = n + clusters.len() - visited;
            if remaining <= early_stop {
                for &w in &unvisited[pos + 1..] {
                    if clusters.cluster_of[w] == UNCLUSTERED {
                        clusters.singleton(hgraph, w);
                    }
                }
                break;
            }
        }
        clusters
    }

    fn cluster_groups(&self, hgraph: &Hypergraph, groups: &[Vec<usize>]) -> Clusters {
        let n = hgraph.num_vertices();
        let k = self.evaluator.num_parts();

        let mut fixed_groups: Vec<Vec<usize>> = vec![Vec::new(); k];
        for v in 0..n {
            if let Some(b) = hgraph.fixed_block(v) {
                if b < k {
                    fixed_groups[b].push(v);
                }
            }
        }
        let all_groups: Vec<&[usize]> = fixed_groups
            .iter()
            .chain(groups)
            .filter(|g| !g.is_empty())
            .map(Vec::as_slice)
            .collect();

        let mut parent: Vec<usize> = (0..n).collect();
        for group in &all_groups {
            let mut members = group.iter().copied().filter(|&v| v < n);
            let Some(first) = members.next() else {
                continue;
            };
            let root = find_root(&mut parent, first);
            for v in members {
                let r = find_root(&mut parent, v);
                if r != root {
                    parent[r] = root;
                }
            }
        }

        // dense ids: groups in the order given, then the remaining vertices
        let mut root_cluster = vec![UNCLUSTERED; n];
        let mut cluster_of = vec![UNCLUSTERED; n];
        let mut next = 0;
        let order = all_groups
            .iter()
            .flat_map(|g| g.iter().copied().filter(|&v| v < n))
            .chain(0..n);
        for v in order {
            if cluster_of[v] != UNCLUSTERED {
                continue;
            }
            let r = find_root(&mut parent, v);
            if root_cluster[r] == UNCLUSTERED {
                root_cluster[r] = next;
                next += 1;
            }
            cluster_of[v] = root_cluster[r];
        }

        let mut clusters = Clusters::new(n);
        clusters.weights = vec![vec![0.0; hgraph.vertex_dimensions()]; next];
        if hgraph.has_community() {
            clusters.community = vec![0; next];
        }
        if hgraph.has_fixed_vertices() {
            clusters.fixed = vec![None; next];
        }
        if hgraph.has_placement() {
            clusters.placement = vec![vec![0.0; hgraph.placement_dimensions()]; next];
        }
        for v in 0..n {
            let c = cluster_of[v];
            if hgraph.has_community() {
                clusters.community[c] = clusters.community[c].max(hgraph.community(v));
            }
            if hgraph.has_fixed_vertices() {
                clusters.fixed[c] = clusters.fixed[c].max(hgraph.fixed_block(v));
            }
            clusters.join(hgraph, &self.evaluator, v, c);
        }
        clusters
    }

    /// Build the hypergraph induced by `clusters`. Hyperedges that collapse to one cluster are
    /// dropped and parallel hyperedges are merged: weights add up, slack takes the minimum and
    /// arc sets are united. Timing paths are collapsed and merged the same way.
    fn contraction(&self, hgraph: &Hypergraph, clusters: Clusters) -> Hypergraph {
        let Clusters {
            cluster_of,
            weights,
            community,
            fixed,
            placement,
        } = clusters;
        debug_assert!(cluster_of.iter().all(|&c| c != UNCLUSTERED));
        let num_clusters = weights.len();
        let timing = hgraph.has_timing();

        let mut edge_cluster: Vec<Option<usize>> = vec![None; hgraph.num_hyperedges()];
        let mut hyperedges_c: Vec<Vec<usize>> = Vec::new();
        let mut weights_c: Matrix<f32> = Vec::new();
        let mut slack_c: Vec<f32> = Vec::new();
        let mut arcs_c: Vec<Vec<usize>> = Vec::new();
        let mut by_hash: HashMap<usize, Vec<usize>> = HashMap::new();

        for e in 0..hgraph.num_hyperedges() {
            let size = hgraph.vertices(e).len();
            if size <= 1 || size > self.params.thr_coarsen_hyperedge_size_skip {
                continue;
            }
            let mut he: Vec<usize> = hgraph.vertices(e).iter().map(|&v| cluster_of[v]).collect();
            he.sort_unstable();
            he.dedup();
            if he.len() <= 1 {
                continue;
            }

            let hash = he.iter().fold(0usize, |acc, &c| acc.wrapping_add(c.wrapping_mul(c)));
            let same = by_hash.entry(hash).or_default();
            match same.iter().copied().find(|&id| hyperedges_c[id] == he) {
                Some(id) => {
                    edge_cluster[e] = Some(id);
                    util::add_assign(&mut weights_c[id], hgraph.hyperedge_weights(e));
                    if timing {
                        slack_c[id] = slack_c[id].min(hgraph.hyperedge_slack(e));
                        for &arc in hgraph.hyperedge_arc_set(e) {
                            if !arcs_c[id].contains(&arc) {
                                arcs_c[id].push(arc);
                            }
                        }
                    }
                }
                None => {
                    let id = hyperedges_c.len();
                    same.push(id);
                    edge_cluster[e] = Some(id);
                    hyperedges_c.push(he);
                    weights_c.push(hgraph.hyperedge_weights(e).to_vec());
                    if timing {
                        slack_c.push(hgraph.hyperedge_slack(e));
                        arcs_c.push(hgraph.hyperedge_arc_set(e).to_vec());
                    }
                }
            }
        }

        let mut path_vertices: Vec<Vec<usize>> = Vec::new();
        let mut path_edges: Vec<Vec<usize>> = Vec::new();
        let mut path_slack: Vec<f32> = Vec::new();
        if timing {
            let mut by_hash: HashMap<usize, Vec<usize>> = HashMap::new();
            for p in 0..hgraph.num_timing_paths() {
                if hgraph.path_vertices(p).len() <= 1 {
                    continue;
                }
                let mut path: Vec<usize> = Vec::new();
                for &v in hgraph.path_vertices(p) {
                    if path.last() != Some(&cluster_of[v]) {
                        path.push(cluster_of[v]);
                    }
                }
                if path.len() <= 1 {
                    continue;
                }

                let hash = path.iter().fold(0usize, |acc, &c| acc.wrapping_add(c.wrapping_mul(c)));
                let same = by_hash.entry(hash).or_default();
                match same.iter().copied().find(|&id| path_vertices[id] == path) {
                    Some(id) => path_slack[id] = path_slack[id].min(hgraph.path_timing_slack(p)),
                    None => {
                        let mut arcs: Vec<usize> = Vec::new();
                        for &e in hgraph.path_edges(p) {
                            if let Some(ec) = edge_cluster[e] {
                                if arcs.last() != Some(&ec) {
                                    arcs.push(ec);
                                }
                            }
                        }
                        same.push(path_vertices.len());
                        path_vertices.push(path);
                        path_edges.push(arcs);
                        path_slack.push(hgraph.path_timing_slack(p));
                    }
                }
            }
        }

        let mut vertex_c_attr = vec![Vec::new(); num_clusters];
        for (v, &c) in cluster_of.iter().enumerate() {
            vertex_c_attr[c].push(v);
        }

        let mut coarse = Hypergraph::from_parts(
            hgraph.vertex_dimensions(),
            hgraph.hyperedge_dimensions(),
            hyperedges_c,
            weights,
            weights_c,
        );
        let placement_dimensions = if placement.is_empty() {
            0
        } else {
            hgraph.placement_dimensions()
        };
        coarse.set_cluster_attrs(fixed, community, placement_dimensions, placement, vertex_c_attr);
        if timing {
            coarse.set_timing_parts(slack_c, arcs_c, path_vertices, path_edges, path_slack);
            self.evaluator.initialize_timing(&mut coarse);
        }
        coarse
    }
}
