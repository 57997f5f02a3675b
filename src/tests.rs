#![cfg(test)]

use std::sync::Arc;

use crate::coarsen::{CoarsenParams, Coarsener};
use crate::evaluator::{Evaluator, TimingFactors};
use crate::hypergraph::{Hypergraph, TimingData, TimingPath, VertexType};
use crate::ilp::{BranchAndBound, IlpProblem, IlpSolver};
use crate::initpart::{PartitionType, Partitioner};
use crate::options::Options;
use crate::refine::{PassMemo, RefineState, Refiner, RefinerKind, RefinerParams};
use crate::tritonpart;
use crate::util;
use crate::{greedy, ilprefine, kwayfm, kwaypm};

/// Hypergraph with `n` unit vertices and `m` hyperedges of 2 to `max_size` vertices. Weights of
/// hyperedges are drawn from 1..=3.
pub(crate) fn random_hgraph(rng: &mut fastrand::Rng, n: usize, m: usize, max_size: usize) -> Hypergraph {
    let mut hyperedges = Vec::with_capacity(m);
    let mut weights = Vec::with_capacity(m);
    for _ in 0..m {
        let size = rng.usize(2..=max_size);
        let he: Vec<usize> = (0..size).map(|_| rng.usize(0..n)).collect();
        hyperedges.push(he);
        weights.push(vec![rng.usize(1..=3) as f32]);
    }
    Hypergraph::new(1, 1, hyperedges, vec![vec![1.0]; n], weights).unwrap()
}

/// Hyperedges `{i, i + 1}` along a path of `n` vertices.
pub(crate) fn path_hgraph(n: usize) -> Hypergraph {
    let hyperedges = (0..n - 1).map(|i| vec![i, i + 1]).collect();
    Hypergraph::unweighted(n, hyperedges).unwrap()
}

fn bounds(hgraph: &Hypergraph, k: usize, ub_factor: f32) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    let base = vec![1.0 / k as f32; k];
    (
        hgraph.upper_vertex_balance(k, ub_factor, &base),
        hgraph.lower_vertex_balance(k, ub_factor, &base),
    )
}

fn random_solution(rng: &mut fastrand::Rng, n: usize, k: usize) -> Vec<usize> {
    (0..n).map(|_| rng.usize(0..k)).collect()
}

/// 4-vertex chain with one timing path over every vertex
fn timing_chain(slack: f32) -> Hypergraph {
    path_hgraph(4)
        .with_timing(TimingData {
            hyperedge_slack: vec![slack; 3],
            hyperedge_arc_set: Vec::new(),
            paths: vec![TimingPath {
                vertices: vec![0, 1, 2, 3],
                hyperedges: vec![0, 1, 2],
                slack,
            }],
        })
        .unwrap()
}

fn timing_evaluator(k: usize) -> Evaluator {
    Evaluator::uniform(k, 1, 1).with_timing_factors(TimingFactors {
        net_timing_factor: 1.0,
        path_timing_factor: 1.0,
        path_snaking_factor: 1.0,
        timing_exp_factor: 2.0,
        extra_delay: 0.1,
    })
}

/// Attach `num_paths` random timing paths of 3 to 6 vertices, with random slacks.
fn with_random_paths(rng: &mut fastrand::Rng, hgraph: Hypergraph, num_paths: usize) -> Hypergraph {
    let n = hgraph.num_vertices();
    let m = hgraph.num_hyperedges();
    let mut paths = Vec::with_capacity(num_paths);
    for _ in 0..num_paths {
        let len = rng.usize(3..=6);
        let vertices: Vec<usize> = (0..len).map(|_| rng.usize(0..n)).collect();
        let hyperedges: Vec<usize> = (0..len - 1).map(|_| rng.usize(0..m)).collect();
        paths.push(TimingPath {
            vertices,
            hyperedges,
            slack: rng.f32() - 0.2,
        });
    }
    let hyperedge_slack = (0..m).map(|_| rng.f32()).collect();
    hgraph
        .with_timing(TimingData {
            hyperedge_slack,
            hyperedge_arc_set: Vec::new(),
            paths,
        })
        .unwrap()
}

/// two triangles joined by hyperedge {2, 3}
fn two_triangles() -> Hypergraph {
    Hypergraph::unweighted(
        6,
        vec![
            vec![0, 1],
            vec![1, 2],
            vec![0, 2],
            vec![3, 4],
            vec![4, 5],
            vec![3, 5],
            vec![2, 3],
        ],
    )
    .unwrap()
}

#[test]
fn gain_matches_cost_difference() {
    let mut rng = fastrand::Rng::with_seed(1);
    let k = 3;
    let hg = random_hgraph(&mut rng, 60, 120, 5);
    let ev = Evaluator::uniform(k, 1, 1);
    let (upper, lower) = bounds(&hg, k, 100.0);
    let mut solution = random_solution(&mut rng, 60, k);
    let mut state = RefineState::new(&hg, &ev, &upper, &lower, &mut solution);

    for _ in 0..200 {
        let v = rng.usize(0..60);
        let from = state.solution[v];
        let to = (from + rng.usize(1..k)) % k;
        let before = ev.cut_evaluator(&hg, state.solution, false).cost;
        let gain = state.vertex_gain(v, from, to);
        state.accept_vertex_gain(&gain);
        let after = ev.cut_evaluator(&hg, state.solution, false).cost;
        assert!(
            (before - after - gain.gain).abs() < 1e-3,
            "gain {} but cost went from {before} to {after}",
            gain.gain
        );
    }
}

#[test]
fn shadow_state_stays_consistent() {
    let mut rng = fastrand::Rng::with_seed(2);
    let k = 4;
    let hg = random_hgraph(&mut rng, 50, 100, 6);
    let ev = Evaluator::uniform(k, 1, 1);
    let (upper, lower) = bounds(&hg, k, 100.0);
    let mut solution = random_solution(&mut rng, 50, k);
    let mut state = RefineState::new(&hg, &ev, &upper, &lower, &mut solution);

    for round in 0..20 {
        let mut moves = Vec::new();
        for _ in 0..rng.usize(1..10) {
            let v = rng.usize(0..50);
            let from = state.solution[v];
            let to = (from + rng.usize(1..k)) % k;
            let gain = state.vertex_gain(v, from, to);
            moves.push(state.accept_vertex_gain(&gain));
        }
        // keep every other round, roll back the rest
        if round % 2 == 1 {
            for mv in moves.into_iter().rev() {
                state.rollback_vertex_gain(mv);
            }
        }
        assert_eq!(state.net_degs, ev.net_degrees(&hg, state.solution));
        let balance = ev.block_balance(&hg, state.solution);
        for (a, b) in state.block_balance.iter().zip(&balance) {
            assert!((a[0] - b[0]).abs() < 1e-4);
        }
    }
}

#[test]
fn rollback_is_exact() {
    let mut rng = fastrand::Rng::with_seed(3);
    let k = 3;
    let hg = random_hgraph(&mut rng, 40, 80, 4);
    let ev = Evaluator::uniform(k, 1, 1);
    let (upper, lower) = bounds(&hg, k, 100.0);
    let mut solution = random_solution(&mut rng, 40, k);
    let initial = solution.clone();
    let mut state = RefineState::new(&hg, &ev, &upper, &lower, &mut solution);
    let net_degs = state.net_degs.clone();
    let balance = state.block_balance.clone();

    let mut moves = Vec::new();
    for _ in 0..100 {
        let v = rng.usize(0..40);
        let from = state.solution[v];
        let to = (from + 1) % k;
        let gain = state.vertex_gain(v, from, to);
        moves.push(state.accept_vertex_gain(&gain));
    }
    for mv in moves.into_iter().rev() {
        state.rollback_vertex_gain(mv);
    }

    assert_eq!(state.net_degs, net_degs);
    assert_eq!(state.block_balance, balance);
    assert_eq!(state.solution, initial.as_slice());
}

#[test]
fn timing_gain_matches_cost_difference() {
    let mut rng = fastrand::Rng::with_seed(10);
    let k = 3;
    let hg = random_hgraph(&mut rng, 50, 100, 5);
    let mut hg = with_random_paths(&mut rng, hg, 30);
    let ev = timing_evaluator(k);
    ev.initialize_timing(&mut hg);
    let (upper, lower) = bounds(&hg, k, 100.0);
    let mut solution = random_solution(&mut rng, 50, k);
    let mut state = RefineState::new(&hg, &ev, &upper, &lower, &mut solution);

    for round in 0..40 {
        let mut moves = Vec::new();
        for _ in 0..rng.usize(1..8) {
            let v = rng.usize(0..50);
            let from = state.solution[v];
            let to = (from + rng.usize(1..k)) % k;
            let before = ev.cut_evaluator(&hg, state.solution, false).cost;
            let gain = state.vertex_gain(v, from, to);
            moves.push(state.accept_vertex_gain(&gain));
            let after = ev.cut_evaluator(&hg, state.solution, false).cost;
            assert!(
                (before - after - gain.gain).abs() < 1e-2,
                "gain {} but cost went from {before} to {after}",
                gain.gain
            );
        }
        if round % 2 == 1 {
            for mv in moves.into_iter().rev() {
                state.rollback_vertex_gain(mv);
            }
        }
        assert_eq!(state.cur_paths_cost, ev.paths_cost(&hg, state.solution));
        assert_eq!(state.net_degs, ev.net_degrees(&hg, state.solution));
    }
}

#[test]
fn contracted_path_lists_each_cluster_once() {
    let hg = path_hgraph(3)
        .with_timing(TimingData {
            hyperedge_slack: vec![0.5; 2],
            hyperedge_arc_set: Vec::new(),
            paths: vec![TimingPath {
                vertices: vec![0, 1, 2],
                hyperedges: vec![0, 1],
                slack: 0.5,
            }],
        })
        .unwrap();
    let ev = Arc::new(timing_evaluator(2));
    let coarsener = Coarsener::new(CoarsenParams::default(), ev.clone(), 0);
    let mut grouped = coarsener.group_vertices(&hg, &[vec![0, 2]]);
    ev.initialize_timing(&mut grouped);

    let x = (0..grouped.num_vertices())
        .find(|&c| grouped.vertex_c_attr(c).contains(&0))
        .unwrap();
    // the path leaves the cluster and comes back
    assert_eq!(grouped.path_vertices(0).iter().filter(|&&c| c == x).count(), 2);
    assert_eq!(grouped.timing_paths_through(x), &[0]);

    let (upper, lower) = bounds(&grouped, 2, 100.0);
    let mut solution = vec![0; grouped.num_vertices()];
    let before = ev.cut_evaluator(&grouped, &solution, false).cost;
    let mut state = RefineState::new(&grouped, &ev, &upper, &lower, &mut solution);
    let gain = state.vertex_gain(x, 0, 1);
    state.accept_vertex_gain(&gain);

    assert_eq!(state.cur_paths_cost, ev.paths_cost(&grouped, state.solution));
    let after = ev.cut_evaluator(&grouped, state.solution, false).cost;
    assert!((before - after - gain.gain).abs() < 1e-4);
}

#[test]
fn queued_cells_see_earlier_moves_on_their_paths() {
    let mut hg = path_hgraph(5)
        .with_timing(TimingData {
            hyperedge_slack: vec![0.5; 4],
            hyperedge_arc_set: Vec::new(),
            paths: vec![TimingPath {
                vertices: (0..5).collect(),
                hyperedges: (0..4).collect(),
                slack: 0.5,
            }],
        })
        .unwrap();
    let ev = timing_evaluator(2);
    ev.initialize_timing(&mut hg);
    let (upper, lower) = bounds(&hg, 2, 100.0);
    let mut solution = vec![0; 5];
    let mut state = RefineState::new(&hg, &ev, &upper, &lower, &mut solution);

    // 0 and 4 share no hyperedge, only the path
    assert!(state.find_neighbors(0).contains(&4));
    let queued = state.vertex_gain(4, 0, 1);
    let first = state.vertex_gain(0, 0, 1);
    state.accept_vertex_gain(&first);

    let before = ev.cut_evaluator(&hg, state.solution, false).cost;
    let accepted = state.accept_vertex_gain(&queued);
    let after = ev.cut_evaluator(&hg, state.solution, false).cost;

    assert_eq!(state.cur_paths_cost, ev.paths_cost(&hg, state.solution));
    assert!((before - after - accepted.cell.gain).abs() < 1e-4);

    state.rollback_vertex_gain(accepted);
    assert_eq!(state.cur_paths_cost, ev.paths_cost(&hg, state.solution));
}

#[test]
fn timing_passes_keep_path_costs_exact() {
    let mut rng = fastrand::Rng::with_seed(12);
    let k = 3;
    let hg = random_hgraph(&mut rng, 60, 120, 4);
    let mut hg = with_random_paths(&mut rng, hg, 40);
    let ev = Arc::new(timing_evaluator(k));
    ev.initialize_timing(&mut hg);
    let (upper, lower) = bounds(&hg, k, 10.0);

    for kind in [RefinerKind::KWayFm, RefinerKind::KWayPm, RefinerKind::Greedy] {
        let refiner = Refiner::new(kind, RefinerParams::default(), ev.clone());
        let mut solution: Vec<usize> = (0..60).map(|v| v % k).collect();
        let before = ev.cut_evaluator(&hg, &solution, false).cost;
        let mut state = RefineState::new(&hg, &ev, &upper, &lower, &mut solution);
        let mut memo = PassMemo::default();
        let gain = match kind {
            RefinerKind::KWayFm => kwayfm::pass(&refiner, &mut state, &mut memo),
            RefinerKind::KWayPm => kwaypm::pass(&refiner, &mut state, &mut memo),
            _ => greedy::pass(&refiner, &mut state, &mut memo),
        };

        let paths = ev.paths_cost(&hg, state.solution);
        for (shadow, full) in state.cur_paths_cost.iter().zip(&paths) {
            assert!((shadow - full).abs() < 1e-4, "{kind:?}: {shadow} vs {full}");
        }
        assert_eq!(state.net_degs, ev.net_degrees(&hg, state.solution));
        assert!(state.is_feasible());

        let after = ev.cut_evaluator(&hg, state.solution, false).cost;
        assert!(gain >= 0.0, "{kind:?}");
        assert!(
            (before - after - gain).abs() < 1e-2,
            "{kind:?}: gain {gain} but cost went from {before} to {after}"
        );
    }
}

#[test]
fn hyperedge_gain_matches_cost_difference() {
    let mut rng = fastrand::Rng::with_seed(13);
    let k = 3;
    let hg = random_hgraph(&mut rng, 40, 80, 4);
    let mut hg = with_random_paths(&mut rng, hg, 20);
    let ev = timing_evaluator(k);
    ev.initialize_timing(&mut hg);
    let (upper, lower) = bounds(&hg, k, 100.0);
    let mut solution = random_solution(&mut rng, 40, k);
    let state = RefineState::new(&hg, &ev, &upper, &lower, &mut solution);

    let before = ev.cut_evaluator(&hg, state.solution, false).cost;
    for e in 0..hg.num_hyperedges() {
        for to in 0..k {
            let gain = state.hyperedge_gain(e, to);
            let mut moved = state.solution.to_vec();
            for &v in hg.vertices(e) {
                moved[v] = to;
            }
            let after = ev.cut_evaluator(&hg, &moved, false).cost;
            assert!(
                (before - after - gain.gain).abs() < 1e-2,
                "hyperedge {e} to {to}: gain {} but cost {before} -> {after}",
                gain.gain
            );
        }
    }
}

#[test]
fn greedy_takes_only_improving_moves() {
    let mut rng = fastrand::Rng::with_seed(14);
    let k = 2;
    let hg = random_hgraph(&mut rng, 40, 60, 3);
    let ev = Arc::new(Evaluator::uniform(k, 1, 1));
    let (upper, lower) = bounds(&hg, k, 30.0);
    let greedy = Refiner::new(RefinerKind::Greedy, RefinerParams::default(), ev.clone());

    for _ in 0..20 {
        let mut solution: Vec<usize> = (0..40).map(|v| v % k).collect();
        rng.shuffle(&mut solution);
        let before = ev.cut_evaluator(&hg, &solution, false).cost;
        let mut state = RefineState::new(&hg, &ev, &upper, &lower, &mut solution);
        let gain = greedy::pass(&greedy, &mut state, &mut PassMemo::default());
        let after = ev.cut_evaluator(&hg, state.solution, false).cost;

        assert!(gain >= 0.0);
        assert!(after <= before);
        assert!((before - after - gain).abs() < 1e-3);
        assert!(state.is_feasible());
    }
}

#[test]
fn path_cost_counts_cuts_and_snaking() {
    let mut hg = timing_chain(0.5);
    let ev = timing_evaluator(2);
    ev.initialize_timing(&mut hg);
    assert!((hg.path_timing_cost(0) - 0.25).abs() < 1e-6);

    // two transitions, block 0 entered twice
    assert!((ev.path_cost(&hg, 0, &[0, 1, 0, 0]) - 1.5).abs() < 1e-6);
    assert!((ev.path_cost(&hg, 0, &[0, 0, 1, 1]) - 0.25).abs() < 1e-6);
    assert_eq!(ev.path_cost(&hg, 0, &[1, 1, 1, 1]), 0.0);
}

#[test]
fn timing_cost_adds_to_hyperedge_cost() {
    let mut hg = timing_chain(0.5);
    let ev = timing_evaluator(2);
    ev.initialize_timing(&mut hg);
    // own (1 - 0.5)^2 plus the one path through it
    assert!((ev.hyperedge_cost(&hg, 1) - 1.5).abs() < 1e-6);
}

#[test]
fn update_timing_propagates_through_combinational_vertices() {
    let mut hg = timing_chain(0.5);
    let ev = timing_evaluator(2);
    ev.update_timing(&mut hg, &[0, 1, 1, 1]);
    for e in 0..3 {
        assert!((hg.hyperedge_slack(e) - 0.4).abs() < 1e-6, "hyperedge {e}");
    }
    assert!((hg.path_timing_slack(0) - 0.4).abs() < 1e-6);
}

#[test]
fn update_timing_stops_at_sequential_vertices() {
    let mut hg = timing_chain(0.5)
        .with_vertex_types(vec![
            VertexType::Combinational,
            VertexType::Combinational,
            VertexType::Sequential,
            VertexType::Combinational,
        ])
        .unwrap();
    let ev = timing_evaluator(2);
    ev.update_timing(&mut hg, &[0, 1, 1, 1]);
    assert!((hg.hyperedge_slack(1) - 0.4).abs() < 1e-6);
    assert!((hg.hyperedge_slack(2) - 0.5).abs() < 1e-6);
    assert!((hg.path_timing_slack(0) - 0.4).abs() < 1e-6);
}

#[test]
fn update_timing_reads_slack_through_arc_sets() {
    let types = vec![
        VertexType::Combinational,
        VertexType::Sequential,
        VertexType::Combinational,
    ];
    let arcs = path_hgraph(3)
        .with_vertex_types(types.clone())
        .unwrap()
        .with_timing(TimingData {
            hyperedge_slack: vec![0.5; 2],
            ..TimingData::default()
        })
        .unwrap();
    let netlist = || {
        path_hgraph(3)
            .with_vertex_types(types.clone())
            .unwrap()
            .with_timing(TimingData {
                hyperedge_slack: vec![0.5; 2],
                hyperedge_arc_set: vec![vec![0, 1], vec![1]],
                paths: Vec::new(),
            })
            .unwrap()
    };

    // each hyperedge is its own arc, so only the cut one is delayed
    let mut own = netlist();
    timing_evaluator(2).update_timing(&mut own, &[0, 0, 1]);
    assert!((own.hyperedge_slack(0) - 0.5).abs() < 1e-6);
    assert!((own.hyperedge_slack(1) - 0.4).abs() < 1e-6);

    // hyperedge 0 also stands for arc 1
    let mut mapped = netlist();
    timing_evaluator(2)
        .with_timing_graph(Arc::new(arcs))
        .update_timing(&mut mapped, &[0, 0, 1]);
    assert!((mapped.hyperedge_slack(0) - 0.4).abs() < 1e-6);
    assert!((mapped.hyperedge_slack(1) - 0.4).abs() < 1e-6);
}

#[test]
fn timing_cuts_counts_paths() {
    let hg = timing_chain(-0.1);
    let ev = timing_evaluator(2);
    let stats = ev.timing_cuts(&hg, &[0, 1, 0, 0]);
    assert_eq!(stats.tot_num_path, 1);
    assert_eq!(stats.tot_num_critical_path, 1);
    assert_eq!(stats.worst_cut_critical_path, 2);
    assert_eq!(stats.avg_cut_critical_path, 2.0);
}

#[test]
fn contraction_keeps_weight_and_merges_parallel_hyperedges() {
    // {0,1} and {2,3} become parallel once 0,2 and 1,3 are grouped
    let hg = Hypergraph::new(
        1,
        1,
        vec![vec![0, 1], vec![2, 3], vec![0, 2], vec![4]],
        vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]],
        vec![vec![1.0], vec![2.0], vec![7.0], vec![1.0]],
    )
    .unwrap();
    let ev = Arc::new(Evaluator::uniform(2, 1, 1));
    let coarsener = Coarsener::new(CoarsenParams::default(), ev, 0);
    let grouped = coarsener.group_vertices(&hg, &[vec![0, 2], vec![1, 3]]);

    assert_eq!(grouped.num_vertices(), 3);
    assert_eq!(grouped.total_vertex_weights(), hg.total_vertex_weights());
    // {0,2} collapses into one vertex, {4} has a single vertex
    assert_eq!(grouped.num_hyperedges(), 1);
    assert_eq!(grouped.hyperedge_weights(0), &[3.0]);

    let mut members: Vec<usize> = (0..grouped.num_vertices())
        .flat_map(|c| grouped.vertex_c_attr(c).to_vec())
        .collect();
    members.sort_unstable();
    assert_eq!(members, vec![0, 1, 2, 3, 4]);
}

#[test]
fn coarsening_shrinks_every_level() {
    let mut rng = fastrand::Rng::with_seed(4);
    let hg = random_hgraph(&mut rng, 300, 500, 4);
    let ev = Arc::new(Evaluator::uniform(2, 1, 1));
    let params = CoarsenParams {
        thr_cluster_weight: vec![20.0],
        ..CoarsenParams::default()
    };
    let coarsener = Coarsener::new(params, ev, 7);
    let hierarchy = coarsener.lazy_first_choice(&hg);
    assert!(!hierarchy.is_empty());

    let mut prev = &hg;
    for level in &hierarchy {
        assert!(level.num_vertices() < prev.num_vertices());
        assert_eq!(level.total_vertex_weights(), prev.total_vertex_weights());
        assert!((0..level.num_vertices()).all(|c| level.vertex_weights(c)[0] <= 20.0));

        let mut seen = vec![false; prev.num_vertices()];
        for c in 0..level.num_vertices() {
            for &v in level.vertex_c_attr(c) {
                assert!(!seen[v]);
                seen[v] = true;
            }
        }
        assert!(seen.into_iter().all(|s| s));
        prev = level;
    }
}

#[test]
fn coarsening_never_merges_across_communities() {
    let mut rng = fastrand::Rng::with_seed(5);
    let hg = random_hgraph(&mut rng, 100, 200, 3);
    let community: Vec<usize> = (0..100).map(|v| v % 2).collect();
    let hg = hg.with_community(community.clone()).unwrap();
    let coarsener = Coarsener::new(
        CoarsenParams::default(),
        Arc::new(Evaluator::uniform(2, 1, 1)),
        0,
    );
    let hierarchy = coarsener.lazy_first_choice(&hg);

    let mut prev = &hg;
    for level in &hierarchy {
        for c in 0..level.num_vertices() {
            for &v in level.vertex_c_attr(c) {
                assert_eq!(prev.community(v), level.community(c));
            }
        }
        prev = level;
    }
}

#[test]
fn cut_evaluator_is_deterministic() {
    let mut rng = fastrand::Rng::with_seed(6);
    let hg = random_hgraph(&mut rng, 80, 150, 5);
    let ev = Evaluator::uniform(4, 1, 1);
    let solution = random_solution(&mut rng, 80, 4);
    let a = ev.cut_evaluator(&hg, &solution, false);
    let b = ev.cut_evaluator(&hg, &solution, false);
    assert_eq!(a, b);
}

#[test]
fn single_vertex_hyperedges_never_count() {
    let hg = Hypergraph::unweighted(4, vec![vec![0], vec![1], vec![0, 1], vec![2, 3]]).unwrap();
    let ev = Evaluator::uniform(2, 1, 1);
    assert!(!ev.is_cut(&hg, 0, &[0, 1, 0, 1]));
    assert_eq!(ev.cut_hyperedges(&hg, &[0, 1, 0, 1]), vec![2, 3]);
    assert_eq!(ev.cut_evaluator(&hg, &[0, 0, 1, 1], false).cost, 0.0);
}

#[test]
fn path_bisection_cuts_once() {
    let options = Options {
        num_parts: 2,
        num_initial_solutions: 4,
        ..Options::default()
    };
    let result = tritonpart::partition(&options, path_hgraph(4), &[]).unwrap();
    assert_eq!(result.report.token.cost, 1.0);
    assert!(result.report.satisfied());
    assert_eq!(result.solution[0], result.solution[1]);
    assert_eq!(result.solution[2], result.solution[3]);
}

#[test]
fn fm_balances_an_all_zero_path() {
    let hg = path_hgraph(4);
    let ev = Arc::new(Evaluator::uniform(2, 1, 1));
    let (upper, lower) = bounds(&hg, 2, 1.0);
    let fm = Refiner::new(RefinerKind::KWayFm, RefinerParams::default(), ev.clone());

    let mut solution = vec![0; 4];
    fm.refine(&hg, &upper, &lower, &mut solution);

    let token = ev.cut_evaluator(&hg, &solution, false);
    assert_eq!(token.cost, 1.0);
    assert!(util::within_bounds(&token.block_balance, &upper, &lower));
}

#[test]
fn fixed_vertex_never_moves() {
    let mut rng = fastrand::Rng::with_seed(8);
    let k = 3;
    let mut fixed = vec![None; 30];
    fixed[0] = Some(2);
    let hg = random_hgraph(&mut rng, 30, 60, 4).with_fixed(fixed).unwrap();
    let ev = Arc::new(Evaluator::uniform(k, 1, 1));
    let (upper, lower) = bounds(&hg, k, 20.0);
    let refiners: Vec<Refiner> = [RefinerKind::KWayFm, RefinerKind::KWayPm, RefinerKind::Greedy]
        .into_iter()
        .map(|kind| Refiner::new(kind, RefinerParams::default(), ev.clone()))
        .collect();

    for _ in 0..100 {
        let mut solution = random_solution(&mut rng, 30, k);
        solution[0] = 2;
        for refiner in &refiners {
            refiner.refine(&hg, &upper, &lower, &mut solution);
            assert_eq!(solution[0], 2);
        }
    }
}

#[test]
fn fm_never_worsens_a_balanced_solution() {
    let mut rng = fastrand::Rng::with_seed(9);
    let k = 2;
    let hg = random_hgraph(&mut rng, 100, 200, 4);
    let ev = Arc::new(Evaluator::uniform(k, 1, 1));
    let (upper, lower) = bounds(&hg, k, 5.0);
    let fm = Refiner::new(RefinerKind::KWayFm, RefinerParams::default(), ev.clone());

    // alternating blocks are balanced
    let mut solution: Vec<usize> = (0..100).map(|v| v % 2).collect();
    let before = ev.cut_evaluator(&hg, &solution, false);
    fm.refine(&hg, &upper, &lower, &mut solution);
    let after = ev.cut_evaluator(&hg, &solution, false);

    assert!(after.cost <= before.cost);
    assert!(util::within_bounds(&after.block_balance, &upper, &lower));
}

#[test]
fn ilp_finds_the_optimal_bisection() {
    let hg = two_triangles();
    let ev = Evaluator::uniform(2, 1, 1);
    let bound = vec![vec![3.0]; 2];
    let problem = IlpProblem::from_hypergraph(&hg, &ev, &bound, &bound);
    let solution = BranchAndBound::default().solve(&problem).unwrap();

    assert!(problem.is_feasible(&solution));
    assert_eq!(problem.cut_cost(&solution), 1.0);
    assert_eq!(solution[0], solution[1]);
    assert_eq!(solution[0], solution[2]);
    assert_ne!(solution[2], solution[3]);
}

#[test]
fn ilp_pass_repairs_a_bad_bisection() {
    let hg = two_triangles();
    let ev = Arc::new(Evaluator::uniform(2, 1, 1));
    let (upper, lower) = bounds(&hg, 2, 20.0);
    let refiner = Refiner::new(RefinerKind::Ilp, RefinerParams::default(), ev.clone());

    // every hyperedge but {0, 1} and {4, 5} is cut
    let mut solution = vec![0, 0, 1, 0, 1, 1];
    let before = ev.cut_evaluator(&hg, &solution, false).cost;
    assert_eq!(before, 5.0);
    let mut state = RefineState::new(&hg, &ev, &upper, &lower, &mut solution);
    let gain = ilprefine::pass(&refiner, &mut state, &mut PassMemo::default());

    assert!(gain > 0.0);
    assert_eq!(state.net_degs, ev.net_degrees(&hg, state.solution));
    assert_eq!(state.block_balance, ev.block_balance(&hg, state.solution));
    let after = ev.cut_evaluator(&hg, state.solution, false);
    assert_eq!(before - after.cost, gain);
    assert!(util::within_bounds(&after.block_balance, &upper, &lower));
}

#[test]
fn ilp_reports_infeasible_instances() {
    let hg = path_hgraph(6);
    let ev = Evaluator::uniform(2, 1, 1);
    let upper = vec![vec![2.0]; 2];
    let lower = vec![vec![0.0]; 2];
    let problem = IlpProblem::from_hypergraph(&hg, &ev, &upper, &lower);
    assert_eq!(BranchAndBound::default().solve(&problem), None);

    let partitioner = Partitioner::new(2, Arc::new(ev), 0);
    let mut solution = vec![0, 0, 0, 1, 1, 1];
    assert!(!partitioner.partition(&hg, &upper, &lower, &mut solution, PartitionType::Ilp));
    assert_eq!(solution, vec![0, 0, 0, 1, 1, 1]);
}

#[test]
fn ilp_honors_fixed_vertices() {
    let hg = path_hgraph(4).with_fixed(vec![Some(1), None, None, None]).unwrap();
    let ev = Arc::new(Evaluator::uniform(2, 1, 1));
    let (upper, lower) = bounds(&hg, 2, 1.0);
    let partitioner = Partitioner::new(2, ev.clone(), 0);
    let mut solution = Vec::new();
    assert!(partitioner.partition(&hg, &upper, &lower, &mut solution, PartitionType::Ilp));
    assert_eq!(solution, vec![1, 1, 0, 0]);
}

#[test]
fn random_partition_fills_blocks_to_target() {
    let hg = Hypergraph::unweighted(100, Vec::new()).unwrap();
    let ev = Arc::new(Evaluator::uniform(4, 1, 1));
    let (upper, lower) = bounds(&hg, 4, 5.0);
    let partitioner = Partitioner::new(4, ev.clone(), 11);

    let mut solution = Vec::new();
    partitioner.partition(&hg, &upper, &lower, &mut solution, PartitionType::Random);
    let balance = ev.block_balance(&hg, &solution);
    assert!(balance.iter().all(|b| (24.0..=26.0).contains(&b[0])));
    assert!(util::within_bounds(&balance, &upper, &lower));

    // up to 30 per block, the rest in the last one
    partitioner.partition(&hg, &upper, &lower, &mut solution, PartitionType::RandomVile);
    let balance = ev.block_balance(&hg, &solution);
    assert!(balance[..3].iter().all(|b| (29.0..=30.0).contains(&b[0])));
    assert!(balance[3][0] <= 13.0);
}

#[test]
fn vile_partition_deals_round_robin() {
    let hg = Hypergraph::new(
        1,
        1,
        Vec::new(),
        vec![vec![1.0], vec![4.0], vec![3.0], vec![2.0]],
        Vec::new(),
    )
    .unwrap();
    let partitioner = Partitioner::new(2, Arc::new(Evaluator::uniform(2, 1, 1)), 0);
    let (upper, lower) = bounds(&hg, 2, 10.0);
    let mut solution = Vec::new();
    partitioner.partition(&hg, &upper, &lower, &mut solution, PartitionType::Vile);
    // heaviest first: 1, 2, 3, 0
    assert_eq!(solution, vec![1, 0, 1, 0]);
}

#[test]
fn options_reject_bad_values() {
    let one_block = Options {
        num_parts: 1,
        ..Options::default()
    };
    assert!(one_block.validate().is_err());

    let no_coarsening = Options {
        coarsening_ratio: 1.0,
        ..Options::default()
    };
    assert!(no_coarsening.validate().is_err());

    let short_balance = Options {
        num_parts: 3,
        base_balance: vec![0.5, 0.5],
        ..Options::default()
    };
    assert!(short_balance.validate().is_err());
}

#[test]
fn options_scale_the_base_balance() {
    let options = Options {
        num_parts: 2,
        scale_factor: vec![2.0, 1.0],
        ..Options::default()
    }
    .normalized()
    .unwrap();
    assert_eq!(options.base_balance, vec![0.25, 0.5]);
    assert_eq!(options.e_wt_factors, vec![1.0]);
    assert_eq!(options.v_wt_factors, vec![1.0]);
}
