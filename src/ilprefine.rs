//! ILP refinement of the boundary.
//!
//! The boundary vertices are kept as they are and every other vertex is folded into one fixed
//! remainder vertex per block. The reduced instance is solved exactly, then the solver's moves
//! are replayed through the usual gain machinery so that timing-path costs, which the ILP does
//! not model, still decide how many of them to keep.

use log::debug;

use crate::ilp::IlpProblem;
use crate::refine::{PassMemo, RefineState, Refiner};
use crate::util;

/// The reduced instance: boundary vertex `i` keeps local id `i`, the remainder of block `b`
/// gets `boundary.len() + b`.
fn reduced_problem(state: &RefineState<'_>, boundary: &[usize]) -> IlpProblem {
    let hg = state.hgraph;
    let k = state.num_parts();
    let m = boundary.len();

    let mut local = vec![usize::MAX; hg.num_vertices()];
    for (i, &v) in boundary.iter().enumerate() {
        local[v] = i;
    }
    let local_id = |v: usize| {
        if local[v] == usize::MAX {
            m + state.solution[v]
        } else {
            local[v]
        }
    };

    let mut vertex_weights: Vec<Vec<f32>> =
        boundary.iter().map(|&v| hg.vertex_weights(v).to_vec()).collect();
    let mut remainder = state.block_balance.clone();
    for &v in boundary {
        util::sub_assign(&mut remainder[state.solution[v]], hg.vertex_weights(v));
    }
    for row in &mut remainder {
        row.iter_mut().for_each(|x| *x = x.max(0.0));
    }
    vertex_weights.extend(remainder);

    let mut fixed = vec![None; m];
    fixed.extend((0..k).map(Some));

    let mut seen = vec![false; hg.num_hyperedges()];
    let mut hyperedges = Vec::new();
    let mut hyperedge_weights = Vec::new();
    for &v in boundary {
        for &e in hg.edges(v) {
            if seen[e] || hg.vertices(e).len() <= 1 {
                continue;
            }
            seen[e] = true;
            let mut he: Vec<usize> = hg.vertices(e).iter().map(|&u| local_id(u)).collect();
            he.sort_unstable();
            he.dedup();
            if he.len() > 1 {
                hyperedges.push(he);
                hyperedge_weights.push(state.evaluator.hyperedge_cost(hg, e));
            }
        }
    }

    let mut hint: Vec<usize> = boundary.iter().map(|&v| state.solution[v]).collect();
    hint.extend(0..k);

    IlpProblem {
        num_parts: k,
        vertex_dimensions: hg.vertex_dimensions(),
        fixed,
        hyperedges,
        hyperedge_weights,
        vertex_weights,
        upper: state.upper.to_vec(),
        lower: state.lower.to_vec(),
        hint: Some(hint),
    }
}

pub(crate) fn pass(refiner: &Refiner, state: &mut RefineState<'_>, _memo: &mut PassMemo) -> f32 {
    let boundary = state.find_boundary_vertices();
    if boundary.is_empty() || boundary.len() > refiner.params.ilp_vertex_threshold {
        return 0.0;
    }

    let problem = reduced_problem(state, &boundary);
    let Some(result) = refiner.ilp_solver.solve(&problem) else {
        debug!("ilp refinement found no solution for {} boundary vertices", boundary.len());
        return 0.0;
    };

    let mut trace = Vec::new();
    let mut total = 0.0;
    let mut best = 0.0;
    let mut best_len = 0;
    for (i, &v) in boundary.iter().enumerate() {
        let from = state.solution[v];
        let to = result[i];
        if from == to || !state.check_vertex_move_legality(v, from, to) {
            continue;
        }
        let cell = state.vertex_gain(v, from, to);
        let accepted = state.accept_vertex_gain(&cell);
        total += accepted.cell.gain;
        trace.push(accepted);
        if total > best {
            best = total;
            best_len = trace.len();
        }
    }
    while trace.len() > best_len {
        if let Some(mv) = trace.pop() {
            state.rollback_vertex_gain(mv);
        }
    }
    best
}
