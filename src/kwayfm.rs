//! Heap-based k-way FM refinement.
//!
//! Every destination block owns one [`GainBucket`]. Buckets are seeded and updated in parallel,
//! one rayon task per bucket, while the move loop itself runs on the calling thread.

use log::trace;
use rayon::prelude::*;

use crate::pqueue::GainBucket;
use crate::refine::{AcceptedMove, PassMemo, RefineState, Refiner, VertexGain};

pub(crate) fn pass(refiner: &Refiner, state: &mut RefineState<'_>, _memo: &mut PassMemo) -> f32 {
    let blocks: Vec<usize> = (0..state.num_parts()).collect();
    // an unbalanced start may have nothing cut, so every free vertex is a candidate
    let boundary = if state.is_feasible() {
        state.find_boundary_vertices()
    } else {
        (0..state.hgraph.num_vertices())
            .filter(|&v| !state.visited[v])
            .collect()
    };
    fm_moves(refiner, state, &blocks, &boundary, |s, v| s.find_neighbors(v))
}

/// (Re)compute the gain of moving `v` into the block of `bucket`. Locked vertices, vertices
/// already there and vertices outside of `blocks` are dropped from the bucket.
fn update_bucket(
    state: &RefineState<'_>,
    bucket: &mut GainBucket,
    blocks: &[usize],
    v: usize,
    to: usize,
) {
    let from = state.solution[v];
    if state.visited[v] || from == to || !blocks.contains(&from) {
        bucket.delete(v);
        return;
    }
    let cell = state.vertex_gain(v, from, to);
    bucket.upsert(cell, state.evaluator.vertex_weight_norm(state.hgraph, v));
}

/// The best legal move among the bucket roots. When every root is illegal, search the top
/// levels of the bucket with the best root instead.
fn pick_move(
    refiner: &Refiner,
    state: &RefineState<'_>,
    buckets: &[GainBucket],
) -> Option<VertexGain> {
    let legal = |cell: &VertexGain| {
        state.check_vertex_move_legality(cell.vertex, cell.source_part, cell.destination_part)
    };

    let mut best_legal: Option<&VertexGain> = None;
    let mut best_root: Option<(usize, f32)> = None;
    for (i, bucket) in buckets.iter().enumerate() {
        let Some(top) = bucket.top() else {
            continue;
        };
        if best_root.map_or(true, |(_, gain)| top.gain > gain) {
            best_root = Some((i, top.gain));
        }
        if legal(top) && best_legal.map_or(true, |b| top.gain > b.gain) {
            best_legal = Some(top);
        }
    }
    if let Some(cell) = best_legal {
        return Some(cell.clone());
    }

    let (i, _) = best_root?;
    buckets[i]
        .find_first_legal(refiner.params.total_corking_passes, legal)
        .cloned()
}

/// One FM pass restricted to moves between `blocks`, starting from `boundary`. Moves past the
/// best prefix (balanced first, then by cumulative gain) are rolled back. Returns the kept gain.
pub(crate) fn fm_moves(
    refiner: &Refiner,
    state: &mut RefineState<'_>,
    blocks: &[usize],
    boundary: &[usize],
    neighbors: impl Fn(&RefineState<'_>, usize) -> Vec<usize>,
) -> f32 {
    if boundary.is_empty() {
        return 0.0;
    }

    let num_vertices = state.hgraph.num_vertices();
    let mut buckets: Vec<GainBucket> = blocks.iter().map(|_| GainBucket::new(num_vertices)).collect();
    {
        let st = &*state;
        buckets
            .par_iter_mut()
            .zip(blocks.par_iter())
            .for_each(|(bucket, &to)| {
                for &v in boundary {
                    update_bucket(st, bucket, blocks, v, to);
                }
            });
    }

    let max_move = refiner.params.max_move;
    let patience = ((max_move as f32 * refiner.params.early_stop_ratio).ceil() as usize).max(1);
    // balanced prefixes beat unbalanced ones; an unbalanced start takes any first move
    let mut best_feasible = state.is_feasible();
    let mut best_gain = if best_feasible { 0.0 } else { f32::NEG_INFINITY };
    let mut best_len = 0;
    let mut total_gain = 0.0;
    let mut since_best = 0;
    let mut trace: Vec<AcceptedMove> = Vec::new();

    while trace.len() < max_move {
        let Some(cell) = pick_move(refiner, state, &buckets) else {
            break;
        };
        let v = cell.vertex;
        let accepted = state.accept_vertex_gain(&cell);
        total_gain += accepted.cell.gain;
        trace.push(accepted);

        buckets.par_iter_mut().for_each(|bucket| {
            bucket.delete(v);
        });
        let nbrs = neighbors(state, v);
        {
            let st = &*state;
            buckets
                .par_iter_mut()
                .zip(blocks.par_iter())
                .for_each(|(bucket, &to)| {
                    for &u in &nbrs {
                        update_bucket(st, bucket, blocks, u, to);
                    }
                });
        }

        let feasible = state.is_feasible();
        if (feasible && !best_feasible) || (feasible == best_feasible && total_gain > best_gain) {
            best_feasible = feasible;
            best_gain = total_gain;
            best_len = trace.len();
            since_best = 0;
        } else {
            since_best += 1;
            if since_best >= patience {
                break;
            }
        }
    }

    trace!(
        "fm over {} blocks: {} moves, keeping {}",
        blocks.len(),
        trace.len(),
        best_len
    );
    while trace.len() > best_len {
        if let Some(mv) = trace.pop() {
            state.rollback_vertex_gain(mv);
        }
    }

    if best_len == 0 {
        0.0
    } else {
        best_gain
    }
}
