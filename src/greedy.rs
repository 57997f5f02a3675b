//! Greedy hyperedge refinement: move whole cut hyperedges into one block. Moving a hyperedge at
//! once can escape the local minima that single-vertex moves get stuck in.

use crate::refine::{HyperedgeGain, PassMemo, RefineState, Refiner};

pub(crate) fn pass(refiner: &Refiner, state: &mut RefineState<'_>, _memo: &mut PassMemo) -> f32 {
    let hg = state.hgraph;
    let mut total = 0.0;
    let mut moves = 0;

    for e in 0..hg.num_hyperedges() {
        if moves >= refiner.params.max_move {
            break;
        }
        if hg.vertices(e).len() <= 1 || state.connectivity(e) <= 1 {
            continue;
        }

        let mut best: Option<HyperedgeGain> = None;
        for to in 0..state.num_parts() {
            if !state.check_hyperedge_move_legality(e, to) {
                continue;
            }
            let gain = state.hyperedge_gain(e, to);
            let better = match &best {
                None => true,
                Some(b) => gain.gain > b.gain || (gain.gain == b.gain && gain.weight < b.weight),
            };
            if better {
                best = Some(gain);
            }
        }

        if let Some(gain) = best.filter(|g| g.gain >= 0.0) {
            state.accept_hyperedge_gain(&gain);
            total += gain.gain;
            moves += 1;
        }
    }
    total
}
