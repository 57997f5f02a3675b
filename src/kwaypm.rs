//! Pairwise k-way FM.
//!
//! FM does better on two blocks than on k. Each pass matches the blocks into disjoint pairs by
//! how strongly they are connected and runs a two-bucket FM on every pair in turn.

use log::debug;

use crate::kwayfm;
use crate::refine::{PassMemo, RefineState, Refiner};
use crate::util::Matrix;

/// Greedy maximum matching of block pairs. Pairs are taken by descending connectivity; equal
/// scores prefer the pair whose connectivity grew most since `prev`.
pub fn maximum_matching(scores: &Matrix<f32>, prev: Option<&Matrix<f32>>) -> Vec<(usize, usize)> {
    let k = scores.len();
    let mut candidates = Vec::new();
    for a in 0..k {
        for b in a + 1..k {
            let score = scores[a][b];
            if score > 0.0 {
                let delta = score - prev.map_or(0.0, |p| p[a][b]);
                candidates.push((a, b, score, delta));
            }
        }
    }
    candidates.sort_by(|x, y| y.2.total_cmp(&x.2).then(y.3.total_cmp(&x.3)));

    let mut matched = vec![false; k];
    let mut pairs = Vec::new();
    for (a, b, _, _) in candidates {
        if !matched[a] && !matched[b] {
            matched[a] = true;
            matched[b] = true;
            pairs.push((a, b));
        }
    }
    pairs
}

pub(crate) fn pass(refiner: &Refiner, state: &mut RefineState<'_>, memo: &mut PassMemo) -> f32 {
    let scores = state.evaluator.matching_connectivity(state.hgraph, state.solution);
    let pairs = maximum_matching(&scores, memo.prev_pair_scores.as_ref());
    memo.prev_pair_scores = Some(scores);
    debug!("pairwise pass over {pairs:?}");

    let mut total = 0.0;
    for (a, b) in pairs {
        let boundary = state.find_boundary_vertices_between(a, b);
        total += kwayfm::fm_moves(refiner, state, &[a, b], &boundary, |s, v| {
            s.find_neighbors_between(v, a, b)
        });
    }
    total
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strongest_pairs_first() {
        let mut scores = vec![vec![0.0; 4]; 4];
        scores[0][1] = 1.0;
        scores[0][2] = 5.0;
        scores[1][3] = 4.0;
        scores[2][3] = 6.0;
        assert_eq!(maximum_matching(&scores, None), vec![(2, 3), (0, 1)]);
    }

    #[test]
    fn ties_prefer_growing_pairs() {
        let mut scores = vec![vec![0.0; 3]; 3];
        scores[0][1] = 2.0;
        scores[1][2] = 2.0;
        let mut prev = vec![vec![0.0; 3]; 3];
        prev[0][1] = 2.0;
        assert_eq!(maximum_matching(&scores, Some(&prev)), vec![(1, 2)]);
    }

    #[test]
    fn unconnected_blocks_stay_unmatched() {
        let scores = vec![vec![0.0; 3]; 3];
        assert!(maximum_matching(&scores, None).is_empty());
    }
}
