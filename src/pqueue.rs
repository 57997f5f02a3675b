//! Gain buckets: max-heaps of candidate vertex moves, one per destination block.
//!
//! Each bucket is an indexed binary heap. After inserting a move it can be found, updated or
//! removed in O(log n) through the vertex id. Buckets share nothing, so the refiners hand one
//! bucket to each worker thread.

use crate::refine::VertexGain;

struct Node {
    /// tie breaker: among equal gains the lighter vertex wins
    weight: f32,
    cell: VertexGain,
}

/// `a` should sit above `b` in the heap
#[inline]
fn higher(a: &Node, b: &Node) -> bool {
    a.cell.gain > b.cell.gain || (a.cell.gain == b.cell.gain && a.weight < b.weight)
}

pub struct GainBucket {
    heap: Vec<Node>,
    /// heap position of each vertex, -1 if absent
    locator: Box<[isize]>,
}

impl GainBucket {
    pub fn new(maxnodes: usize) -> Self {
        Self {
            heap: Vec::new(),
            locator: vec![-1; maxnodes].into_boxed_slice(),
        }
    }

    /// clear the bucket
    pub fn reset(&mut self) {
        for node in &self.heap {
            self.locator[node.cell.vertex] = -1;
        }
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, vertex: usize) -> bool {
        self.locator[vertex] != -1
    }

    pub fn get(&self, vertex: usize) -> Option<&VertexGain> {
        match self.locator[vertex] {
            -1 => None,
            i => Some(&self.heap[i as usize].cell),
        }
    }

    /// insert a move; the vertex must not already be in the bucket
    pub fn insert(&mut self, cell: VertexGain, weight: f32) {
        debug_assert!(self.locator[cell.vertex] == -1);

        let i = self.heap.len();
        self.locator[cell.vertex] = i as isize;
        self.heap.push(Node { weight, cell });
        self.sift_up(i);

        debug_assert!(self.check_heap());
    }

    /// replace the move stored for `cell.vertex`, or insert it
    pub fn upsert(&mut self, cell: VertexGain, weight: f32) {
        match self.locator[cell.vertex] {
            -1 => self.insert(cell, weight),
            i => {
                let vertex = cell.vertex;
                self.heap[i as usize] = Node { weight, cell };
                self.sift_up(i as usize);
                self.sift_down(self.locator[vertex] as usize);
                debug_assert!(self.check_heap());
            }
        }
    }

    /// remove the move of `vertex`, if present
    pub fn delete(&mut self, vertex: usize) -> Option<VertexGain> {
        let i = match self.locator[vertex] {
            -1 => return None,
            i => i as usize,
        };
        self.locator[vertex] = -1;

        let last = self.heap.len() - 1;
        self.heap.swap(i, last);
        let node = self.heap.pop()?;
        if i < self.heap.len() {
            let moved = self.heap[i].cell.vertex;
            self.locator[moved] = i as isize;
            // the moved node may need to go either way
            self.sift_up(i);
            self.sift_down(self.locator[moved] as usize);
        }

        debug_assert!(self.check_heap());
        Some(node.cell)
    }

    /// the best move, without removing it
    pub fn top(&self) -> Option<&VertexGain> {
        self.heap.first().map(|n| &n.cell)
    }

    /// remove and return the best move
    pub fn extract_max(&mut self) -> Option<VertexGain> {
        let vertex = self.top()?.vertex;
        self.delete(vertex)
    }

    /// Scan the top `max_levels` levels of the heap in level order and return the first move
    /// accepted by `legal`. Resolves the corking effect without draining the heap.
    pub fn find_first_legal(
        &self,
        max_levels: usize,
        mut legal: impl FnMut(&VertexGain) -> bool,
    ) -> Option<&VertexGain> {
        let limit = match 1usize.checked_shl(max_levels.min(usize::BITS as usize - 1) as u32) {
            Some(n) => (n - 1).min(self.heap.len()),
            None => self.heap.len(),
        };
        self.heap[..limit]
            .iter()
            .map(|n| &n.cell)
            .find(|cell| legal(cell))
    }

    /// iterate over all stored moves in heap order
    pub fn iter(&self) -> impl Iterator<Item = &VertexGain> {
        self.heap.iter().map(|n| &n.cell)
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let j = (i - 1) >> 1;
            if higher(&self.heap[i], &self.heap[j]) {
                self.swap_nodes(i, j);
                i = j;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.heap.len();
        loop {
            let l = 2 * i + 1;
            if l >= n {
                break;
            }
            let mut j = l;
            if l + 1 < n && higher(&self.heap[l + 1], &self.heap[l]) {
                j = l + 1;
            }
            if higher(&self.heap[j], &self.heap[i]) {
                self.swap_nodes(i, j);
                i = j;
            } else {
                break;
            }
        }
    }

    #[inline]
    fn swap_nodes(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.locator[self.heap[i].cell.vertex] = i as isize;
        self.locator[self.heap[j].cell.vertex] = j as isize;
    }

    /// checks the consistency of the heap
    fn check_heap(&self) -> bool {
        for (i, node) in self.heap.iter().enumerate() {
            if self.locator[node.cell.vertex] != i as isize {
                return false;
            }
            if i > 0 && higher(node, &self.heap[(i - 1) >> 1]) {
                return false;
            }
        }
        self.locator.iter().filter(|&&l| l != -1).count() == self.heap.len()
    }
}
