#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// `clusters` groups of `size` vertices, each densely connected inside, with `bridges` random
/// 2-pin hyperedges between groups.
pub fn clustered_hyperedges(seed: u64, clusters: usize, size: usize, bridges: usize) -> Vec<Vec<usize>> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut hyperedges = Vec::new();
    for c in 0..clusters {
        let base = c * size;
        for i in 0..size {
            hyperedges.push(vec![base + i, base + (i + 1) % size]);
            let pins = rng.usize(2..=4);
            let mut he: Vec<usize> = (0..pins).map(|_| base + rng.usize(0..size)).collect();
            he.sort_unstable();
            he.dedup();
            if he.len() > 1 {
                hyperedges.push(he);
            }
        }
    }
    let n = clusters * size;
    for _ in 0..bridges {
        let a = rng.usize(0..n);
        let b = rng.usize(0..n);
        if a != b {
            hyperedges.push(vec![a, b]);
        }
    }
    hyperedges
}

/// hMETIS text of an unweighted hypergraph
pub fn hmetis(num_vertices: usize, hyperedges: &[Vec<usize>]) -> String {
    let mut text = format!("{} {}\n", hyperedges.len(), num_vertices);
    for he in hyperedges {
        let ids: Vec<String> = he.iter().map(|v| (v + 1).to_string()).collect();
        text += &ids.join(" ");
        text.push('\n');
    }
    text
}

pub struct Workdir {
    dir: TempDir,
}

impl Workdir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// write `contents` to `name` inside the directory
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }
}

/// block weights of a unit-weight solution
pub fn block_sizes(solution: &[usize], num_parts: usize) -> Vec<usize> {
    let mut sizes = vec![0; num_parts];
    for &b in solution {
        sizes[b] += 1;
    }
    sizes
}
