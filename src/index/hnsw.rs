//! Hierarchical navigable small-world graph for approximate nearest-neighbor
//! search.
//!
//! Flat storage variant: every vector is kept in full, so lookups by internal
//! id (`reconstruct`) are exact. Distances are Euclidean; callers convert to
//! similarity as `1 / (1 + distance)`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

/// Maximum assignable level. Levels follow a geometric distribution; this cap
/// only matters for pathological RNG draws.
const MAX_LEVEL: usize = 16;

/// Tunable graph parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswParams {
    /// Graph degree at levels above zero
    pub m: usize,
    /// Graph degree at level zero
    pub m0: usize,
    /// Beam width during construction
    pub ef_construction: usize,
    /// Beam width during queries
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 32,
            m0: 64,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// A scored node during traversal. Orders by distance, ties broken by id so
/// heap behaviour is deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    dist: f32,
    id: u32,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Euclidean distance.
fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// The HNSW graph. Append-only: nodes are never removed.
#[derive(Debug, Serialize, Deserialize)]
pub struct HnswGraph {
    params: HnswParams,
    /// Full vector storage, indexed by node id
    vectors: Vec<Vec<f32>>,
    /// neighbors[node][level] = adjacency list; a node participates in
    /// levels 0..=its assigned level
    neighbors: Vec<Vec<Vec<u32>>>,
    /// Entry point for searches (node with the highest level)
    entry: Option<u32>,
    max_level: usize,
    /// Level sampling multiplier, 1 / ln(m)
    level_mult: f64,
}

impl HnswGraph {
    pub fn new(params: HnswParams) -> Self {
        let level_mult = 1.0 / (params.m as f64).ln();
        Self {
            params,
            vectors: Vec::new(),
            neighbors: Vec::new(),
            entry: None,
            max_level: 0,
            level_mult,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The stored vector for an internal id, if present.
    pub fn vector(&self, id: u32) -> Option<&[f32]> {
        self.vectors.get(id as usize).map(|v| v.as_slice())
    }

    /// Insert a vector, returning its internal id (dense, insertion-ordered).
    pub fn insert(&mut self, vector: Vec<f32>) -> u32 {
        let id = self.vectors.len() as u32;
        let level = self.random_level();
        self.vectors.push(vector);
        self.neighbors.push(vec![Vec::new(); level + 1]);

        let Some(entry) = self.entry else {
            self.entry = Some(id);
            self.max_level = level;
            return id;
        };

        let query = self.vectors[id as usize].clone();

        // Greedy descent through levels above the new node's level
        let mut cur = entry;
        for l in (level + 1..=self.max_level).rev() {
            cur = self.greedy_closest(&query, cur, l);
        }

        // Beam search and connect at each level the node participates in
        for l in (0..=level.min(self.max_level)).rev() {
            let found = self.search_layer(&query, cur, l, self.params.ef_construction);
            let m_max = if l == 0 { self.params.m0 } else { self.params.m };

            let selected: Vec<u32> = found.iter().take(self.params.m).map(|c| c.id).collect();
            self.neighbors[id as usize][l] = selected.clone();

            for &n in &selected {
                self.neighbors[n as usize][l].push(id);
                if self.neighbors[n as usize][l].len() > m_max {
                    self.prune(n, l, m_max);
                }
            }

            if let Some(best) = found.first() {
                cur = best.id;
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry = Some(id);
        }

        id
    }

    /// Top-k search. Returns `(id, distance)` pairs in ascending distance.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u32, f32)> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };

        let mut cur = entry;
        for l in (1..=self.max_level).rev() {
            cur = self.greedy_closest(query, cur, l);
        }

        let ef = self.params.ef_search.max(k);
        self.search_layer(query, cur, 0, ef)
            .into_iter()
            .take(k)
            .map(|c| (c.id, c.dist))
            .collect()
    }

    /// Keep only the `m_max` closest neighbours of `node` at `level`.
    fn prune(&mut self, node: u32, level: usize, m_max: usize) {
        let mut list = std::mem::take(&mut self.neighbors[node as usize][level]);
        let base = &self.vectors[node as usize];
        list.sort_by(|&a, &b| {
            l2(base, &self.vectors[a as usize]).total_cmp(&l2(base, &self.vectors[b as usize]))
        });
        list.truncate(m_max);
        self.neighbors[node as usize][level] = list;
    }

    /// Move greedily towards the query until no neighbour improves.
    fn greedy_closest(&self, query: &[f32], start: u32, level: usize) -> u32 {
        let mut cur = start;
        let mut cur_dist = l2(query, &self.vectors[cur as usize]);
        loop {
            let mut improved = false;
            for &n in self.neighbors_at(cur, level) {
                let d = l2(query, &self.vectors[n as usize]);
                if d < cur_dist {
                    cur = n;
                    cur_dist = d;
                    improved = true;
                }
            }
            if !improved {
                return cur;
            }
        }
    }

    /// Beam search within a single level. Returns candidates in ascending
    /// distance, at most `ef` of them.
    fn search_layer(&self, query: &[f32], entry: u32, level: usize, ef: usize) -> Vec<Candidate> {
        let entry_c = Candidate {
            dist: l2(query, &self.vectors[entry as usize]),
            id: entry,
        };

        let mut visited: HashSet<u32> = HashSet::new();
        visited.insert(entry);

        // Min-heap of nodes to expand, max-heap of the best results so far
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        frontier.push(Reverse(entry_c));
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
        results.push(entry_c);

        while let Some(Reverse(current)) = frontier.pop() {
            let worst = results.peek().map(|c| c.dist).unwrap_or(f32::INFINITY);
            if current.dist > worst && results.len() >= ef {
                break;
            }

            for &n in self.neighbors_at(current.id, level) {
                if !visited.insert(n) {
                    continue;
                }
                let d = l2(query, &self.vectors[n as usize]);
                let worst = results.peek().map(|c| c.dist).unwrap_or(f32::INFINITY);
                if results.len() < ef || d < worst {
                    let c = Candidate { dist: d, id: n };
                    frontier.push(Reverse(c));
                    results.push(c);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    fn neighbors_at(&self, node: u32, level: usize) -> &[u32] {
        self.neighbors[node as usize]
            .get(level)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn random_level(&self) -> usize {
        let u: f64 = rand::thread_rng().gen_range(f64::EPSILON..1.0);
        let level = (-u.ln() * self.level_mult).floor() as usize;
        level.min(MAX_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn empty_graph_returns_nothing() {
        let graph = HnswGraph::new(HnswParams::default());
        assert!(graph.search(&[1.0, 0.0], 5).is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn single_vector_is_its_own_neighbour() {
        let mut graph = HnswGraph::new(HnswParams::default());
        let id = graph.insert(vec![1.0, 0.0, 0.0]);
        let hits = graph.search(&[1.0, 0.0, 0.0], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, id);
        assert!(hits[0].1 < 1e-6);
    }

    #[test]
    fn nearest_vector_ranks_first() {
        let mut graph = HnswGraph::new(HnswParams::default());
        let a = graph.insert(vec![1.0, 0.0, 0.0]);
        let _b = graph.insert(vec![0.0, 1.0, 0.0]);
        let _c = graph.insert(vec![0.0, 0.0, 1.0]);

        let hits = graph.search(&[0.9, 0.1, 0.0], 3);
        assert_eq!(hits[0].0, a);
        // Distances ascend
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn recall_on_clustered_vectors() {
        let mut graph = HnswGraph::new(HnswParams::default());
        // Two clusters along different axes
        let mut cluster_a = Vec::new();
        for i in 0..50 {
            let mut v = unit(8, 0);
            v[1] = 0.001 * i as f32;
            cluster_a.push(graph.insert(v));
        }
        for i in 0..50 {
            let mut v = unit(8, 4);
            v[5] = 0.001 * i as f32;
            graph.insert(v);
        }

        let hits = graph.search(&unit(8, 0), 10);
        assert_eq!(hits.len(), 10);
        for (id, _) in hits {
            assert!(cluster_a.contains(&id), "hit {} from wrong cluster", id);
        }
    }

    #[test]
    fn reconstruct_returns_exact_vector() {
        let mut graph = HnswGraph::new(HnswParams::default());
        let v = vec![0.25, -0.5, 0.75];
        let id = graph.insert(v.clone());
        assert_eq!(graph.vector(id), Some(v.as_slice()));
        assert_eq!(graph.vector(99), None);
    }

    #[test]
    fn serde_round_trip_preserves_search() {
        let mut graph = HnswGraph::new(HnswParams::default());
        for i in 0..20 {
            let mut v = vec![0.0; 4];
            v[i % 4] = 1.0;
            v[(i + 1) % 4] = 0.01 * i as f32;
            graph.insert(v);
        }

        let json = serde_json::to_string(&graph).unwrap();
        let restored: HnswGraph = serde_json::from_str(&json).unwrap();

        let before = graph.search(&[1.0, 0.0, 0.0, 0.0], 5);
        let after = restored.search(&[1.0, 0.0, 0.0, 0.0], 5);
        assert_eq!(before, after);
        assert_eq!(graph.len(), restored.len());
    }
}
