//! In-memory topology view
//!
//! A directed multigraph mirror of the persisted claim graph, sized for
//! interactive structural queries: contradictions, unsupported claims,
//! frontier edges, evidence paths, and PageRank importance. Node and edge
//! iteration follow insertion order.

use crate::adjudicate::Verdict;
use crate::claim::ClaimId;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// PageRank damping factor.
const PAGERANK_DAMPING: f64 = 0.85;
/// PageRank convergence tolerance (per-node, summed as N * tol).
const PAGERANK_TOLERANCE: f64 = 1e-6;
/// PageRank iteration cap.
const PAGERANK_MAX_ITERATIONS: usize = 100;

/// A mirrored edge.
#[derive(Debug, Clone)]
pub struct MirrorEdge {
    pub from: ClaimId,
    pub to: ClaimId,
    pub relation: Verdict,
    pub confidence: f64,
    pub citations: Vec<ClaimId>,
}

/// Research-gap classification for a frontier edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    MethodologicalGap,
    ValidationNeeded,
    FrontierSynthesis,
}

/// A low-confidence edge between well-connected claims.
#[derive(Debug, Clone, Serialize)]
pub struct FrontierEdge {
    pub claim_a: ClaimId,
    pub claim_b: ClaimId,
    pub confidence: f64,
    pub relation: Verdict,
    pub gap_type: GapType,
}

/// A high-confidence refutation: `(from, to, citations)`.
pub type Contradiction = (ClaimId, ClaimId, Vec<ClaimId>);

/// The topology mirror. Not internally synchronised; the owning graph
/// guards it with a readers-writer lock.
#[derive(Debug, Default)]
pub struct TopologyView {
    /// Insertion-ordered node list
    nodes: Vec<ClaimId>,
    node_set: HashSet<ClaimId>,
    /// Insertion-ordered edge list
    edges: Vec<MirrorEdge>,
    /// node → indices into `edges` (outgoing)
    out_edges: HashMap<ClaimId, Vec<usize>>,
    /// node → indices into `edges` (incoming)
    in_edges: HashMap<ClaimId, Vec<usize>>,
}

impl TopologyView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, id: &ClaimId) -> bool {
        self.node_set.contains(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[ClaimId] {
        &self.nodes
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[MirrorEdge] {
        &self.edges
    }

    /// Add a node; duplicate adds are no-ops.
    pub fn add_node(&mut self, id: ClaimId) {
        if self.node_set.insert(id.clone()) {
            self.nodes.push(id);
        }
    }

    /// Add a directed edge. Endpoints must already be present.
    pub fn add_edge(&mut self, edge: MirrorEdge) {
        let idx = self.edges.len();
        self.out_edges.entry(edge.from.clone()).or_default().push(idx);
        self.in_edges.entry(edge.to.clone()).or_default().push(idx);
        self.edges.push(edge);
    }

    /// Whether any edge connects the unordered pair `{a, b}`.
    pub fn has_edge_between(&self, a: &ClaimId, b: &ClaimId) -> bool {
        self.out_edges
            .get(a)
            .into_iter()
            .flatten()
            .any(|&i| self.edges[i].to == *b)
            || self
                .out_edges
                .get(b)
                .into_iter()
                .flatten()
                .any(|&i| self.edges[i].to == *a)
    }

    /// Total degree (in + out) of a node.
    pub fn degree(&self, id: &ClaimId) -> usize {
        self.out_edges.get(id).map(|v| v.len()).unwrap_or(0)
            + self.in_edges.get(id).map(|v| v.len()).unwrap_or(0)
    }

    /// Every `refutes` edge at or above `min_confidence`, in insertion
    /// order.
    pub fn find_contradictions(&self, min_confidence: f64) -> Vec<Contradiction> {
        self.edges
            .iter()
            .filter(|e| e.relation == Verdict::Refutes && e.confidence >= min_confidence)
            .map(|e| (e.from.clone(), e.to.clone(), e.citations.clone()))
            .collect()
    }

    /// Nodes with no incoming `supports` edge and degree at least
    /// `min_degree`, in insertion order.
    pub fn find_unsupported(&self, min_degree: usize) -> Vec<ClaimId> {
        self.nodes
            .iter()
            .filter(|&id| {
                let supported = self
                    .in_edges
                    .get(id)
                    .map(|idxs| {
                        idxs.iter()
                            .any(|&i| self.edges[i].relation == Verdict::Supports)
                    })
                    .unwrap_or(false);
                !supported && self.degree(id) >= min_degree
            })
            .cloned()
            .collect()
    }

    /// Low-confidence edges between well-connected nodes, each tagged with
    /// a gap classification.
    pub fn find_frontier(&self, max_confidence: f64, min_degree: usize) -> Vec<FrontierEdge> {
        self.edges
            .iter()
            .filter(|e| {
                e.confidence < max_confidence
                    && self.degree(&e.from) >= min_degree
                    && self.degree(&e.to) >= min_degree
            })
            .map(|e| FrontierEdge {
                claim_a: e.from.clone(),
                claim_b: e.to.clone(),
                confidence: e.confidence,
                relation: e.relation,
                gap_type: classify_gap(e.relation, e.confidence),
            })
            .collect()
    }

    /// Shortest path between two claims in the undirected projection,
    /// endpoints included. Empty when no path exists or either endpoint is
    /// unknown.
    pub fn evidence_path(&self, a: &ClaimId, b: &ClaimId) -> Vec<ClaimId> {
        if !self.contains(a) || !self.contains(b) {
            return Vec::new();
        }
        if a == b {
            return vec![a.clone()];
        }

        let mut visited: HashSet<&ClaimId> = HashSet::new();
        let mut predecessors: HashMap<&ClaimId, &ClaimId> = HashMap::new();
        let mut queue: VecDeque<&ClaimId> = VecDeque::new();
        visited.insert(a);
        queue.push_back(a);

        'bfs: while let Some(current) = queue.pop_front() {
            let out = self.out_edges.get(current).into_iter().flatten();
            let inc = self.in_edges.get(current).into_iter().flatten();
            for &idx in out.chain(inc) {
                let edge = &self.edges[idx];
                let neighbour = if &edge.from == current {
                    &edge.to
                } else {
                    &edge.from
                };
                if !visited.insert(neighbour) {
                    continue;
                }
                predecessors.insert(neighbour, current);
                if neighbour == b {
                    break 'bfs;
                }
                queue.push_back(neighbour);
            }
        }

        if !predecessors.contains_key(b) {
            return Vec::new();
        }

        let mut path = vec![b.clone()];
        let mut current = b;
        while let Some(&pred) = predecessors.get(current) {
            path.push(pred.clone());
            current = pred;
        }
        path.reverse();
        path
    }

    /// PageRank score of one claim over the directed mirror.
    pub fn importance(&self, id: &ClaimId) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        self.pagerank().remove(id).unwrap_or(0.0)
    }

    /// Full PageRank: damping 0.85, tolerance 1e-6, at most 100
    /// iterations. Dangling mass is redistributed uniformly.
    pub fn pagerank(&self) -> HashMap<ClaimId, f64> {
        let n = self.nodes.len();
        if n == 0 {
            return HashMap::new();
        }

        let uniform = 1.0 / n as f64;
        let mut ranks: HashMap<&ClaimId, f64> =
            self.nodes.iter().map(|id| (id, uniform)).collect();

        for _ in 0..PAGERANK_MAX_ITERATIONS {
            let dangling_mass: f64 = self
                .nodes
                .iter()
                .filter(|id| self.out_edges.get(*id).map(|v| v.is_empty()).unwrap_or(true))
                .map(|id| ranks[id])
                .sum();

            let mut next: HashMap<&ClaimId, f64> = self
                .nodes
                .iter()
                .map(|id| {
                    (
                        id,
                        (1.0 - PAGERANK_DAMPING) * uniform
                            + PAGERANK_DAMPING * dangling_mass * uniform,
                    )
                })
                .collect();

            for edge in &self.edges {
                let out_degree = self.out_edges[&edge.from].len() as f64;
                let share = PAGERANK_DAMPING * ranks[&edge.from] / out_degree;
                if let Some(rank) = next.get_mut(&edge.to) {
                    *rank += share;
                }
            }

            let err: f64 = self
                .nodes
                .iter()
                .map(|id| (next[id] - ranks[id]).abs())
                .sum();
            ranks = next;
            if err < n as f64 * PAGERANK_TOLERANCE {
                break;
            }
        }

        ranks.into_iter().map(|(id, r)| (id.clone(), r)).collect()
    }
}

fn classify_gap(relation: Verdict, confidence: f64) -> GapType {
    if relation == Verdict::Refutes && confidence < 0.7 {
        GapType::MethodologicalGap
    } else if relation == Verdict::Uncertain {
        GapType::ValidationNeeded
    } else {
        GapType::FrontierSynthesis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ClaimId {
        ClaimId::from(s)
    }

    fn edge(from: &str, to: &str, relation: Verdict, confidence: f64) -> MirrorEdge {
        MirrorEdge {
            from: id(from),
            to: id(to),
            relation,
            confidence,
            citations: Vec::new(),
        }
    }

    fn view_with_nodes(ids: &[&str]) -> TopologyView {
        let mut view = TopologyView::new();
        for s in ids {
            view.add_node(id(s));
        }
        view
    }

    #[test]
    fn contradictions_respect_the_threshold() {
        let mut view = view_with_nodes(&["c1", "c2", "c3", "c4"]);
        let mut high = edge("c1", "c2", Verdict::Refutes, 0.90);
        high.citations = vec![id("e1")];
        view.add_edge(high);
        view.add_edge(edge("c3", "c4", Verdict::Refutes, 0.70));
        view.add_edge(edge("c1", "c3", Verdict::Supports, 0.95));

        let found = view.find_contradictions(0.85);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, id("c1"));
        assert_eq!(found[0].1, id("c2"));
        assert_eq!(found[0].2, vec![id("e1")]);
    }

    #[test]
    fn unsupported_excludes_supported_nodes() {
        let mut view = view_with_nodes(&["c1", "c2", "c3"]);
        view.add_edge(edge("c1", "c2", Verdict::Supports, 0.9));

        // c2 has incoming supports; c1 and c3 do not
        let unsupported = view.find_unsupported(0);
        assert_eq!(unsupported, vec![id("c1"), id("c3")]);
    }

    #[test]
    fn unsupported_honours_min_degree() {
        let mut view = view_with_nodes(&["c1", "c2", "c3"]);
        view.add_edge(edge("c1", "c2", Verdict::Refutes, 0.9));

        // Degree: c1=1, c2=1, c3=0
        let unsupported = view.find_unsupported(1);
        assert_eq!(unsupported, vec![id("c1"), id("c2")]);
    }

    #[test]
    fn frontier_requires_connectivity_and_low_confidence() {
        let mut view = view_with_nodes(&["a", "b", "c", "d"]);
        // Build degree >= 3 on a and b
        view.add_edge(edge("a", "b", Verdict::Uncertain, 0.4));
        view.add_edge(edge("a", "c", Verdict::Supports, 0.9));
        view.add_edge(edge("c", "a", Verdict::Supports, 0.9));
        view.add_edge(edge("b", "c", Verdict::Supports, 0.9));
        view.add_edge(edge("d", "b", Verdict::Supports, 0.9));

        let frontier = view.find_frontier(0.6, 3);
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier[0].claim_a, id("a"));
        assert_eq!(frontier[0].claim_b, id("b"));
        assert_eq!(frontier[0].gap_type, GapType::ValidationNeeded);
    }

    #[test]
    fn gap_classification() {
        assert_eq!(
            classify_gap(Verdict::Refutes, 0.5),
            GapType::MethodologicalGap
        );
        assert_eq!(
            classify_gap(Verdict::Uncertain, 0.5),
            GapType::ValidationNeeded
        );
        assert_eq!(
            classify_gap(Verdict::Extends, 0.5),
            GapType::FrontierSynthesis
        );
        // refutes at or above 0.7 is not a methodological gap
        assert_eq!(
            classify_gap(Verdict::Refutes, 0.7),
            GapType::FrontierSynthesis
        );
    }

    #[test]
    fn evidence_path_ignores_direction() {
        let mut view = view_with_nodes(&["a", "b", "c"]);
        view.add_edge(edge("a", "b", Verdict::Supports, 0.9));
        view.add_edge(edge("c", "b", Verdict::Supports, 0.9));

        // a -> b <- c is connected undirected
        let path = view.evidence_path(&id("a"), &id("c"));
        assert_eq!(path, vec![id("a"), id("b"), id("c")]);
    }

    #[test]
    fn evidence_path_empty_when_disconnected() {
        let mut view = view_with_nodes(&["a", "b", "c"]);
        view.add_edge(edge("a", "b", Verdict::Supports, 0.9));
        assert!(view.evidence_path(&id("a"), &id("c")).is_empty());
        assert!(view.evidence_path(&id("a"), &id("ghost")).is_empty());
    }

    #[test]
    fn evidence_path_to_self_is_singleton() {
        let view = view_with_nodes(&["a"]);
        assert_eq!(view.evidence_path(&id("a"), &id("a")), vec![id("a")]);
    }

    #[test]
    fn pagerank_sums_to_one() {
        let mut view = view_with_nodes(&["a", "b", "c", "d"]);
        view.add_edge(edge("a", "b", Verdict::Supports, 0.9));
        view.add_edge(edge("c", "b", Verdict::Supports, 0.9));
        view.add_edge(edge("d", "b", Verdict::Supports, 0.9));

        let ranks = view.pagerank();
        let total: f64 = ranks.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        // b receives all the links and must rank highest
        let b_rank = ranks[&id("b")];
        for other in ["a", "c", "d"] {
            assert!(b_rank > ranks[&id(other)]);
        }
    }

    #[test]
    fn importance_of_unknown_node_is_zero() {
        let view = view_with_nodes(&["a"]);
        assert_eq!(view.importance(&id("ghost")), 0.0);
        assert!(view.importance(&id("a")) > 0.0);
    }

    #[test]
    fn empty_graph_importance_is_zero() {
        let view = TopologyView::new();
        assert_eq!(view.importance(&id("a")), 0.0);
    }

    #[test]
    fn duplicate_node_adds_are_noops() {
        let mut view = TopologyView::new();
        view.add_node(id("a"));
        view.add_node(id("a"));
        assert_eq!(view.node_count(), 1);
    }
}
