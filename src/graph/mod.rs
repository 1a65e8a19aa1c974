//! Causal claim graph and topology queries

mod causal;
mod topology;

pub use causal::{CausalGraph, GraphError, GraphResult};
pub use topology::{Contradiction, FrontierEdge, GapType, MirrorEdge, TopologyView};
