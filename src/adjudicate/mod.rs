//! Claim-pair adjudication
//!
//! Decides whether and how a claim pair is adjudicated and caches the
//! result under a canonical symmetric key. The adjudicator itself is an
//! external black box behind the [`crate::provider::Adjudicator`] trait;
//! this module owns the cache, the two-tier similarity pre-filter, evidence
//! retrieval, citation extraction, and the human-review flag policy.

mod cache;
mod engine;

pub use cache::{canonical_key, DebateCache};
pub use engine::{AdjudicationError, AdjudicationResult, PairEngine};

use crate::calibration::ConfidenceBand;
use crate::claim::ClaimId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// The relational label between two claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Refutes,
    Supports,
    Extends,
    Uncertain,
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "refutes" => Ok(Verdict::Refutes),
            "supports" => Ok(Verdict::Supports),
            "extends" => Ok(Verdict::Extends),
            "uncertain" => Ok(Verdict::Uncertain),
            _ => Err(format!("Unknown verdict: {}", s)),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Refutes => "refutes",
            Verdict::Supports => "supports",
            Verdict::Extends => "extends",
            Verdict::Uncertain => "uncertain",
        };
        write!(f, "{}", s)
    }
}

/// The structured outcome of one adjudication.
///
/// Immutable; stored in the debate cache and serialised onto graph edges.
/// Citations and per-agent confidences use BTree containers so iteration
/// order is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateResult {
    pub verdict: Verdict,
    /// Raw adjudicator confidence in [0, 1]
    pub raw_confidence: f64,
    /// Calibrated probability in [0, 1]
    pub calibrated_confidence: f64,
    pub band: ConfidenceBand,
    /// Evidence claim ids cited in the transcript
    pub citations: BTreeSet<ClaimId>,
    pub requires_human: bool,
    /// Ordered transcript lines
    pub transcript: Vec<String>,
    pub agent_confidences: BTreeMap<String, f64>,
}
