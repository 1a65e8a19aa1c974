//! Core claim data model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Unique identifier for a claim
///
/// Serializes as a plain string. Derived ids take the form
/// `{paper_id}_{hash64(text) % 100000}` (see [`ClaimId::derive`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(String);

impl ClaimId {
    /// Create a ClaimId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a stable id from the paper id and the claim text.
    ///
    /// Uses the first 8 bytes of the BLAKE3 digest as a big-endian u64,
    /// reduced mod 100000. Collisions within a paper are possible and are
    /// the caller's responsibility to log.
    pub fn derive(paper_id: &str, text: &str) -> Self {
        Self(format!("{}_{}", paper_id, hash64(text) % 100_000))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClaimId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClaimId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Stable 64-bit content hash (BLAKE3, first 8 bytes, big-endian).
fn hash64(text: &str) -> u64 {
    let digest = blake3::hash(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(bytes)
}

/// Claim type classification
///
/// Lowercase string enum on the wire, matching the graph schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    /// Empirical result
    Finding,
    /// Methodological contribution
    Method,
    /// Downstream consequence drawn by the authors
    Implication,
    /// Untested proposition
    Hypothesis,
}

impl FromStr for ClaimType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "finding" => Ok(ClaimType::Finding),
            "method" => Ok(ClaimType::Method),
            "implication" => Ok(ClaimType::Implication),
            "hypothesis" => Ok(ClaimType::Hypothesis),
            _ => Err(format!("Unknown claim type: {}", s)),
        }
    }
}

impl std::fmt::Display for ClaimType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClaimType::Finding => "finding",
            ClaimType::Method => "method",
            ClaimType::Implication => "implication",
            ClaimType::Hypothesis => "hypothesis",
        };
        write!(f, "{}", s)
    }
}

/// An atomic assertion extracted from a paper section.
///
/// Claims are immutable once created. The embedding is required for
/// indexing and for the adjudication pre-filter; vectors are assumed
/// unit-norm and are never renormalised here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Stable identifier
    pub id: ClaimId,
    /// Paper this claim was extracted from
    pub paper_id: String,
    /// Section name within the paper
    pub section: String,
    /// Classification
    pub claim_type: ClaimType,
    /// The claim text itself
    pub text: String,
    /// Extractor confidence in [0, 1]
    pub confidence: f64,
    /// Supporting snippets from the source text
    pub evidence_snippets: Vec<String>,
    /// Dense embedding of fixed dimension
    pub embedding: Vec<f32>,
}

impl Claim {
    /// Create a claim with a derived id.
    pub fn new(
        paper_id: impl Into<String>,
        section: impl Into<String>,
        claim_type: ClaimType,
        text: impl Into<String>,
    ) -> Self {
        let paper_id = paper_id.into();
        let text = text.into();
        Self {
            id: ClaimId::derive(&paper_id, &text),
            paper_id,
            section: section.into(),
            claim_type,
            text,
            confidence: 0.0,
            evidence_snippets: Vec::new(),
            embedding: Vec::new(),
        }
    }

    /// Attach an embedding vector
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Set the extractor confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// A search hit from the vector index.
///
/// Produced on the fly; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceHit {
    pub claim_id: ClaimId,
    pub text: String,
    /// Similarity in (0, 1], computed as 1 / (1 + L2 distance)
    pub similarity: f64,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Paper-level metadata persisted by the graph backend and referenced by
/// claims.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paper {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub raw_text: Option<String>,
    pub summary_embedding: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_id_is_stable() {
        let a = ClaimId::derive("paper1", "Self-attention improves translation quality.");
        let b = ClaimId::derive("paper1", "Self-attention improves translation quality.");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("paper1_"));
    }

    #[test]
    fn derived_id_suffix_in_range() {
        let id = ClaimId::derive("p", "some claim text");
        let suffix: u64 = id.as_str().rsplit('_').next().unwrap().parse().unwrap();
        assert!(suffix < 100_000);
    }

    #[test]
    fn different_text_different_id() {
        let a = ClaimId::derive("p", "claim one");
        let b = ClaimId::derive("p", "claim two");
        assert_ne!(a, b);
    }

    #[test]
    fn claim_type_round_trips_through_str() {
        for (s, t) in [
            ("finding", ClaimType::Finding),
            ("method", ClaimType::Method),
            ("implication", ClaimType::Implication),
            ("hypothesis", ClaimType::Hypothesis),
        ] {
            assert_eq!(s.parse::<ClaimType>().unwrap(), t);
            assert_eq!(t.to_string(), s);
        }
        assert!("conjecture".parse::<ClaimType>().is_err());
    }

    #[test]
    fn claim_id_serializes_transparent() {
        let id = ClaimId::from_string("p1_42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1_42\"");
    }
}
