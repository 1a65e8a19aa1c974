//! Heuristic sentence extractor
//!
//! A deterministic, model-free `Extractor`: splits the paper into sections
//! on markdown-style headers and takes the first substantial sentences of
//! each section as `finding` claims. Serves as the default wiring when no
//! model-backed extractor is configured; also the workhorse for tests.

use super::{Extractor, ProviderResult};
use crate::claim::{Claim, ClaimType};
use async_trait::async_trait;

/// Claims taken per section, at most.
const MAX_CLAIMS_PER_SECTION: usize = 5;
/// Sentences shorter than this are noise, not claims.
const MIN_SENTENCE_LEN: usize = 20;
/// Extractor confidence attached to heuristic claims.
const HEURISTIC_CONFIDENCE: f64 = 0.7;

/// Sentence-splitting extractor.
#[derive(Debug, Clone, Default)]
pub struct SentenceExtractor;

impl SentenceExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Split text into `(section_name, body)` pairs on `## ` headers; text
    /// before the first header lands in "Main".
    fn split_sections(text: &str) -> Vec<(String, String)> {
        let mut sections: Vec<(String, String)> = Vec::new();
        let mut current_name = "Main".to_string();
        let mut current_body = String::new();

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(header) = trimmed.strip_prefix("## ") {
                if !current_body.trim().is_empty() {
                    sections.push((current_name.clone(), current_body.clone()));
                }
                current_name = header.trim().to_string();
                current_body.clear();
            } else {
                current_body.push_str(line);
                current_body.push('\n');
            }
        }
        if !current_body.trim().is_empty() {
            sections.push((current_name, current_body));
        }
        sections
    }
}

#[async_trait]
impl Extractor for SentenceExtractor {
    async fn extract(&self, text: &str, paper_id: &str) -> ProviderResult<Vec<Claim>> {
        let mut claims = Vec::new();

        for (section, body) in Self::split_sections(text) {
            let mut taken = 0;
            for sentence in body.split('.') {
                if taken >= MAX_CLAIMS_PER_SECTION {
                    break;
                }
                let sentence = sentence.trim().replace('\n', " ");
                if sentence.len() < MIN_SENTENCE_LEN {
                    continue;
                }
                let claim = Claim::new(paper_id, section.clone(), ClaimType::Finding, &sentence)
                    .with_confidence(HEURISTIC_CONFIDENCE);
                claims.push(Claim {
                    evidence_snippets: vec![sentence],
                    ..claim
                });
                taken += 1;
            }
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER: &str = "\
## Method
We used a transformer-based architecture with self-attention mechanisms.
The model achieved strong accuracy on the validation set.

## Results
Our approach outperforms all baselines by a significant margin.
Ok. Tiny.
";

    #[tokio::test]
    async fn extracts_sentences_per_section() {
        let extractor = SentenceExtractor::new();
        let claims = extractor.extract(PAPER, "p1").await.unwrap();

        assert!(claims.len() >= 3);
        assert!(claims.iter().any(|c| c.section == "Method"));
        assert!(claims.iter().any(|c| c.section == "Results"));
        // Short fragments are dropped
        assert!(claims.iter().all(|c| c.text.len() >= MIN_SENTENCE_LEN));
        for claim in &claims {
            assert_eq!(claim.paper_id, "p1");
            assert_eq!(claim.confidence, HEURISTIC_CONFIDENCE);
            assert!(claim.id.as_str().starts_with("p1_"));
        }
    }

    #[tokio::test]
    async fn empty_text_yields_no_claims() {
        let extractor = SentenceExtractor::new();
        assert!(extractor.extract("", "p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn headerless_text_goes_to_main() {
        let extractor = SentenceExtractor::new();
        let claims = extractor
            .extract("A single substantial sentence about transformers.", "p1")
            .await
            .unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].section, "Main");
    }

    #[tokio::test]
    async fn extraction_is_deterministic() {
        let extractor = SentenceExtractor::new();
        let a = extractor.extract(PAPER, "p1").await.unwrap();
        let b = extractor.extract(PAPER, "p1").await.unwrap();
        let ids_a: Vec<_> = a.iter().map(|c| c.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
