//! arXiv identifier extraction and version parsing

use regex_lite::Regex;
use std::sync::OnceLock;

use super::PaperMetadata;

/// `2103.12345` optionally followed by `v2`, on word boundaries.
fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4}\.\d{4,5})(v\d+)?\b").unwrap())
}

/// Bracketed arXiv tag in titles, e.g. `[arXiv:2103.12345v2]`.
fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[arXiv[:\s]*(\d{4}\.\d{4,5})(v\d+)?\]").unwrap()
    })
}

/// Extract an arXiv id (with optional version suffix) from paper metadata.
///
/// Checks the explicit `arxiv_id` field first, then arxiv.org URLs, then a
/// bracketed tag in the title.
pub fn extract_arxiv_id(metadata: &PaperMetadata) -> Option<String> {
    if let Some(ref id) = metadata.arxiv_id {
        let id = id.trim();
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    for url in [&metadata.url, &metadata.pdf_url, &metadata.source_url]
        .into_iter()
        .flatten()
    {
        if !url.contains("arxiv.org") {
            continue;
        }
        if let Some(caps) = id_regex().captures(url) {
            let base = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let version = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            return Some(format!("{}{}", base, version));
        }
    }

    if let Some(ref title) = metadata.title {
        if let Some(caps) = title_regex().captures(title) {
            let base = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let version = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            return Some(format!("{}{}", base, version));
        }
    }

    None
}

/// Split an arXiv id into `(base_id, version)`. Ids without a version
/// suffix are version 1.
pub fn parse_version(arxiv_id: &str) -> (String, u32) {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(.+)v(\d+)$").unwrap());
    if let Some(caps) = re.captures(arxiv_id) {
        if let Ok(version) = caps[2].parse::<u32>() {
            return (caps[1].to_string(), version);
        }
    }
    (arxiv_id.to_string(), 1)
}
