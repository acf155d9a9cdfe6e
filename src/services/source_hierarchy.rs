//! Source credibility tiers.
//!
//! URLs are matched against known domain patterns first; when nothing
//! matches, title keywords decide, and unknown sources land in `Blogs`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    PeerReviewed,
    Government,
    News,
    Blogs,
    Social,
    Forums,
}

impl SourceTier {
    /// Credibility from 1 (lowest) to 5.
    pub const fn credibility(self) -> u8 {
        match self {
            Self::PeerReviewed => 5,
            Self::Government => 4,
            Self::News => 3,
            Self::Blogs => 2,
            Self::Social | Self::Forums => 1,
        }
    }
}

const URL_PATTERNS: &[(&str, SourceTier)] = &[
    (r"\.gov(\.[a-z]{2})?(/|$)", SourceTier::Government),
    (r"\.edu(/|$)", SourceTier::PeerReviewed),
    (r"pubmed\.ncbi|arxiv\.org|doi\.org|scholar\.google", SourceTier::PeerReviewed),
    (r"nature\.com|science\.org|springer\.com|wiley\.com", SourceTier::PeerReviewed),
    (r"lancet\.com|nejm\.org|bmj\.com|plos\.org", SourceTier::PeerReviewed),
    (r"reuters\.com|apnews\.com|bbc\.(com|co\.uk)", SourceTier::News),
    (r"nytimes\.com|washingtonpost\.com|theguardian\.com", SourceTier::News),
    (r"cnn\.com|npr\.org|aljazeera\.com", SourceTier::News),
    (r"medium\.com|substack\.com|wordpress\.com|blogspot", SourceTier::Blogs),
    (r"twitter\.com|\bx\.com|facebook\.com|instagram\.com", SourceTier::Social),
    (r"tiktok\.com|youtube\.com", SourceTier::Social),
    (r"reddit\.com|stackexchange\.com|stackoverflow\.com", SourceTier::Forums),
    (r"quora\.com|discourse\.|forum\.", SourceTier::Forums),
];

const TITLE_KEYWORDS: &[(SourceTier, &[&str])] = &[
    (
        SourceTier::PeerReviewed,
        &["journal", "proceedings", "et al.", "doi:", "abstract", "peer-reviewed", "study", "meta-analysis"],
    ),
    (
        SourceTier::Government,
        &["department of", "ministry of", "official", "federal", "national institute", "census", "bureau of"],
    ),
    (
        SourceTier::News,
        &["breaking", "reported", "correspondent", "editorial", "news", "press release"],
    ),
    (SourceTier::Blogs, &["blog", "opinion", "personal", "my thoughts"]),
    (SourceTier::Social, &["tweet", "post", "thread", "shared"]),
    (SourceTier::Forums, &["forum", "discussion", "q&a", "answered"]),
];

fn url_patterns() -> &'static [(Regex, SourceTier)] {
    static PATTERNS: OnceLock<Vec<(Regex, SourceTier)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        URL_PATTERNS
            .iter()
            .filter_map(|(pattern, tier)| Regex::new(pattern).ok().map(|re| (re, *tier)))
            .collect()
    })
}

/// Classify a source by URL, falling back to title keywords.
pub fn classify_source(url: &str, title: &str) -> SourceTier {
    let url = url.to_lowercase();
    if let Some((_, tier)) = url_patterns().iter().find(|(re, _)| re.is_match(&url)) {
        return *tier;
    }

    let title = title.to_lowercase();
    let mut best = SourceTier::Blogs;
    let mut best_count = 0;
    for (tier, keywords) in TITLE_KEYWORDS {
        let count = keywords.iter().filter(|kw| title.contains(*kw)).count();
        if count > best_count {
            best_count = count;
            best = *tier;
        }
    }
    best
}

/// Credibility (1-5) of a bare source reference.
pub fn rank_source(url: &str) -> u8 {
    classify_source(url, "").credibility()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(url_patterns().len(), URL_PATTERNS.len());
    }

    #[test]
    fn test_url_classification() {
        assert_eq!(classify_source("https://www.cdc.gov/flu", ""), SourceTier::Government);
        assert_eq!(classify_source("https://arxiv.org/abs/1234", ""), SourceTier::PeerReviewed);
        assert_eq!(classify_source("https://www.mit.edu/", ""), SourceTier::PeerReviewed);
        assert_eq!(classify_source("https://www.reuters.com/world", ""), SourceTier::News);
        assert_eq!(classify_source("https://someone.substack.com/p/x", ""), SourceTier::Blogs);
        assert_eq!(classify_source("https://www.youtube.com/watch", ""), SourceTier::Social);
        assert_eq!(classify_source("https://stackoverflow.com/q/1", ""), SourceTier::Forums);
    }

    #[test]
    fn test_title_fallback_and_default() {
        assert_eq!(
            classify_source("https://example.org", "A meta-analysis published in a journal"),
            SourceTier::PeerReviewed
        );
        assert_eq!(classify_source("https://example.org", "Untitled"), SourceTier::Blogs);
    }

    #[test]
    fn test_rank() {
        assert_eq!(rank_source("https://doi.org/10.1/abc"), 5);
        assert_eq!(rank_source("https://example.org"), 2);
    }
}
