//! Relevance of materialised candidates to the words spoken over them.
//!
//! Scores are additive: every script keyword that equals a candidate term
//! earns [`SCORE_EXACT_KEYWORD`], one that only overlaps earns
//! [`SCORE_PARTIAL_KEYWORD`], and a candidate whose category is the one the
//! text leans on most earns [`SCORE_CATEGORY_ALIGNMENT`] on top.

use std::cmp::Reverse;

use engine::SourceTier;

use crate::config::{CategoryRule, ResolverConfig};
use crate::retrieval::query::{classify_category, extract_keywords};
use crate::retrieval::AssetCandidate;

pub const SCORE_EXACT_KEYWORD: u32 = 10;
pub const SCORE_PARTIAL_KEYWORD: u32 = 5;
pub const SCORE_CATEGORY_ALIGNMENT: u32 = 15;

/// Deducted from a pick that would extend a run of one category past the
/// configured limit.
pub const VARIETY_PENALTY: i64 = 20;

#[derive(Debug, Clone, Default)]
pub struct ClipScorer {
    table: Vec<CategoryRule>,
}

impl ClipScorer {
    pub fn new(table: Vec<CategoryRule>) -> Self {
        ClipScorer { table }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        ClipScorer::new(config.category_table.clone())
    }

    /// The category whose keywords the text hits hardest. Exact hits weigh
    /// twice a partial one; the earlier rule wins a tie.
    pub fn dominant_category(&self, keywords: &[String]) -> Option<&str> {
        let mut best: Option<(&str, u32)> = None;
        for rule in &self.table {
            let weight: u32 = keywords
                .iter()
                .flat_map(|kw| rule.keywords.iter().map(move |term| term_weight(kw, term)))
                .sum();
            if weight > 0 && best.map_or(true, |(_, top)| weight > top) {
                best = Some((rule.name.as_str(), weight));
            }
        }
        best.map(|(name, _)| name)
    }

    /// Words a candidate is known by: its URI, the file name of local
    /// footage, and the keyword list of its category.
    fn terms(&self, candidate: &AssetCandidate) -> Vec<String> {
        let mut terms = extract_keywords(&candidate.uri);
        if candidate.source_tier == SourceTier::Local {
            if let Some(stem) = candidate.path.file_stem().and_then(|s| s.to_str()) {
                terms.extend(extract_keywords(stem));
            }
        }
        if let Some(rule) = candidate
            .category
            .as_deref()
            .and_then(|name| self.table.iter().find(|r| r.name.eq_ignore_ascii_case(name)))
        {
            terms.extend(rule.keywords.iter().map(|k| k.to_lowercase()));
        }
        terms.sort();
        terms.dedup();
        terms
    }

    /// Explicit category first, then whatever the candidate's own words
    /// classify as, then the query that found it.
    pub fn category_of(&self, candidate: &AssetCandidate, query: &str) -> Option<String> {
        if let Some(category) = &candidate.category {
            return Some(category.clone());
        }
        let own = self.terms(candidate).join(" ");
        classify_category(&own, &self.table)
            .or_else(|| classify_category(query, &self.table))
            .map(str::to_string)
    }

    pub fn score(&self, text: &str, candidate: &AssetCandidate) -> u32 {
        let keywords = extract_keywords(text);
        if keywords.is_empty() {
            return 0;
        }
        let terms = self.terms(candidate);
        let mut score: u32 = keywords
            .iter()
            .flat_map(|kw| terms.iter().map(move |term| keyword_score(kw, term)))
            .sum();

        let aligned = match (self.dominant_category(&keywords), candidate.category.as_deref()) {
            (Some(dominant), Some(category)) => dominant.eq_ignore_ascii_case(category),
            _ => false,
        };
        if aligned {
            score += SCORE_CATEGORY_ALIGNMENT;
        }
        score
    }

    /// Fill in missing categories, score every candidate against `text` and
    /// order best first. Equal scores keep their resolution order.
    pub fn rank(&self, text: &str, query: &str, found: &mut [AssetCandidate]) {
        for candidate in found.iter_mut() {
            if candidate.category.is_none() {
                candidate.category = self.category_of(candidate, query);
            }
            candidate.score = self.score(text, candidate);
        }
        found.sort_by_key(|c| Reverse(c.score));
    }
}

fn keyword_score(keyword: &str, term: &str) -> u32 {
    if keyword == term {
        SCORE_EXACT_KEYWORD
    } else if keyword.contains(term) || term.contains(keyword) {
        SCORE_PARTIAL_KEYWORD
    } else {
        0
    }
}

fn term_weight(keyword: &str, term: &str) -> u32 {
    match keyword_score(keyword, term) {
        SCORE_EXACT_KEYWORD => 2,
        SCORE_PARTIAL_KEYWORD => 1,
        _ => 0,
    }
}

/// Whether binding `category` next would make it appear more than
/// `max_run` times in a row. Unknown categories never count as a run.
pub fn breaks_variety(recent: &[Option<String>], category: Option<&str>, max_run: usize) -> bool {
    let Some(category) = category else {
        return false;
    };
    if max_run == 0 || recent.len() < max_run {
        return false;
    }
    recent[recent.len() - max_run..]
        .iter()
        .all(|c| c.as_deref() == Some(category))
}
