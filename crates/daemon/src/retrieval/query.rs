//! Pure query shaping: keywords, category lookup, cleanup and weak-term
//! replacement. Nothing here touches the network.

use std::collections::BTreeMap;

use crate::config::{CategoryRule, ResolverConfig};

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "been", "be", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "can", "this", "that", "these",
    "those", "i", "you", "he", "she", "it", "we", "they", "what", "which", "who", "when",
    "where", "why", "how", "your", "our", "their",
];

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lowercase content words of at least three characters.
pub fn extract_keywords(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn contains_phrase(padded: &str, phrase: &str) -> bool {
    let phrase = words(phrase).join(" ");
    !phrase.is_empty() && padded.contains(&format!(" {phrase} "))
}

/// First rule with a keyword (or multi-word phrase) present in the query.
pub fn classify_category<'a>(query: &str, table: &'a [CategoryRule]) -> Option<&'a str> {
    let padded = format!(" {} ", words(query).join(" "));
    table
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| contains_phrase(&padded, k)))
        .map(|rule| rule.name.as_str())
}

/// Drop technical words and map brand or jargon terms to searchable tags.
pub fn clean_query(query: &str, technical_words: &[String], term_map: &BTreeMap<String, String>) -> String {
    query
        .split_whitespace()
        .map(|token| {
            token
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
                .to_lowercase()
        })
        .filter(|token| !token.is_empty() && !technical_words.contains(token))
        .map(|token| term_map.get(&token).cloned().unwrap_or(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace a query that leans on weak atmospheric terms, unless it also
/// names a concrete subject from the exception list.
pub fn apply_weak_filter(
    query: &str,
    weak_terms: &[String],
    exception_terms: &[String],
    replacement: &str,
) -> String {
    let tokens = words(query);
    let has = |terms: &[String]| terms.iter().any(|t| tokens.contains(&t.to_lowercase()));
    if has(weak_terms) && !has(exception_terms) {
        tracing::debug!("[QUERY] weak query '{}' replaced with '{}'", query, replacement);
        return replacement.to_string();
    }
    query.to_string()
}

/// The search-tier query pipeline bound to one configuration.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    technical_words: Vec<String>,
    term_map: BTreeMap<String, String>,
    weak_terms: Vec<String>,
    exception_terms: Vec<String>,
    weak_replacement: String,
}

impl QueryFilter {
    pub fn from_config(config: &ResolverConfig) -> Self {
        QueryFilter {
            technical_words: config.technical_words.iter().map(|w| w.to_lowercase()).collect(),
            term_map: config
                .term_map
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            weak_terms: config.weak_terms.clone(),
            exception_terms: config.exception_terms.clone(),
            weak_replacement: config.weak_replacement.clone(),
        }
    }

    pub fn prepare(&self, raw: &str) -> String {
        let cleaned = clean_query(raw, &self.technical_words, &self.term_map);
        if cleaned.is_empty() {
            return self.weak_replacement.clone();
        }
        apply_weak_filter(
            &cleaned,
            &self.weak_terms,
            &self.exception_terms,
            &self.weak_replacement,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<CategoryRule> {
        ResolverConfig::default().category_table
    }

    #[test]
    fn classifies_reference_queries() {
        let table = table();
        let cases = [
            ("shadow boxing night street", Some("COMBAT")),
            ("supercar night drive neon", Some("CARS")),
            ("ancient rome temple marble", Some("STOIC")),
            ("private jet luxury interior", Some("LUXURY")),
            ("gym workout training", Some("GYM")),
            ("random unknown query", None),
            ("lamborghini night drive tunnel", Some("CARS")),
            ("luxury yacht champagne", Some("LUXURY")),
            ("marble statue roman emperor", Some("STOIC")),
            ("shadow boxing training dark", Some("COMBAT")),
            ("gym workout muscle discipline", Some("GYM")),
        ];
        for (query, expected) in cases {
            assert_eq!(classify_category(query, &table), expected, "query: {query}");
        }
    }

    #[test]
    fn classification_is_pure() {
        let table = table();
        let first = classify_category("shadow boxing night street", &table);
        for _ in 0..10 {
            assert_eq!(classify_category("shadow boxing night street", &table), first);
        }
    }

    #[test]
    fn keyword_match_is_whole_word() {
        let table = table();
        assert_eq!(classify_category("scary cartoon", &table), None);
    }

    #[test]
    fn first_matching_rule_wins() {
        let table = vec![
            CategoryRule { name: "A".into(), keywords: vec!["night drive".into()] },
            CategoryRule { name: "B".into(), keywords: vec!["night".into()] },
        ];
        assert_eq!(classify_category("slow night drive", &table), Some("A"));
        assert_eq!(classify_category("night walk", &table), Some("B"));
    }

    #[test]
    fn keywords_drop_stopwords_and_short_words() {
        assert_eq!(
            extract_keywords("You are the storm, not the rain!"),
            vec!["storm", "not", "rain"]
        );
    }

    #[test]
    fn weak_query_is_replaced() {
        let config = ResolverConfig::default();
        let out = apply_weak_filter(
            "calm ocean sunset",
            &config.weak_terms,
            &config.exception_terms,
            &config.weak_replacement,
        );
        assert_eq!(out, "man walking alone city night");
    }

    #[test]
    fn exception_term_keeps_weak_query() {
        let config = ResolverConfig::default();
        let out = apply_weak_filter(
            "lion in fog",
            &config.weak_terms,
            &config.exception_terms,
            &config.weak_replacement,
        );
        assert_eq!(out, "lion in fog");
    }

    #[test]
    fn clean_query_strips_technical_words_and_maps_brands() {
        let config = ResolverConfig::default();
        let filter = QueryFilter::from_config(&config);
        assert_eq!(filter.prepare("Lamborghini night drive 4K cinematic footage"), "supercar night drive");
        assert_eq!(filter.prepare("4k footage"), config.weak_replacement);
    }
}
