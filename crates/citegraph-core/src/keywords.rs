//! Keyword extraction for the optional `HAS_KEYWORD` path.

use std::collections::HashSet;

use crate::models::Paper;

const STOP_WORDS: &[&str] = &[
    "the", "and", "are", "was", "were", "been", "being", "have", "has", "had", "does", "did",
    "will", "would", "shall", "should", "may", "might", "must", "can", "could", "for", "with",
    "from", "about", "into", "through", "during", "before", "after", "above", "below",
    "between", "this", "that", "these", "those", "its", "but", "not", "our", "their", "they",
    "them", "which", "what", "when", "where", "who", "whom", "how", "than", "then", "there",
    "here", "such", "also", "both", "each", "more", "most", "other", "some", "any", "all",
    "only", "over", "under", "very", "via", "using", "use", "used", "based", "new", "show",
    "shows", "paper", "propose", "proposed", "present", "approach", "results", "result", "we",
];

/// Entities produced by [`crate::normalize::escape_html`].
const ESCAPED_ENTITIES: &[&str] = &["&amp;", "&lt;", "&gt;", "&quot;", "&#x27;"];

/// Light suffix stripping; maps common plural and verb forms onto one token.
pub fn lemmatize(token: &str) -> String {
    if token.len() > 4
        && let Some(stem) = token.strip_suffix("ies")
    {
        return format!("{stem}y");
    }
    if token.len() > 4
        && ["sses", "xes", "ches", "shes"]
            .iter()
            .any(|suffix| token.ends_with(suffix))
    {
        return token[..token.len() - 2].to_string();
    }
    if token.len() > 3
        && token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is")
    {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

/// Extract normalized keywords from free text, deduplicated, in first-seen order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut cleaned = text.to_lowercase();
    for entity in ESCAPED_ENTITIES {
        cleaned = cleaned.replace(entity, " ");
    }

    let mut seen = HashSet::new();
    cleaned
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOP_WORDS.contains(w))
        .map(lemmatize)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Keywords for a paper's title, summary and abstract.
pub fn paper_keywords(paper: &Paper) -> Vec<String> {
    extract_keywords(&paper.searchable_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lemmatizes_plurals() {
        assert_eq!(lemmatize("networks"), "network");
        assert_eq!(lemmatize("studies"), "study");
        assert_eq!(lemmatize("indexes"), "index");
        assert_eq!(lemmatize("analysis"), "analysis");
        assert_eq!(lemmatize("class"), "class");
    }

    #[test]
    fn filters_stopwords_punctuation_and_numbers() {
        let keywords = extract_keywords("The Graph Networks, for 2024 citation-analysis!");
        assert_eq!(keywords, vec!["graph", "network", "citation", "analysis"]);
    }

    #[test]
    fn deduplicates_after_lemmatizing() {
        let keywords = extract_keywords("graph graphs Graph");
        assert_eq!(keywords, vec!["graph"]);
    }

    #[test]
    fn ignores_escaped_entities() {
        let keywords = extract_keywords("Q&amp;A systems &quot;quoted&quot;");
        assert_eq!(keywords, vec!["system", "quoted"]);
    }
}
