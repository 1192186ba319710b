//! Entity normalization: raw API records → canonical [`Paper`] / [`Author`].
//!
//! Normalization is pure. Free text is HTML-escaped here exactly once; nothing
//! downstream escapes again.
//!
//! Identity rules:
//! - a paper's id is the provider id when present, otherwise
//!   `sha1(escaped title + primary author)`;
//! - an author's id is the provider id when present, otherwise `sha1(escaped name)`.
//!
//! The fallback hash applies no case or whitespace folding, so two distinct papers with
//! byte-identical title and first author collide, and two spellings of the same title do not.

use sha1::{Digest, Sha1};

use crate::models::{Author, Paper, RawAuthor, RawPaper, UNKNOWN_AUTHOR};

/// Escape text for storage and display (`&`, `<`, `>`, `"`, `'`).
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Lowercase hex SHA-1 digest of `input`.
pub fn content_hash(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn provider_id(id: Option<&str>) -> Option<String> {
    id.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn escaped_or_default(value: Option<&str>) -> String {
    value.map(escape_html).unwrap_or_default()
}

/// Normalize one author. Never fails: a missing name becomes `"unknown"`.
pub fn normalize_author(raw: &RawAuthor) -> Author {
    let name = raw
        .name
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(escape_html)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let id = provider_id(raw.author_id.as_deref()).unwrap_or_else(|| content_hash(&name));

    Author { id, name }
}

/// Normalize a raw paper record. Returns `None` when the record has no usable title.
pub fn normalize(raw: &RawPaper) -> Option<Paper> {
    let title = raw
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(escape_html)?;

    let authors: Vec<Author> = raw
        .authors
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(normalize_author)
        .collect();

    let primary_author = authors
        .first()
        .map(|a| a.name.clone())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let id = provider_id(raw.paper_id.as_deref())
        .unwrap_or_else(|| content_hash(&format!("{title}{primary_author}")));

    let summary = raw
        .tldr
        .as_ref()
        .and_then(|t| t.text.as_deref())
        .map(escape_html);

    Some(Paper {
        id,
        title,
        primary_author,
        authors,
        year: raw.year.unwrap_or(0),
        venue: escaped_or_default(raw.venue.as_deref()),
        abstract_text: escaped_or_default(raw.abstract_text.as_deref()),
        summary,
        citation_count: raw.citation_count.unwrap_or(0),
        reference_count: raw.reference_count.unwrap_or(0),
        url: escaped_or_default(raw.url.as_deref()),
    })
}
