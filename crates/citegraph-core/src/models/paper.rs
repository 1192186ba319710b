use serde::{Deserialize, Serialize};

use crate::models::graph::{Label, NodeKey, Properties, PropertyValue};

/// Name used when a record carries no author name.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// An author of a paper, keyed by the provider's author id or a hash of the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
}

impl Author {
    pub fn node_key(&self) -> NodeKey {
        NodeKey::new(Label::Author, &self.id)
    }

    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("name".to_string(), PropertyValue::from(self.name.as_str()));
        props
    }
}

/// Canonical paper entity. Every free-text field is already HTML-escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub primary_author: String,
    pub authors: Vec<Author>,

    #[serde(default)]
    pub year: i64,

    #[serde(default)]
    pub venue: String,

    #[serde(default)]
    pub abstract_text: String,

    /// `None` when the record came without the tldr projection (list endpoints). An upsert
    /// then leaves any stored summary in place.
    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub citation_count: i64,

    #[serde(default)]
    pub reference_count: i64,

    #[serde(default)]
    pub url: String,
}

impl Paper {
    pub fn node_key(&self) -> NodeKey {
        NodeKey::new(Label::Paper, &self.id)
    }

    /// Venue node, if the paper names one. Empty venues are never stored.
    pub fn venue_key(&self) -> Option<NodeKey> {
        if self.venue.is_empty() {
            None
        } else {
            Some(NodeKey::new(Label::Venue, &self.venue))
        }
    }

    /// Non-key attributes written on every upsert. `summary` is only included when known.
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("title".into(), PropertyValue::from(self.title.as_str()));
        props.insert(
            "primary_author".into(),
            PropertyValue::from(self.primary_author.as_str()),
        );
        props.insert("year".into(), PropertyValue::Int(self.year));
        props.insert("venue".into(), PropertyValue::from(self.venue.as_str()));
        props.insert(
            "abstract".into(),
            PropertyValue::from(self.abstract_text.as_str()),
        );
        if let Some(summary) = &self.summary {
            props.insert("summary".into(), PropertyValue::from(summary.as_str()));
        }
        props.insert(
            "citation_count".into(),
            PropertyValue::Int(self.citation_count),
        );
        props.insert(
            "reference_count".into(),
            PropertyValue::Int(self.reference_count),
        );
        props.insert("url".into(), PropertyValue::from(self.url.as_str()));
        props
    }

    /// Attributes set only when the node is first created.
    pub fn defaults(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("summary".into(), PropertyValue::from(""));
        props
    }

    /// Concatenated text used for keyword extraction.
    pub fn searchable_text(&self) -> String {
        [
            self.title.as_str(),
            self.summary.as_deref().unwrap_or_default(),
            self.abstract_text.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }
}
