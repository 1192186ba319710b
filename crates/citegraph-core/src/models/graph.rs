//! Property-graph vocabulary shared by every storage backend.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Node labels. Each label has exactly one business-key property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Paper,
    Author,
    Venue,
    Keyword,
}

impl Label {
    pub const ALL: [Label; 4] = [Label::Paper, Label::Author, Label::Venue, Label::Keyword];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Paper => "Paper",
            Label::Author => "Author",
            Label::Venue => "Venue",
            Label::Keyword => "Keyword",
        }
    }

    pub fn key_property(&self) -> &'static str {
        match self {
            Label::Paper | Label::Author => "id",
            Label::Venue => "name",
            Label::Keyword => "value",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed relationship types.
///
/// Citations are not a separate type: "B cites A" is stored as `B -REFERENCES-> A`
/// and read back by traversing `REFERENCES` edges into `A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelKind {
    AuthoredBy,
    PublishedIn,
    HasKeyword,
    References,
}

impl RelKind {
    pub const ALL: [RelKind; 4] = [
        RelKind::AuthoredBy,
        RelKind::PublishedIn,
        RelKind::HasKeyword,
        RelKind::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelKind::AuthoredBy => "AUTHORED_BY",
            RelKind::PublishedIn => "PUBLISHED_IN",
            RelKind::HasKeyword => "HAS_KEYWORD",
            RelKind::References => "REFERENCES",
        }
    }

    /// `(source, target)` labels this relationship connects.
    pub fn endpoints(&self) -> (Label, Label) {
        match self {
            RelKind::AuthoredBy => (Label::Paper, Label::Author),
            RelKind::PublishedIn => (Label::Paper, Label::Venue),
            RelKind::HasKeyword => (Label::Paper, Label::Keyword),
            RelKind::References => (Label::Paper, Label::Paper),
        }
    }
}

impl fmt::Display for RelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A node addressed by its label and business key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub label: Label,
    pub key: String,
}

impl NodeKey {
    pub fn new(label: Label, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
        }
    }

    pub fn paper(id: impl Into<String>) -> Self {
        Self::new(Label::Paper, id)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.label, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i64),
    Text(String),
}

impl PropertyValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(n) => Some(*n),
            PropertyValue::Text(_) => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(n) => write!(f, "{n}"),
            PropertyValue::Text(s) => f.write_str(s),
        }
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// One merge-by-key write. Backends apply a slice of these as a unit.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphWrite {
    /// Create the node if absent, then overwrite the given properties. `defaults` are
    /// set only on creation and never replace a stored value.
    MergeNode {
        node: NodeKey,
        properties: Properties,
        defaults: Properties,
    },
    /// Create the relationship if absent. Both endpoints must already exist.
    MergeRelationship {
        from: NodeKey,
        kind: RelKind,
        to: NodeKey,
    },
}

impl GraphWrite {
    pub fn node(node: NodeKey, properties: Properties) -> Self {
        Self::node_with_defaults(node, properties, Properties::new())
    }

    pub fn node_with_defaults(
        node: NodeKey,
        properties: Properties,
        defaults: Properties,
    ) -> Self {
        GraphWrite::MergeNode {
            node,
            properties,
            defaults,
        }
    }

    pub fn relationship(from: NodeKey, kind: RelKind, to: NodeKey) -> Self {
        GraphWrite::MergeRelationship { from, kind, to }
    }
}

/// Counts reported by a write. `missing_endpoints` counts relationship merges skipped
/// because an endpoint node did not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub nodes_created: u64,
    pub relationships_created: u64,
    pub missing_endpoints: u64,
}

impl std::ops::AddAssign for WriteSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes_created += rhs.nodes_created;
        self.relationships_created += rhs.relationships_created;
        self.missing_endpoints += rhs.missing_endpoints;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    pub nodes: BTreeMap<String, u64>,
    pub relationships: BTreeMap<String, u64>,
}

impl GraphCounts {
    pub fn nodes_with(&self, label: Label) -> u64 {
        self.nodes.get(label.as_str()).copied().unwrap_or(0)
    }

    pub fn relationships_of(&self, kind: RelKind) -> u64 {
        self.relationships.get(kind.as_str()).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_connect_papers() {
        assert_eq!(RelKind::References.endpoints(), (Label::Paper, Label::Paper));
        assert_eq!(RelKind::References.to_string(), "REFERENCES");
    }

    #[test]
    fn property_value_serializes_untagged() {
        let mut props = Properties::new();
        props.insert("year".into(), PropertyValue::Int(2017));
        props.insert("title".into(), PropertyValue::from("Attention"));
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"title":"Attention","year":2017}"#);
        let back: Properties = serde_json::from_str(&json).unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn write_summaries_accumulate() {
        let mut total = WriteSummary::default();
        total += WriteSummary {
            nodes_created: 2,
            relationships_created: 1,
            missing_endpoints: 0,
        };
        total += WriteSummary {
            nodes_created: 0,
            relationships_created: 0,
            missing_endpoints: 1,
        };
        assert_eq!(total.nodes_created, 2);
        assert_eq!(total.missing_endpoints, 1);
    }
}
