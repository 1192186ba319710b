//! Loosely-shaped records as the metadata API returns them.
//!
//! Every field is optional and `null` is treated the same as absent. Decoding into these
//! types is the only place the wire shape is inspected; normalization works on them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawAuthor {
    pub author_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTldr {
    pub model: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPaper {
    pub paper_id: Option<String>,
    pub title: Option<String>,
    pub authors: Option<Vec<RawAuthor>>,
    pub year: Option<i64>,
    pub venue: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub tldr: Option<RawTldr>,
    pub citation_count: Option<i64>,
    pub reference_count: Option<i64>,
    pub url: Option<String>,
}

impl RawPaper {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Author lookup result (`/author/{id}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawAuthorProfile {
    pub author_id: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub paper_count: Option<i64>,
    pub citation_count: Option<i64>,
    pub h_index: Option<i64>,
}

impl From<&RawAuthorProfile> for RawAuthor {
    fn from(profile: &RawAuthorProfile) -> Self {
        Self {
            author_id: profile.author_id.clone(),
            name: profile.name.clone(),
        }
    }
}
