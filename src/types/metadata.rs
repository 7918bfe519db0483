use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use super::FragmentKey;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FragmentSetId(pub Uuid);

impl FragmentSetId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FragmentSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for FragmentSetId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A fragment set before the metadata store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFragmentSet {
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub fragment_keys: Vec<FragmentKey>,
    pub fragment_checksums: Vec<String>,
    pub owner_id: String,
}

impl NewFragmentSet {
    pub fn with_id(self, id: FragmentSetId) -> FragmentSet {
        FragmentSet {
            id,
            original_name: self.original_name,
            uploaded_at: self.uploaded_at,
            fragments_count: self.fragment_keys.len(),
            fragment_keys: self.fragment_keys,
            fragment_checksums: self.fragment_checksums,
            owner_id: self.owner_id,
        }
    }
}

/// Persisted record of one uploaded file and the ordered keys of its fragments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSet {
    pub id: FragmentSetId,
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub fragments_count: usize,
    pub fragment_keys: Vec<FragmentKey>,
    #[serde(default)]
    pub fragment_checksums: Vec<String>,
    pub owner_id: String,
}

impl FragmentSet {
    /// Expected checksum of the fragment at `index`, if one was recorded.
    pub fn checksum_of(&self, index: usize) -> Option<&str> {
        self.fragment_checksums.get(index).map(String::as_str)
    }
}
