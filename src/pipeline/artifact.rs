//! Published image references and tags.

use serde::{Deserialize, Serialize};

/// Tag literal for the mutable alias.
pub const LATEST_TAG: &str = "latest";

/// A named pointer to a built image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    /// Mutable; repointed by every successful release-branch publish
    Latest,
    /// Immutable once published
    Commit(String),
}

impl Tag {
    pub fn as_str(&self) -> &str {
        match self {
            Tag::Latest => LATEST_TAG,
            Tag::Commit(sha) => sha,
        }
    }

    pub fn is_immutable(&self) -> bool {
        matches!(self, Tag::Commit(_))
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The image built for one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub sha: String,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            sha: sha.into(),
        }
    }

    /// Both tags a release publishes, commit tag first.
    pub fn release_tags(&self) -> [Tag; 2] {
        [Tag::Commit(self.sha.clone()), Tag::Latest]
    }

    /// `repository:tag`
    pub fn reference(&self, tag: &Tag) -> String {
        format!("{}:{}", self.repository, tag)
    }

    /// The reference the build stage produces.
    pub fn build_reference(&self) -> String {
        self.reference(&Tag::Commit(self.sha.clone()))
    }
}

/// Per-tag outcome of the publish stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub pushed: Vec<String>,
    /// (reference, reason)
    pub failed: Vec<(String, String)>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.pushed.is_empty()
    }

    /// Some tags reached the registry and some did not.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() && !self.pushed.is_empty()
    }

    pub fn failed_references(&self) -> Vec<String> {
        self.failed.iter().map(|(reference, _)| reference.clone()).collect()
    }
}
