//! The event that starts a pipeline run.

use serde::{Deserialize, Serialize};

use super::error::GateError;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Kind of source event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Push,
    PullRequest,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Push => "push",
            TriggerKind::PullRequest => "pull_request",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A push or pull-request event carrying the branch and commit to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub branch: String,
    pub sha: String,
}

impl Trigger {
    /// Validate and normalize a trigger.
    ///
    /// `refs/heads/<name>` is reduced to `<name>`. The SHA becomes an image tag,
    /// so it must be non-empty ASCII alphanumerics.
    pub fn new(
        kind: TriggerKind,
        branch: impl Into<String>,
        sha: impl Into<String>,
    ) -> Result<Self, GateError> {
        let branch = branch.into();
        let branch = branch
            .trim()
            .strip_prefix(BRANCH_REF_PREFIX)
            .unwrap_or(branch.trim())
            .to_string();
        if branch.is_empty() {
            return Err(GateError::InvalidTrigger("branch is empty".to_string()));
        }

        let sha = sha.into().trim().to_string();
        if sha.is_empty() {
            return Err(GateError::InvalidTrigger("commit sha is empty".to_string()));
        }
        if !sha.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(GateError::InvalidTrigger(format!(
                "commit sha {:?} is not a valid image tag",
                sha
            )));
        }

        Ok(Self { kind, branch, sha })
    }

    pub fn push(branch: impl Into<String>, sha: impl Into<String>) -> Result<Self, GateError> {
        Self::new(TriggerKind::Push, branch, sha)
    }

    pub fn pull_request(
        branch: impl Into<String>,
        sha: impl Into<String>,
    ) -> Result<Self, GateError> {
        Self::new(TriggerKind::PullRequest, branch, sha)
    }
}
