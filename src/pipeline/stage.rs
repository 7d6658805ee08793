//! Stage identities and per-stage results.

use serde::{Deserialize, Serialize};

/// One gated phase of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Test,
    Build,
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Test, Stage::Build, Stage::Publish];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Test => "test",
            Stage::Build => "build",
            Stage::Publish => "publish",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Pass,
    Fail,
    Skipped,
}

/// Result of one stage within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub outcome: StageOutcome,
    /// Failure reason or skip reason
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl StageResult {
    pub fn passed(stage: Stage, duration_ms: u64) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Pass,
            detail: None,
            duration_ms,
        }
    }

    pub fn failed(stage: Stage, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Fail,
            detail: Some(detail.into()),
            duration_ms,
        }
    }

    pub fn skipped(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            detail: Some(detail.into()),
            duration_ms: 0,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == StageOutcome::Pass
    }
}
