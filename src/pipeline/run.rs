//! The record of one pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::{Stage, StageResult};
use super::state::{RunState, Transition};
use super::trigger::Trigger;

/// One run of the gate, from trigger to a terminal state.
///
/// Stage results are appended in execution order; stages the run never
/// reached are recorded as skipped once it finishes. A run that stops at
/// PUBLISHING is serialized and resumed by the publish step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub trigger: Trigger,
    pub release_branch: String,
    pub state: RunState,
    pub stages: Vec<StageResult>,
    pub transitions: Vec<Transition>,
    /// `repository:sha` once the build stage passes
    pub image: Option<String>,
    /// References that reached the registry
    pub published: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(trigger: Trigger, release_branch: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger,
            release_branch: release_branch.into(),
            state: RunState::Pending,
            stages: Vec::new(),
            transitions: Vec::new(),
            image: None,
            published: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// True only when the run reached DONE.
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }

    /// Test and build passed on a release push; only the publish step remains.
    pub fn awaiting_publish(&self) -> bool {
        self.state == RunState::Publishing
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
        self.stages.iter().find(|result| result.stage == stage)
    }

    pub(crate) fn record(&mut self, result: StageResult) {
        self.stages.push(result);
    }

    pub(crate) fn apply(&mut self, transition: Transition) {
        self.state = transition.to;
        self.transitions.push(transition);
    }

    /// Mark unreached stages skipped and stamp the finish time.
    pub(crate) fn finish(&mut self, skip_reason: &str) {
        for stage in Stage::ALL {
            if self.stage(stage).is_none() {
                self.stages.push(StageResult::skipped(stage, skip_reason));
            }
        }
        self.finished_at = Some(Utc::now());
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::StageOutcome;

    #[test]
    fn test_finish_fills_skipped_stages() {
        let mut run = PipelineRun::new(Trigger::push("main", "abc123").unwrap(), "main");
        run.record(StageResult::failed(Stage::Test, "1 test failed", 20));
        run.finish("halted");

        assert!(!run.succeeded());
        assert!(run.finished_at.is_some());
        assert_eq!(run.stages.len(), 3);
        assert_eq!(run.stage(Stage::Test).unwrap().outcome, StageOutcome::Fail);
        assert_eq!(
            run.stage(Stage::Build).unwrap().outcome,
            StageOutcome::Skipped
        );
        assert_eq!(
            run.stage(Stage::Publish).unwrap().outcome,
            StageOutcome::Skipped
        );
    }

    #[test]
    fn test_report_json() {
        let run = PipelineRun::new(Trigger::push("main", "abc123").unwrap(), "main");
        let value: serde_json::Value = serde_json::from_str(&run.to_json().unwrap()).unwrap();
        assert_eq!(value["state"], "PENDING");
        assert_eq!(value["trigger"]["branch"], "main");
        assert_eq!(value["trigger"]["kind"], "push");
    }

    #[test]
    fn test_record_reloads() {
        let mut run = PipelineRun::new(Trigger::push("main", "abc123").unwrap(), "main");
        run.record(StageResult::passed(Stage::Test, 20));
        run.state = RunState::Publishing;

        let reloaded = PipelineRun::from_json(&run.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.id, run.id);
        assert_eq!(reloaded.trigger, run.trigger);
        assert!(reloaded.awaiting_publish());
        assert_eq!(reloaded.stages, run.stages);
        assert_eq!(reloaded.started_at, run.started_at);
    }
}
