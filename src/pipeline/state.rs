//! The pipeline gate as an explicit state machine.
//!
//! ```text
//! PENDING -> TESTING -> TEST_FAILED
//!                    -> BUILDING -> BUILD_FAILED
//!                                -> DONE            (not eligible to publish)
//!                                -> PUBLISHING -> PUBLISH_FAILED
//!                                              -> DONE
//! ```
//!
//! PUBLISHING is where a run crosses from the test-and-build process to the
//! separate publish process that holds the registry credentials.
//!
//! [`advance`] is pure: it maps the current state and a stage signal to the
//! next state plus the reason, so the gating rules are testable without
//! running any command.

use serde::{Deserialize, Serialize};

use super::error::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Testing,
    TestFailed,
    Building,
    BuildFailed,
    Publishing,
    PublishFailed,
    Done,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "PENDING",
            RunState::Testing => "TESTING",
            RunState::TestFailed => "TEST_FAILED",
            RunState::Building => "BUILDING",
            RunState::BuildFailed => "BUILD_FAILED",
            RunState::Publishing => "PUBLISHING",
            RunState::PublishFailed => "PUBLISH_FAILED",
            RunState::Done => "DONE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::TestFailed | RunState::BuildFailed | RunState::PublishFailed | RunState::Done
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunState::TestFailed | RunState::BuildFailed | RunState::PublishFailed
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to the state machine: the run started, or a stage finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Start,
    TestsFinished { passed: bool },
    /// `publish_eligible` is the branch policy verdict for this run
    BuildFinished { passed: bool, publish_eligible: bool },
    /// `passed` is false unless every tag was pushed
    PublishFinished { passed: bool },
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Start => write!(f, "start"),
            Signal::TestsFinished { passed } => write!(f, "tests finished (passed={})", passed),
            Signal::BuildFinished {
                passed,
                publish_eligible,
            } => write!(
                f,
                "build finished (passed={}, publish_eligible={})",
                passed, publish_eligible
            ),
            Signal::PublishFinished { passed } => {
                write!(f, "publish finished (passed={})", passed)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Triggered,
    TestsPassed,
    TestsFailed,
    BuildPassedReleaseBranch,
    BuildPassedNotReleaseBranch,
    BuildFailed,
    Published,
    PublishFailed,
}

impl TransitionReason {
    pub fn describe(&self) -> &'static str {
        match self {
            TransitionReason::Triggered => "run triggered",
            TransitionReason::TestsPassed => "all tests passed",
            TransitionReason::TestsFailed => "test stage failed; halting before build",
            TransitionReason::BuildPassedReleaseBranch => {
                "image built on the release branch; publishing"
            }
            TransitionReason::BuildPassedNotReleaseBranch => {
                "image built; not eligible to publish, build validated only"
            }
            TransitionReason::BuildFailed => "build stage failed; halting before publish",
            TransitionReason::Published => "all tags published",
            TransitionReason::PublishFailed => "publish stage failed",
        }
    }
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: RunState,
    pub to: RunState,
    pub reason: TransitionReason,
}

/// Compute the next state. Terminal states and out-of-order signals are rejected.
pub fn advance(state: RunState, signal: Signal) -> Result<Transition, GateError> {
    use RunState::*;
    use TransitionReason as R;

    let (to, reason) = match (state, signal) {
        (Pending, Signal::Start) => (Testing, R::Triggered),
        (Testing, Signal::TestsFinished { passed: true }) => (Building, R::TestsPassed),
        (Testing, Signal::TestsFinished { passed: false }) => (TestFailed, R::TestsFailed),
        (
            Building,
            Signal::BuildFinished {
                passed: true,
                publish_eligible: true,
            },
        ) => (Publishing, R::BuildPassedReleaseBranch),
        (
            Building,
            Signal::BuildFinished {
                passed: true,
                publish_eligible: false,
            },
        ) => (Done, R::BuildPassedNotReleaseBranch),
        (Building, Signal::BuildFinished { passed: false, .. }) => (BuildFailed, R::BuildFailed),
        (Publishing, Signal::PublishFinished { passed: true }) => (Done, R::Published),
        (Publishing, Signal::PublishFinished { passed: false }) => {
            (PublishFailed, R::PublishFailed)
        }
        (state, signal) => {
            return Err(GateError::InvalidTransition {
                state,
                signal: signal.to_string(),
            })
        }
    };

    Ok(Transition {
        from: state,
        to,
        reason,
    })
}
