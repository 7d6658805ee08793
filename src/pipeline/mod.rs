//! Pipeline gate: test -> build -> publish, fail-fast.
//!
//! A run is started by a push or pull-request [`Trigger`]. The test stage must
//! pass before the image is built; the image is published under its commit
//! SHA and `latest` only when the build passes on a push to the release
//! branch. Every stage shells out through a [`CommandRunner`], so the gating
//! logic is independent of any particular CI platform or container engine.
//!
//! Publishing runs in its own process: a release run stops at PUBLISHING,
//! is written out as a [`PipelineRun`] record, and is resumed by
//! [`PipelineGate::publish`] where the registry credentials live.
//!
//! Concurrent runs are independent. Two release-branch runs racing to
//! publish both repoint `latest`; the last push wins.

pub mod artifact;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod policy;
pub mod run;
pub mod runner;
pub mod stage;
pub mod state;
pub mod trigger;

pub use artifact::{ImageRef, PublishReport, Tag};
pub use credentials::RegistryCredentials;
pub use error::{GateError, RunnerError, StageError};
pub use gate::PipelineGate;
pub use policy::publish_eligible;
pub use run::PipelineRun;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use stage::{Stage, StageOutcome, StageResult};
pub use state::{advance, RunState, Signal, Transition, TransitionReason};
pub use trigger::{Trigger, TriggerKind};
