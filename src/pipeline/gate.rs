//! Pipeline gate: drives a run through test, build and publish.
//!
//! [`PipelineGate::run`] executes the stage the current [`RunState`] calls
//! for, turns its outcome into a [`Signal`], and lets [`advance`] pick the
//! next state. Any failure is terminal; later stages are recorded as skipped.
//!
//! A run eligible to publish stops at PUBLISHING. [`PipelineGate::publish`]
//! resumes it in another process, the only one given registry credentials.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join;

use crate::config::PipelineConfig;

use super::artifact::{ImageRef, PublishReport, Tag};
use super::credentials::RegistryCredentials;
use super::error::{GateError, StageError};
use super::policy::publish_eligible;
use super::run::PipelineRun;
use super::runner::{CommandOutput, CommandRunner, CommandSpec};
use super::stage::{Stage, StageResult};
use super::state::{advance, RunState, Signal};
use super::trigger::Trigger;

const HALTED: &str = "run halted by an earlier stage failure";
const NOT_ELIGIBLE: &str = "not a push to the release branch; build validated only";

pub struct PipelineGate {
    config: PipelineConfig,
    runner: Arc<dyn CommandRunner>,
}

impl PipelineGate {
    pub fn new(config: PipelineConfig, runner: Arc<dyn CommandRunner>) -> Result<Self, GateError> {
        if config.image.trim().is_empty() {
            return Err(GateError::Config("pipeline.image must be set".to_string()));
        }
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn image(&self, trigger: &Trigger) -> ImageRef {
        ImageRef::new(self.config.image_repository(), trigger.sha.clone())
    }

    /// Test and build one commit.
    ///
    /// Ends in a terminal state, or in PUBLISHING when the build is eligible
    /// for release; that run is then handed to [`PipelineGate::publish`].
    /// Stage failures end up in the returned run, not in `Err`; `Err` only
    /// signals a gate bug (an impossible transition).
    #[tracing::instrument(
        skip(self, trigger),
        fields(kind = %trigger.kind, branch = %trigger.branch, sha = %trigger.sha)
    )]
    pub async fn run(&self, trigger: Trigger) -> Result<PipelineRun, GateError> {
        let mut run = PipelineRun::new(trigger, self.config.release_branch.clone());
        let image = self.image(&run.trigger);
        let eligible = publish_eligible(&run.trigger, &self.config.release_branch);
        let mut skip_reason = HALTED;

        tracing::info!(run_id = %run.id, publish_eligible = eligible, "Pipeline run started");

        loop {
            let signal = match run.state {
                RunState::Pending => Signal::Start,
                RunState::Testing => {
                    let passed = self
                        .execute(&mut run, Stage::Test, self.test_stage(&image))
                        .await
                        .is_some();
                    Signal::TestsFinished { passed }
                }
                RunState::Building => {
                    let passed = self
                        .execute(&mut run, Stage::Build, self.build_stage(&image))
                        .await
                        .is_some();
                    if passed {
                        run.image = Some(image.build_reference());
                        if !eligible {
                            skip_reason = NOT_ELIGIBLE;
                        }
                    }
                    Signal::BuildFinished {
                        passed,
                        publish_eligible: eligible,
                    }
                }
                RunState::Publishing => {
                    tracing::info!(
                        run_id = %run.id,
                        image = %image.build_reference(),
                        "Build ready to publish; handing off to the publish step"
                    );
                    return Ok(run);
                }
                RunState::TestFailed
                | RunState::BuildFailed
                | RunState::PublishFailed
                | RunState::Done => break,
            };

            self.transition(&mut run, signal)?;
        }

        Ok(self.conclude(run, skip_reason))
    }

    /// Publish a run that [`PipelineGate::run`] left at PUBLISHING.
    ///
    /// `lookup` is the only credential source the gate ever sees. The run
    /// record is checked against this gate's policy before anything is
    /// pushed.
    #[tracing::instrument(skip(self, run, lookup), fields(run_id = %run.id, sha = %run.trigger.sha))]
    pub async fn publish<F>(
        &self,
        mut run: PipelineRun,
        lookup: F,
    ) -> Result<PipelineRun, GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !run.awaiting_publish() {
            return Err(GateError::NotAwaitingPublish(run.state));
        }
        if !publish_eligible(&run.trigger, &self.config.release_branch) {
            return Err(GateError::Handoff(format!(
                "{} to {} is not eligible to publish",
                run.trigger.kind, run.trigger.branch
            )));
        }
        let image = self.image(&run.trigger);
        let built = [Stage::Test, Stage::Build]
            .into_iter()
            .all(|stage| run.stage(stage).is_some_and(StageResult::is_pass));
        if !built || run.image.as_deref() != Some(image.build_reference().as_str()) {
            return Err(GateError::Handoff(format!(
                "no passing test and build recorded for {}",
                image.build_reference()
            )));
        }

        let report = self
            .execute(&mut run, Stage::Publish, self.publish_stage(&image, &lookup))
            .await;
        let passed = report.is_some();
        if let Some(report) = report {
            run.published = report.pushed;
        }
        self.transition(&mut run, Signal::PublishFinished { passed })?;

        Ok(self.conclude(run, HALTED))
    }

    fn transition(&self, run: &mut PipelineRun, signal: Signal) -> Result<(), GateError> {
        let transition = advance(run.state, signal)?;
        tracing::info!(
            run_id = %run.id,
            from = %transition.from,
            to = %transition.to,
            reason = %transition.reason,
            "Pipeline transition"
        );
        run.apply(transition);
        Ok(())
    }

    fn conclude(&self, mut run: PipelineRun, skip_reason: &str) -> PipelineRun {
        run.finish(skip_reason);
        if run.succeeded() {
            tracing::info!(run_id = %run.id, published = ?run.published, "Pipeline run succeeded");
        } else {
            tracing::warn!(run_id = %run.id, state = %run.state, "Pipeline run failed");
        }
        run
    }

    /// Run one stage, record its result, and return its value on success.
    async fn execute<T, F>(&self, run: &mut PipelineRun, stage: Stage, work: F) -> Option<T>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        tracing::info!(%stage, "Stage started");
        let start = Instant::now();
        let result = work.await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                tracing::info!(%stage, duration_ms, "Stage passed");
                run.record(StageResult::passed(stage, duration_ms));
                Some(value)
            }
            Err(err) => {
                tracing::warn!(%stage, duration_ms, error = %err, "Stage failed");
                if let StageError::PartialPublish { pushed, .. } = &err {
                    run.published = pushed.clone();
                }
                run.record(StageResult::failed(stage, err.to_string(), duration_ms));
                None
            }
        }
    }

    /// Locked dependency fetch, then the suite.
    async fn test_stage(&self, image: &ImageRef) -> Result<(), StageError> {
        for template in &self.config.commands.test {
            let spec = self.command(self.render(template, image, None, None));
            self.run_checked(&spec)
                .await
                .map_err(StageError::TestFailure)?;
        }
        Ok(())
    }

    async fn build_stage(&self, image: &ImageRef) -> Result<(), StageError> {
        for template in &self.config.commands.build {
            let spec = self.command(self.render(template, image, None, None));
            self.run_checked(&spec)
                .await
                .map_err(StageError::BuildFailure)?;
        }
        Ok(())
    }

    /// Login, guard the commit tag, point `latest` at the build, then push both tags.
    ///
    /// A tag that was pushed stays pushed even if its sibling fails.
    async fn publish_stage(
        &self,
        image: &ImageRef,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<PublishReport, StageError> {
        let commands = &self.config.commands;
        let credentials = RegistryCredentials::resolve(&self.config.credentials, lookup)?;

        let login = self
            .command(self.render(&commands.login, image, None, Some(credentials.username())))
            .with_stdin(credentials.token());
        self.run_checked(&login)
            .await
            .map_err(|e| StageError::PublishFailure(format!("registry login failed: {}", e)))?;

        if self.config.guard_immutable_tags {
            for tag in image.release_tags().iter().filter(|tag| tag.is_immutable()) {
                self.ensure_unpublished(image, tag).await?;
            }
        }

        let retag = self.command(self.render(&commands.tag, image, Some(&Tag::Latest), None));
        self.run_checked(&retag).await.map_err(|e| {
            StageError::PublishFailure(format!(
                "tagging {} failed: {}",
                image.reference(&Tag::Latest),
                e
            ))
        })?;

        let [first, second] = image.release_tags();
        let (first_result, second_result) =
            join(self.push(image, &first), self.push(image, &second)).await;

        let mut report = PublishReport::default();
        for (tag, result) in [(first, first_result), (second, second_result)] {
            match result {
                Ok(()) => report.pushed.push(image.reference(&tag)),
                Err(reason) => report.failed.push((image.reference(&tag), reason)),
            }
        }

        if report.is_complete() {
            Ok(report)
        } else if report.is_partial() {
            tracing::error!(
                pushed = ?report.pushed,
                failed = ?report.failed,
                "Partial tag publication: registry tags are inconsistent and need manual remediation"
            );
            Err(StageError::PartialPublish {
                failed: report.failed_references(),
                pushed: report.pushed,
            })
        } else {
            let reasons: Vec<String> = report
                .failed
                .iter()
                .map(|(reference, reason)| format!("{} ({})", reference, reason))
                .collect();
            Err(StageError::PublishFailure(format!(
                "push failed for {}",
                reasons.join(", ")
            )))
        }
    }

    /// Succeeds only when the registry positively reports `tag` as absent.
    async fn ensure_unpublished(&self, image: &ImageRef, tag: &Tag) -> Result<(), StageError> {
        let reference = image.reference(tag);
        let argv = self.render(&self.config.commands.exists, image, Some(tag), None);
        let exists = self.command(argv);
        let unknown = |detail: String| {
            StageError::PublishFailure(format!(
                "could not check whether {} exists: {}",
                reference, detail
            ))
        };

        let output = self
            .runner
            .run(&exists)
            .await
            .map_err(|e| unknown(e.to_string()))?;
        if output.success() {
            return Err(StageError::TagExists(reference.clone()));
        }

        let text = format!("{}\n{}", output.stderr, output.stdout);
        if self.config.commands.reports_absent(&text) {
            tracing::debug!(%reference, "Commit tag not yet published");
            return Ok(());
        }
        let mut detail = format!("`{}` exited with code {}", exists.display(), output.exit_code);
        if let Some(summary) = output.summary() {
            detail.push_str(": ");
            detail.push_str(summary);
        }
        Err(unknown(detail))
    }

    async fn push(&self, image: &ImageRef, tag: &Tag) -> Result<(), String> {
        let spec = self.command(self.render(&self.config.commands.push, image, Some(tag), None));
        self.run_checked(&spec).await.map(|_| ())
    }

    /// Every command gets the stage timeout and loses the credential variables.
    fn command(&self, argv: Vec<String>) -> CommandSpec {
        CommandSpec::new(argv)
            .without_env(&self.config.secret_env_names())
            .with_timeout_secs(self.config.stage_timeout_seconds)
    }

    fn render(
        &self,
        template: &[String],
        image: &ImageRef,
        tag: Option<&Tag>,
        username: Option<&str>,
    ) -> Vec<String> {
        template
            .iter()
            .map(|arg| {
                let mut arg = arg
                    .replace("{image}", &image.repository)
                    .replace("{sha}", &image.sha)
                    .replace("{registry}", &self.config.registry);
                if let Some(tag) = tag {
                    arg = arg.replace("{tag}", tag.as_str());
                }
                if let Some(username) = username {
                    arg = arg.replace("{username}", username);
                }
                arg
            })
            .collect()
    }

    /// Run a command, turning a runner error or non-zero exit into a failure detail.
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, String> {
        let output = self
            .runner
            .run(spec)
            .await
            .map_err(|e| format!("`{}`: {}", spec.display(), e))?;
        if output.success() {
            return Ok(output);
        }
        let mut detail = format!("`{}` exited with code {}", spec.display(), output.exit_code);
        if let Some(summary) = output.summary() {
            detail.push_str(": ");
            detail.push_str(summary);
        }
        Err(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::runner::ProcessRunner;

    fn gate() -> PipelineGate {
        let config = PipelineConfig {
            image: "valencloud/hello".to_string(),
            ..PipelineConfig::default()
        };
        PipelineGate::new(config, Arc::new(ProcessRunner)).expect("valid gate")
    }

    fn strings(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_requires_image() {
        let err = PipelineGate::new(PipelineConfig::default(), Arc::new(ProcessRunner))
            .err()
            .expect("image is required");
        assert!(matches!(err, GateError::Config(_)));
    }

    #[test]
    fn test_render_placeholders() {
        let gate = gate();
        let image = gate.image(&Trigger::push("main", "abc123").unwrap());

        let rendered = gate.render(
            &strings(&["docker", "tag", "{image}:{sha}", "{image}:{tag}"]),
            &image,
            Some(&Tag::Latest),
            None,
        );
        assert_eq!(
            rendered,
            strings(&[
                "docker",
                "tag",
                "docker.io/valencloud/hello:abc123",
                "docker.io/valencloud/hello:latest"
            ])
        );

        let login = gate.render(
            &gate.config().commands.login,
            &image,
            None,
            Some("ci-bot"),
        );
        assert_eq!(
            login,
            strings(&[
                "docker",
                "login",
                "--username",
                "ci-bot",
                "--password-stdin",
                "docker.io"
            ])
        );
    }

    #[test]
    fn test_commands_scrub_credentials() {
        let spec = gate().command(strings(&["cargo", "test"]));
        assert_eq!(
            spec.env_remove,
            strings(&["REGISTRY_USERNAME", "REGISTRY_TOKEN"])
        );
        assert!(spec.timeout.is_some());
    }

    #[tokio::test]
    async fn test_run_checked_reports_exit_code() {
        let gate = gate();
        let spec = CommandSpec::new(strings(&["sh", "-c", "echo broken >&2; exit 3"]));
        let detail = gate.run_checked(&spec).await.unwrap_err();
        assert!(detail.contains("exited with code 3"));
        assert!(detail.ends_with("broken"));
    }
}
