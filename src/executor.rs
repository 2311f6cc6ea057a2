//! Stage Executor — runs exactly one stage against the run's artifact set.
//!
//! Responsibilities, in order: resolve declared inputs from the store,
//! dispatch to the stage's handler, persist produced artifacts, consult
//! the stop-condition evaluator, and append the finished [`StageResult`]
//! to the run history. Appending here is the only mutation point for run
//! history anywhere in the crate.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::artifact::ArtifactStore;
use crate::errors::{HaltReason, PipelineError};
use crate::handlers::{HandlerOutcome, HandlerRegistry};
use crate::run::PipelineRun;
use crate::stage::{Stage, StageResult, StageStatus};
use crate::stop::{StopConditionEvaluator, StopDecision};

pub struct StageExecutor {
    registry: HandlerRegistry,
    evaluator: StopConditionEvaluator,
}

impl StageExecutor {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            evaluator: StopConditionEvaluator::new(),
        }
    }

    /// Execute one stage, record its result, and report whether the run
    /// may continue.
    ///
    /// A missing declared input is a contract violation: the failure is
    /// still recorded in history (the summary must account for every
    /// stage reached), then surfaced as a fatal error.
    pub async fn execute(
        &self,
        stage: &Stage,
        run: &mut PipelineRun,
        store: &mut ArtifactStore,
    ) -> Result<(StageResult, StopDecision), PipelineError> {
        let started_at = Utc::now();
        info!(stage = %stage.id, ordinal = stage.ordinal, "executing stage");

        let inputs = match store.resolve_all(&stage.inputs) {
            Ok(inputs) => inputs,
            Err(missing) => {
                error!(stage = %stage.id, ?missing, "declared input artifacts missing");
                let result = failed_result(stage, started_at, format!(
                    "contract violation: missing input artifact(s) {:?}",
                    missing
                ));
                run.record(result);
                return Err(PipelineError::ContractViolation {
                    stage: stage.id.clone(),
                    missing,
                });
            }
        };

        let Some(handler) = self.registry.get(&stage.id) else {
            let result = failed_result(stage, started_at, "no handler registered".to_string());
            run.record(result);
            return Err(PipelineError::Other(anyhow::anyhow!(
                "no handler registered for stage {}",
                stage.id
            )));
        };

        let outcome = match handler.handle(stage, &inputs).await {
            Ok(outcome) => outcome,
            Err(PipelineError::InvocationFailure { stage: s, message }) => {
                warn!(stage = %s, %message, "delegated task could not be invoked");
                let result = failed_result(stage, started_at, message.clone());
                run.record(result.clone());
                return Ok((result, StopDecision::Halt(HaltReason::InvocationFailed(message))));
            }
            Err(other) => {
                let result = failed_result(stage, started_at, other.to_string());
                run.record(result);
                return Err(other);
            }
        };

        let mut artifacts = Vec::with_capacity(outcome.outputs.len());
        for draft in &outcome.outputs {
            match store.persist(&stage.id, draft.clone()) {
                Ok(artifact) => artifacts.push(artifact),
                Err(err) => {
                    // The stage did execute; its failure must still show up
                    // in history so the summary accounts for it.
                    error!(stage = %stage.id, %err, "failed to persist artifact");
                    let result = failed_result(stage, started_at, err.to_string());
                    run.record(result);
                    return Err(err);
                }
            }
        }

        let mut result = StageResult {
            stage_id: stage.id.clone(),
            ordinal: stage.ordinal,
            status: StageStatus::Pass,
            artifacts,
            findings: outcome.findings.clone(),
            halt_suggested: outcome.halt_suggested,
            halt_reason: outcome.halt_reason.clone(),
            blocking_findings: outcome.blocking_findings.clone(),
            iterations: outcome.iterations,
            tests_passed: outcome.tests_passed,
            check_passed: outcome.check_passed,
            started_at,
            finished_at: Utc::now(),
        };

        let decision = self.evaluator.evaluate(stage, &result);
        if let StopDecision::Halt(reason) = &decision {
            warn!(stage = %stage.id, %reason, "stop condition fired");
            result.status = StageStatus::Stopped;
        }
        log_ignored_halt_suggestion(stage, &outcome, &decision);

        run.record(result.clone());
        Ok((result, decision))
    }
}

/// A halt suggestion on a stage whose policy never halts is recorded and
/// surfaced, but does not stop progression.
fn log_ignored_halt_suggestion(stage: &Stage, outcome: &HandlerOutcome, decision: &StopDecision) {
    if outcome.halt_suggested && matches!(decision, StopDecision::Continue) {
        info!(
            stage = %stage.id,
            reason = outcome.halt_reason.as_deref().unwrap_or("unstated"),
            "handler suggested a halt; stage policy records it without stopping"
        );
    }
}

fn failed_result(
    stage: &Stage,
    started_at: chrono::DateTime<Utc>,
    findings: String,
) -> StageResult {
    StageResult {
        stage_id: stage.id.clone(),
        ordinal: stage.ordinal,
        status: StageStatus::Fail,
        artifacts: vec![],
        findings,
        halt_suggested: false,
        halt_reason: None,
        blocking_findings: vec![],
        iterations: None,
        tests_passed: None,
        check_passed: None,
        started_at,
        finished_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactDraft, ArtifactKind};
    use crate::handlers::StageHandler;
    use crate::stage::reference_pipeline;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Scripted(HandlerOutcome);

    #[async_trait]
    impl StageHandler for Scripted {
        async fn handle(
            &self,
            _stage: &Stage,
            _inputs: &[crate::artifact::Artifact],
        ) -> Result<HandlerOutcome, PipelineError> {
            Ok(self.0.clone())
        }
    }

    struct Unavailable;

    #[async_trait]
    impl StageHandler for Unavailable {
        async fn handle(
            &self,
            stage: &Stage,
            _inputs: &[crate::artifact::Artifact],
        ) -> Result<HandlerOutcome, PipelineError> {
            Err(PipelineError::InvocationFailure {
                stage: stage.id.clone(),
                message: "agent binary not on PATH".to_string(),
            })
        }
    }

    fn stage_by_id(id: &str) -> Stage {
        reference_pipeline()
            .into_iter()
            .find(|s| s.id == id)
            .unwrap()
    }

    fn setup(dir: &std::path::Path) -> (PipelineRun, ArtifactStore) {
        let spec_path = dir.join("FEAT47_specification.md");
        std::fs::write(&spec_path, "# FEAT47 spec").unwrap();
        let mut store = ArtifactStore::new("FEAT47", &dir.join("artifacts")).unwrap();
        store.register_specification(&spec_path).unwrap();
        (PipelineRun::new(spec_path, "FEAT47"), store)
    }

    fn executor_with(stage_id: &str, handler: Arc<dyn StageHandler>) -> StageExecutor {
        let mut registry = HandlerRegistry::new();
        registry.register(stage_id, handler);
        StageExecutor::new(registry)
    }

    #[tokio::test]
    async fn test_pass_flow_persists_artifacts_and_records_history() {
        let dir = tempdir().unwrap();
        let (mut run, mut store) = setup(dir.path());
        let stage = stage_by_id("architecture-analysis");
        // Ordinal 1 runs first, so history stays gap-free.
        let executor = executor_with(
            &stage.id,
            Arc::new(Scripted(HandlerOutcome {
                findings: "layering is sound".to_string(),
                ..Default::default()
            })),
        );

        let (result, decision) = executor.execute(&stage, &mut run, &mut store).await.unwrap();

        assert_eq!(result.status, StageStatus::Pass);
        assert_eq!(decision, StopDecision::Continue);
        assert_eq!(run.history.len(), 1);
        assert_eq!(run.history[0].findings, "layering is sound");
    }

    #[tokio::test]
    async fn test_produced_artifacts_are_stored_with_stage_id() {
        let dir = tempdir().unwrap();
        let (mut run, mut store) = setup(dir.path());
        // Use ordinal-1 stage so the history invariant holds in isolation.
        let stage = Stage {
            ordinal: 1,
            ..stage_by_id("verification")
        };
        let executor = executor_with(
            &stage.id,
            Arc::new(Scripted(HandlerOutcome {
                outputs: vec![ArtifactDraft::new(
                    ArtifactKind::VerificationReport,
                    "all symbols resolve",
                )],
                ..Default::default()
            })),
        );

        let (result, _) = executor.execute(&stage, &mut run, &mut store).await.unwrap();

        assert_eq!(result.artifacts.len(), 1);
        let stored = store.resolve(ArtifactKind::VerificationReport).unwrap();
        assert_eq!(stored.produced_by, "verification");
        assert!(stored.path.exists());
    }

    #[tokio::test]
    async fn test_missing_input_is_a_contract_violation() {
        let dir = tempdir().unwrap();
        let spec_path = dir.path().join("FEAT47_specification.md");
        std::fs::write(&spec_path, "spec").unwrap();
        // Store deliberately left without the specification registered.
        let mut store = ArtifactStore::new("FEAT47", &dir.path().join("artifacts")).unwrap();
        let mut run = PipelineRun::new(spec_path, "FEAT47");
        let stage = stage_by_id("architecture-analysis");
        let executor = executor_with(&stage.id, Arc::new(Scripted(HandlerOutcome::default())));

        let err = executor
            .execute(&stage, &mut run, &mut store)
            .await
            .unwrap_err();

        assert!(err.is_contract_violation());
        // The violation is still accounted for in history.
        assert_eq!(run.history.len(), 1);
        assert_eq!(run.history[0].status, StageStatus::Fail);
        assert!(run.history[0].findings.contains("contract violation"));
    }

    #[tokio::test]
    async fn test_halt_decision_marks_result_stopped() {
        let dir = tempdir().unwrap();
        let (mut run, mut store) = setup(dir.path());
        let stage = stage_by_id("architecture-analysis");
        let executor = executor_with(
            &stage.id,
            Arc::new(Scripted(HandlerOutcome {
                halt_suggested: true,
                halt_reason: Some("fundamental issue".to_string()),
                ..Default::default()
            })),
        );

        let (result, decision) = executor.execute(&stage, &mut run, &mut store).await.unwrap();

        assert_eq!(result.status, StageStatus::Stopped);
        assert!(matches!(decision, StopDecision::Halt(_)));
        assert_eq!(run.history[0].status, StageStatus::Stopped);
    }

    #[tokio::test]
    async fn test_persist_failure_still_records_stage_result() {
        let dir = tempdir().unwrap();
        let (mut run, mut store) = setup(dir.path());
        // Seed the store with a verification-owned report, then run a stage
        // whose handler tries to emit that same kind.
        store
            .persist(
                "verification",
                ArtifactDraft::new(ArtifactKind::VerificationReport, "owned"),
            )
            .unwrap();
        let stage = Stage {
            ordinal: 1,
            ..stage_by_id("review")
        };
        let executor = executor_with(
            &stage.id,
            Arc::new(Scripted(HandlerOutcome {
                outputs: vec![ArtifactDraft::new(
                    ArtifactKind::VerificationReport,
                    "hijacked",
                )],
                ..Default::default()
            })),
        );

        let err = executor
            .execute(&stage, &mut run, &mut store)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::ArtifactOwnership { .. }));
        // The executed stage is accounted for in history, not left as a gap.
        assert_eq!(run.history.len(), 1);
        assert_eq!(run.history[0].status, StageStatus::Fail);
        assert!(run.history[0].findings.contains("verification"));
        // The owned artifact is untouched.
        assert_eq!(
            store.resolve(ArtifactKind::VerificationReport).unwrap().body,
            "owned"
        );
    }

    #[tokio::test]
    async fn test_invocation_failure_fails_stage_and_halts() {
        let dir = tempdir().unwrap();
        let (mut run, mut store) = setup(dir.path());
        let stage = stage_by_id("architecture-analysis");
        let executor = executor_with(&stage.id, Arc::new(Unavailable));

        let (result, decision) = executor.execute(&stage, &mut run, &mut store).await.unwrap();

        assert_eq!(result.status, StageStatus::Fail);
        assert!(matches!(
            decision,
            StopDecision::Halt(HaltReason::InvocationFailed(_))
        ));
        assert!(result.findings.contains("agent binary not on PATH"));
    }
}
