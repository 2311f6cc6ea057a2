//! Stage definitions and per-stage results.
//!
//! A `Stage` is immutable configuration created at pipeline-definition
//! time: its ordinal position, declared input/output artifact kinds, how
//! its handler is dispatched, and which stop-condition predicate applies.
//! The reference pipeline wires seven stages in fixed order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactKind};

/// How the stage executor dispatches a stage's handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerKind {
    /// Direct, synchronous call to an analytical handler.
    Direct,
    /// Single-shot delegation through the invocation gateway.
    DelegatedOnce,
    /// Bounded-loop delegation through the invocation gateway.
    DelegatedLoop,
}

/// Which stop-condition predicate governs a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopPolicy {
    /// Findings are recorded but never stop the run.
    Never,
    /// Halt if the handler reports a fundamental design issue.
    OnDesignIssue,
    /// Halt only if the handler reports that a major rewrite is required.
    OnRewriteRequired,
    /// Halt if any finding is classified blocking.
    OnBlockingFinding,
    /// Halt if the iteration cap is reached without the terminal check.
    OnBudgetExhausted,
}

/// One ordered unit of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Stable identifier (e.g. `"verification"`).
    pub id: String,
    /// 1-based position in the pipeline.
    pub ordinal: u32,
    /// Human-readable name shown in the summary.
    pub name: String,
    pub inputs: Vec<ArtifactKind>,
    pub outputs: Vec<ArtifactKind>,
    pub handler: HandlerKind,
    pub stop: StopPolicy,
}

impl Stage {
    pub fn new(
        id: &str,
        ordinal: u32,
        name: &str,
        inputs: Vec<ArtifactKind>,
        outputs: Vec<ArtifactKind>,
        handler: HandlerKind,
        stop: StopPolicy,
    ) -> Self {
        Self {
            id: id.to_string(),
            ordinal,
            name: name.to_string(),
            inputs,
            outputs,
            handler,
            stop,
        }
    }

    /// The stage's primary output kind, used for the summary reference
    /// column. Stages with no declared outputs have none.
    pub fn primary_output(&self) -> Option<ArtifactKind> {
        self.outputs.first().copied()
    }

    /// Display label used in the summary when the stage succeeds.
    ///
    /// Analytical stages report `PASS`; test authoring reports `CREATED`
    /// (artifacts were written, not checked against anything yet); the
    /// implementation loop reports `DONE`.
    pub fn success_label(&self) -> &'static str {
        match self.handler {
            HandlerKind::Direct => "PASS",
            HandlerKind::DelegatedOnce => "CREATED",
            HandlerKind::DelegatedLoop => "DONE",
        }
    }
}

/// Outcome status of one executed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pass,
    Fail,
    Stopped,
}

/// Outcome of executing one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: String,
    pub ordinal: u32,
    pub status: StageStatus,
    /// References to the artifacts this stage persisted.
    pub artifacts: Vec<Artifact>,
    /// Free-text findings reported by the handler.
    pub findings: String,
    /// Whether the handler itself suggested halting the run.
    pub halt_suggested: bool,
    /// The handler's stated reason for suggesting a halt.
    pub halt_reason: Option<String>,
    /// Findings classified blocking (verification stage).
    pub blocking_findings: Vec<String>,
    /// Iteration count for delegated stages.
    pub iterations: Option<u32>,
    /// Terminal-check outcome for delegated stages: did the produced tests
    /// pass, and did the static consistency check pass.
    pub tests_passed: Option<bool>,
    pub check_passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    pub fn elapsed_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

/// The seven-stage reference pipeline, in strict ordinal order.
///
/// Each stage consumes artifacts produced by prior stages; the initiating
/// specification is registered by the caller before stage 1 runs.
pub fn reference_pipeline() -> Vec<Stage> {
    use ArtifactKind::*;
    vec![
        Stage::new(
            "architecture-analysis",
            1,
            "Architecture analysis",
            vec![Specification],
            vec![],
            HandlerKind::Direct,
            StopPolicy::OnDesignIssue,
        ),
        Stage::new(
            "simplification",
            2,
            "Simplification",
            vec![Specification],
            vec![],
            HandlerKind::Direct,
            StopPolicy::OnRewriteRequired,
        ),
        Stage::new(
            "verification",
            3,
            "Static verification",
            vec![Specification],
            vec![VerificationReport],
            HandlerKind::Direct,
            StopPolicy::OnBlockingFinding,
        ),
        Stage::new(
            "test-authoring",
            4,
            "Test authoring",
            vec![Specification, VerificationReport],
            vec![TestFile],
            HandlerKind::DelegatedOnce,
            StopPolicy::Never,
        ),
        Stage::new(
            "implementation-guide",
            5,
            "Implementation guide",
            vec![Specification, VerificationReport, TestFile],
            vec![ImplementationGuide],
            HandlerKind::Direct,
            StopPolicy::Never,
        ),
        Stage::new(
            "implementation",
            6,
            "Implementation loop",
            vec![ImplementationGuide, TestFile],
            vec![CodeChangeSet],
            HandlerKind::DelegatedLoop,
            StopPolicy::OnBudgetExhausted,
        ),
        Stage::new(
            "review",
            7,
            "Final review",
            vec![Specification, CodeChangeSet],
            vec![ReviewReport],
            HandlerKind::Direct,
            StopPolicy::Never,
        ),
    ]
}
