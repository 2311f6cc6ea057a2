//! Typed error hierarchy for the conveyor orchestrator.
//!
//! Two top-level types cover the two failure planes:
//! - `PipelineError` — run-level failures that terminate the pipeline
//! - `HaltReason` — deliberate stop-condition outcomes, recoverable by
//!   caller action (fix inputs, re-run)
//!
//! A `HaltReason` is not an error in the `Result` sense: it is recorded on
//! the run and surfaced through the summary. `PipelineError::StageHalt`
//! wraps one when the CLI needs a non-zero exit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactKind;

/// Why a stop condition fired for a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HaltReason {
    /// Architecture analysis flagged a fundamental, unresolvable design issue.
    DesignIssue(String),
    /// Simplification flagged a major rewrite that the caller must approve.
    RewriteRequired(String),
    /// Verification found at least one blocking issue (missing artifact,
    /// symbol, or dependency).
    BlockingFindings(Vec<String>),
    /// The implementation loop reached its iteration cap without the
    /// terminal check succeeding.
    BudgetExhausted {
        iterations: u32,
        tests_passed: bool,
        check_passed: bool,
    },
    /// The delegated task itself could not be invoked or crashed.
    InvocationFailed(String),
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::DesignIssue(msg) => write!(f, "fundamental design issue: {}", msg),
            HaltReason::RewriteRequired(msg) => write!(f, "major rewrite required: {}", msg),
            HaltReason::BlockingFindings(issues) => {
                write!(
                    f,
                    "{} blocking finding(s): {}",
                    issues.len(),
                    issues.join("; ")
                )
            }
            HaltReason::BudgetExhausted {
                iterations,
                tests_passed,
                check_passed,
            } => write!(
                f,
                "iteration budget exhausted after {} iteration(s) (tests passed: {}, check passed: {})",
                iterations, tests_passed, check_passed
            ),
            HaltReason::InvocationFailed(msg) => write!(f, "invocation failed: {}", msg),
        }
    }
}

/// Run-terminating failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage's declared input artifact kind is missing from the store.
    /// This is a defect in pipeline wiring, not in the work itself, and is
    /// fatal to the run — distinct from a normal halt.
    #[error("contract violation at stage {stage}: missing input artifact(s) {missing:?}")]
    ContractViolation {
        stage: String,
        missing: Vec<ArtifactKind>,
    },

    /// A stop condition fired; the run transitioned to stopped_at_stage_N.
    #[error("stage {stage} halted the run: {reason}")]
    StageHalt { stage: String, reason: HaltReason },

    /// The bounded implementation loop reached its cap without success.
    #[error("delegation exhausted at stage {stage} after {iterations} iteration(s)")]
    DelegationExhausted { stage: String, iterations: u32 },

    /// The delegated task could not be invoked (unavailable, crashed).
    /// Treated as stage `fail`; the run halts and is not retried.
    #[error("failed to invoke delegated task for stage {stage}: {message}")]
    InvocationFailure { stage: String, message: String },

    /// A stage attempted to overwrite an artifact kind owned by another
    /// stage within the same run.
    #[error("stage {stage} attempted to overwrite {kind} produced by stage {owner}")]
    ArtifactOwnership {
        stage: String,
        kind: ArtifactKind,
        owner: String,
    },

    #[error("failed to write artifact at {path}: {source}")]
    ArtifactWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("specification not found at {path}")]
    SpecNotFound { path: std::path::PathBuf },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether this failure is a pipeline-wiring defect rather than a
    /// normal halt. Contract violations are never recoverable by re-running
    /// with fixed inputs alone.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, PipelineError::ContractViolation { .. })
    }
}
