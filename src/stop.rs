//! Stop-Condition Evaluator — the single source of halt policy.
//!
//! The evaluator is a pure per-stage predicate over a [`StageResult`]; it
//! owns no other state. The predicate table:
//!
//! | stage policy        | halts when                                        |
//! |---------------------|---------------------------------------------------|
//! | `OnDesignIssue`     | the handler reported a fundamental design issue   |
//! | `OnRewriteRequired` | the handler reported a major rewrite is required  |
//! | `OnBlockingFinding` | any finding is classified blocking                |
//! | `OnBudgetExhausted` | the iteration cap was hit without the terminal    |
//! |                     | check succeeding                                  |
//! | `Never`             | never — findings are recorded, progression keeps  |

use crate::errors::HaltReason;
use crate::stage::{Stage, StageResult, StopPolicy};

/// Decision for the orchestrator after a stage executes.
#[derive(Debug, Clone, PartialEq)]
pub enum StopDecision {
    Continue,
    Halt(HaltReason),
}

#[derive(Debug, Default)]
pub struct StopConditionEvaluator;

impl StopConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Apply the stage's predicate to its result.
    pub fn evaluate(&self, stage: &Stage, result: &StageResult) -> StopDecision {
        match stage.stop {
            StopPolicy::Never => StopDecision::Continue,
            StopPolicy::OnDesignIssue => {
                if result.halt_suggested {
                    StopDecision::Halt(HaltReason::DesignIssue(stated_reason(result)))
                } else {
                    StopDecision::Continue
                }
            }
            StopPolicy::OnRewriteRequired => {
                if result.halt_suggested {
                    StopDecision::Halt(HaltReason::RewriteRequired(stated_reason(result)))
                } else {
                    StopDecision::Continue
                }
            }
            StopPolicy::OnBlockingFinding => {
                if result.blocking_findings.is_empty() {
                    StopDecision::Continue
                } else {
                    StopDecision::Halt(HaltReason::BlockingFindings(
                        result.blocking_findings.clone(),
                    ))
                }
            }
            StopPolicy::OnBudgetExhausted => {
                if result.tests_passed == Some(true) && result.check_passed == Some(true) {
                    StopDecision::Continue
                } else {
                    StopDecision::Halt(HaltReason::BudgetExhausted {
                        iterations: result.iterations.unwrap_or(0),
                        tests_passed: result.tests_passed.unwrap_or(false),
                        check_passed: result.check_passed.unwrap_or(false),
                    })
                }
            }
        }
    }
}

fn stated_reason(result: &StageResult) -> String {
    result
        .halt_reason
        .clone()
        .unwrap_or_else(|| "handler suggested halting without a stated reason".to_string())
}
