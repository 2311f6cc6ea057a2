//! The mutable root of one orchestration: run identity, stage history,
//! and overall status.
//!
//! History is append-only and strictly ordinal-ordered; the stage executor
//! is the only caller of [`PipelineRun::record`]. The run is in-memory
//! bookkeeping only — artifacts stay on disk, the run does not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::stage::{StageResult, StageStatus};

/// Overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    /// The run halted at the given 1-based stage ordinal.
    StoppedAtStage(u32),
    Completed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::StoppedAtStage(n) => write!(f, "STOPPED_AT_STAGE_{}", n),
            RunStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// One pipeline run from `start(spec_path)` to completion or halt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub spec_path: PathBuf,
    pub feature: String,
    pub started_at: DateTime<Utc>,
    /// Ordered StageResult history; ordinals are strictly increasing with
    /// no gaps.
    pub history: Vec<StageResult>,
    /// Index of the stage currently executing (0-based into the stage
    /// list), equal to `history.len()` while running.
    pub current_index: usize,
    pub status: RunStatus,
}

impl PipelineRun {
    pub fn new(spec_path: PathBuf, feature: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            spec_path,
            feature: feature.to_string(),
            started_at: Utc::now(),
            history: Vec::new(),
            current_index: 0,
            status: RunStatus::Running,
        }
    }

    /// Append a stage result to the history.
    ///
    /// Panics in debug builds if the ordinal is out of order; execution
    /// order is a structural invariant of the orchestrator, not input data.
    pub fn record(&mut self, result: StageResult) {
        debug_assert_eq!(
            result.ordinal as usize,
            self.history.len() + 1,
            "stage results must arrive in strict ordinal order"
        );
        self.history.push(result);
    }

    /// Result recorded for a given stage ordinal, if that stage executed.
    pub fn result_for(&self, ordinal: u32) -> Option<&StageResult> {
        self.history.iter().find(|r| r.ordinal == ordinal)
    }

    /// Whether every recorded stage passed so far.
    pub fn all_passed(&self) -> bool {
        self.history.iter().all(|r| r.status == StageStatus::Pass)
    }

    /// Mark the run halted at the given ordinal.
    pub fn stop_at(&mut self, ordinal: u32) {
        self.status = RunStatus::StoppedAtStage(ordinal);
    }

    /// Mark the run completed after the last stage.
    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
    }
}
