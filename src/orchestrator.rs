//! Pipeline Orchestrator — owns the ordered stage list and the run's
//! state machine.
//!
//! States: `Idle → Running(i) → {Running(i+1) | Stopped(i, reason) |
//! Completed}`. The orchestrator is strictly sequential: it blocks on
//! each stage-executor call before evaluating the stop condition, and it
//! never suppresses a halt or failure to reach later stages. Resumption
//! after a halt is an explicit new invocation by the caller; a halted
//! orchestrator is terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifact::{ArtifactStore, feature_name_from_spec};
use crate::errors::PipelineError;
use crate::executor::StageExecutor;
use crate::handlers::HandlerRegistry;
use crate::report::Summary;
use crate::run::PipelineRun;
use crate::stage::{Stage, StageStatus};
use crate::stop::StopDecision;
use crate::ui::OrchestratorUI;

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorState {
    Idle,
    /// Index into the stage list of the stage about to execute.
    Running(usize),
    Stopped { ordinal: u32, reason: String },
    Completed,
}

pub struct PipelineOrchestrator {
    stages: Vec<Stage>,
    executor: StageExecutor,
    artifact_dir: PathBuf,
    state: OrchestratorState,
    run: Option<PipelineRun>,
    store: Option<ArtifactStore>,
    ui: Option<Arc<OrchestratorUI>>,
}

impl PipelineOrchestrator {
    pub fn new(stages: Vec<Stage>, registry: HandlerRegistry, artifact_dir: &Path) -> Self {
        Self {
            stages,
            executor: StageExecutor::new(registry),
            artifact_dir: artifact_dir.to_path_buf(),
            state: OrchestratorState::Idle,
            run: None,
            store: None,
            ui: None,
        }
    }

    pub fn with_ui(mut self, ui: Arc<OrchestratorUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn run_handle(&self) -> Option<&PipelineRun> {
        self.run.as_ref()
    }

    /// Validate the initiating specification, create the run, and move to
    /// `Running(0)`.
    pub fn start(&mut self, spec_path: &Path) -> Result<(), PipelineError> {
        if self.state != OrchestratorState::Idle {
            return Err(PipelineError::Other(anyhow::anyhow!(
                "orchestrator already started; resumption requires a new invocation"
            )));
        }
        if !spec_path.is_file() {
            return Err(PipelineError::SpecNotFound {
                path: spec_path.to_path_buf(),
            });
        }

        let feature = feature_name_from_spec(spec_path);
        let mut store = ArtifactStore::new(&feature, &self.artifact_dir)?;
        store.register_specification(spec_path)?;

        info!(%feature, spec = %spec_path.display(), "pipeline run starting");
        self.run = Some(PipelineRun::new(spec_path.to_path_buf(), &feature));
        self.store = Some(store);
        self.state = OrchestratorState::Running(0);
        Ok(())
    }

    /// Drive the pipeline stage-by-stage until completion or a halt.
    ///
    /// On `pass` the stage index advances and the next stage executes
    /// immediately; on `fail` or `stopped` control returns to the caller
    /// with no later stage executed.
    pub async fn advance(&mut self) -> Result<(), PipelineError> {
        loop {
            let OrchestratorState::Running(index) = self.state else {
                return Err(PipelineError::Other(anyhow::anyhow!(
                    "advance() called outside Running state"
                )));
            };

            if index >= self.stages.len() {
                self.run_mut().complete();
                self.state = OrchestratorState::Completed;
                info!("pipeline run completed");
                return Ok(());
            }

            let stage = self.stages[index].clone();
            if let Some(ui) = &self.ui {
                ui.start_stage(stage.ordinal, &stage.name);
            }

            // Split borrows at field level so the executor can run against
            // the run and store while the orchestrator stays borrowed.
            let run = self.run.as_mut().expect("run exists while Running");
            let store = self.store.as_mut().expect("store exists while Running");
            let executed = self.executor.execute(&stage, run, store).await;

            match executed {
                Ok((result, StopDecision::Continue)) if result.status == StageStatus::Pass => {
                    if let Some(ui) = &self.ui {
                        ui.stage_complete(&stage.name, stage.success_label());
                    }
                    let run = self.run_mut();
                    run.current_index = index + 1;
                    self.state = OrchestratorState::Running(index + 1);
                }
                Ok((result, decision)) => {
                    let reason = match decision {
                        StopDecision::Halt(reason) => reason.to_string(),
                        StopDecision::Continue => result.findings.clone(),
                    };
                    warn!(stage = %stage.id, %reason, "run halted");
                    if let Some(ui) = &self.ui {
                        ui.stage_halted(&stage.name, &reason);
                    }
                    self.run_mut().stop_at(stage.ordinal);
                    self.state = OrchestratorState::Stopped {
                        ordinal: stage.ordinal,
                        reason,
                    };
                    return Ok(());
                }
                Err(err) => {
                    // Contract violations and other wiring defects still
                    // leave the run accounted for, so the summary renders.
                    self.run_mut().stop_at(stage.ordinal);
                    self.state = OrchestratorState::Stopped {
                        ordinal: stage.ordinal,
                        reason: err.to_string(),
                    };
                    return Err(err);
                }
            }
        }
    }

    /// Render the fixed-schema summary for the current run.
    pub fn summary(&self) -> Option<Summary> {
        let run = self.run.as_ref()?;
        let halt_reason = match &self.state {
            OrchestratorState::Stopped { reason, .. } => Some(reason.clone()),
            _ => None,
        };
        Some(Summary::from_run(&self.stages, run, halt_reason))
    }

    /// The single invocation surface: `run(spec_path) -> Summary`.
    ///
    /// Halted runs return `Ok` — the summary is the complete account of
    /// progress to the point of failure. Only wiring defects (missing
    /// specification, contract violations) surface as errors, and even
    /// then a summary is available through [`Self::summary`].
    pub async fn run(&mut self, spec_path: &Path) -> Result<Summary, PipelineError> {
        self.start(spec_path)?;
        self.advance().await?;
        self.summary().ok_or_else(|| {
            PipelineError::Other(anyhow::anyhow!("run produced no summary"))
        })
    }

    fn run_mut(&mut self) -> &mut PipelineRun {
        self.run.as_mut().expect("run exists while not Idle")
    }
}
