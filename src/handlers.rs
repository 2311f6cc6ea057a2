//! Stage handlers — the uniform polymorphic interface between the
//! executor and the collaborators that do the actual analytical or
//! generative work.
//!
//! Two variants exist, mirroring how stages are dispatched:
//! - direct analytical handlers (architecture review, simplification,
//!   static verification, implementation guide, final review) call the
//!   agent once and interpret its marker output synchronously;
//! - delegated handlers route through the invocation gateway, either
//!   single-shot (test authoring) or as a bounded loop (implementation).
//!
//! New stage types are added by implementing [`StageHandler`], never by
//! special-casing the orchestrator.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::AgentInvoker;
use crate::artifact::{Artifact, ArtifactDraft};
use crate::config::Config;
use crate::errors::PipelineError;
use crate::gateway::{DelegatedTask, InvocationGateway, TaskInvocation};
use crate::markers::parse_output;
use crate::stage::{HandlerKind, Stage, reference_pipeline};

/// What a handler reports back to the executor.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub findings: String,
    pub outputs: Vec<ArtifactDraft>,
    pub halt_suggested: bool,
    pub halt_reason: Option<String>,
    pub blocking_findings: Vec<String>,
    /// Iteration count, for delegated stages.
    pub iterations: Option<u32>,
    pub tests_passed: Option<bool>,
    pub check_passed: Option<bool>,
    /// Whether the delegated work reached its terminal check.
    pub delegate_succeeded: Option<bool>,
}

/// Uniform stage handler contract: resolved input artifacts in, findings
/// plus produced artifacts out.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(
        &self,
        stage: &Stage,
        inputs: &[Artifact],
    ) -> Result<HandlerOutcome, PipelineError>;
}

/// Assemble the agent prompt for a stage from its resolved inputs.
///
/// Layout follows a fixed section order so invocations with unchanged
/// inputs produce byte-identical prompts (and, for pure-check stages,
/// identical findings).
pub fn build_prompt(stage: &Stage, feature: &str, inputs: &[Artifact]) -> String {
    let mut prompt = format!(
        "You are performing the \"{}\" stage of the {} feature pipeline.\n\n",
        stage.name, feature
    );

    prompt.push_str("## INPUT ARTIFACTS\n");
    for artifact in inputs {
        prompt.push_str(&format!("\n### {} ({})\n{}\n", artifact.kind, artifact.produced_by, artifact.body));
    }

    prompt.push_str("\n## OUTPUT PROTOCOL\n");
    for kind in &stage.outputs {
        prompt.push_str(&format!(
            "- Emit the {} as <artifact kind=\"{}\">...</artifact>\n",
            kind,
            kind.as_str()
        ));
    }
    match stage.handler {
        HandlerKind::Direct => {
            prompt.push_str(
                "- If you find a condition that must stop the pipeline, emit \
                 <halt>reason</halt>\n\
                 - Classify findings where a referenced artifact, symbol, or \
                 dependency does not exist as <blocking>issue</blocking>\n",
            );
        }
        HandlerKind::DelegatedOnce | HandlerKind::DelegatedLoop => {
            prompt.push_str("- All other output is recorded as free-text findings\n");
        }
    }

    prompt.push_str(&format!("\n## TASK\nPerform stage {} - {}\n", stage.ordinal, stage.name));
    prompt
}

/// Direct analytical handler: one synchronous agent call, marker output
/// interpreted in place.
pub struct DirectAgentHandler {
    invoker: Arc<AgentInvoker>,
    feature: String,
}

impl DirectAgentHandler {
    pub fn new(invoker: Arc<AgentInvoker>, feature: &str) -> Self {
        Self {
            invoker,
            feature: feature.to_string(),
        }
    }
}

#[async_trait]
impl StageHandler for DirectAgentHandler {
    async fn handle(
        &self,
        stage: &Stage,
        inputs: &[Artifact],
    ) -> Result<HandlerOutcome, PipelineError> {
        let prompt = build_prompt(stage, &self.feature, inputs);
        let output = self
            .invoker
            .invoke(&stage.id, 1, &prompt)
            .await
            .map_err(|e| PipelineError::InvocationFailure {
                stage: stage.id.clone(),
                message: e.to_string(),
            })?;

        let parsed = parse_output(&output);
        Ok(HandlerOutcome {
            findings: parsed.findings,
            outputs: parsed.artifacts,
            halt_suggested: parsed.halt.is_some(),
            halt_reason: parsed.halt,
            blocking_findings: parsed.blocking,
            ..Default::default()
        })
    }
}

/// Production [`DelegatedTask`]: each invocation pipes the stage prompt to
/// the agent subprocess and parses marker output.
pub struct AgentTask {
    invoker: Arc<AgentInvoker>,
    label: String,
    prompt: String,
}

impl AgentTask {
    pub fn new(invoker: Arc<AgentInvoker>, label: &str, prompt: String) -> Self {
        Self {
            invoker,
            label: label.to_string(),
            prompt,
        }
    }
}

#[async_trait]
impl DelegatedTask for AgentTask {
    async fn run(&self, iteration: u32) -> Result<TaskInvocation> {
        let output = self.invoker.invoke(&self.label, iteration, &self.prompt).await?;
        let parsed = parse_output(&output);
        Ok(TaskInvocation {
            artifacts: parsed.artifacts,
            findings: parsed.findings,
        })
    }
}

/// Single-shot delegation handler (test authoring).
pub struct DelegatedOnceHandler {
    invoker: Arc<AgentInvoker>,
    gateway: Arc<InvocationGateway>,
    feature: String,
}

impl DelegatedOnceHandler {
    pub fn new(invoker: Arc<AgentInvoker>, gateway: Arc<InvocationGateway>, feature: &str) -> Self {
        Self {
            invoker,
            gateway,
            feature: feature.to_string(),
        }
    }
}

#[async_trait]
impl StageHandler for DelegatedOnceHandler {
    async fn handle(
        &self,
        stage: &Stage,
        inputs: &[Artifact],
    ) -> Result<HandlerOutcome, PipelineError> {
        let prompt = build_prompt(stage, &self.feature, inputs);
        let task = AgentTask::new(self.invoker.clone(), &stage.id, prompt);
        let result = self.gateway.invoke_once(&task).await.map_err(|e| {
            PipelineError::InvocationFailure {
                stage: stage.id.clone(),
                message: e.to_string(),
            }
        })?;

        let mut findings = result.findings;
        if let Some(anomaly) = &result.anomaly {
            findings.push_str(&format!("\nANOMALY: {}", anomaly));
        }

        Ok(HandlerOutcome {
            findings,
            outputs: result.artifacts,
            iterations: Some(result.iterations),
            tests_passed: result.tests_passed,
            check_passed: result.check_passed,
            delegate_succeeded: Some(result.success),
            ..Default::default()
        })
    }
}

/// Bounded-loop delegation handler (iterative implementation).
pub struct DelegatedLoopHandler {
    invoker: Arc<AgentInvoker>,
    gateway: Arc<InvocationGateway>,
    feature: String,
}

impl DelegatedLoopHandler {
    pub fn new(invoker: Arc<AgentInvoker>, gateway: Arc<InvocationGateway>, feature: &str) -> Self {
        Self {
            invoker,
            gateway,
            feature: feature.to_string(),
        }
    }
}

#[async_trait]
impl StageHandler for DelegatedLoopHandler {
    async fn handle(
        &self,
        stage: &Stage,
        inputs: &[Artifact],
    ) -> Result<HandlerOutcome, PipelineError> {
        let prompt = build_prompt(stage, &self.feature, inputs);
        let task = AgentTask::new(self.invoker.clone(), &stage.id, prompt);
        let result = self.gateway.invoke_looped(&task).await.map_err(|e| {
            PipelineError::InvocationFailure {
                stage: stage.id.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(HandlerOutcome {
            findings: result.findings,
            outputs: result.artifacts,
            iterations: Some(result.iterations),
            tests_passed: result.tests_passed,
            check_passed: result.check_passed,
            delegate_succeeded: Some(result.success),
            ..Default::default()
        })
    }
}

/// Stage-id → handler lookup owned by the executor.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn StageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stage_id: &str, handler: Arc<dyn StageHandler>) {
        self.handlers.insert(stage_id.to_string(), handler);
    }

    pub fn get(&self, stage_id: &str) -> Option<Arc<dyn StageHandler>> {
        self.handlers.get(stage_id).cloned()
    }

    /// Wire the reference pipeline's stages to production handlers.
    pub fn production(config: &Config, feature: &str) -> Self {
        let invoker = Arc::new(AgentInvoker::new(&config.agent_cmd, &config.log_dir));
        let gateway = Arc::new(InvocationGateway::new(
            &config.project_dir,
            &config.test_cmd,
            &config.check_cmd,
            config.max_iterations,
        ));

        let mut registry = Self::new();
        for stage in reference_pipeline() {
            let handler: Arc<dyn StageHandler> = match stage.handler {
                HandlerKind::Direct => {
                    Arc::new(DirectAgentHandler::new(invoker.clone(), feature))
                }
                HandlerKind::DelegatedOnce => Arc::new(DelegatedOnceHandler::new(
                    invoker.clone(),
                    gateway.clone(),
                    feature,
                )),
                HandlerKind::DelegatedLoop => Arc::new(DelegatedLoopHandler::new(
                    invoker.clone(),
                    gateway.clone(),
                    feature,
                )),
            };
            registry.register(&stage.id, handler);
        }
        registry
    }
}
