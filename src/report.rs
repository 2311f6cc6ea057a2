//! Summary Reporter — the fixed-schema account of a run.
//!
//! One row per defined stage, whether or not it executed: ordinal, name,
//! status (`PASS`/`FAIL`/`DONE`/`CREATED`/`N/A`), and a short reference
//! to the stage's primary output artifact. The summary renders for every
//! run, halted or completed, so the caller always receives a complete
//! account of progress to the point of failure.

use console::style;
use serde::Serialize;

use crate::run::PipelineRun;
use crate::stage::{Stage, StageStatus};

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub ordinal: u32,
    pub name: String,
    pub status: String,
    /// Filename of the stage's primary output, or `-`.
    pub output: String,
    pub iterations: Option<u32>,
    pub elapsed_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub feature: String,
    /// `COMPLETED` or `STOPPED_AT_STAGE_<n>`.
    pub overall: String,
    pub halt_reason: Option<String>,
    pub rows: Vec<SummaryRow>,
}

impl Summary {
    /// Build the summary from the defined stage list and the run history.
    /// Stages without a recorded result get a placeholder `N/A` row.
    pub fn from_run(stages: &[Stage], run: &PipelineRun, halt_reason: Option<String>) -> Self {
        let rows = stages
            .iter()
            .map(|stage| match run.result_for(stage.ordinal) {
                Some(result) => SummaryRow {
                    ordinal: stage.ordinal,
                    name: stage.name.clone(),
                    status: match result.status {
                        StageStatus::Pass => stage.success_label().to_string(),
                        StageStatus::Fail | StageStatus::Stopped => "FAIL".to_string(),
                    },
                    output: result
                        .artifacts
                        .first()
                        .map(|a| a.short_ref())
                        .unwrap_or_else(|| "-".to_string()),
                    iterations: result.iterations,
                    elapsed_secs: Some(result.elapsed_secs()),
                },
                None => SummaryRow {
                    ordinal: stage.ordinal,
                    name: stage.name.clone(),
                    status: "N/A".to_string(),
                    output: "-".to_string(),
                    iterations: None,
                    elapsed_secs: None,
                },
            })
            .collect();

        Self {
            feature: run.feature.clone(),
            overall: run.status.to_string(),
            halt_reason,
            rows,
        }
    }

    /// Render the table for the terminal.
    pub fn render(&self) -> String {
        let name_width = self
            .rows
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max("Stage".len());

        let mut out = String::new();
        out.push_str(&format!("\nPipeline summary for {}\n\n", self.feature));
        out.push_str(&format!(
            "  {:>2}  {:<name_width$}  {:<7}  {:<10}  {}\n",
            "#", "Stage", "Status", "Iterations", "Output"
        ));
        for row in &self.rows {
            // Pad before styling; ANSI escapes would throw the width off.
            let padded = format!("{:<7}", row.status);
            let status = match row.status.as_str() {
                "FAIL" => style(padded).red().to_string(),
                "N/A" => style(padded).dim().to_string(),
                _ => style(padded).green().to_string(),
            };
            let iterations = row
                .iterations
                .map(|i| i.to_string())
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "  {:>2}  {:<name_width$}  {}  {:<10}  {}\n",
                row.ordinal, row.name, status, iterations, row.output
            ));
        }

        out.push_str(&format!("\nOverall: {}\n", self.overall));
        if let Some(reason) = &self.halt_reason {
            out.push_str(&format!("Reason:  {}\n", reason));
        }
        out
    }
}
