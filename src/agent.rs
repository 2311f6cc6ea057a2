//! Subprocess invocation of the external agent.
//!
//! The agent command is an opaque capability: it receives a prompt on
//! stdin and emits findings and marker tags on stdout. Each invocation's
//! prompt and captured output are written to the run's log directory,
//! named by stage and iteration.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

pub struct AgentInvoker {
    cmd: String,
    log_dir: PathBuf,
}

impl AgentInvoker {
    pub fn new(cmd: &str, log_dir: &Path) -> Self {
        Self {
            cmd: cmd.to_string(),
            log_dir: log_dir.to_path_buf(),
        }
    }

    fn prompt_file(&self, label: &str, iteration: u32) -> PathBuf {
        self.log_dir
            .join(format!("stage-{}-iter-{}-prompt.md", label, iteration))
    }

    fn output_file(&self, label: &str, iteration: u32) -> PathBuf {
        self.log_dir
            .join(format!("stage-{}-iter-{}-output.log", label, iteration))
    }

    /// Run the agent once: prompt in on stdin, captured stdout back.
    ///
    /// A non-zero exit is an invocation failure; the stderr tail is
    /// included in the error.
    pub async fn invoke(&self, label: &str, iteration: u32, prompt: &str) -> Result<String> {
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        let prompt_file = self.prompt_file(label, iteration);
        std::fs::write(&prompt_file, prompt).context("Failed to write prompt file")?;

        debug!(label, iteration, cmd = %self.cmd, "invoking agent");
        let start = Instant::now();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.cmd)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn agent command: {}", self.cmd))?;

        if let Some(mut stdin) = child.stdin.take() {
            // The agent may exit without draining stdin; a broken pipe here
            // is its prerogative, the exit status tells the real story.
            let _ = stdin.write_all(prompt.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for agent process")?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let output_file = self.output_file(label, iteration);
        std::fs::write(&output_file, &stdout).context("Failed to write output file")?;

        info!(
            label,
            iteration,
            elapsed_secs = start.elapsed().as_secs_f64(),
            exit = output.status.code().unwrap_or(-1),
            "agent invocation finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            anyhow::bail!(
                "agent exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                tail
            );
        }

        Ok(stdout)
    }
}

/// Run a success-predicate command (test or consistency check) in the
/// project directory, reporting whether it exited zero.
pub async fn run_check_command(cmd: &str, project_dir: &Path) -> Result<bool> {
    debug!(cmd, "running check command");
    let status = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(project_dir)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .with_context(|| format!("Failed to run check command: {}", cmd))?;
    Ok(status.success())
}
