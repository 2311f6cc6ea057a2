//! Runtime configuration for conveyor.
//!
//! Settings are layered: built-in defaults, then an optional
//! `conveyor.toml` at the project root, then CLI overrides.
//!
//! ```toml
//! [agent]
//! cmd = "claude --print"
//!
//! [delegation]
//! max_iterations = 10
//! test_cmd = "cargo test"
//! check_cmd = "cargo check"
//!
//! [artifacts]
//! dir = ".conveyor/artifacts"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default iteration cap for the bounded implementation loop. The bound
/// must be a configured, finite value; this is the fallback when neither
/// `conveyor.toml` nor `--max-iterations` supplies one.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

const DEFAULT_AGENT_CMD: &str = "claude";
const DEFAULT_TEST_CMD: &str = "cargo test";
const DEFAULT_CHECK_CMD: &str = "cargo check";

/// Contents of `conveyor.toml`. All sections are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConveyorToml {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub delegation: DelegationSection,
    #[serde(default)]
    pub artifacts: ArtifactsSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSection {
    /// Command used to invoke the agent; the prompt is piped to stdin.
    pub cmd: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegationSection {
    pub max_iterations: Option<u32>,
    pub test_cmd: Option<String>,
    pub check_cmd: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactsSection {
    /// Artifact directory, relative to the project root.
    pub dir: Option<String>,
}

impl ConveyorToml {
    /// Load `conveyor.toml` from the project root, or defaults when absent.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join("conveyor.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Resolved runtime configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub log_dir: PathBuf,
    pub agent_cmd: String,
    pub test_cmd: String,
    pub check_cmd: String,
    pub max_iterations: u32,
    pub verbose: bool,
}

impl Config {
    /// Resolve configuration from the project directory, `conveyor.toml`,
    /// and CLI overrides.
    pub fn new(
        project_dir: PathBuf,
        verbose: bool,
        max_iterations_override: Option<u32>,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        let file = ConveyorToml::load_or_default(&project_dir)?;

        let artifact_dir = project_dir.join(
            file.artifacts
                .dir
                .as_deref()
                .unwrap_or(".conveyor/artifacts"),
        );
        let log_dir = project_dir.join(".conveyor/logs");

        let agent_cmd = file
            .agent
            .cmd
            .or_else(|| std::env::var("CONVEYOR_AGENT_CMD").ok())
            .unwrap_or_else(|| DEFAULT_AGENT_CMD.to_string());

        let max_iterations = max_iterations_override
            .or(file.delegation.max_iterations)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);

        Ok(Self {
            project_dir,
            artifact_dir,
            log_dir,
            agent_cmd,
            test_cmd: file
                .delegation
                .test_cmd
                .unwrap_or_else(|| DEFAULT_TEST_CMD.to_string()),
            check_cmd: file
                .delegation
                .check_cmd
                .unwrap_or_else(|| DEFAULT_CHECK_CMD.to_string()),
            max_iterations,
            verbose,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.artifact_dir)
            .context("Failed to create artifact directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}
