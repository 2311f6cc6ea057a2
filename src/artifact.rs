//! Artifact bookkeeping for a pipeline run.
//!
//! The store tracks every artifact produced or consumed across stages:
//! - canonical on-disk paths derived from the feature name plus a fixed
//!   kind suffix
//! - content hashes for idempotence checks
//! - the single-writer-per-kind invariant (a stage may overwrite its own
//!   artifacts on re-run, never another stage's)
//!
//! The store holds no stage logic; it is pure bookkeeping scoped to one run.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::PipelineError;

/// Producing-stage id recorded on the initiating specification, which is
/// supplied by the caller rather than produced by any stage.
pub const CALLER_STAGE: &str = "caller";

/// The typed artifact kinds the reference pipeline exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Specification,
    VerificationReport,
    TestFile,
    ImplementationGuide,
    CodeChangeSet,
    ReviewReport,
}

impl ArtifactKind {
    /// Fixed filename suffix appended to the feature name.
    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Specification => "_specification.md",
            ArtifactKind::VerificationReport => "_verification_report.md",
            ArtifactKind::TestFile => "_test_file.md",
            ArtifactKind::ImplementationGuide => "_implementation_guide.md",
            ArtifactKind::CodeChangeSet => "_code_change_set.md",
            ArtifactKind::ReviewReport => "_review_report.md",
        }
    }

    /// Kind name as used in marker tags and serialized forms.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Specification => "specification",
            ArtifactKind::VerificationReport => "verification-report",
            ArtifactKind::TestFile => "test-file",
            ArtifactKind::ImplementationGuide => "implementation-guide",
            ArtifactKind::CodeChangeSet => "code-change-set",
            ArtifactKind::ReviewReport => "review-report",
        }
    }

    /// Parse a kind name as it appears in marker tags.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "specification" => Some(ArtifactKind::Specification),
            "verification-report" => Some(ArtifactKind::VerificationReport),
            "test-file" => Some(ArtifactKind::TestFile),
            "implementation-guide" => Some(ArtifactKind::ImplementationGuide),
            "code-change-set" => Some(ArtifactKind::CodeChangeSet),
            "review-report" => Some(ArtifactKind::ReviewReport),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unwritten artifact content returned by a handler, before the store
/// assigns it a path and hash.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactDraft {
    pub kind: ArtifactKind,
    pub body: String,
}

impl ArtifactDraft {
    pub fn new(kind: ArtifactKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }
}

/// A named, typed, immutable unit of stage output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    /// Stage id that wrote this artifact, or [`CALLER_STAGE`] for the
    /// initiating specification.
    pub produced_by: String,
    pub path: PathBuf,
    pub content_hash: String,
    /// Body kept in memory so handlers can assemble prompts without
    /// re-reading files.
    #[serde(skip)]
    pub body: String,
}

impl Artifact {
    /// Short reference used in the summary table.
    pub fn short_ref(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Hex-encoded SHA-256 of artifact body text.
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract the feature name from the initiating specification's filename.
///
/// `docs/todo/FEAT47_specification.md` yields `FEAT47`. Falls back to the
/// full file stem when the `_specification` suffix is absent.
pub fn feature_name_from_spec(spec_path: &Path) -> String {
    let stem = spec_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.strip_suffix("_specification")
        .map(str::to_string)
        .unwrap_or(stem)
}

/// Per-run artifact store keyed by kind.
#[derive(Debug)]
pub struct ArtifactStore {
    feature: String,
    artifact_dir: PathBuf,
    entries: HashMap<ArtifactKind, Artifact>,
}

impl ArtifactStore {
    /// Create a store for one run, ensuring the artifact directory exists.
    pub fn new(feature: &str, artifact_dir: &Path) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(artifact_dir).map_err(|source| {
            PipelineError::ArtifactWriteFailed {
                path: artifact_dir.to_path_buf(),
                source,
            }
        })?;
        Ok(Self {
            feature: feature.to_string(),
            artifact_dir: artifact_dir.to_path_buf(),
            entries: HashMap::new(),
        })
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Canonical path for a kind: `<dir>/<feature><kind-suffix>`.
    pub fn canonical_path(&self, kind: ArtifactKind) -> PathBuf {
        self.artifact_dir
            .join(format!("{}{}", self.feature, kind.suffix()))
    }

    /// Register the initiating specification from an existing file.
    ///
    /// The file is read in place; it is not copied into the artifact
    /// directory, since the caller owns it across runs.
    pub fn register_specification(&mut self, spec_path: &Path) -> Result<Artifact, PipelineError> {
        let body =
            std::fs::read_to_string(spec_path).map_err(|_| PipelineError::SpecNotFound {
                path: spec_path.to_path_buf(),
            })?;
        let artifact = Artifact {
            name: format!("{} specification", self.feature),
            kind: ArtifactKind::Specification,
            produced_by: CALLER_STAGE.to_string(),
            path: spec_path.to_path_buf(),
            content_hash: content_hash(&body),
            body,
        };
        self.entries.insert(ArtifactKind::Specification, artifact.clone());
        Ok(artifact)
    }

    /// Persist a handler's draft under the producing stage id.
    ///
    /// Enforces the single-writer-per-kind invariant: overwriting is only
    /// allowed when the existing artifact was produced by the same stage
    /// (a stage re-run within the run).
    pub fn persist(
        &mut self,
        stage_id: &str,
        draft: ArtifactDraft,
    ) -> Result<Artifact, PipelineError> {
        if let Some(existing) = self.entries.get(&draft.kind)
            && existing.produced_by != stage_id
        {
            return Err(PipelineError::ArtifactOwnership {
                stage: stage_id.to_string(),
                kind: draft.kind,
                owner: existing.produced_by.clone(),
            });
        }

        let path = self.canonical_path(draft.kind);
        let contents = format!(
            "<!-- feature: {} -->\n<!-- stage: {} -->\n\n{}",
            self.feature, stage_id, draft.body
        );
        std::fs::write(&path, &contents).map_err(|source| PipelineError::ArtifactWriteFailed {
            path: path.clone(),
            source,
        })?;

        let artifact = Artifact {
            name: format!("{} {}", self.feature, draft.kind),
            kind: draft.kind,
            produced_by: stage_id.to_string(),
            path,
            content_hash: content_hash(&draft.body),
            body: draft.body,
        };
        self.entries.insert(artifact.kind, artifact.clone());
        Ok(artifact)
    }

    pub fn resolve(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.entries.get(&kind)
    }

    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Resolve every declared input kind, or report the missing ones.
    pub fn resolve_all(&self, kinds: &[ArtifactKind]) -> Result<Vec<Artifact>, Vec<ArtifactKind>> {
        let missing: Vec<ArtifactKind> = kinds
            .iter()
            .copied()
            .filter(|k| !self.entries.contains_key(k))
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }
        Ok(kinds
            .iter()
            .map(|k| self.entries[k].clone())
            .collect())
    }
}
