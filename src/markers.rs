//! Marker parsing from handler output.
//!
//! Stage handlers and delegated tasks communicate structured outcomes
//! through inline marker tags in their captured output:
//!
//! - `<halt>reason</halt>` — the handler suggests halting the run
//! - `<blocking>issue</blocking>` — a finding classified blocking
//!   (referenced artifact, symbol, or dependency does not exist)
//! - `<artifact kind="verification-report">body</artifact>` — produced
//!   artifact content, persisted by the store under the producing stage
//!
//! Everything outside marker tags is the handler's free-text findings.

use regex::Regex;
use std::sync::LazyLock;

use crate::artifact::{ArtifactDraft, ArtifactKind};

static HALT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<halt>(.*?)</halt>").unwrap());

static BLOCKING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<blocking>(.*?)</blocking>").unwrap());

static ARTIFACT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<artifact\s+kind="([a-z-]+)">\s*(.*?)\s*</artifact>"#).unwrap()
});

/// Structured outcome extracted from one invocation's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    /// Halt suggestion, with the handler's stated reason.
    pub halt: Option<String>,
    /// Findings classified blocking.
    pub blocking: Vec<String>,
    /// Artifact bodies keyed by declared kind.
    pub artifacts: Vec<ArtifactDraft>,
    /// Free text with all marker blocks stripped.
    pub findings: String,
}

/// Extract all markers from captured handler output.
pub fn parse_output(text: &str) -> ParsedOutput {
    let halt = HALT_REGEX
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    let blocking: Vec<String> = BLOCKING_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut artifacts = Vec::new();
    for cap in ARTIFACT_REGEX.captures_iter(text) {
        let (Some(kind_match), Some(body_match)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        match ArtifactKind::parse(kind_match.as_str()) {
            Some(kind) => artifacts.push(ArtifactDraft::new(kind, body_match.as_str())),
            None => {
                tracing::warn!(kind = kind_match.as_str(), "ignoring unknown artifact kind");
            }
        }
    }

    let mut findings = text.to_string();
    for re in [&*HALT_REGEX, &*BLOCKING_REGEX, &*ARTIFACT_REGEX] {
        findings = re.replace_all(&findings, "").into_owned();
    }
    let findings = findings
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    ParsedOutput {
        halt,
        blocking,
        artifacts,
        findings,
    }
}
