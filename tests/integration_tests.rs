//! Integration tests for conveyor.
//!
//! These drive the binary end-to-end against a scripted agent command
//! that answers each stage prompt with canned marker output.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a conveyor Command
fn conveyor() -> Command {
    cargo_bin_cmd!("conveyor")
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Write a feature specification and return its path.
fn write_spec(dir: &TempDir, feature: &str) -> PathBuf {
    let todo = dir.path().join("docs/todo");
    fs::create_dir_all(&todo).unwrap();
    let spec = todo.join(format!("{}_specification.md", feature));
    fs::write(&spec, format!("# {feature}\n\nBuild the thing.\n")).unwrap();
    spec
}

/// Install an agent script that answers each stage prompt with marker
/// output appropriate for that stage, plus a conveyor.toml pointing at it.
fn install_scripted_agent(dir: &TempDir) {
    let script = dir.path().join("agent.sh");
    fs::write(
        &script,
        r#"#!/bin/sh
prompt=$(cat)
case "$prompt" in
*"Static verification"*)
    printf 'All references resolve.\n<artifact kind="verification-report">no blocking findings</artifact>\n'
    ;;
*"Test authoring"*)
    printf '<artifact kind="test-file">#[test] fn covers_feature() {}</artifact>\n'
    ;;
*"Implementation guide"*)
    printf '<artifact kind="implementation-guide">1. write code</artifact>\n'
    ;;
*"Implementation loop"*)
    printf '<artifact kind="code-change-set">diff --git a/lib.rs b/lib.rs</artifact>\n'
    ;;
*"Final review"*)
    printf '<artifact kind="review-report">looks correct</artifact>\n'
    ;;
*)
    printf 'No issues found.\n'
    ;;
esac
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("conveyor.toml"),
        format!(
            r#"
[agent]
cmd = "sh {}"

[delegation]
max_iterations = 3
test_cmd = "true"
check_cmd = "true"
"#,
            script.display()
        ),
    )
    .unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_conveyor_help() {
        conveyor().arg("--help").assert().success();
    }

    #[test]
    fn test_conveyor_version() {
        conveyor().arg("--version").assert().success();
    }

    #[test]
    fn test_stages_lists_all_seven_in_order() {
        conveyor()
            .arg("stages")
            .assert()
            .success()
            .stdout(predicate::str::contains("Architecture analysis"))
            .stdout(predicate::str::contains("Static verification"))
            .stdout(predicate::str::contains("Final review"));
    }

    #[test]
    fn test_run_with_missing_spec_fails() {
        let dir = create_temp_project();
        conveyor()
            .arg("run")
            .arg(dir.path().join("docs/todo/NOPE_specification.md"))
            .arg("--project-dir")
            .arg(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("specification not found"));
    }
}

// =============================================================================
// Full Pipeline Runs
// =============================================================================

mod pipeline_runs {
    use super::*;

    #[test]
    fn test_full_run_completes_and_persists_artifacts() {
        let dir = create_temp_project();
        let spec = write_spec(&dir, "FEAT47");
        install_scripted_agent(&dir);

        conveyor()
            .arg("run")
            .arg(&spec)
            .arg("--project-dir")
            .arg(dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("COMPLETED"))
            .stdout(predicate::str::contains("PASS"))
            .stdout(predicate::str::contains("CREATED"))
            .stdout(predicate::str::contains("DONE"));

        // Every produced artifact lands at its canonical path.
        let artifacts = dir.path().join(".conveyor/artifacts");
        for name in [
            "FEAT47_verification_report.md",
            "FEAT47_test_file.md",
            "FEAT47_implementation_guide.md",
            "FEAT47_code_change_set.md",
            "FEAT47_review_report.md",
        ] {
            assert!(artifacts.join(name).exists(), "missing artifact {}", name);
        }

        // Prompts and outputs are logged per stage invocation.
        let logs = dir.path().join(".conveyor/logs");
        assert!(logs.join("stage-verification-iter-1-prompt.md").exists());
        assert!(logs.join("stage-verification-iter-1-output.log").exists());
    }

    #[test]
    fn test_json_summary_output() {
        let dir = create_temp_project();
        let spec = write_spec(&dir, "FEAT9");
        install_scripted_agent(&dir);

        let output = conveyor()
            .arg("run")
            .arg(&spec)
            .arg("--json")
            .arg("--project-dir")
            .arg(dir.path())
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(summary["overall"], "COMPLETED");
        assert_eq!(summary["feature"], "FEAT9");
        assert_eq!(summary["rows"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn test_halt_at_first_stage_reports_stopped_and_exits_nonzero() {
        let dir = create_temp_project();
        let spec = write_spec(&dir, "FEAT47");
        let script = dir.path().join("agent.sh");
        fs::write(
            &script,
            "#!/bin/sh\ncat > /dev/null\nprintf '<halt>two modules own the same state</halt>\\n'\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("conveyor.toml"),
            format!("[agent]\ncmd = \"sh {}\"\n", script.display()),
        )
        .unwrap();

        conveyor()
            .arg("run")
            .arg(&spec)
            .arg("--project-dir")
            .arg(dir.path())
            .assert()
            .failure()
            .stdout(predicate::str::contains("STOPPED_AT_STAGE_1"))
            .stdout(predicate::str::contains("two modules own the same state"))
            .stdout(predicate::str::contains("N/A"));
    }

    #[test]
    fn test_blocking_finding_stops_at_verification() {
        let dir = create_temp_project();
        let spec = write_spec(&dir, "FEAT47");
        let script = dir.path().join("agent.sh");
        fs::write(
            &script,
            r#"#!/bin/sh
prompt=$(cat)
case "$prompt" in
*"Static verification"*)
    printf '<blocking>symbol `Frobnicator` does not exist</blocking>\n'
    ;;
*)
    printf 'No issues found.\n'
    ;;
esac
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("conveyor.toml"),
            format!("[agent]\ncmd = \"sh {}\"\n", script.display()),
        )
        .unwrap();

        conveyor()
            .arg("run")
            .arg(&spec)
            .arg("--project-dir")
            .arg(dir.path())
            .assert()
            .failure()
            .stdout(predicate::str::contains("STOPPED_AT_STAGE_3"))
            .stdout(predicate::str::contains("Frobnicator"));
    }

    #[test]
    fn test_budget_exhaustion_stops_at_implementation() {
        let dir = create_temp_project();
        let spec = write_spec(&dir, "FEAT47");
        install_scripted_agent(&dir);
        // Failing test command exhausts the loop's iteration budget.
        let script = dir.path().join("agent.sh");
        fs::write(
            dir.path().join("conveyor.toml"),
            format!(
                r#"
[agent]
cmd = "sh {}"

[delegation]
max_iterations = 2
test_cmd = "false"
check_cmd = "true"
"#,
                script.display()
            ),
        )
        .unwrap();

        conveyor()
            .arg("run")
            .arg(&spec)
            .arg("--project-dir")
            .arg(dir.path())
            .assert()
            .failure()
            .stdout(predicate::str::contains("STOPPED_AT_STAGE_6"))
            .stdout(predicate::str::contains("budget exhausted"));

        // Both iteration prompts were logged before the halt.
        let logs = dir.path().join(".conveyor/logs");
        assert!(logs.join("stage-implementation-iter-1-prompt.md").exists());
        assert!(logs.join("stage-implementation-iter-2-prompt.md").exists());
    }

    #[test]
    fn test_cli_max_iterations_overrides_toml() {
        let dir = create_temp_project();
        let spec = write_spec(&dir, "FEAT47");
        install_scripted_agent(&dir);
        let script = dir.path().join("agent.sh");
        fs::write(
            dir.path().join("conveyor.toml"),
            format!(
                "[agent]\ncmd = \"sh {}\"\n[delegation]\nmax_iterations = 3\ntest_cmd = \"false\"\n",
                script.display()
            ),
        )
        .unwrap();

        conveyor()
            .arg("run")
            .arg(&spec)
            .arg("--project-dir")
            .arg(dir.path())
            .arg("--max-iterations")
            .arg("1")
            .assert()
            .failure()
            .stdout(predicate::str::contains("STOPPED_AT_STAGE_6"));

        let logs = dir.path().join(".conveyor/logs");
        assert!(logs.join("stage-implementation-iter-1-prompt.md").exists());
        assert!(!logs.join("stage-implementation-iter-2-prompt.md").exists());
    }
}
