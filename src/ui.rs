//! Terminal UI for the pipeline orchestrator, rendered via `indicatif`.
//!
//! Two bars are stacked vertically:
//! - Stage bar — tracks how many stages have completed
//! - Status spinner — the stage currently executing
//!
//! All methods coordinate output via `indicatif`'s `MultiProgress` internally.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

const CHECK: &str = "✓";
const CROSS: &str = "✗";
const ARROW: &str = "▶";

pub struct OrchestratorUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    status_bar: ProgressBar,
    verbose: bool,
}

impl OrchestratorUI {
    /// Create the UI and add both progress bars to the multiplex renderer.
    /// Call once at orchestrator startup, before `start_stage`.
    pub fn new(total_stages: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let stage_bar = multi.add(ProgressBar::new(total_stages));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");

        let status_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(status_style);
        status_bar.set_prefix("  Run ");

        Self {
            multi,
            stage_bar,
            status_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the
    /// rich UI fails, so halt reasons are never lost.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Announce the stage about to execute and start the spinner.
    ///
    /// Does **not** increment the stage counter — [`Self::stage_complete`]
    /// advances it.
    pub fn start_stage(&self, ordinal: u32, name: &str) {
        self.stage_bar
            .set_message(format!("{}: {}", style(ordinal).yellow(), name));
        self.status_bar
            .set_message(format!("{} {}", ARROW, style(name).cyan()));
        self.status_bar
            .enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!(
                "{} Stage {}: {}",
                style(ARROW).green().bold(),
                style(ordinal).yellow().bold(),
                name
            ));
        }
    }

    /// Increment the stage bar and print the stage's terminal label
    /// (`PASS`, `CREATED`, `DONE`).
    pub fn stage_complete(&self, name: &str, label: &str) {
        self.stage_bar.inc(1);
        self.status_bar.set_message(String::new());
        self.print_line(format!(
            "{} {} {}",
            style(CHECK).green(),
            name,
            style(label).green().bold()
        ));
    }

    /// Print a halt banner without advancing the stage bar.
    pub fn stage_halted(&self, name: &str, reason: &str) {
        self.status_bar.set_message(String::new());
        self.print_line(format!(
            "{} {} halted: {}",
            style(CROSS).red(),
            style(name).red().bold(),
            reason
        ));
    }

    /// Stop both bars. Call once after the run reaches a terminal state.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
        self.stage_bar.finish_and_clear();
    }
}
