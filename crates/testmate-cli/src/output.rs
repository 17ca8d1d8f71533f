//! Output formatting and reporting
//!
//! Human output is colored when enabled; JSON output prints one document per
//! tree and one line per event so it can be piped into other tools.

use anyhow::Result;
use colored::*;
use serde::Serialize;
use testmate_core::{
    EngineEvent, RootSnapshot, RunOutcome, StateEvent, SuiteState, TestState, TestmateError,
};

use crate::OutputFormat;

/// Counts gathered while a run is reported
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub suites: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub killed: usize,
    pub timed_out: usize,
    pub start_failed: usize,
}

impl RunSummary {
    /// Count a test or suite event
    pub fn record(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::State(StateEvent::Suite {
                state: SuiteState::Running,
                ..
            }) => self.suites += 1,
            EngineEvent::State(StateEvent::Test { state, .. }) => match state {
                TestState::Passed => self.passed += 1,
                TestState::Failed => self.failed += 1,
                TestState::Skipped => self.skipped += 1,
                TestState::Errored => self.errored += 1,
                TestState::Running => {}
            },
            _ => {}
        }
    }

    /// Count how a suite run ended
    pub fn record_outcome(&mut self, outcome: &Result<RunOutcome, TestmateError>) {
        match outcome {
            Ok(RunOutcome::Killed) => self.killed += 1,
            Ok(RunOutcome::TimedOut) => self.timed_out += 1,
            Ok(RunOutcome::StartFailed { .. }) | Err(_) => self.start_failed += 1,
            Ok(RunOutcome::Completed { .. }) | Ok(RunOutcome::NotSelected) => {}
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.errored
    }

    pub fn unsuccessful(&self) -> usize {
        self.failed + self.errored
    }

    pub fn is_success(&self) -> bool {
        self.unsuccessful() == 0 && self.start_failed == 0 && self.timed_out == 0
    }
}

/// Output formatter for different formats
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print the whole test tree
    pub fn print_tree(&self, snapshot: &RootSnapshot) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(snapshot)?),
            OutputFormat::Human => {
                if snapshot.suites.is_empty() {
                    println!("{} No test executables found", "i".blue());
                    return Ok(());
                }
                for suite in &snapshot.suites {
                    println!(
                        "{} {}",
                        suite.label.bold(),
                        format!("({}, {})", suite.framework, suite.path.display()).dimmed()
                    );
                    for test in &suite.children {
                        let location = match (&test.file, test.line) {
                            (Some(file), Some(line)) => format!("{}:{}", file.display(), line),
                            (Some(file), None) => file.display().to_string(),
                            _ => String::new(),
                        };
                        let name = if test.skipped {
                            format!("{} (skipped)", test.name).yellow()
                        } else {
                            test.name.normal()
                        };
                        println!("  {} {}", name, location.dimmed());
                    }
                }
                println!(
                    "\n{} tests in {} suites",
                    snapshot.test_count(),
                    snapshot.suites.len()
                );
            }
        }
        Ok(())
    }

    /// Print one run event as it arrives
    pub fn print_event(&self, event: &EngineEvent) {
        if self.format == OutputFormat::Json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Couldn't serialize event: {}", e),
            }
            return;
        }

        match event {
            EngineEvent::State(StateEvent::Suite {
                label,
                state: SuiteState::Running,
                ..
            }) => println!("{} {}", "▶".bright_blue(), label.bold()),
            EngineEvent::State(StateEvent::Test {
                name,
                state,
                message,
                duration,
                ..
            }) => {
                let marker = match state {
                    TestState::Running => return,
                    TestState::Passed => "✓".green(),
                    TestState::Failed => "✗".red(),
                    TestState::Skipped => "-".yellow(),
                    TestState::Errored => "!".red(),
                };
                let timing = duration
                    .map(|d| format!(" ({} ms)", d.as_millis()))
                    .unwrap_or_default();
                println!("  {} {}{}", marker, name, timing.dimmed());
                if let Some(message) = message {
                    for line in message.lines() {
                        println!("      {}", line.dimmed());
                    }
                }
            }
            _ => {}
        }
    }

    /// Print the final counts
    pub fn print_summary(&self, summary: &RunSummary) -> Result<()> {
        if self.format == OutputFormat::Json {
            println!("{}", serde_json::to_string(summary)?);
            return Ok(());
        }

        println!("\n{}", "Summary:".bold());
        println!("  Suites run: {}", summary.suites);
        println!("  Passed: {}", summary.passed.to_string().green());
        if summary.failed > 0 {
            println!("  Failed: {}", summary.failed.to_string().red());
        }
        if summary.errored > 0 {
            println!("  Errored: {}", summary.errored.to_string().red());
        }
        if summary.skipped > 0 {
            println!("  Skipped: {}", summary.skipped.to_string().yellow());
        }
        if summary.timed_out > 0 {
            println!("  Timed out: {}", summary.timed_out.to_string().red());
        }
        if summary.killed > 0 {
            println!("  Cancelled: {}", summary.killed.to_string().yellow());
        }
        if summary.start_failed > 0 {
            println!("  Failed to start: {}", summary.start_failed.to_string().red());
        }
        Ok(())
    }
}
