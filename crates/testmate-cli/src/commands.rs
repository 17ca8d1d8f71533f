//! CLI command implementations
//!
//! Top-level commands (list, run, watch) are implemented in this file;
//! configuration management lives in `commands/config.rs`.

pub mod config;

use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use testmate_core::{
    ChannelSink, ConfigLoader, EngineEvent, LoadEvent, NodeId, NullSink, RootSnapshot,
    StateEvent, TestEngine, TestmateConfig,
};
use tracing::{debug, info, warn};

use crate::OutputFormat;
use crate::output::{OutputFormatter, RunSummary};

fn load_config(workspace: &Path, config_path: Option<&Path>) -> Result<TestmateConfig> {
    ConfigLoader::load(config_path, workspace).context("Failed to load configuration")
}

/// List command implementation
pub async fn list_command(
    workspace: &Path,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    debug!("Listing tests in {}", workspace.display());
    let config = load_config(workspace, config_path)?;
    let engine = TestEngine::new(workspace, config, Arc::new(NullSink))?;

    engine.load().await;
    engine.dispose();

    OutputFormatter::new(format).print_tree(&engine.snapshot())
}

/// Run command implementation
///
/// Fails when any test failed or errored, or when a suite could not run.
pub async fn run_command(
    workspace: &Path,
    config_path: Option<&Path>,
    filters: Vec<String>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_config(workspace, config_path)?;
    let patterns = filters
        .iter()
        .map(|filter| {
            glob::Pattern::new(filter).with_context(|| format!("Invalid filter '{filter}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    let (sink, mut events) = ChannelSink::new();
    let engine = TestEngine::new(workspace, config, Arc::new(sink))?;
    engine.load().await;
    engine.dispose();
    while events.try_recv().is_ok() {}

    let selection = select_ids(&engine.snapshot(), &patterns);
    if selection.is_empty() {
        warn!("No tests matched");
        return Ok(());
    }

    let formatter = OutputFormatter::new(format);
    let printer = tokio::spawn(async move {
        let mut summary = RunSummary::default();
        while let Some(event) = events.recv().await {
            summary.record(&event);
            formatter.print_event(&event);
            if matches!(event, EngineEvent::State(StateEvent::RunFinished)) {
                break;
            }
        }
        summary
    });

    let run = engine.run(selection);
    tokio::pin!(run);
    let mut interrupted = false;
    let results = tokio::select! {
        results = &mut run => results,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling run");
            interrupted = true;
            engine.cancel();
            run.await
        }
    };

    let mut summary = printer.await.context("Event printer stopped unexpectedly")?;
    for result in &results {
        summary.record_outcome(&result.outcome);
    }
    formatter.print_summary(&summary)?;

    if interrupted {
        bail!("Run cancelled");
    }
    if !summary.is_success() {
        bail!("{} of {} tests did not pass", summary.unsuccessful(), summary.total());
    }
    Ok(())
}

/// Watch command implementation
pub async fn watch_command(
    workspace: &Path,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_config(workspace, config_path)?;
    let (sink, mut events) = ChannelSink::new();
    let engine = TestEngine::new(workspace, config, Arc::new(sink))?;
    let formatter = OutputFormatter::new(format);

    engine.load().await;
    while events.try_recv().is_ok() {}
    formatter.print_tree(&engine.snapshot())?;
    info!("Watching for changes, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(EngineEvent::Load(LoadEvent::Finished { root })) => formatter.print_tree(&root)?,
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.dispose();
    Ok(())
}

/// Ids to run for the given filters
///
/// Without filters the whole tree is selected. A suite whose label matches
/// is selected as a whole; otherwise its matching tests are.
fn select_ids(snapshot: &RootSnapshot, patterns: &[glob::Pattern]) -> HashSet<NodeId> {
    if patterns.is_empty() {
        return snapshot.id.into_iter().collect();
    }

    let mut ids = HashSet::new();
    for suite in &snapshot.suites {
        if patterns.iter().any(|p| p.matches(&suite.label)) {
            ids.insert(suite.id);
            continue;
        }
        ids.extend(
            suite
                .children
                .iter()
                .filter(|test| patterns.iter().any(|p| p.matches(&test.name)))
                .map(|test| test.id),
        );
    }
    ids
}
