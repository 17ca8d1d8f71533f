//! Engine facade tying configuration, discovery and execution together

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::TestmateConfig;
use crate::error::TestmateError;
use crate::events::EventSink;
use crate::ids::NodeId;
use crate::pool::TaskPool;
use crate::result::{Result, ResultExt};
use crate::suite::{RootSnapshot, RootSuite, SuiteRunResult, SuiteSettings};
use crate::variables::normalize_path;
use crate::watcher::{ExecutableWatcher, WatchOptions};

/// Test tree of one workspace
pub struct TestEngine {
    workspace: PathBuf,
    config: TestmateConfig,
    root: Arc<RootSuite>,
    pool: Arc<TaskPool>,
    watchers: Vec<Arc<ExecutableWatcher>>,
}

impl TestEngine {
    /// Validate `config` and set up an empty tree for `workspace`
    ///
    /// Nothing is discovered until [`TestEngine::load`] is called.
    pub fn new(
        workspace: impl Into<PathBuf>,
        config: TestmateConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let workspace = workspace.into();
        let workspace = if workspace.is_absolute() {
            workspace
        } else {
            std::env::current_dir()
                .map_err(|e| TestmateError::io_error(&workspace, e))?
                .join(workspace)
        };
        let workspace = std::fs::canonicalize(&workspace).unwrap_or_else(|_| normalize_path(&workspace));

        let root = RootSuite::new(SuiteSettings::from_config(&workspace, &config), sink);
        let options = WatchOptions::from_config(&config);
        let watchers = config
            .executable_patterns()
            .into_iter()
            .map(|pattern| ExecutableWatcher::new(pattern, Arc::clone(&root), options))
            .collect();
        let pool = TaskPool::new(config.parallel_jobs());

        Ok(Self {
            workspace,
            config,
            root,
            pool,
            watchers,
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn config(&self) -> &TestmateConfig {
        &self.config
    }

    pub fn root(&self) -> &Arc<RootSuite> {
        &self.root
    }

    pub fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }

    pub fn watchers(&self) -> &[Arc<ExecutableWatcher>] {
        &self.watchers
    }

    /// Discover executables for every pattern inside one load event pair
    ///
    /// A pattern that fails is logged and skipped. Call once per engine.
    pub async fn load(&self) {
        self.root
            .send_load_events(|| async {
                for watcher in &self.watchers {
                    watcher
                        .load()
                        .await
                        .log_and_continue("Couldn't load executables");
                }
            })
            .await;
        info!(
            "Loaded {} suites from {}",
            self.root.children().len(),
            self.workspace.display()
        );
    }

    /// Run the given test and suite ids
    pub async fn run(&self, tests: HashSet<NodeId>) -> Vec<SuiteRunResult> {
        self.root.run(tests, &self.pool).await
    }

    /// Run every suite
    pub async fn run_all(&self) -> Vec<SuiteRunResult> {
        self.run(HashSet::from([self.root.id()])).await
    }

    /// Cancel all running and waiting suites
    pub fn cancel(&self) {
        self.root.cancel();
    }

    pub fn snapshot(&self) -> RootSnapshot {
        self.root.snapshot()
    }

    /// Stop all file watches
    pub fn dispose(&self) {
        for watcher in &self.watchers {
            watcher.dispose();
        }
    }
}
