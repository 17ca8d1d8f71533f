//! Root of the test tree

use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

use super::{ExecutableSuite, RootSnapshot, RunOutcome, SuiteSettings};
use crate::events::{EngineEvent, EventSink, LoadEvent, StateEvent};
use crate::framework::FrameworkInfo;
use crate::ids::NodeId;
use crate::labels;
use crate::pool::TaskPool;
use crate::process::SpawnOptions;
use crate::result::Result;

/// Outcome of one suite within a root run
#[derive(Debug)]
pub struct SuiteRunResult {
    pub suite: NodeId,
    pub label: String,
    pub outcome: Result<RunOutcome>,
}

/// Ordered collection of executable suites
pub struct RootSuite {
    id: NodeId,
    children: RwLock<Vec<Arc<ExecutableSuite>>>,
    settings: Arc<SuiteSettings>,
    sink: Arc<dyn EventSink>,
}

impl RootSuite {
    pub fn new(settings: SuiteSettings, sink: Arc<dyn EventSink>) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::generate(),
            children: RwLock::new(Vec::new()),
            settings: Arc::new(settings),
            sink,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn settings(&self) -> &SuiteSettings {
        &self.settings
    }

    pub fn emit(&self, event: EngineEvent) {
        self.sink.emit(event);
    }

    /// Children in insertion order
    pub fn children(&self) -> Vec<Arc<ExecutableSuite>> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn find_suite(&self, id: NodeId) -> Option<Arc<ExecutableSuite>> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }

    /// Append a new suite; labels are not disambiguated here
    pub fn create_child_suite(
        &self,
        label: String,
        exec_path: PathBuf,
        options: SpawnOptions,
        framework: FrameworkInfo,
    ) -> Arc<ExecutableSuite> {
        let suite = Arc::new(ExecutableSuite::new(
            label,
            exec_path,
            options,
            framework,
            Arc::clone(&self.settings),
            Arc::clone(&self.sink),
        ));
        self.children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&suite));
        debug!("Added suite {} ({})", suite.orig_label(), suite.id());
        suite
    }

    /// Remove a suite by id; returns whether it was present
    pub fn remove_child(&self, id: NodeId) -> bool {
        let mut children = self.children.write().unwrap_or_else(PoisonError::into_inner);
        let before = children.len();
        children.retain(|s| s.id() != id);
        before != children.len()
    }

    /// Recompute every displayed label from the original labels
    pub fn uniquify_labels(&self) {
        let children = self.children();
        let orig: Vec<&str> = children.iter().map(|s| s.orig_label()).collect();
        for (suite, label) in children.iter().zip(labels::disambiguate(&orig)) {
            suite.set_label(label);
        }
    }

    pub fn snapshot(&self) -> RootSnapshot {
        RootSnapshot {
            id: Some(self.id),
            suites: self.children().iter().map(|s| s.snapshot()).collect(),
        }
    }

    /// Bracket `f` with a load started / load finished pair
    ///
    /// The finished event is emitted whether or not `f` succeeds and carries
    /// a snapshot of the tree taken after `f` completed.
    pub async fn send_load_events<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.emit(EngineEvent::Load(LoadEvent::Started));
        let result = f().await;
        self.emit(EngineEvent::Load(LoadEvent::Finished {
            root: self.snapshot(),
        }));
        result
    }

    /// Run every suite that owns part of `tests`, concurrently
    ///
    /// Selecting the root id selects every suite.
    pub async fn run(&self, mut tests: HashSet<NodeId>, pool: &Arc<TaskPool>) -> Vec<SuiteRunResult> {
        let mut requested: Vec<NodeId> = tests.iter().copied().collect();
        requested.sort();
        self.emit(EngineEvent::State(StateEvent::RunStarted { tests: requested }));

        let children = self.children();
        if tests.remove(&self.id) {
            tests.extend(children.iter().map(|s| s.id()));
        }

        let selected: Vec<_> = children
            .into_iter()
            .filter_map(|suite| suite.select(&mut tests).map(|selection| (suite, selection)))
            .collect();
        if !tests.is_empty() {
            debug!("{} requested ids matched no test", tests.len());
        }
        info!("Running {} suites", selected.len());

        let results = join_all(selected.into_iter().map(|(suite, selection)| async move {
            let outcome = suite.run_selection(selection, pool).await;
            if let Err(e) = &outcome {
                error!("Run of {} failed: {}", suite.label(), e);
            }
            SuiteRunResult {
                suite: suite.id(),
                label: suite.label(),
                outcome,
            }
        }))
        .await;

        self.emit(EngineEvent::State(StateEvent::RunFinished));
        results
    }

    /// Cancel every suite
    pub fn cancel(&self) {
        for suite in self.children() {
            suite.cancel();
        }
    }
}
