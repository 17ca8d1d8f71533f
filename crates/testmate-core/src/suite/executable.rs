//! One test executable and the tests it contains

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::{SuiteSettings, SuiteSnapshot, TestCase};
use crate::adapters::{RunSelection, TestResult};
use crate::error::TestmateError;
use crate::events::{EngineEvent, EventSink, StateEvent, SuiteState, TestState};
use crate::framework::FrameworkInfo;
use crate::ids::NodeId;
use crate::pool::TaskPool;
use crate::process::{
    KillHandle, OutputStream, ProcessOutcome, ProcessRunner, SpawnOptions, run_captured,
};
use crate::result::Result;

/// Tests chosen for one run of a suite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The suite itself was selected
    All,
    /// Only these children
    Tests(Vec<TestCase>),
}

/// How a suite run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunOutcome {
    /// Nothing in the requested set belongs to this suite
    NotSelected,
    /// The executable ran to completion
    Completed { exit_code: Option<i32> },
    /// The running timeout terminated the executable
    TimedOut,
    /// The run was cancelled before or during execution
    Killed,
    /// The executable could not be started
    StartFailed { message: String },
}

/// Suite backed by a single test executable
pub struct ExecutableSuite {
    id: NodeId,
    orig_label: String,
    label: RwLock<String>,
    exec_path: PathBuf,
    options: SpawnOptions,
    framework: FrameworkInfo,
    children: RwLock<Vec<TestCase>>,
    running: AtomicBool,
    is_killed: AtomicBool,
    process: Mutex<Option<KillHandle>>,
    settings: Arc<SuiteSettings>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ExecutableSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableSuite")
            .field("id", &self.id)
            .field("label", &self.label())
            .field("exec_path", &self.exec_path)
            .field("framework", &self.framework)
            .finish_non_exhaustive()
    }
}

impl ExecutableSuite {
    pub(crate) fn new(
        label: String,
        exec_path: PathBuf,
        options: SpawnOptions,
        framework: FrameworkInfo,
        settings: Arc<SuiteSettings>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            id: NodeId::generate(),
            label: RwLock::new(label.clone()),
            orig_label: label,
            exec_path,
            options,
            framework,
            children: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            is_killed: AtomicBool::new(false),
            process: Mutex::new(None),
            settings,
            sink,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Label as produced by the name template
    pub fn orig_label(&self) -> &str {
        &self.orig_label
    }

    /// Label currently displayed, possibly disambiguated
    pub fn label(&self) -> String {
        self.label
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_label(&self, label: String) {
        *self.label.write().unwrap_or_else(PoisonError::into_inner) = label;
    }

    pub fn exec_path(&self) -> &Path {
        &self.exec_path
    }

    pub fn options(&self) -> &SpawnOptions {
        &self.options
    }

    pub fn framework(&self) -> &FrameworkInfo {
        &self.framework
    }

    /// Copy of the current children
    pub fn children(&self) -> Vec<TestCase> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a run of this suite is in progress, including one still
    /// waiting for a pool slot
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SuiteSnapshot {
        SuiteSnapshot {
            id: self.id,
            label: self.label(),
            orig_label: self.orig_label.clone(),
            path: self.exec_path.clone(),
            framework: self.framework.clone(),
            children: self.children(),
        }
    }

    /// Ask the executable for its tests and replace the children
    ///
    /// Tests keep their id across reloads as long as their name is unchanged.
    /// On failure the previous children stay in place.
    pub async fn reload_children(&self) -> Result<()> {
        let adapter = self.framework.adapter().ok_or_else(|| {
            TestmateError::reload_error(&self.exec_path, "unknown test framework")
        })?;
        let args = adapter.list_args(&self.framework.version);
        let output = run_captured(
            &self.exec_path,
            &args,
            &self.options,
            Some(self.settings.list_timeout),
        )
        .await
        .map_err(|e| TestmateError::reload_error(&self.exec_path, e.to_string()))?;

        match output.outcome {
            ProcessOutcome::TimedOut => {
                return Err(TestmateError::reload_error(
                    &self.exec_path,
                    "listing tests timed out",
                ));
            }
            ProcessOutcome::Killed => {
                return Err(TestmateError::reload_error(
                    &self.exec_path,
                    "listing tests was cancelled",
                ));
            }
            ProcessOutcome::Exited { .. } => {}
        }

        let descriptors = adapter
            .parse_listing(&output.stdout)
            .map_err(|e| TestmateError::reload_error(&self.exec_path, e.to_string()))?;
        if descriptors.is_empty() && !output.outcome.is_success() {
            return Err(TestmateError::reload_error(
                &self.exec_path,
                format!(
                    "listing exited with {:?}: {}",
                    output.outcome,
                    output.stderr.lines().next().unwrap_or_default()
                ),
            ));
        }

        let previous = self.children();
        let mut used = HashSet::new();
        let children: Vec<TestCase> = descriptors
            .into_iter()
            .map(|descriptor| {
                let id = previous
                    .iter()
                    .find(|t| t.name == descriptor.name && !used.contains(&t.id))
                    .map(|t| t.id)
                    .unwrap_or_else(NodeId::generate);
                used.insert(id);
                let file = descriptor.file.as_deref().map(|f| self.find_file_path(f));
                TestCase::from_descriptor(id, descriptor, file)
            })
            .collect();

        info!(
            "Loaded {} tests from {}",
            children.len(),
            self.exec_path.display()
        );
        *self.children.write().unwrap_or_else(PoisonError::into_inner) = children;
        Ok(())
    }

    /// Resolve a source path printed by the executable
    ///
    /// Tried in order: relative to the workspace, relative to the working
    /// directory, then relative to each ancestor of the executable. The raw
    /// string is returned when none of them exists.
    pub fn find_file_path(&self, matched: &str) -> PathBuf {
        let mut candidates = vec![self.settings.workspace.join(matched)];
        if let Some(cwd) = &self.options.cwd {
            candidates.push(cwd.join(matched));
        }
        candidates.extend(self.exec_path.ancestors().skip(1).map(|dir| dir.join(matched)));

        candidates
            .into_iter()
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(matched))
    }

    /// Take this suite's share of `tests` out of the set
    ///
    /// Selecting the suite id selects everything. Ids consumed here are
    /// removed so that sibling suites do not see them.
    pub fn select(&self, tests: &mut HashSet<NodeId>) -> Option<Selection> {
        let children = self.children();
        if tests.remove(&self.id) {
            for child in &children {
                tests.remove(&child.id);
            }
            return Some(Selection::All);
        }

        let picked: Vec<TestCase> = children
            .into_iter()
            .filter(|child| tests.remove(&child.id))
            .collect();
        (!picked.is_empty()).then_some(Selection::Tests(picked))
    }

    /// Run the part of `tests` that belongs to this suite
    pub async fn run(&self, tests: &mut HashSet<NodeId>, pool: &Arc<TaskPool>) -> Result<RunOutcome> {
        match self.select(tests) {
            Some(selection) => self.run_selection(selection, pool).await,
            None => Ok(RunOutcome::NotSelected),
        }
    }

    /// Run an already computed selection
    ///
    /// Fails only with [`TestmateError::AlreadyRunning`]. The suite is
    /// reserved before waiting for the pool, so a second run is rejected even
    /// while the first one has no process yet. Start failures are logged and
    /// reported as [`RunOutcome::StartFailed`]; the suite completion event is
    /// emitted for every run that got a pool slot.
    pub async fn run_selection(&self, selection: Selection, pool: &Arc<TaskPool>) -> Result<RunOutcome> {
        let Some(_reservation) = RunReservation::take(&self.running) else {
            return Err(TestmateError::AlreadyRunning {
                suite: self.label(),
            });
        };
        self.is_killed.store(false, Ordering::SeqCst);

        let Some(permit) = pool.acquire(|| self.is_killed.load(Ordering::SeqCst)).await else {
            info!("Run of {} cancelled before start", self.label());
            return Ok(RunOutcome::Killed);
        };

        self.emit_suite(SuiteState::Running);
        if selection == Selection::All {
            for test in self.children().iter().filter(|t| t.skipped) {
                self.emit_test(test, TestState::Running, None, None);
                self.emit_test(test, TestState::Skipped, None, None);
            }
        }

        let outcome = match self.execute(&selection).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Couldn't run {}: {}", self.exec_path.display(), e);
                RunOutcome::StartFailed {
                    message: e.to_string(),
                }
            }
        };

        self.emit_suite(SuiteState::Completed);
        self.process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(permit);
        Ok(outcome)
    }

    /// Kill the running process, or stop a run waiting for a pool slot
    pub fn cancel(&self) {
        info!("Cancel requested for {}", self.label());
        self.is_killed.store(true, Ordering::SeqCst);
        let handle = self
            .process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.kill();
        }
    }

    async fn execute(&self, selection: &Selection) -> Result<RunOutcome> {
        let adapter = self.framework.adapter().ok_or_else(|| {
            TestmateError::internal_error(format!(
                "no adapter for {}",
                self.exec_path.display()
            ))
        })?;

        let (targets, names) = match selection {
            Selection::All => {
                let targets: Vec<TestCase> =
                    self.children().into_iter().filter(|t| !t.skipped).collect();
                (targets, None)
            }
            Selection::Tests(tests) => {
                let names: Vec<String> = tests.iter().map(|t| t.name.clone()).collect();
                (tests.clone(), Some(names))
            }
        };
        let run_selection = match &names {
            Some(names) => RunSelection::Tests(names),
            None => RunSelection::All,
        };
        let args = adapter.run_args(&self.framework.version, run_selection);

        if self.is_killed.load(Ordering::SeqCst) {
            info!("Run of {} cancelled before spawn", self.label());
            return Ok(RunOutcome::Killed);
        }
        let process = ProcessRunner::spawn(&self.exec_path, &args, &self.options)?;
        let handle = process.kill_handle();
        *self.process.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        if self.is_killed.load(Ordering::SeqCst) {
            handle.kill();
        }
        info!(
            "Started {} (pid {:?}) with {:?}",
            self.exec_path.display(),
            process.id(),
            args
        );

        let mut stdout = Vec::new();
        let label = self.label();
        let outcome = process
            .wait(
                |stream, chunk| match stream {
                    OutputStream::Stdout => stdout.extend_from_slice(chunk),
                    OutputStream::Stderr => {
                        trace!("{} stderr: {}", label, String::from_utf8_lossy(chunk))
                    }
                },
                self.settings.running_timeout,
            )
            .await?;
        debug!("{} finished: {:?}", label, outcome);

        let results = adapter.parse_results(&String::from_utf8_lossy(&stdout));
        self.report_results(&targets, results, outcome);

        Ok(match outcome {
            ProcessOutcome::Exited { code } => RunOutcome::Completed { exit_code: code },
            ProcessOutcome::Killed => RunOutcome::Killed,
            ProcessOutcome::TimedOut => RunOutcome::TimedOut,
        })
    }

    fn report_results(&self, targets: &[TestCase], results: Vec<TestResult>, outcome: ProcessOutcome) {
        let mut reported = HashSet::new();
        for result in results {
            let Some(test) = targets.iter().find(|t| t.name == result.name) else {
                debug!("Result for unlisted test {} ignored", result.name);
                continue;
            };
            if !reported.insert(test.id) {
                continue;
            }
            self.emit_test(test, TestState::Running, None, None);
            self.emit_test(test, result.state, result.message, result.duration);
        }

        let missing = match outcome {
            ProcessOutcome::Killed => return,
            ProcessOutcome::TimedOut => "timed out".to_string(),
            ProcessOutcome::Exited { code } => match code {
                Some(code) => format!("no result reported, exit code {code}"),
                None => "no result reported, terminated by signal".to_string(),
            },
        };
        for test in targets.iter().filter(|t| !reported.contains(&t.id)) {
            warn!("{}: {}", test.name, missing);
            self.emit_test(test, TestState::Errored, Some(missing.clone()), None);
        }
    }

    fn emit_suite(&self, state: SuiteState) {
        self.sink.emit(EngineEvent::State(StateEvent::Suite {
            suite: self.id,
            label: self.label(),
            state,
        }));
    }

    fn emit_test(
        &self,
        test: &TestCase,
        state: TestState,
        message: Option<String>,
        duration: Option<Duration>,
    ) {
        self.sink.emit(EngineEvent::State(StateEvent::Test {
            suite: self.id,
            test: test.id,
            name: test.name.clone(),
            state,
            message,
            duration,
        }));
    }
}

/// Marks a suite as running until dropped
struct RunReservation<'a>(&'a AtomicBool);

impl<'a> RunReservation<'a> {
    fn take(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunReservation<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
