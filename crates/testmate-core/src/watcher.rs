//! Executable discovery and file watching
//!
//! One [`ExecutableWatcher`] exists per configured pattern. It enumerates the
//! matching files once, installs a file system watch, and reconciles the test
//! tree whenever a matching path changes.
//!
//! Build tools rewrite executables in several steps, so a change is not acted
//! upon immediately. The path is polled with a doubling backoff until it
//! exists and can be listed; a path that stays absent longer than the quiet
//! timeout counts as deleted. At most one settle loop runs per path.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::stream::{self, StreamExt};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{
    DEFAULT_MAX_FILES, DEFAULT_DETECT_TIMEOUT_SEC, DEFAULT_WATCH_TIMEOUT_SEC,
    ExecutablePatternConfig, TestmateConfig,
};
use crate::error::TestmateError;
use crate::events::{EngineEvent, LoadEvent};
use crate::framework::{FrameworkDetector, FrameworkInfo};
use crate::process::SpawnOptions;
use crate::result::{Result, ResultExt};
use crate::suite::{ExecutableSuite, RootSuite};
use crate::variables::{
    FileVariables, has_unresolved, normalize_path, relative_path, resolve_env, resolve_variables,
    workspace_variables,
};

/// First settle delay
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(64);
/// Upper bound of the settle delay
pub const MAX_BACKOFF: Duration = Duration::from_millis(2000);

const DETECT_CONCURRENCY: usize = 8;

/// Discovery timing and bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// A path absent for longer than this is treated as deleted
    pub watch_timeout: Duration,
    pub max_files: usize,
    pub detect_timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            watch_timeout: Duration::from_secs(DEFAULT_WATCH_TIMEOUT_SEC),
            max_files: DEFAULT_MAX_FILES,
            detect_timeout: Duration::from_secs(DEFAULT_DETECT_TIMEOUT_SEC),
        }
    }
}

impl WatchOptions {
    pub fn from_config(config: &TestmateConfig) -> Self {
        Self {
            watch_timeout: config.watch_timeout(),
            max_files: config.max_files(),
            detect_timeout: config.detect_timeout(),
        }
    }
}

/// A configured pattern resolved against the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPattern {
    /// Normalized absolute pattern
    pub absolute: PathBuf,
    pub is_absolute: bool,
    pub inside_workspace: bool,
}

impl ResolvedPattern {
    pub fn resolve(workspace: &Path, pattern: &str) -> Self {
        let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
        if pattern.contains('\\') {
            warn!(
                "Pattern {:?} contains a backslash; use '/' as path separator",
                pattern
            );
        }

        let is_absolute = Path::new(pattern).is_absolute();
        let absolute = if is_absolute {
            normalize_path(Path::new(pattern))
        } else {
            normalize_path(&workspace.join(pattern))
        };
        let inside_workspace = !relative_path(workspace, &absolute)
            .components()
            .any(|c| c == Component::ParentDir);
        if is_absolute && inside_workspace {
            info!(
                "Absolute pattern {:?} points into the workspace; a relative one would do",
                pattern
            );
        }

        Self {
            absolute,
            is_absolute,
            inside_workspace,
        }
    }

    /// True when the pattern contains glob metacharacters
    pub fn has_glob(&self) -> bool {
        is_glob(&self.absolute.to_string_lossy())
    }

    /// Whether the pattern is enumerated and watched rather than used as one path
    ///
    /// Only absolute patterns outside the workspace are fixed paths; a
    /// workspace pattern without glob characters is still watched.
    pub fn is_live(&self) -> bool {
        !self.is_absolute || self.inside_workspace
    }

    /// Deepest directory of the pattern free of glob metacharacters
    pub fn watch_root(&self) -> PathBuf {
        let mut root = PathBuf::new();
        for component in self.absolute.components() {
            if is_glob(&component.as_os_str().to_string_lossy()) {
                break;
            }
            root.push(component);
        }
        if root == self.absolute {
            // no glob at all: watch the containing directory
            root.pop();
        }
        root
    }
}

fn is_glob(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

#[derive(Debug, Clone, Copy)]
enum PathState {
    /// Event seen, settle loop about to start
    Pending { last_event: Instant },
    /// Settle loop sleeping before the next existence check
    Settling { last_event: Instant, backoff: Duration },
}

impl PathState {
    fn last_event(&self) -> Instant {
        match *self {
            PathState::Pending { last_event } | PathState::Settling { last_event, .. } => last_event,
        }
    }

    fn backoff(&self) -> Option<Duration> {
        match *self {
            PathState::Pending { .. } => None,
            PathState::Settling { backoff, .. } => Some(backoff),
        }
    }

    fn touch(&mut self, now: Instant) {
        match self {
            PathState::Pending { last_event } | PathState::Settling { last_event, .. } => {
                *last_event = now
            }
        }
    }
}

/// Watches one executable pattern and keeps its suites in sync
pub struct ExecutableWatcher {
    pattern: ExecutablePatternConfig,
    workspace: PathBuf,
    root: Arc<RootSuite>,
    detector: FrameworkDetector,
    options: WatchOptions,
    executables: Mutex<HashMap<PathBuf, Arc<ExecutableSuite>>>,
    path_states: DashMap<PathBuf, PathState>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl ExecutableWatcher {
    pub fn new(pattern: ExecutablePatternConfig, root: Arc<RootSuite>, options: WatchOptions) -> Arc<Self> {
        Arc::new(Self {
            workspace: root.settings().workspace.clone(),
            pattern,
            root,
            detector: FrameworkDetector::new(options.detect_timeout),
            options,
            executables: Mutex::new(HashMap::new()),
            path_states: DashMap::new(),
            watcher: Mutex::new(None),
        })
    }

    pub fn pattern(&self) -> &ExecutablePatternConfig {
        &self.pattern
    }

    /// Suites created by this watcher
    pub fn suites(&self) -> Vec<Arc<ExecutableSuite>> {
        let executables = self.executables.lock().unwrap_or_else(PoisonError::into_inner);
        let mut suites: Vec<_> = executables.values().cloned().collect();
        suites.sort_by_key(|s| s.id());
        suites
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Initial discovery
    ///
    /// Enumerates the pattern, installs the watch, creates a suite for every
    /// file with a known framework and lists its tests. Failures of single
    /// files are logged and skipped.
    pub async fn load(self: &Arc<Self>) -> Result<()> {
        let resolved = ResolvedPattern::resolve(&self.workspace, &self.pattern.pattern);
        let files = if resolved.is_live() {
            let files = self.enumerate(&resolved)?;
            if let Err(e) = self.install_watch(&resolved) {
                error!("Couldn't watch {}: {}", resolved.absolute.display(), e);
            }
            files
        } else {
            vec![resolved.absolute.clone()]
        };
        debug!(
            "Pattern {:?} matched {} files",
            self.pattern.pattern,
            files.len()
        );

        let detector = &self.detector;
        let detected: Vec<(PathBuf, FrameworkInfo)> = stream::iter(files)
            .map(|file| async move {
                let framework = detector.detect(&file).await;
                (file, framework)
            })
            .buffered(DETECT_CONCURRENCY)
            .collect()
            .await;

        let suites: Vec<_> = detected
            .into_iter()
            .filter(|(_, framework)| framework.is_known())
            .map(|(file, framework)| self.add_file(&file, framework))
            .collect();

        for suite in suites {
            suite
                .reload_children()
                .await
                .log_and_continue("Couldn't list tests");
        }
        Ok(())
    }

    fn enumerate(&self, resolved: &ResolvedPattern) -> Result<Vec<PathBuf>> {
        let pattern = resolved.absolute.to_string_lossy();
        let paths = glob::glob(&pattern)
            .map_err(|e| TestmateError::pattern_error(pattern.to_string(), e.to_string()))?;

        let mut files = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    if files.len() == self.options.max_files {
                        warn!(
                            "Pattern {:?} matches more than {} files; the rest is ignored",
                            self.pattern.pattern, self.options.max_files
                        );
                        break;
                    }
                    files.push(path);
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping unreadable path: {}", e),
            }
        }
        Ok(files)
    }

    fn install_watch(self: &Arc<Self>, resolved: &ResolvedPattern) -> Result<()> {
        let pattern = resolved.absolute.to_string_lossy().into_owned();
        let matcher = glob::Pattern::new(&pattern)
            .map_err(|e| TestmateError::pattern_error(&pattern, e.to_string()))?;
        let mut root = resolved.watch_root();
        while !root.is_dir() {
            match root.parent() {
                Some(parent) => root = parent.to_path_buf(),
                None => break,
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    for path in event.paths {
                        if matcher.matches_path(&path) && !path.is_dir() {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => warn!("File watch error: {}", e),
            }
        })
        .map_err(|e| TestmateError::watch_error(&root, e.to_string()))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| TestmateError::watch_error(&root, e.to_string()))?;
        info!("Watching {} for {:?}", root.display(), self.pattern.pattern);

        let this = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                let Some(this) = this.upgrade() else { break };
                this.handle_event(path);
            }
        });

        *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
        Ok(())
    }

    /// Stop watching; existing suites are kept
    pub fn dispose(&self) {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// React to a change of `path`
    ///
    /// Returns the handle of the settle loop when one was started. An event
    /// for a path that is already settling only refreshes its timestamp.
    pub fn handle_event(self: &Arc<Self>, path: PathBuf) -> Option<JoinHandle<()>> {
        let now = Instant::now();
        let start = match self.path_states.entry(path.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().touch(now);
                debug!(
                    "{} is already settling (backoff {:?})",
                    path.display(),
                    entry.get().backoff()
                );
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(PathState::Pending { last_event: now });
                true
            }
        };
        if !start {
            return None;
        }

        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.settle(path).await }))
    }

    async fn settle(&self, path: PathBuf) {
        let mut backoff = INITIAL_BACKOFF;
        let mut exists = false;
        loop {
            let Some(last_event) = self.path_states.get(&path).map(|s| s.last_event()) else {
                error!("Settle state of {} vanished", path.display());
                return;
            };

            if last_event.elapsed() > self.options.watch_timeout {
                let timeout = self.options.watch_timeout;
                if self
                    .path_states
                    .remove_if(&path, |_, s| s.last_event().elapsed() > timeout)
                    .is_some()
                {
                    self.remove_executable(&path);
                    return;
                }
                continue;
            }

            if exists {
                let attempt = Instant::now();
                match self.materialize(&path).await {
                    Ok(()) => {
                        // events that arrived during the reload need another pass
                        if self
                            .path_states
                            .remove_if(&path, |_, s| s.last_event() < attempt)
                            .is_some()
                        {
                            return;
                        }
                    }
                    Err(e) => warn!("Couldn't reload {}: {}", path.display(), e),
                }
                backoff = INITIAL_BACKOFF;
            }

            if let Some(mut state) = self.path_states.get_mut(&path) {
                let last_event = state.last_event();
                *state = PathState::Settling { last_event, backoff };
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
            exists = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
        }
    }

    async fn materialize(&self, path: &Path) -> Result<()> {
        let existing = self.executable(path);
        let framework = match &existing {
            Some(suite) => suite.framework().clone(),
            None => self.detector.detect(path).await,
        };
        if !framework.is_known() {
            debug!("{} is not a test executable", path.display());
            return Ok(());
        }

        self.root
            .send_load_events(move || async move {
                let suite = match existing {
                    Some(suite) => suite,
                    None => self.add_file(path, framework),
                };
                suite.reload_children().await
            })
            .await
    }

    fn executable(&self, path: &Path) -> Option<Arc<ExecutableSuite>> {
        self.executables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Suite for `path`, created unless another discovery got there first
    fn add_file(&self, path: &Path, framework: FrameworkInfo) -> Arc<ExecutableSuite> {
        let mut executables = self.executables.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = executables.get(path) {
            debug!("{} is already known", path.display());
            return Arc::clone(existing);
        }

        let mut variables = workspace_variables(&self.workspace);
        variables.extend(FileVariables::new(&self.workspace, path).to_variables());

        let label = resolve_variables(&self.pattern.name, &variables);
        if has_unresolved(&label) {
            warn!("Name {:?} has unresolved variables", label);
        }
        let cwd = resolve_variables(&self.pattern.cwd, &variables);
        if has_unresolved(&cwd) {
            warn!("Working directory {:?} has unresolved variables", cwd);
        }
        let env = resolve_env(&self.pattern.env, &variables);
        if let Some((key, value)) = env.iter().find(|(_, value)| has_unresolved(value)) {
            warn!("Environment variable {}={:?} has unresolved variables", key, value);
        }

        let suite = self.root.create_child_suite(
            label,
            path.to_path_buf(),
            SpawnOptions::new(normalize_path(Path::new(&cwd)), env),
            framework,
        );
        executables.insert(path.to_path_buf(), Arc::clone(&suite));
        drop(executables);

        self.root.uniquify_labels();
        info!("Found {} test executable {}", suite.framework(), path.display());
        suite
    }

    fn remove_executable(&self, path: &Path) {
        let removed = self
            .executables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        let Some(suite) = removed else {
            debug!("{} vanished before it was loaded", path.display());
            return;
        };

        info!("Removing {}", path.display());
        suite.cancel();
        self.root.emit(EngineEvent::Load(LoadEvent::Started));
        self.root.remove_child(suite.id());
        self.root.uniquify_labels();
        self.root.emit(EngineEvent::Load(LoadEvent::Finished {
            root: self.root.snapshot(),
        }));
    }
}

impl Drop for ExecutableWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}
