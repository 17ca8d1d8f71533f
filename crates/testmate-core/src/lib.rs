//! testmate core library
//!
//! Discovers native test executables (Catch2 and Google Test) in a workspace,
//! keeps a tree of suites and tests in sync with the file system, and runs
//! selected tests under a bounded concurrency pool.

pub mod adapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod framework;
pub mod ids;
pub mod labels;
pub mod pool;
pub mod process;
pub mod result;
pub mod suite;
pub mod variables;
pub mod watcher;

pub use adapters::{FrameworkAdapter, RunSelection, TestDescriptor, TestResult};
pub use config::{ConfigLoader, ExecutableEntry, ExecutablePatternConfig, TestmateConfig};
pub use engine::TestEngine;
pub use error::{ErrorKind, TestmateError};
pub use events::{
    ChannelSink, CollectingSink, EngineEvent, EventSink, LoadEvent, NullSink, StateEvent,
    SuiteState, TestState,
};
pub use framework::{FrameworkDetector, FrameworkInfo, FrameworkKind};
pub use ids::NodeId;
pub use pool::{TaskPermit, TaskPool};
pub use process::{KillHandle, ProcessOutcome, ProcessRunner, SpawnOptions};
pub use result::{Result, ResultExt};
pub use suite::{
    ExecutableSuite, RootSnapshot, RootSuite, RunOutcome, Selection, SuiteRunResult,
    SuiteSettings, SuiteSnapshot, TestCase,
};
pub use watcher::{ExecutableWatcher, ResolvedPattern, WatchOptions};

/// Initialize tracing/logging
pub fn init_tracing() {
    init_tracing_with_filter("testmate=info");
}

/// Initialize tracing with a default filter used when `RUST_LOG` is unset
pub fn init_tracing_with_filter(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
