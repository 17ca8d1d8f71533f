//! The test tree
//!
//! A [`RootSuite`] owns one [`ExecutableSuite`] per discovered executable, and
//! each executable suite owns the [`TestCase`]s its listing reported. Every
//! node carries a process-wide unique [`crate::ids::NodeId`].

mod executable;
mod root;
mod snapshot;
mod test_case;

pub use executable::{ExecutableSuite, RunOutcome, Selection};
pub use root::{RootSuite, SuiteRunResult};
pub use snapshot::{RootSnapshot, SuiteSnapshot};
pub use test_case::TestCase;

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{DEFAULT_LIST_TIMEOUT_SEC, TestmateConfig};

/// Settings shared by every suite of one tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteSettings {
    pub workspace: PathBuf,
    /// Watchdog for test runs; unlimited when `None`
    pub running_timeout: Option<Duration>,
    pub list_timeout: Duration,
}

impl SuiteSettings {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            running_timeout: None,
            list_timeout: Duration::from_secs(DEFAULT_LIST_TIMEOUT_SEC),
        }
    }

    pub fn from_config(workspace: impl Into<PathBuf>, config: &TestmateConfig) -> Self {
        Self {
            workspace: workspace.into(),
            running_timeout: config.running_timeout(),
            list_timeout: config.list_timeout(),
        }
    }
}
