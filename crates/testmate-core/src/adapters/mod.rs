//! Framework adapters
//!
//! Each supported framework has one adapter that knows how to ask an
//! executable for its tests, how to parse that listing, how to select a subset
//! of tests on the command line and how to read per-test results from the run
//! output. Adapters are stateless and looked up by
//! [`crate::framework::adapter_for`].

mod catch2;
mod gtest;

pub use catch2::Catch2Adapter;
pub use gtest::GoogleTestAdapter;

use semver::Version;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::events::TestState;
use crate::framework::FrameworkKind;
use crate::result::Result;

/// Shared Catch2 adapter instance
pub static CATCH2: Catch2Adapter = Catch2Adapter;
/// Shared Google Test adapter instance
pub static GOOGLE_TEST: GoogleTestAdapter = GoogleTestAdapter;

/// One test as reported by a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestDescriptor {
    pub name: String,
    /// Source file as printed by the framework, unresolved
    pub file: Option<String>,
    pub line: Option<u32>,
    pub skipped: bool,
    pub metadata: BTreeMap<String, String>,
}

impl TestDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Which tests a run should execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSelection<'a> {
    /// Everything the executable runs by default
    All,
    /// Exactly these test names
    Tests(&'a [String]),
}

/// Result of one test read from run output
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub name: String,
    pub state: TestState,
    pub message: Option<String>,
    pub duration: Option<Duration>,
}

impl TestResult {
    pub fn new(name: impl Into<String>, state: TestState) -> Self {
        Self {
            name: name.into(),
            state,
            message: None,
            duration: None,
        }
    }
}

/// Framework-specific listing and result parser
pub trait FrameworkAdapter: Send + Sync {
    /// Framework handled by this adapter
    fn kind(&self) -> FrameworkKind;

    /// Arguments that make the executable list its tests
    fn list_args(&self, version: &Version) -> Vec<String>;

    /// Parse the listing printed for [`FrameworkAdapter::list_args`]
    fn parse_listing(&self, output: &str) -> Result<Vec<TestDescriptor>>;

    /// Arguments that run the selected tests
    fn run_args(&self, version: &Version, selection: RunSelection<'_>) -> Vec<String>;

    /// Per-test results found in the output of a run
    fn parse_results(&self, output: &str) -> Vec<TestResult>;
}
