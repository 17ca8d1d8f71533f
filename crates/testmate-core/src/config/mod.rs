//! Configuration system for testmate
//!
//! Configuration is read from JSON, YAML or TOML files. When no explicit path
//! is given, the loader searches from the workspace directory upwards for:
//! `.testmaterc.json`, `.testmaterc.toml`, `testmate.yaml`, `testmate.yml`,
//! `testmate.json`.
//!
//! ## Example Configuration (testmate.yaml)
//!
//! ```yaml
//! executables:
//!   - "build/**/*test*"
//!   - name: "${filename} (${relDirpath})"
//!     pattern: "out/**/*.exe"
//!     cwd: "${absDirpath}"
//!     env:
//!       ASAN_OPTIONS: detect_leaks=0
//! execution:
//!   parallelJobs: 4
//!   runningTimeoutSec: 60
//! discovery:
//!   watchTimeoutSec: 10
//! ```

mod loader;
mod testmate_config;

pub use loader::{CONFIG_FILE_NAMES, ConfigLoader};
pub use testmate_config::{
    DEFAULT_CWD, DEFAULT_LIST_TIMEOUT_SEC, DEFAULT_MAX_FILES, DEFAULT_NAME,
    DEFAULT_PARALLEL_JOBS, DEFAULT_PATTERN, DEFAULT_DETECT_TIMEOUT_SEC, DEFAULT_WATCH_TIMEOUT_SEC,
    DiscoveryConfiguration, ExecutableEntry, ExecutablePatternConfig, ExecutionConfiguration,
    TestmateConfig,
};
