//! Configuration types for testmate
//!
//! `TestmateConfig` is the root of the configuration file. Every section is
//! optional; the accessor methods fill in defaults.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::TestmateError;
use crate::result::Result;

/// Default glob used when no executables are configured
pub const DEFAULT_PATTERN: &str = "build/**/*test*";
/// Default display name template
pub const DEFAULT_NAME: &str = "${filename}";
/// Default working directory template
pub const DEFAULT_CWD: &str = "${absDirpath}";
/// Default Task Pool capacity
pub const DEFAULT_PARALLEL_JOBS: usize = 4;
/// Default settle quiet timeout
pub const DEFAULT_WATCH_TIMEOUT_SEC: u64 = 10;
/// Default bound on the number of files enumerated per pattern
pub const DEFAULT_MAX_FILES: usize = 1000;
/// Default timeout for the `--help` framework detection
pub const DEFAULT_DETECT_TIMEOUT_SEC: u64 = 5;
/// Default timeout for listing tests during reload
pub const DEFAULT_LIST_TIMEOUT_SEC: u64 = 30;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestmateConfig {
    /// Executable patterns to discover
    #[schemars(description = "Executable patterns: a glob string or a full pattern object")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executables: Option<Vec<ExecutableEntry>>,

    /// Execution settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionConfiguration>,

    /// Discovery and watch settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryConfiguration>,
}

/// One entry of the `executables` list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum ExecutableEntry {
    /// Shorthand: just a glob pattern
    Pattern(String),
    /// Full pattern configuration
    Config(ExecutablePatternConfig),
}

impl ExecutableEntry {
    /// Normalize to a full pattern configuration
    pub fn to_pattern_config(&self) -> ExecutablePatternConfig {
        match self {
            ExecutableEntry::Pattern(pattern) => ExecutablePatternConfig::new(pattern.clone()),
            ExecutableEntry::Config(config) => config.clone(),
        }
    }
}

/// Configuration of one executable pattern
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutablePatternConfig {
    /// Display name template
    #[schemars(description = "Display name template, e.g. '${filename}'")]
    #[serde(default = "default_name")]
    pub name: String,

    /// Glob pattern, workspace relative or absolute
    #[schemars(description = "Glob pattern, relative to the workspace or absolute")]
    pub pattern: String,

    /// Working directory template
    #[schemars(description = "Working directory template, e.g. '${absDirpath}'")]
    #[serde(default = "default_cwd")]
    pub cwd: String,

    /// Environment variable templates
    #[schemars(description = "Extra environment variables; values may contain variables")]
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_cwd() -> String {
    DEFAULT_CWD.to_string()
}

impl ExecutablePatternConfig {
    /// Create a pattern config with default name, cwd and env
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            pattern: pattern.into(),
            cwd: default_cwd(),
            env: IndexMap::new(),
        }
    }

    /// Set the display name template
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the working directory template
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Add one environment variable template
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Execution configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfiguration {
    /// Maximum number of executables running at the same time
    #[schemars(description = "Maximum number of concurrently running executables")]
    pub parallel_jobs: Option<usize>,

    /// Running timeout in seconds (unbounded when absent)
    #[schemars(description = "Kill a test executable after this many seconds")]
    pub running_timeout_sec: Option<u64>,
}

/// Discovery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfiguration {
    /// Quiet period after the last file event before a missing file counts as deleted
    #[schemars(description = "Seconds without file events before a missing executable is removed")]
    pub watch_timeout_sec: Option<u64>,

    /// Maximum number of files enumerated per pattern
    #[schemars(description = "Maximum number of files matched per pattern")]
    pub max_files: Option<usize>,

    /// Timeout of the framework detection
    #[schemars(description = "Seconds allowed for the '--help' framework detection")]
    pub detect_timeout_sec: Option<u64>,

    /// Timeout of the test listing
    #[schemars(description = "Seconds allowed for listing the tests of an executable")]
    pub list_timeout_sec: Option<u64>,
}

impl TestmateConfig {
    /// Load configuration from file
    ///
    /// Supports JSON (`.json`), YAML (`.yaml`, `.yml`) and TOML (`.toml`).
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| TestmateError::io_error(path, e))?;
        let ext = path.extension().and_then(|e| e.to_str());

        let parsed: std::result::Result<Self, String> = match ext {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
            Some("toml") => toml::from_str(&content).map_err(|e| e.to_string()),
            _ => Err("Unsupported file extension (expected .json, .yaml, .yml or .toml)".into()),
        };

        parsed.map_err(|message| {
            TestmateError::config_error(format!("{}: {}", path.display(), message))
        })
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.parallel_jobs() == 0 {
            return Err(TestmateError::config_error(
                "execution.parallelJobs must be at least 1",
            ));
        }
        if self.watch_timeout().is_zero() {
            return Err(TestmateError::config_error(
                "discovery.watchTimeoutSec must be greater than 0",
            ));
        }
        for pattern in self.executable_patterns() {
            if pattern.pattern.trim().is_empty() {
                return Err(TestmateError::config_error(
                    "executables entries must have a non-empty pattern",
                ));
            }
        }
        Ok(())
    }

    /// All executable patterns, or the default pattern when none are configured
    pub fn executable_patterns(&self) -> Vec<ExecutablePatternConfig> {
        match &self.executables {
            Some(entries) => entries.iter().map(|e| e.to_pattern_config()).collect(),
            None => vec![ExecutablePatternConfig::new(DEFAULT_PATTERN)],
        }
    }

    /// Task Pool capacity
    pub fn parallel_jobs(&self) -> usize {
        self.execution
            .as_ref()
            .and_then(|e| e.parallel_jobs)
            .unwrap_or(DEFAULT_PARALLEL_JOBS)
    }

    /// Maximum running time of a test executable; `None` is unbounded
    pub fn running_timeout(&self) -> Option<Duration> {
        self.execution
            .as_ref()
            .and_then(|e| e.running_timeout_sec)
            .map(Duration::from_secs)
    }

    /// Settle quiet timeout
    pub fn watch_timeout(&self) -> Duration {
        Duration::from_secs(
            self.discovery
                .as_ref()
                .and_then(|d| d.watch_timeout_sec)
                .unwrap_or(DEFAULT_WATCH_TIMEOUT_SEC),
        )
    }

    /// Enumeration bound per pattern
    pub fn max_files(&self) -> usize {
        self.discovery
            .as_ref()
            .and_then(|d| d.max_files)
            .unwrap_or(DEFAULT_MAX_FILES)
    }

    /// Framework detection timeout
    pub fn detect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.discovery
                .as_ref()
                .and_then(|d| d.detect_timeout_sec)
                .unwrap_or(DEFAULT_DETECT_TIMEOUT_SEC),
        )
    }

    /// Listing timeout
    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(
            self.discovery
                .as_ref()
                .and_then(|d| d.list_timeout_sec)
                .unwrap_or(DEFAULT_LIST_TIMEOUT_SEC),
        )
    }

    /// JSON schema of the configuration file
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(TestmateConfig)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TestmateConfig::default();
        assert_eq!(config.parallel_jobs(), DEFAULT_PARALLEL_JOBS);
        assert_eq!(config.running_timeout(), None);
        assert_eq!(config.watch_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_files(), 1000);

        let patterns = config.executable_patterns();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern, DEFAULT_PATTERN);
        assert_eq!(patterns[0].name, "${filename}");
        assert_eq!(patterns[0].cwd, "${absDirpath}");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shorthand_and_full_entries() {
        let json = r#"{
            "executables": [
                "out/*.exe",
                { "pattern": "build/**/*test*", "name": "${baseFilename}", "env": { "A": "${absPath}" } }
            ],
            "execution": { "parallelJobs": 2, "runningTimeoutSec": 30 }
        }"#;
        let config: TestmateConfig = serde_json::from_str(json).unwrap();
        let patterns = config.executable_patterns();

        assert_eq!(patterns[0], ExecutablePatternConfig::new("out/*.exe"));
        assert_eq!(patterns[1].name, "${baseFilename}");
        assert_eq!(patterns[1].cwd, DEFAULT_CWD);
        assert_eq!(patterns[1].env.get("A").map(String::as_str), Some("${absPath}"));
        assert_eq!(config.parallel_jobs(), 2);
        assert_eq!(config.running_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_validate_rejects_zero_jobs() {
        let config = TestmateConfig {
            execution: Some(ExecutionConfiguration {
                parallel_jobs: Some(0),
                running_timeout_sec: None,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_pattern() {
        let config = TestmateConfig {
            executables: Some(vec![ExecutableEntry::Pattern("  ".to_string())]),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_and_toml_formats() {
        let yaml = "executables:\n  - out/*.exe\ndiscovery:\n  watchTimeoutSec: 3\n";
        let config: TestmateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.watch_timeout(), Duration::from_secs(3));

        let toml_src = "[execution]\nparallelJobs = 8\n\n[[executables]]\npattern = \"bin/*\"\n";
        let config: TestmateConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.parallel_jobs(), 8);
        assert_eq!(config.executable_patterns()[0].pattern, "bin/*");
    }

    #[test]
    fn test_json_schema_mentions_sections() {
        let schema = TestmateConfig::json_schema().to_string();
        assert!(schema.contains("executables"));
        assert!(schema.contains("parallelJobs"));
    }
}
