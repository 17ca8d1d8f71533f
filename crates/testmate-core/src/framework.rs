//! Test framework detection
//!
//! Executables are run with `--help` and classified by fixed signatures in
//! their standard output. Anything that fails to run, hangs past the detection
//! timeout, or prints no known signature is [`FrameworkKind::Unknown`].

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::adapters::{CATCH2, FrameworkAdapter, GOOGLE_TEST};
use crate::config::DEFAULT_DETECT_TIMEOUT_SEC;
use crate::process::{SpawnOptions, run_captured};

static CATCH2_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Catch2? v([0-9]+)\.([0-9]+)\.([0-9]+)").expect("static regex is valid")
});

const GOOGLE_TEST_SIGNATURE: &str = "This program contains tests written using Google Test.";

/// Argument passed to executables when probing them
pub const DETECT_ARG: &str = "--help";

/// Supported test frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkKind {
    Catch2,
    #[serde(rename = "google")]
    GoogleTest,
    Unknown,
}

impl fmt::Display for FrameworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameworkKind::Catch2 => write!(f, "catch2"),
            FrameworkKind::GoogleTest => write!(f, "google"),
            FrameworkKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Detected framework and its version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub kind: FrameworkKind,
    pub version: Version,
}

impl FrameworkInfo {
    pub fn new(kind: FrameworkKind, version: Version) -> Self {
        Self { kind, version }
    }

    pub fn unknown() -> Self {
        Self::new(FrameworkKind::Unknown, Version::new(0, 0, 0))
    }

    pub fn is_known(&self) -> bool {
        self.kind != FrameworkKind::Unknown
    }

    /// Parser collaborator for this framework
    pub fn adapter(&self) -> Option<&'static dyn FrameworkAdapter> {
        adapter_for(self.kind)
    }

    /// Classify the stdout of a `--help` invocation
    pub fn from_help_output(stdout: &str) -> Self {
        if let Some(caps) = CATCH2_SIGNATURE.captures(stdout) {
            let part = |i: usize| {
                caps.get(i)
                    .and_then(|m| m.as_str().parse::<u64>().ok())
                    .unwrap_or(0)
            };
            return Self::new(FrameworkKind::Catch2, Version::new(part(1), part(2), part(3)));
        }
        if stdout.contains(GOOGLE_TEST_SIGNATURE) {
            return Self::new(FrameworkKind::GoogleTest, Version::new(0, 0, 0));
        }
        Self::unknown()
    }
}

impl fmt::Display for FrameworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.version)
    }
}

/// Capability table: framework kind to parser collaborator
pub fn adapter_for(kind: FrameworkKind) -> Option<&'static dyn FrameworkAdapter> {
    match kind {
        FrameworkKind::Catch2 => Some(&CATCH2),
        FrameworkKind::GoogleTest => Some(&GOOGLE_TEST),
        FrameworkKind::Unknown => None,
    }
}

/// Detects the framework of executables
#[derive(Debug, Clone)]
pub struct FrameworkDetector {
    detect_timeout: Duration,
}

impl Default for FrameworkDetector {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_DETECT_TIMEOUT_SEC))
    }
}

impl FrameworkDetector {
    pub fn new(detect_timeout: Duration) -> Self {
        Self { detect_timeout }
    }

    /// Detect the framework of `path`; never fails
    pub async fn detect(&self, path: &Path) -> FrameworkInfo {
        let args = [DETECT_ARG.to_string()];
        match run_captured(path, &args, &SpawnOptions::default(), Some(self.detect_timeout)).await {
            Ok(output) => {
                let info = FrameworkInfo::from_help_output(&output.stdout);
                debug!("Detected {}: {} ({:?})", path.display(), info, output.outcome);
                info
            }
            Err(e) => {
                debug!("Detection of {} failed: {}", path.display(), e);
                FrameworkInfo::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch2_v2_signature() {
        let stdout = "\nTest.exe is a Catch v2.13.7 host application.\nRun with -? for options\n";
        let info = FrameworkInfo::from_help_output(stdout);
        assert_eq!(info.kind, FrameworkKind::Catch2);
        assert_eq!(info.version, Version::new(2, 13, 7));
    }

    #[test]
    fn test_catch2_v3_signature() {
        let info = FrameworkInfo::from_help_output("tests is a Catch2 v3.4.0 host application.");
        assert_eq!(info.kind, FrameworkKind::Catch2);
        assert_eq!(info.version, Version::new(3, 4, 0));
    }

    #[test]
    fn test_google_test_signature() {
        let stdout = "This program contains tests written using Google Test. You can use the\nfollowing command line flags";
        let info = FrameworkInfo::from_help_output(stdout);
        assert_eq!(info.kind, FrameworkKind::GoogleTest);
        assert_eq!(info.version, Version::new(0, 0, 0));
    }

    #[test]
    fn test_unknown_output() {
        let info = FrameworkInfo::from_help_output("usage: ls [OPTION]... [FILE]...");
        assert_eq!(info, FrameworkInfo::unknown());
        assert!(!info.is_known());
        assert!(info.adapter().is_none());
    }

    #[test]
    fn test_adapter_lookup() {
        assert_eq!(adapter_for(FrameworkKind::Catch2).unwrap().kind(), FrameworkKind::Catch2);
        assert_eq!(
            adapter_for(FrameworkKind::GoogleTest).unwrap().kind(),
            FrameworkKind::GoogleTest
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_unknown() {
        let detector = FrameworkDetector::default();
        let info = detector.detect(Path::new("/no/such/binary")).await;
        assert_eq!(info, FrameworkInfo::unknown());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_binary_is_unknown() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("hang.exe");
        std::fs::write(&path, "#!/bin/sh\nsleep 10\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let detector = FrameworkDetector::new(Duration::from_millis(200));
        assert_eq!(detector.detect(&path).await, FrameworkInfo::unknown());
    }
}
