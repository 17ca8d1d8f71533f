//! Google Test listing and console output parsing

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::time::Duration;

use super::{FrameworkAdapter, RunSelection, TestDescriptor, TestResult};
use crate::error::TestmateError;
use crate::events::TestState;
use crate::framework::FrameworkKind;
use crate::result::Result;

const DISABLED_PREFIX: &str = "DISABLED_";

static RESULT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[\s*(OK|FAILED|SKIPPED)\s*\] ([^\s(]+)(?: \(([0-9]+) ms\))?")
        .expect("static regex is valid")
});

static RUN_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[ RUN\s*\] (\S+)").expect("static regex is valid"));

/// Adapter for Google Test executables
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleTestAdapter;

impl FrameworkAdapter for GoogleTestAdapter {
    fn kind(&self) -> FrameworkKind {
        FrameworkKind::GoogleTest
    }

    fn list_args(&self, _version: &Version) -> Vec<String> {
        vec!["--gtest_list_tests".into()]
    }

    fn parse_listing(&self, output: &str) -> Result<Vec<TestDescriptor>> {
        let mut tests = Vec::new();
        let mut suite: Option<(String, Option<String>)> = None;

        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let (text, comment) = split_comment(line);
            if !line.starts_with(' ') {
                // banner lines such as "Running main() from gtest_main.cc" end the current suite
                suite = text
                    .strip_suffix('.')
                    .map(|name| (name.to_string(), comment.map(str::to_string)));
                continue;
            }

            let Some((suite_name, type_param)) = &suite else {
                return Err(TestmateError::parse_error(format!(
                    "Google Test listing has a test outside of any suite: {}",
                    line.trim()
                )));
            };
            let test_name = text.trim();
            let mut descriptor = TestDescriptor::new(format!("{suite_name}.{test_name}"));
            descriptor.skipped = is_disabled(suite_name) || is_disabled(test_name);
            if let Some(param) = type_param.as_deref().and_then(|c| param_value(c, "TypeParam")) {
                descriptor.metadata.insert("typeParam".into(), param);
            }
            if let Some(param) = comment.and_then(|c| param_value(c, "GetParam()")) {
                descriptor.metadata.insert("getParam".into(), param);
            }
            tests.push(descriptor);
        }

        Ok(tests)
    }

    fn run_args(&self, _version: &Version, selection: RunSelection<'_>) -> Vec<String> {
        let mut args = vec!["--gtest_color=no".to_string()];
        if let RunSelection::Tests(names) = selection {
            args.push(format!("--gtest_filter={}", names.join(":")));
            args.push("--gtest_also_run_disabled_tests".into());
        }
        args
    }

    fn parse_results(&self, output: &str) -> Vec<TestResult> {
        let mut results = Vec::new();
        let mut running: Option<(String, Vec<&str>)> = None;

        for line in output.lines() {
            // the summary after "N tests ran" repeats failed names
            if line.starts_with("[==========]") && line.contains(" ran.") {
                break;
            }
            if let Some(caps) = RUN_LINE.captures(line) {
                running = Some((caps[1].to_string(), Vec::new()));
                continue;
            }
            if let Some(caps) = RESULT_LINE.captures(line) {
                let name = caps[2].to_string();
                let state = match &caps[1] {
                    "OK" => TestState::Passed,
                    "SKIPPED" => TestState::Skipped,
                    _ => TestState::Failed,
                };
                let mut result = TestResult::new(name, state);
                result.duration = caps
                    .get(3)
                    .and_then(|ms| ms.as_str().parse().ok())
                    .map(Duration::from_millis);
                if let Some((current, lines)) = running.take() {
                    let message = lines.join("\n").trim().to_string();
                    if current == result.name && state != TestState::Passed && !message.is_empty()
                    {
                        result.message = Some(message);
                    }
                }
                results.push(result);
                continue;
            }
            if let Some((_, lines)) = running.as_mut() {
                lines.push(line);
            }
        }

        results
    }
}

fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.find("  #") {
        Some(pos) => (&line[..pos], Some(line[pos + 3..].trim())),
        None => (line.trim_end(), None),
    }
}

fn param_value(comment: &str, key: &str) -> Option<String> {
    let rest = comment.trim().strip_prefix(key)?.trim_start();
    Some(rest.strip_prefix('=')?.trim().to_string())
}

fn is_disabled(name: &str) -> bool {
    name.split('/').any(|part| part.starts_with(DISABLED_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::super::GOOGLE_TEST;
    use super::*;

    #[test]
    fn test_parse_listing() {
        let listing = "Running main() from gtest_main.cc
MathTest.
  Adds
  DISABLED_Divides
DISABLED_Broken.
  Any
Typed/ListTest/0.  # TypeParam = int
  Grows
Values/ParamTest.
  Check/0  # GetParam() = 4
";
        let tests = GOOGLE_TEST.parse_listing(listing).unwrap();
        let names: Vec<_> = tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "MathTest.Adds",
                "MathTest.DISABLED_Divides",
                "DISABLED_Broken.Any",
                "Typed/ListTest/0.Grows",
                "Values/ParamTest.Check/0",
            ]
        );
        assert!(!tests[0].skipped);
        assert!(tests[1].skipped);
        assert!(tests[2].skipped);
        assert_eq!(tests[3].metadata.get("typeParam").map(String::as_str), Some("int"));
        assert_eq!(tests[4].metadata.get("getParam").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_test_before_suite_is_malformed() {
        assert!(GOOGLE_TEST.parse_listing("  Orphan\n").is_err());
    }

    #[test]
    fn test_run_args() {
        let names = vec!["A.b".to_string(), "A.c".to_string()];
        let args = GOOGLE_TEST.run_args(&Version::new(0, 0, 0), RunSelection::Tests(&names));
        assert_eq!(
            args,
            ["--gtest_color=no", "--gtest_filter=A.b:A.c", "--gtest_also_run_disabled_tests"]
        );
        assert_eq!(GOOGLE_TEST.run_args(&Version::new(0, 0, 0), RunSelection::All), ["--gtest_color=no"]);
    }

    #[test]
    fn test_parse_results() {
        let output = "[==========] Running 3 tests from 1 test suite.
[----------] 3 tests from MathTest
[ RUN      ] MathTest.Adds
[       OK ] MathTest.Adds (0 ms)
[ RUN      ] MathTest.Subtracts
math_test.cpp:14: Failure
Expected equality of these values:
  1
  2
[  FAILED  ] MathTest.Subtracts (3 ms)
[ RUN      ] MathTest.Later
[  SKIPPED ] MathTest.Later (0 ms)
[==========] 3 tests from 1 test suite ran. (5 ms total)
[  PASSED  ] 1 test.
[  FAILED  ] 1 test, listed below:
[  FAILED  ] MathTest.Subtracts
";
        let results = GOOGLE_TEST.parse_results(output);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].state, TestState::Passed);
        assert_eq!(results[0].message, None);
        assert_eq!(results[1].name, "MathTest.Subtracts");
        assert_eq!(results[1].state, TestState::Failed);
        assert_eq!(results[1].duration, Some(Duration::from_millis(3)));
        assert!(results[1].message.as_deref().unwrap().starts_with("math_test.cpp:14: Failure"));
        assert_eq!(results[2].state, TestState::Skipped);
    }
}
