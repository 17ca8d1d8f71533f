//! Catch2 listing and XML reporter parsing

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::time::Duration;

use super::{FrameworkAdapter, RunSelection, TestDescriptor, TestResult};
use crate::error::TestmateError;
use crate::events::TestState;
use crate::framework::FrameworkKind;
use crate::result::Result;

const LISTING_HEADERS: [&str; 2] = ["Matching test cases:", "All available test cases:"];
const NO_DESCRIPTION: &str = "(NO DESCRIPTION)";

static LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)(?::([0-9]+)|\(([0-9]+)\))$").expect("static regex is valid")
});

static TEST_CASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<TestCase\s+name="([^"]*)"[^>]*>(.*?)</TestCase>"#)
        .expect("static regex is valid")
});

static OVERALL_RESULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<OverallResult\s+success="(true|false)"([^>]*)/?>"#).expect("static regex is valid")
});

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"durationInSeconds="([0-9.eE+-]+)""#).expect("static regex is valid")
});

static FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<Expression\s+success="false"[^>]*>.*?<Expanded>\s*(.*?)\s*</Expanded>|<Exception[^>]*>\s*(.*?)\s*</Exception>|<FatalErrorCondition[^>]*>\s*(.*?)\s*</FatalErrorCondition>"#,
    )
    .expect("static regex is valid")
});

/// Adapter for Catch2 v2 and v3 executables
#[derive(Debug, Clone, Copy, Default)]
pub struct Catch2Adapter;

impl FrameworkAdapter for Catch2Adapter {
    fn kind(&self) -> FrameworkKind {
        FrameworkKind::Catch2
    }

    fn list_args(&self, _version: &Version) -> Vec<String> {
        vec!["--list-tests".into(), "--verbosity".into(), "high".into()]
    }

    fn parse_listing(&self, output: &str) -> Result<Vec<TestDescriptor>> {
        let mut lines = output.lines();
        if !lines
            .by_ref()
            .any(|line| LISTING_HEADERS.contains(&line.trim_end()))
        {
            return Err(TestmateError::parse_error(
                "Catch2 listing has no test case header",
            ));
        }

        let mut tests: Vec<ListedTest> = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let indent = line.len() - line.trim_start().len();
            match indent {
                0 => break,
                1..=3 => tests.push(ListedTest::new(line.trim())),
                _ => match tests.last_mut() {
                    Some(test) => test.attribute(line.trim()),
                    None => {
                        return Err(TestmateError::parse_error(format!(
                            "Catch2 listing has a detail line before any test: {}",
                            line.trim()
                        )));
                    }
                },
            }
        }

        Ok(tests.into_iter().map(ListedTest::into_descriptor).collect())
    }

    fn run_args(&self, _version: &Version, selection: RunSelection<'_>) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--reporter".into(),
            "xml".into(),
            "--durations".into(),
            "yes".into(),
        ];
        if let RunSelection::Tests(names) = selection {
            let spec = names
                .iter()
                .map(|name| escape_test_spec(name))
                .collect::<Vec<_>>()
                .join(",");
            args.push(spec);
        }
        args
    }

    fn parse_results(&self, output: &str) -> Vec<TestResult> {
        TEST_CASE
            .captures_iter(output)
            .filter_map(|caps| {
                let name = xml_unescape(caps.get(1)?.as_str());
                let body = caps.get(2)?.as_str();
                let overall = OVERALL_RESULT.captures(body)?;

                let passed = &overall[1] == "true";
                let mut result = TestResult::new(
                    name,
                    if passed { TestState::Passed } else { TestState::Failed },
                );
                result.duration = DURATION
                    .captures(&overall[2])
                    .and_then(|d| d[1].parse::<f64>().ok())
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .map(Duration::from_secs_f64);
                if !passed {
                    result.message = FAILURE.captures(body).and_then(|f| {
                        (1..=3)
                            .find_map(|i| f.get(i))
                            .map(|m| xml_unescape(m.as_str()))
                    });
                }
                Some(result)
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct ListedTest {
    name: String,
    location: Option<(String, Option<u32>)>,
    description: Vec<String>,
    tags: String,
}

impl ListedTest {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn attribute(&mut self, text: &str) {
        if self.location.is_none() {
            if let Some(caps) = LOCATION.captures(text) {
                let line = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .and_then(|m| m.as_str().parse().ok());
                self.location = Some((caps[1].to_string(), line));
            } else {
                // wrapped test name
                self.name.push(' ');
                self.name.push_str(text);
            }
        } else if text.starts_with('[') {
            self.tags.push_str(text);
        } else if text != NO_DESCRIPTION {
            self.description.push(text.to_string());
        }
    }

    fn is_hidden(&self) -> bool {
        self.name.starts_with("./")
            || self
                .tags
                .split_inclusive(']')
                .any(|tag| tag.starts_with("[.") || tag == "[!hide]")
    }

    fn into_descriptor(self) -> TestDescriptor {
        let skipped = self.is_hidden();
        let mut descriptor = TestDescriptor::new(self.name);
        descriptor.skipped = skipped;
        if let Some((file, line)) = self.location {
            descriptor.file = Some(file);
            descriptor.line = line;
        }
        if !self.tags.is_empty() {
            descriptor.metadata.insert("tags".into(), self.tags);
        }
        if !self.description.is_empty() {
            descriptor
                .metadata
                .insert("description".into(), self.description.join(" "));
        }
        descriptor
    }
}

fn escape_test_spec(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, ',' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::super::CATCH2;
    use super::*;

    const LISTING: &str = "Matching test cases:
  first test
      /src/tests/test1.cpp:12
      (NO DESCRIPTION)
      [fast]
  hidden one
      /src/tests/test1.cpp:30
      checks the slow path
      [.][slow]
  ./dot prefixed
      test1.cpp(44)
      (NO DESCRIPTION)
3 matching test cases

";

    #[test]
    fn test_parse_listing() {
        let tests = CATCH2.parse_listing(LISTING).unwrap();
        assert_eq!(tests.len(), 3);

        assert_eq!(tests[0].name, "first test");
        assert_eq!(tests[0].file.as_deref(), Some("/src/tests/test1.cpp"));
        assert_eq!(tests[0].line, Some(12));
        assert!(!tests[0].skipped);
        assert_eq!(tests[0].metadata.get("tags").map(String::as_str), Some("[fast]"));
        assert!(!tests[0].metadata.contains_key("description"));

        assert!(tests[1].skipped);
        assert_eq!(
            tests[1].metadata.get("description").map(String::as_str),
            Some("checks the slow path")
        );

        assert_eq!(tests[2].file.as_deref(), Some("test1.cpp"));
        assert_eq!(tests[2].line, Some(44));
        assert!(tests[2].skipped);
    }

    #[test]
    fn test_parse_catch2_v3_listing() {
        let listing = "All available test cases:\n  one\n      a.cpp:1\n      (NO DESCRIPTION)\n      [!hide]\n  two\n      a.cpp:9\n      (NO DESCRIPTION)\n2 test cases\n";
        let tests = CATCH2.parse_listing(listing).unwrap();
        assert_eq!(tests.len(), 2);
        assert!(tests[0].skipped);
        assert!(!tests[1].skipped);
    }

    #[test]
    fn test_wrapped_name_is_joined() {
        let listing = "Matching test cases:\n  a very long test name that\n    wraps onto a second line\n      x.cpp:3\n1 matching test case\n";
        let tests = CATCH2.parse_listing(listing).unwrap();
        assert_eq!(tests[0].name, "a very long test name that wraps onto a second line");
        assert_eq!(tests[0].line, Some(3));
    }

    #[test]
    fn test_listing_without_header_is_malformed() {
        assert!(CATCH2.parse_listing("garbage\n").is_err());
        assert!(CATCH2.parse_listing("").is_err());
    }

    #[test]
    fn test_empty_listing() {
        let tests = CATCH2.parse_listing("Matching test cases:\n0 matching test cases\n").unwrap();
        assert!(tests.is_empty());
    }

    #[test]
    fn test_run_args_escape_names() {
        let names = vec!["a,b".to_string(), "[x]".to_string(), "plain".to_string()];
        let args = CATCH2.run_args(&Version::new(2, 0, 0), RunSelection::Tests(&names));
        assert_eq!(args[..4], ["--reporter", "xml", "--durations", "yes"]);
        assert_eq!(args[4], r"a\,b,\[x\],plain");

        let all = CATCH2.run_args(&Version::new(2, 0, 0), RunSelection::All);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_parse_results() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Catch name="tests1.exe">
  <Group name="tests1.exe">
    <TestCase name="first test" filename="test1.cpp" line="12">
      <OverallResult success="true" durationInSeconds="0.0012"/>
    </TestCase>
    <TestCase name="a &amp; b" filename="test1.cpp" line="20">
      <Expression success="false" type="REQUIRE" filename="test1.cpp" line="22">
        <Original>
          x == 2
        </Original>
        <Expanded>
          1 == 2
        </Expanded>
      </Expression>
      <OverallResult success="false" durationInSeconds="0.5"/>
    </TestCase>
    <TestCase name="unfinished"
"#;
        let results = CATCH2.parse_results(xml);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "first test");
        assert_eq!(results[0].state, TestState::Passed);
        assert_eq!(results[0].duration, Some(Duration::from_secs_f64(0.0012)));
        assert_eq!(results[1].name, "a & b");
        assert_eq!(results[1].state, TestState::Failed);
        assert_eq!(results[1].message.as_deref(), Some("1 == 2"));
    }

    #[test]
    fn test_exception_message() {
        let xml = r#"<TestCase name="throws"><Exception filename="t.cpp" line="3">
  boom
</Exception><OverallResult success="false"/></TestCase>"#;
        let results = CATCH2.parse_results(xml);
        assert_eq!(results[0].message.as_deref(), Some("boom"));
        assert_eq!(results[0].duration, None);
    }
}
