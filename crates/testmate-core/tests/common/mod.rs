//! Fake test executables for integration tests

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use testmate_core::{CollectingSink, EngineEvent, StateEvent, SuiteState, TestState, TestmateConfig};

pub const CATCH2_LISTING: &str = "Matching test cases:
  first test
      test1.cpp:12
      (NO DESCRIPTION)
  second test
      test1.cpp:20
      (NO DESCRIPTION)
      [math]
  hidden test
      test1.cpp:30
      (NO DESCRIPTION)
      [.]
3 matching test cases
";

pub const CATCH2_RESULTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Catch name="tests1.exe">
  <Group name="tests1.exe">
    <TestCase name="first test" filename="test1.cpp" line="12">
      <OverallResult success="true" durationInSeconds="0.001"/>
    </TestCase>
    <TestCase name="second test" filename="test1.cpp" line="20">
      <Expression success="false" type="REQUIRE" filename="test1.cpp" line="22">
        <Original>
          a == b
        </Original>
        <Expanded>
          1 == 2
        </Expanded>
      </Expression>
      <OverallResult success="false" durationInSeconds="0.002"/>
    </TestCase>
  </Group>
</Catch>
"#;

/// Shell script answering the Catch2 detection, listing and run invocations
///
/// `run_body` is executed for the run invocation.
pub fn catch2_script(run_body: &str) -> String {
    format!(
        "#!/bin/sh
case \"$1\" in
  --help)
    echo 'tests1.exe is a Catch v2.13.7 host application.'
    echo 'Run with -? for options'
    ;;
  --list-tests)
    cat <<'LISTING'
{CATCH2_LISTING}LISTING
    ;;
  --reporter)
    {run_body}
    ;;
esac
"
    )
}

/// Catch2 script whose runs print [`CATCH2_RESULTS`]
pub fn catch2_passing_script() -> String {
    catch2_script(&format!("cat <<'RESULTS'\n{CATCH2_RESULTS}RESULTS"))
}

/// Catch2 script whose runs never finish on their own
pub fn catch2_hanging_script() -> String {
    catch2_script("exec sleep 30")
}

/// Catch2 script whose `--help` answer takes `delay` (a `sleep` argument)
pub fn catch2_slow_help_script(delay: &str) -> String {
    catch2_passing_script().replace("  --help)\n", &format!("  --help)\n    sleep {delay}\n"))
}

/// Catch2 script that leaves `ran.marker` next to itself when run
pub fn catch2_marker_script() -> String {
    catch2_script(&format!(
        "touch \"$(dirname \"$0\")/ran.marker\"\n    cat <<'RESULTS'\n{CATCH2_RESULTS}RESULTS"
    ))
}

/// Catch2 executable whose listing is garbage and fails
pub const CATCH2_BROKEN_LISTING_SCRIPT: &str = "#!/bin/sh
case \"$1\" in
  --help)
    echo 'tests1.exe is a Catch v2.13.7 host application.'
    ;;
  --list-tests)
    echo 'Segmentation fault'
    exit 1
    ;;
esac
";

pub const PLAIN_SCRIPT: &str = "#!/bin/sh\necho hello\n";

/// Write an executable script without ever exposing a half-written file at `path`
pub fn write_script(workspace: &Path, path: &Path, body: &str) {
    let staging = workspace.join(format!(
        ".staging-{}",
        path.file_name().unwrap().to_string_lossy()
    ));
    fs::write(&staging, body).unwrap();
    fs::set_permissions(&staging, fs::Permissions::from_mode(0o755)).unwrap();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::rename(&staging, path).unwrap();
}

pub fn config_from_json(json: &str) -> TestmateConfig {
    serde_json::from_str(json).unwrap()
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

pub fn suite_states(sink: &Arc<CollectingSink>) -> Vec<SuiteState> {
    sink.events()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::State(StateEvent::Suite { state, .. }) => Some(state),
            _ => None,
        })
        .collect()
}

/// Final (non-running) test states as `(name, state, message)`
pub fn final_test_states(sink: &Arc<CollectingSink>) -> Vec<(String, TestState, Option<String>)> {
    sink.events()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::State(StateEvent::Test {
                name,
                state,
                message,
                ..
            }) if state.is_final() => Some((name, state, message)),
            _ => None,
        })
        .collect()
}
