use serde::Serialize;
use std::path::PathBuf;

use super::TestCase;
use crate::framework::FrameworkInfo;
use crate::ids::NodeId;

/// Immutable copy of the whole test tree
#[derive(Debug, Clone, Default, Serialize)]
pub struct RootSnapshot {
    pub id: Option<NodeId>,
    pub suites: Vec<SuiteSnapshot>,
}

impl RootSnapshot {
    pub fn test_count(&self) -> usize {
        self.suites.iter().map(|s| s.children.len()).sum()
    }

    pub fn find_suite(&self, label: &str) -> Option<&SuiteSnapshot> {
        self.suites.iter().find(|s| s.label == label)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteSnapshot {
    pub id: NodeId,
    pub label: String,
    pub orig_label: String,
    pub path: PathBuf,
    pub framework: FrameworkInfo,
    pub children: Vec<TestCase>,
}

impl SuiteSnapshot {
    pub fn find_test(&self, name: &str) -> Option<&TestCase> {
        self.children.iter().find(|t| t.name == name)
    }
}
