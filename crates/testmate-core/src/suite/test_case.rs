use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::adapters::TestDescriptor;
use crate::ids::NodeId;

/// Leaf node of the test tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: NodeId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub skipped: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TestCase {
    /// Build a test from a listing entry with an already resolved source file
    pub fn from_descriptor(id: NodeId, descriptor: TestDescriptor, file: Option<PathBuf>) -> Self {
        Self {
            id,
            name: descriptor.name,
            file,
            line: descriptor.line,
            skipped: descriptor.skipped,
            metadata: descriptor.metadata,
        }
    }
}
