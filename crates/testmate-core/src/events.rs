//! Load and state events emitted by the engine
//!
//! Load events bracket every change to the test tree. State events report
//! run progress for suites and tests. Consumers receive them through an
//! [`EventSink`].

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::ids::NodeId;
use crate::suite::RootSnapshot;

/// Lifecycle state of a suite during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteState {
    Running,
    Completed,
}

/// State of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    Running,
    Passed,
    Failed,
    Skipped,
    Errored,
}

impl TestState {
    /// True for every state except [`TestState::Running`]
    pub fn is_final(self) -> bool {
        !matches!(self, TestState::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LoadEvent {
    Started,
    Finished { root: RootSnapshot },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StateEvent {
    RunStarted {
        tests: Vec<NodeId>,
    },
    RunFinished,
    Suite {
        suite: NodeId,
        label: String,
        state: SuiteState,
    },
    Test {
        suite: NodeId,
        test: NodeId,
        name: String,
        state: TestState,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", with = "duration_ms")]
        duration: Option<Duration>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineEvent {
    Load(LoadEvent),
    State(StateEvent),
}

/// Receiver of engine events
///
/// `emit` is called from whatever task produced the event and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Sink that forwards events to an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        // receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events received so far
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return all events received so far
    pub fn take(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of (load started, load finished) events received
    pub fn load_counts(&self) -> (usize, usize) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.iter().fold((0, 0), |(started, finished), event| match event {
            EngineEvent::Load(LoadEvent::Started) => (started + 1, finished),
            EngineEvent::Load(LoadEvent::Finished { .. }) => (started, finished + 1),
            EngineEvent::State(_) => (started, finished),
        })
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: EngineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }
}
