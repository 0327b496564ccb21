use serde::Serialize;
use tokio::sync::oneshot;

/// Reply channel delivered to a stage with each diagnostic request.
/// The stage answers synchronously with a point-in-time view of itself.
pub type SnapshotRequest = oneshot::Sender<StageSnapshot>;

/// Point-in-time view of one stage's internal state.
#[derive(Debug, Clone, Serialize)]
pub struct StageSnapshot {
    pub stage: String,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub key: String,
    pub value: String,
}

impl StageSnapshot {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.entries.push(SnapshotEntry {
            key: key.into(),
            value: value.to_string(),
        });
        self
    }

    pub fn entry(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }
}
