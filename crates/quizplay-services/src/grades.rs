//! Static grade store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;

use quizplay_core::completion::GradeSnapshot;
use quizplay_core::traits::GradeStore;

/// Grade snapshots held in memory, one per learner.
#[derive(Debug, Default)]
pub struct MemoryGradeStore {
    snapshots: RwLock<HashMap<String, GradeSnapshot>>,
}

impl MemoryGradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot for `snapshot.learner_id`.
    pub fn set_snapshot(&self, snapshot: GradeSnapshot) {
        let mut snapshots = self.snapshots.write().unwrap_or_else(|e| e.into_inner());
        snapshots.insert(snapshot.learner_id.clone(), snapshot);
    }

    /// Load a JSON array of snapshots. Later entries for the same learner win.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let store = Self::new();
        for snapshot in read_snapshots(path)? {
            store.set_snapshot(snapshot);
        }
        Ok(store)
    }
}

/// Read a JSON array of grade snapshots, in file order.
pub fn read_snapshots(path: &Path) -> Result<Vec<GradeSnapshot>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read grade snapshots: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse grade snapshots: {}", path.display()))
}

#[async_trait]
impl GradeStore for MemoryGradeStore {
    async fn snapshot(&self, learner_id: &str) -> Result<GradeSnapshot> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        snapshots
            .get(learner_id)
            .cloned()
            .with_context(|| format!("no grades recorded for learner '{learner_id}'"))
    }
}
